use image::{imageops, GrayImage, Luma, RgbImage};
use imageproc::contrast::otsu_level;

// Binary image
//------------------------------------------------------------------------------

/// Foreground mask of an RGB capture: dark pixels are 255, light pixels 0.
#[derive(Debug, Clone)]
pub struct BinaryImage {
    pub mask: GrayImage,
    // Gray level at or below which a pixel counts as dark
    pub level: u8,
    pub w: u32,
    pub h: u32,
}

impl BinaryImage {
    pub fn prepare(img: &RgbImage) -> Self {
        let gray = imageops::grayscale(img);
        let level = Self::threshold_level(&gray);
        let (w, h) = gray.dimensions();
        let mask = GrayImage::from_fn(w, h, |x, y| {
            if gray.get_pixel(x, y)[0] <= level {
                Luma([255])
            } else {
                Luma([0])
            }
        });
        Self { mask, level, w, h }
    }

    /// Otsu's level when the histogram has two classes to separate. A flat
    /// image falls back to the mean, where only pixels below it are dark.
    pub fn threshold_level(gray: &GrayImage) -> u8 {
        let (mut lo, mut hi, mut sum) = (u8::MAX, u8::MIN, 0u64);
        for p in gray.pixels() {
            lo = lo.min(p[0]);
            hi = hi.max(p[0]);
            sum += p[0] as u64;
        }

        if lo < hi {
            return otsu_level(gray);
        }
        let n = (gray.width() as u64 * gray.height() as u64).max(1);
        ((sum / n) as u8).saturating_sub(1)
    }

    pub fn count_dark(&self) -> usize {
        self.mask.pixels().filter(|p| p[0] != 0).count()
    }
}

#[cfg(test)]
mod binarize_tests {
    use image::{Rgb, RgbImage};

    use super::BinaryImage;
    use crate::common::metadata::Color;

    #[test]
    fn test_palette_split() {
        // Every palette color except white must land in the foreground
        let colors = [Color::White, Color::Black, Color::Red, Color::Blue];
        let img = RgbImage::from_fn(40, 10, |x, _| colors[(x / 10) as usize].rgb());
        let bin = BinaryImage::prepare(&img);
        let dark: Vec<bool> = (0..4).map(|i| bin.mask.get_pixel(i * 10 + 5, 5)[0] != 0).collect();
        assert_eq!(dark, [false, true, true, true]);
        assert_eq!(bin.count_dark(), 300);
    }

    #[test]
    fn test_flat_image_has_no_foreground() {
        let img = RgbImage::from_pixel(20, 20, Rgb([255, 255, 255]));
        let bin = BinaryImage::prepare(&img);
        assert_eq!(bin.level, 254);
        assert_eq!(bin.count_dark(), 0);
    }
}
