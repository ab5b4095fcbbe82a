use std::borrow::Cow;

use image::{imageops, RgbImage};
use tracing::{debug, info, warn};

use crate::common::{
    error::{GridError, GridResult},
    layout::{Axis, Corner, ZoneLayout},
};

use super::{
    binarize::BinaryImage,
    finder::{locate_finders, FinderCorners},
    sampler::{linear_centers, refine_axis, GridMapping, DEFAULT_TIMING_THRESHOLD},
    utils::{affine::Affine, geometry::Point},
    Diagnostic,
};

// Options
//------------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RectifyOptions {
    // Half side of the sampling window. Defaults to a quarter cell
    pub sample_radius: Option<u32>,
    pub timing_refinement: bool,
    pub timing_threshold: f64,
}

impl Default for RectifyOptions {
    fn default() -> Self {
        Self { sample_radius: None, timing_refinement: true, timing_threshold: DEFAULT_TIMING_THRESHOLD }
    }
}

// Rectified capture
//------------------------------------------------------------------------------

/// Upright capture with the mapping from grid cells to its pixels.
#[derive(Debug, Clone)]
pub struct Rectified<'a> {
    pub image: Cow<'a, RgbImage>,
    pub mapping: GridMapping,
    pub radius: u32,
    // None when sampling fell back to the axis aligned estimate
    pub corners: Option<FinderCorners>,
}

// Rectifier stages
//------------------------------------------------------------------------------

enum Stage<'a> {
    Detect { image: Cow<'a, RgbImage>, rotated: bool },
    Rotate { image: Cow<'a, RgbImage>, degrees: i32 },
    Estimate { image: Cow<'a, RgbImage>, corners: FinderCorners },
    Fallback { image: Cow<'a, RgbImage>, reason: GridError },
}

/// Nearest multiple of 90 degrees, in (-180, 180].
pub fn coarse_angle(degrees: f64) -> i32 {
    match ((degrees / 90.0).round() as i32).rem_euclid(4) {
        0 => 0,
        1 => 90,
        2 => 180,
        _ => -90,
    }
}

/// Expected TL to TR distance over the side of a finder core.
fn span_ratio(layout: &ZoneLayout) -> f64 {
    let fp = &layout.config().finder;
    (layout.dim() - fp.size) as f64 / (fp.size - 2 * fp.margin) as f64
}

// ENTRY POINT FOR RECTIFICATION
pub fn rectify<'a>(
    img: &'a RgbImage,
    layout: &ZoneLayout,
    opts: &RectifyOptions,
    diags: &mut Vec<Diagnostic>,
) -> GridResult<Rectified<'a>> {
    let span = span_ratio(layout);
    let mut stage = Stage::Detect { image: Cow::Borrowed(img), rotated: false };

    loop {
        stage = match stage {
            Stage::Detect { image, rotated } => {
                let bin = BinaryImage::prepare(&image);
                debug!("Binarized at level {}: {} dark pixels", bin.level, bin.count_dark());
                match locate_finders(&bin, Some(span)) {
                    Ok(corners) => {
                        let degrees = coarse_angle(corners.angle());
                        debug!("Finders at {corners:?}, Angle {:.1}", corners.angle());
                        if degrees != 0 && !rotated {
                            Stage::Rotate { image, degrees }
                        } else {
                            Stage::Estimate { image, corners }
                        }
                    }
                    Err(reason) => Stage::Fallback { image, reason },
                }
            }

            Stage::Rotate { image, degrees } => {
                info!("Undoing coarse rotation of {degrees} degrees");
                diags.push(Diagnostic::CoarseRotation { degrees });
                let upright = match degrees {
                    90 => imageops::rotate270(&*image),
                    180 => imageops::rotate180(&*image),
                    _ => imageops::rotate90(&*image),
                };
                Stage::Detect { image: Cow::Owned(upright), rotated: true }
            }

            Stage::Estimate { image, corners } => {
                let src = Corner::ALL.map(|c| Point::from(layout.finder_center(c)));
                match Affine::compute(src, [corners.tl, corners.tr, corners.bl]) {
                    Ok(base) => return Ok(estimate(image, corners, base, layout, opts, diags)),
                    Err(reason) => Stage::Fallback { image, reason },
                }
            }

            Stage::Fallback { image, reason } => {
                let dim = layout.dim() as u32;
                let (w, h) = image.dimensions();
                if w < dim || h < dim {
                    return Err(GridError::ImageTooSmall);
                }

                warn!("Falling back to axis aligned sampling: {reason}");
                diags.push(Diagnostic::FallbackSampling { reason });
                let cell_px = w as f64 / dim as f64;
                let radius = opts.sample_radius.unwrap_or((cell_px / 4.0).floor() as u32);
                let mapping = GridMapping::AxisAligned { cell_px };
                return Ok(Rectified { image, mapping, radius, corners: None });
            }
        };
    }
}

fn estimate<'a>(
    image: Cow<'a, RgbImage>,
    corners: FinderCorners,
    base: Affine,
    layout: &ZoneLayout,
    opts: &RectifyOptions,
    diags: &mut Vec<Diagnostic>,
) -> Rectified<'a> {
    // Legs join finder centers, which sit dim - finder size cells apart
    let fp_size = layout.config().finder.size;
    let cell_px = corners.mean_leg() / (layout.dim() - fp_size) as f64;
    let radius = opts.sample_radius.unwrap_or((cell_px / 4.0).floor() as u32);
    debug!("Cell size {cell_px:.2} px, Sample radius {radius}");

    let mapping = if opts.timing_refinement {
        refine_mapping(&image, base, layout, opts.timing_threshold, diags)
    } else {
        GridMapping::Affine(base)
    };
    Rectified { image, mapping, radius, corners: Some(corners) }
}

// Refines both axes from their timing lines. An axis with fewer than two
// usable boundaries keeps its linear positions.
fn refine_mapping(
    img: &RgbImage,
    base: Affine,
    layout: &ZoneLayout,
    threshold: f64,
    diags: &mut Vec<Diagnostic>,
) -> GridMapping {
    let mut refine = |axis: Axis| match refine_axis(img, &base, layout, axis, threshold) {
        Ok(centers) => Some(centers),
        Err((found, expected)) => {
            warn!("Timing line {axis:?}: Found {found} transitions, Expected {expected}");
            diags.push(Diagnostic::TimingFallback { axis, found, expected });
            None
        }
    };

    match (refine(Axis::Horizontal), refine(Axis::Vertical)) {
        (None, None) => GridMapping::Affine(base),
        (cols, rows) => {
            let dim = layout.dim();
            GridMapping::Interpolated {
                base,
                cols: cols.unwrap_or_else(|| linear_centers(dim)),
                rows: rows.unwrap_or_else(|| linear_centers(dim)),
            }
        }
    }
}
