use tracing::debug;

use crate::common::{
    error::{GridError, GridResult},
    layout::ZoneLayout,
    metadata::ProtocolConfig,
};

use super::sampler::{color_dist_sq, Rgbf, Sampler};

// Calibration map
//------------------------------------------------------------------------------

/// Observed color of every palette symbol, indexed by symbol value.
#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationMap {
    colors: Vec<Rgbf>,
}

impl CalibrationMap {
    /// Map built from the palette's nominal RGB values.
    pub fn nominal(config: &ProtocolConfig) -> Self {
        let colors = config
            .palette
            .iter()
            .map(|c| {
                let px = c.rgb();
                [px[0] as f64, px[1] as f64, px[2] as f64]
            })
            .collect();
        Self { colors }
    }

    pub fn observed(&self, symbol: u8) -> Rgbf {
        self.colors[symbol as usize]
    }

    /// Symbol whose observed color is nearest. Ties go to the lower symbol.
    pub fn classify(&self, rgb: &Rgbf) -> u8 {
        let mut best = (0u8, f64::INFINITY);
        for (sym, c) in self.colors.iter().enumerate() {
            let d = color_dist_sq(rgb, c);
            if d < best.1 {
                best = (sym as u8, d);
            }
        }
        best.0
    }
}

// Calibrator
//------------------------------------------------------------------------------

/// Measures the calibration patches through `sampler`. Each patch is averaged
/// over its central quarter. Patches of the same
/// color are averaged together. Returns the map along with the symbols that had
/// no patch and kept their nominal color.
pub fn calibrate(sampler: &Sampler, layout: &ZoneLayout) -> GridResult<(CalibrationMap, Vec<u8>)> {
    let config = layout.config();
    let mut sums = vec![([0.0; 3], 0usize); config.palette.len()];

    for (i, &color) in config.calibration.colors.iter().enumerate() {
        let b = layout.patch_bounds(i);
        let (w, h) = (b.width() as f64, b.height() as f64);
        let (x0, x1) = (b.col_start as f64 + w / 4.0, (b.col_end + 1) as f64 - w / 4.0);
        let (y0, y1) = (b.row_start as f64 + h / 4.0, (b.row_end + 1) as f64 - h / 4.0);

        let mean = sampler.region_mean(x0, x1, y0, y1).ok_or(GridError::EmptyCalibrationPatch(i))?;
        let sym = config.symbol_of(color)?;
        debug!("Calibration patch {i}: Symbol {sym}, Observed {mean:?}");

        let (sum, n) = &mut sums[sym as usize];
        for k in 0..3 {
            sum[k] += mean[k];
        }
        *n += 1;
    }

    let mut map = CalibrationMap::nominal(config);
    let mut missing = Vec::new();
    for (sym, (sum, n)) in sums.into_iter().enumerate() {
        if n == 0 {
            missing.push(sym as u8);
        } else {
            map.colors[sym] = sum.map(|s| s / n as f64);
        }
    }
    Ok((map, missing))
}
