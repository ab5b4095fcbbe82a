use image::RgbImage;
use tracing::debug;

use crate::common::{
    error::{GridError, GridResult},
    layout::{Axis, Corner, ZoneLayout},
};

use super::utils::{affine::Affine, geometry::Point};

/// Floating point RGB triple.
pub type Rgbf = [f64; 3];

pub fn color_dist_sq(a: &Rgbf, b: &Rgbf) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y) * (x - y)).sum()
}

fn pixel_at(img: &RgbImage, p: Point) -> Option<Rgbf> {
    let (x, y) = p.to_pixel(img.width(), img.height())?;
    let px = img.get_pixel(x, y);
    Some([px[0] as f64, px[1] as f64, px[2] as f64])
}

// Grid mapping
//------------------------------------------------------------------------------

/// Maps logical grid coordinates (cell units, x along columns) to pixels.
#[derive(Debug, Clone, PartialEq)]
pub enum GridMapping {
    Affine(Affine),
    // Naive estimate anchored at the image origin
    AxisAligned { cell_px: f64 },
    // Per-axis cell centers refined from the timing lines, then mapped by `base`
    Interpolated { base: Affine, cols: Vec<f64>, rows: Vec<f64> },
}

impl GridMapping {
    pub fn map(&self, p: Point) -> Point {
        match self {
            Self::Affine(t) => t.map(p),
            Self::AxisAligned { cell_px } => p * *cell_px,
            Self::Interpolated { base, cols, rows } => {
                base.map(Point::new(interpolate(cols, p.x), interpolate(rows, p.y)))
            }
        }
    }

    pub fn cell_center(&self, r: usize, c: usize) -> Point {
        self.map(Point::new(c as f64 + 0.5, r as f64 + 0.5))
    }

    /// Approximate pixels per cell.
    pub fn cell_px(&self) -> f64 {
        match self {
            Self::Affine(t) | Self::Interpolated { base: t, .. } => t.scale(),
            Self::AxisAligned { cell_px } => *cell_px,
        }
    }
}

// Piecewise linear lookup into a table of cell centers, where entry i is the
// refined position of logical coordinate i + 0.5. Extrapolates at both ends.
fn interpolate(centers: &[f64], v: f64) -> f64 {
    match centers.len() {
        0 => v,
        1 => centers[0] + v - 0.5,
        n => {
            let i = ((v - 0.5).floor().max(0.0) as usize).min(n - 2);
            let t = v - 0.5 - i as f64;
            centers[i] + t * (centers[i + 1] - centers[i])
        }
    }
}

// Sampler
//------------------------------------------------------------------------------

pub struct Sampler<'a> {
    img: &'a RgbImage,
    mapping: &'a GridMapping,
    radius: u32,
}

impl<'a> Sampler<'a> {
    pub fn new(img: &'a RgbImage, mapping: &'a GridMapping, radius: u32) -> Self {
        Self { img, mapping, radius }
    }

    /// Mean color of the (2r + 1) square window around the pixel containing
    /// `p`, clipped to the image. None when `p` is outside the image.
    pub fn window_mean(&self, p: Point) -> Option<Rgbf> {
        let (w, h) = self.img.dimensions();
        let (cx, cy) = p.to_pixel(w, h)?;
        let r = self.radius;
        let (x0, x1) = (cx.saturating_sub(r), (cx + r).min(w - 1));
        let (y0, y1) = (cy.saturating_sub(r), (cy + r).min(h - 1));

        let mut sum = [0.0; 3];
        for y in y0..=y1 {
            for x in x0..=x1 {
                let px = self.img.get_pixel(x, y);
                for i in 0..3 {
                    sum[i] += px[i] as f64;
                }
            }
        }
        let n = ((x1 - x0 + 1) * (y1 - y0 + 1)) as f64;
        Some(sum.map(|s| s / n))
    }

    pub fn sample_cell(&self, r: usize, c: usize) -> GridResult<Rgbf> {
        self.window_mean(self.mapping.cell_center(r, c))
            .ok_or(GridError::CellOutOfBounds { row: r, col: c })
    }

    /// Mean color over the logical rectangle [x0, x1] x [y0, y1], sampled about
    /// once per pixel. None when no sample lands inside the image.
    pub fn region_mean(&self, x0: f64, x1: f64, y0: f64, y1: f64) -> Option<Rgbf> {
        let px = self.mapping.cell_px().max(1.0);
        let nx = ((x1 - x0) * px).ceil().max(1.0) as usize;
        let ny = ((y1 - y0) * px).ceil().max(1.0) as usize;

        let mut sum = [0.0; 3];
        let mut count = 0usize;
        for j in 0..ny {
            for i in 0..nx {
                let x = x0 + (i as f64 + 0.5) * (x1 - x0) / nx as f64;
                let y = y0 + (j as f64 + 0.5) * (y1 - y0) / ny as f64;
                if let Some(c) = pixel_at(self.img, self.mapping.map(Point::new(x, y))) {
                    for k in 0..3 {
                        sum[k] += c[k];
                    }
                    count += 1;
                }
            }
        }

        if count == 0 {
            return None;
        }
        Some(sum.map(|s| s / count as f64))
    }
}

// Timing refinement
//------------------------------------------------------------------------------

pub const DEFAULT_TIMING_THRESHOLD: f64 = 96.0;

// Half width, in cells, of the window a color step is measured across. Wide
// enough to span a blurred or anti-aliased edge in one step
const STEP_HALF_SPAN: f64 = 0.25;

// Transitions closer than this many cells are one boundary
const MIN_BOUNDARY_GAP: f64 = 0.5;

// Color step across a timing line boundary, in logical coordinates
#[derive(Debug, Clone, Copy, PartialEq)]
struct Transition {
    pos: f64,
    strength: f64,
}

// Piecewise linear through knots sorted by x, extended from the end segments
fn interpolate_knots(knots: &[(f64, f64)], v: f64) -> f64 {
    let seg = knots.windows(2).position(|w| v < w[1].0).unwrap_or(knots.len() - 2);
    let ((x0, y0), (x1, y1)) = (knots[seg], knots[seg + 1]);
    y0 + (v - x0) * (y1 - y0) / (x1 - x0)
}

/// Logical cell centers along one axis without refinement.
pub fn linear_centers(dim: usize) -> Vec<f64> {
    (0..dim).map(|i| i as f64 + 0.5).collect()
}

// Collapses each run of (position, step) samples above the threshold into one
// transition at the run's weighted centroid. Runs cut by either end of the
// scan belong to the finder patterns beyond it and are dropped.
fn step_runs(profile: &[(f64, f64)], threshold: f64) -> Vec<Transition> {
    let mut res = Vec::new();
    let mut i = 0;
    while i < profile.len() {
        if profile[i].1 <= threshold {
            i += 1;
            continue;
        }
        let j = profile[i..]
            .iter()
            .position(|&(_, d)| d <= threshold)
            .map_or(profile.len(), |k| i + k);

        if i > 0 && j < profile.len() {
            let run = &profile[i..j];
            let weight: f64 = run.iter().map(|&(_, d)| d - threshold).sum();
            let pos = run.iter().map(|&(v, d)| v * (d - threshold)).sum::<f64>() / weight;
            let strength = run.iter().map(|&(_, d)| d).fold(0.0, f64::max);
            res.push(Transition { pos, strength });
        }
        i = j;
    }
    res
}

// Merges transitions closer than `min_gap`, keeping the strongest
fn merge_close(transitions: &[Transition], min_gap: f64) -> Vec<Transition> {
    let mut res: Vec<Transition> = Vec::with_capacity(transitions.len());
    for &t in transitions {
        match res.last_mut() {
            Some(last) if t.pos - last.pos < min_gap => {
                if t.strength > last.strength {
                    *last = t;
                }
            }
            _ => res.push(t),
        }
    }
    res
}

/// Assigns sorted boundary positions to boundary indices 0..count, where
/// boundary k nominally sits at `first + k`. Gaps are counted in units of
/// the median single-cell gap, so missing boundaries skip indices.
fn assign_boundaries(positions: &[f64], first: f64, count: usize) -> Vec<(usize, f64)> {
    let Some(&p0) = positions.first() else {
        return Vec::new();
    };

    let mut single: Vec<f64> =
        positions.windows(2).map(|w| w[1] - w[0]).filter(|&g| g < 1.5).collect();
    single.sort_by(f64::total_cmp);
    let pitch = single.get(single.len() / 2).copied().unwrap_or(1.0);

    let mut res = Vec::with_capacity(count);
    let mut idx = ((p0 - first) / pitch).round().max(0.0) as usize;
    if idx < count {
        res.push((idx, p0));
    }
    for w in positions.windows(2) {
        idx += ((w[1] - w[0]) / pitch).round().max(1.0) as usize;
        if idx >= count {
            break;
        }
        res.push((idx, w[1]));
    }
    res
}

/// Refines the cell centers along `axis` from the boundaries of its timing
/// line, scanned from the margin cell before the line to the margin cell
/// after it. Boundaries that weren't found are bridged linearly from their
/// neighbours, cells outside the line are interpolated towards the finder
/// centers. The horizontal line yields column centers, the vertical one row
/// centers. Returns (found, expected) when fewer than two boundaries show up
/// or the line leaves the image.
pub fn refine_axis(
    img: &RgbImage,
    base: &Affine,
    layout: &ZoneLayout,
    axis: Axis,
    threshold: f64,
) -> Result<Vec<f64>, (usize, usize)> {
    let tb = layout.timing_bounds(axis);
    let (start, end, across) = match axis {
        Axis::Horizontal => (tb.col_start, tb.col_end, tb.row_start),
        Axis::Vertical => (tb.row_start, tb.row_end, tb.col_start),
    };
    let expected = end - start + 2;

    let at = |v: f64| match axis {
        Axis::Horizontal => Point::new(v, across as f64 + 0.5),
        Axis::Vertical => Point::new(across as f64 + 0.5, v),
    };
    let color = |v: f64| pixel_at(img, base.map(at(v)));
    let (from, to) = ((start - 1) as f64 + 0.5, (end + 1) as f64 + 0.5);
    let n = ((to - from) * base.scale().max(1.0) * 2.0).ceil() as usize;

    let mut profile = Vec::with_capacity(n + 1);
    for i in 0..=n {
        let v = from + (to - from) * i as f64 / n as f64;
        let (Some(a), Some(b)) = (color(v - STEP_HALF_SPAN), color(v + STEP_HALF_SPAN)) else {
            return Err((0, expected));
        };
        profile.push((v, color_dist_sq(&a, &b).sqrt()));
    }

    let mut found = merge_close(&step_runs(&profile, threshold), MIN_BOUNDARY_GAP);
    if found.len() > expected {
        found.sort_by(|a, b| b.strength.total_cmp(&a.strength));
        found.truncate(expected);
        found.sort_by(|a, b| a.pos.total_cmp(&b.pos));
    }
    if found.len() < 2 {
        return Err((found.len(), expected));
    }
    debug!("{axis:?} timing line: {} of {expected} boundaries", found.len());

    // Knots in logical space: finder centers are exact under `base`, boundary
    // k of the line nominally sits at start + k
    let (lo, hi) = match axis {
        Axis::Horizontal => {
            (layout.finder_center(Corner::TopLeft).0, layout.finder_center(Corner::TopRight).0)
        }
        Axis::Vertical => {
            (layout.finder_center(Corner::TopLeft).1, layout.finder_center(Corner::BottomLeft).1)
        }
    };
    let positions: Vec<f64> = found.iter().map(|t| t.pos).collect();
    let mut knots = Vec::with_capacity(expected + 2);
    knots.push((lo, lo));
    for (k, pos) in assign_boundaries(&positions, start as f64, expected) {
        knots.push(((start + k) as f64, pos));
    }
    knots.push((hi, hi));

    let centers = (0..layout.dim()).map(|i| interpolate_knots(&knots, i as f64 + 0.5)).collect();
    Ok(centers)
}
