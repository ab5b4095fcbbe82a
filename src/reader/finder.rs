use image::Luma;
use imageproc::region_labelling::{connected_components, Connectivity};

use crate::common::error::{GridError, GridResult};

use super::{binarize::BinaryImage, utils::geometry::Point};

// Minimum side of a candidate, relative to the shorter image side
const MIN_SIDE_RATIO: f64 = 0.04;
// Maximum side of a candidate, relative to the shorter image side
const MAX_SIDE_RATIO: f64 = 0.35;
const MAX_ASPECT: f64 = 3.0;
const MIN_FILL: f64 = 0.4;

// Triples are only formed among this many of the largest candidates
const TRIPLE_POOL: usize = 12;
const MAX_AREA_RATIO: f64 = 2.0;
const MAX_ABS_COS: f64 = 0.2;
const LEG_RATIO_RANGE: (f64, f64) = (0.8, 1.25);
const SPAN_RATIO_RANGE: (f64, f64) = (0.75, 1.33);

// Candidate
//------------------------------------------------------------------------------

/// Connected dark component that could be a finder pattern core.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    pub center: Point,
    pub area: u32,
    pub min_x: u32,
    pub min_y: u32,
    pub max_x: u32,
    pub max_y: u32,
}

impl Candidate {
    pub fn width(&self) -> u32 {
        self.max_x - self.min_x + 1
    }

    pub fn height(&self) -> u32 {
        self.max_y - self.min_y + 1
    }

    pub fn fill_ratio(&self) -> f64 {
        self.area as f64 / (self.width() as f64 * self.height() as f64)
    }

    pub fn aspect(&self) -> f64 {
        let (w, h) = (self.width() as f64, self.height() as f64);
        w.max(h) / w.min(h)
    }
}

#[derive(Debug, Clone, Copy)]
struct Accumulator {
    area: u32,
    sum_x: u64,
    sum_y: u64,
    min_x: u32,
    min_y: u32,
    max_x: u32,
    max_y: u32,
}

impl Default for Accumulator {
    fn default() -> Self {
        Self { area: 0, sum_x: 0, sum_y: 0, min_x: u32::MAX, min_y: u32::MAX, max_x: 0, max_y: 0 }
    }
}

impl Accumulator {
    fn add(&mut self, x: u32, y: u32) {
        self.area += 1;
        self.sum_x += x as u64;
        self.sum_y += y as u64;
        self.min_x = self.min_x.min(x);
        self.min_y = self.min_y.min(y);
        self.max_x = self.max_x.max(x);
        self.max_y = self.max_y.max(y);
    }

    // Pixel (x, y) covers [x, x + 1), hence the half pixel shift
    fn to_candidate(self) -> Candidate {
        let n = self.area as f64;
        Candidate {
            center: Point::new(self.sum_x as f64 / n + 0.5, self.sum_y as f64 / n + 0.5),
            area: self.area,
            min_x: self.min_x,
            min_y: self.min_y,
            max_x: self.max_x,
            max_y: self.max_y,
        }
    }
}

// Locate candidates
//------------------------------------------------------------------------------

// Labels 4-connected dark components and keeps the ones that
// 1. Are at least MIN_SIDE_RATIO of the shorter image side along both axes
// 2. Are no longer than MAX_ASPECT to 1
// 3. Are no wider than MAX_SIDE_RATIO of the shorter image side
// 4. Cover at least MIN_FILL of their bounding box
// Returned candidates are sorted by descending area
pub fn locate_candidates(img: &BinaryImage) -> Vec<Candidate> {
    let labels = connected_components(&img.mask, Connectivity::Four, Luma([0u8]));

    let mut acc: Vec<Accumulator> = Vec::new();
    for (x, y, label) in labels.enumerate_pixels() {
        let id = label[0] as usize;
        if id == 0 {
            continue;
        }
        if acc.len() <= id {
            acc.resize(id + 1, Accumulator::default());
        }
        acc[id].add(x, y);
    }

    let short = img.w.min(img.h) as f64;
    let (min_side, max_side) = (short * MIN_SIDE_RATIO, short * MAX_SIDE_RATIO);

    let mut cands: Vec<Candidate> = acc
        .into_iter()
        .filter(|a| a.area > 0)
        .map(Accumulator::to_candidate)
        .filter(|c| {
            let (w, h) = (c.width() as f64, c.height() as f64);
            w >= min_side
                && h >= min_side
                && w.max(h) <= max_side
                && c.aspect() <= MAX_ASPECT
                && c.fill_ratio() >= MIN_FILL
        })
        .collect();

    cands.sort_by(|a, b| b.area.cmp(&a.area));
    cands
}

// Finder corners
//------------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FinderCorners {
    pub tl: Point,
    pub tr: Point,
    pub bl: Point,
}

impl FinderCorners {
    /// TL is the point with the smallest summed distance to the other two.
    /// Of the rest, the first is TR when (o1 - TL) x (o2 - TL) is positive.
    pub fn identify(pts: [Point; 3]) -> Self {
        let sum_dist = |i: usize| -> f64 { (0..3).map(|j| pts[i].dist(&pts[j])).sum() };
        let tl_idx = (0..3)
            .min_by(|&a, &b| sum_dist(a).total_cmp(&sum_dist(b)))
            .unwrap_or_default();

        let tl = pts[tl_idx];
        let o1 = pts[(tl_idx + 1) % 3];
        let o2 = pts[(tl_idx + 2) % 3];
        if (o1 - tl).cross(&(o2 - tl)) > 0.0 {
            Self { tl, tr: o1, bl: o2 }
        } else {
            Self { tl, tr: o2, bl: o1 }
        }
    }

    /// Angle of the TL to TR vector, in degrees.
    pub fn angle(&self) -> f64 {
        let v = self.tr - self.tl;
        v.y.atan2(v.x).to_degrees()
    }

    pub fn mean_leg(&self) -> f64 {
        (self.tl.dist(&self.tr) + self.tl.dist(&self.bl)) / 2.0
    }
}

// Triple selection
//------------------------------------------------------------------------------

// Scores a triple by how far it is from three equal squares at the corners of
// a right isosceles triangle. Implausible triples score None.
// `span_ratio` is the expected leg length over the core side, when known.
fn score_triple(tri: [&Candidate; 3], span_ratio: Option<f64>) -> Option<(f64, FinderCorners)> {
    let areas = tri.map(|c| c.area as f64);
    let max_area = areas.iter().copied().fold(f64::MIN, f64::max);
    let min_area = areas.iter().copied().fold(f64::MAX, f64::min);
    let area_ratio = max_area / min_area;
    if area_ratio > MAX_AREA_RATIO {
        return None;
    }

    let corners = FinderCorners::identify(tri.map(|c| c.center));
    let (a, b) = (corners.tr - corners.tl, corners.bl - corners.tl);
    let (la, lb) = (a.norm(), b.norm());
    if la == 0.0 || lb == 0.0 {
        return None;
    }

    let cos = (a.dot(&b) / (la * lb)).abs();
    let legs = la / lb;
    if cos > MAX_ABS_COS || legs < LEG_RATIO_RANGE.0 || legs > LEG_RATIO_RANGE.1 {
        return None;
    }

    let mut score = (area_ratio - 1.0) + cos + (legs - 1.0).abs();
    if let Some(expected) = span_ratio {
        let side = (areas.iter().sum::<f64>() / 3.0).sqrt();
        let span = corners.mean_leg() / side / expected;
        if span < SPAN_RATIO_RANGE.0 || span > SPAN_RATIO_RANGE.1 {
            return None;
        }
        score += (span - 1.0).abs();
    }

    Some((score, corners))
}

/// Picks the best scoring triple among the largest candidates.
pub fn select_triple(cands: &[Candidate], span_ratio: Option<f64>) -> Option<FinderCorners> {
    let pool = &cands[..cands.len().min(TRIPLE_POOL)];
    let mut best: Option<(f64, FinderCorners)> = None;
    for i in 0..pool.len() {
        for j in (i + 1)..pool.len() {
            for k in (j + 1)..pool.len() {
                let Some((score, corners)) = score_triple([&pool[i], &pool[j], &pool[k]], span_ratio)
                else {
                    continue;
                };
                let better = match &best {
                    Some((s, _)) => score < *s,
                    None => true,
                };
                if better {
                    best = Some((score, corners));
                }
            }
        }
    }
    best.map(|(_, corners)| corners)
}

// ENTRY POINT FOR LOCATING FINDERS
pub fn locate_finders(img: &BinaryImage, span_ratio: Option<f64>) -> GridResult<FinderCorners> {
    let cands = locate_candidates(img);
    if cands.len() < 3 {
        return Err(GridError::FinderNotFound(cands.len()));
    }
    select_triple(&cands, span_ratio).ok_or(GridError::FinderNotFound(cands.len()))
}
