use std::ops::Index;

use crate::common::error::{GridError, GridResult};

use super::geometry::Point;

// Affine transform to map the logical grid onto the image
//------------------------------------------------------------------------------

/// Row-major 2x3 matrix: x' = a0 x + a1 y + a2, y' = a3 x + a4 y + a5.
#[derive(Debug, PartialEq, Clone)]
pub struct Affine(pub [f64; 6]);

impl Index<usize> for Affine {
    type Output = f64;

    #[inline]
    fn index(&self, index: usize) -> &Self::Output {
        &self.0[index]
    }
}

impl Affine {
    /// Transform taking src[i] to dst[i]. The linear part solves
    /// L [u v] = [du dv] for the edge vectors out of the first pair.
    pub fn compute(src: [Point; 3], dst: [Point; 3]) -> GridResult<Self> {
        let (u, v) = (src[1] - src[0], src[2] - src[0]);
        let (du, dv) = (dst[1] - dst[0], dst[2] - dst[0]);

        let det = u.cross(&v);
        if det.abs() < 1e-9 {
            return Err(GridError::SingularMatrix);
        }

        let a0 = (du.x * v.y - dv.x * u.y) / det;
        let a1 = (dv.x * u.x - du.x * v.x) / det;
        let a3 = (du.y * v.y - dv.y * u.y) / det;
        let a4 = (dv.y * u.x - du.y * v.x) / det;
        let Point { x, y } = src[0];
        let a2 = dst[0].x - a0 * x - a1 * y;
        let a5 = dst[0].y - a3 * x - a4 * y;

        Ok(Self([a0, a1, a2, a3, a4, a5]))
    }

    pub fn map(&self, p: Point) -> Point {
        Point::new(
            self[0] * p.x + self[1] * p.y + self[2],
            self[3] * p.x + self[4] * p.y + self[5],
        )
    }

    /// Mean length of the mapped unit vectors, i.e. pixels per logical unit.
    pub fn scale(&self) -> f64 {
        (self[0].hypot(self[3]) + self[1].hypot(self[4])) / 2.0
    }
}

#[cfg(test)]
mod affine_tests {
    use super::Affine;
    use crate::{common::error::GridError, reader::utils::geometry::Point};

    fn assert_close(a: Point, b: Point) {
        assert!(a.dist(&b) < 1e-6, "Points differ: {a:?} {b:?}");
    }

    #[test]
    fn test_scale_and_offset() {
        let src = [Point::new(3.5, 3.5), Point::new(31.5, 3.5), Point::new(3.5, 31.5)];
        let dst = [Point::new(75.0, 75.0), Point::new(355.0, 75.0), Point::new(75.0, 355.0)];
        let t = Affine::compute(src, dst).unwrap();
        assert_close(t.map(Point::new(0.0, 0.0)), Point::new(40.0, 40.0));
        assert_close(t.map(Point::new(35.0, 35.0)), Point::new(390.0, 390.0));
        assert!((t.scale() - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_rotation() {
        // Quarter turn clockwise about the origin, scaled by 2
        let src = [Point::new(0.0, 0.0), Point::new(1.0, 0.0), Point::new(0.0, 1.0)];
        let dst = [Point::new(10.0, 10.0), Point::new(10.0, 12.0), Point::new(8.0, 10.0)];
        let t = Affine::compute(src, dst).unwrap();
        assert_close(t.map(Point::new(2.0, 3.0)), Point::new(4.0, 14.0));
        assert!((t.scale() - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_recovers_skewed_transform() {
        let t = Affine([1.5, -0.4, 12.0, 0.3, 2.2, -7.0]);
        let src = [Point::new(2.0, 1.0), Point::new(9.0, 3.0), Point::new(4.0, 8.0)];
        let dst = src.map(|p| t.map(p));
        let fit = Affine::compute(src, dst).unwrap();
        for (a, b) in fit.0.iter().zip(t.0.iter()) {
            assert!((a - b).abs() < 1e-9, "Coefficients differ: {:?} {:?}", fit.0, t.0);
        }
    }

    #[test]
    fn test_collinear_points() {
        let src = [Point::new(0.0, 0.0), Point::new(1.0, 1.0), Point::new(2.0, 2.0)];
        let dst = [Point::new(0.0, 0.0), Point::new(1.0, 0.0), Point::new(0.0, 1.0)];
        assert_eq!(Affine::compute(src, dst), Err(GridError::SingularMatrix));
    }
}
