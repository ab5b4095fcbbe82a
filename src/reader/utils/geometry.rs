use std::ops::{Add, Mul, Sub};

// Point
//------------------------------------------------------------------------------

/// Sub-pixel position. In logical space x runs along columns and y along rows,
/// both in cell units.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn norm(&self) -> f64 {
        self.x.hypot(self.y)
    }

    pub fn dist(&self, other: &Point) -> f64 {
        (*self - *other).norm()
    }

    pub fn dot(&self, other: &Point) -> f64 {
        self.x * other.x + self.y * other.y
    }

    /// Z component of the 2-D cross product. Positive when `other` lies
    /// clockwise of `self` in image coordinates (y pointing down).
    pub fn cross(&self, other: &Point) -> f64 {
        self.x * other.y - self.y * other.x
    }

    /// Pixel containing this point, if it falls inside a `w` x `h` image.
    pub fn to_pixel(&self, w: u32, h: u32) -> Option<(u32, u32)> {
        let (x, y) = (self.x.floor(), self.y.floor());
        if x < 0.0 || y < 0.0 || x >= w as f64 || y >= h as f64 {
            return None;
        }
        Some((x as u32, y as u32))
    }
}

impl From<(f64, f64)> for Point {
    fn from((x, y): (f64, f64)) -> Self {
        Self { x, y }
    }
}

impl Add for Point {
    type Output = Point;
    fn add(self, rhs: Point) -> Point {
        Point::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for Point {
    type Output = Point;
    fn sub(self, rhs: Point) -> Point {
        Point::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl Mul<f64> for Point {
    type Output = Point;
    fn mul(self, rhs: f64) -> Point {
        Point::new(self.x * rhs, self.y * rhs)
    }
}

#[cfg(test)]
mod point_tests {
    use super::Point;

    #[test]
    fn test_vector_ops() {
        let a = Point::new(3.0, 4.0);
        let b = Point::new(1.0, 1.0);
        assert_eq!(a.norm(), 5.0);
        assert_eq!(a - b, Point::new(2.0, 3.0));
        assert_eq!(a + b * 2.0, Point::new(5.0, 6.0));
        assert_eq!(a.dot(&b), 7.0);
        assert_eq!(Point::new(1.0, 0.0).cross(&Point::new(0.0, 1.0)), 1.0);
        assert_eq!(Point::new(0.0, 1.0).cross(&Point::new(1.0, 0.0)), -1.0);
    }

    #[test]
    fn test_to_pixel() {
        assert_eq!(Point::new(4.99, 0.0).to_pixel(10, 10), Some((4, 0)));
        assert_eq!(Point::new(-0.01, 3.0).to_pixel(10, 10), None);
        assert_eq!(Point::new(9.5, 10.0).to_pixel(10, 10), None);
    }
}
