use crate::geometry;
use serde::{Deserialize, Serialize};

/// A 2D point in normalized coordinates: pixels of the video's intrinsic frame,
/// origin top-left.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Points placed on one frame, in the order they were placed.
///
/// Angle `i` is always the angle at point `i + 1` of the path
/// `points[i] -> points[i + 1] -> points[i + 2]`.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(transparent)]
pub struct PointSequence {
    points: Vec<Point>,
}

impl PointSequence {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn as_slice(&self) -> &[Point] {
        &self.points
    }

    pub fn push(&mut self, point: Point) {
        self.points.push(point);
    }

    /// Remove the most recently placed point.
    pub fn pop(&mut self) -> Option<Point> {
        self.points.pop()
    }

    /// Remove the point at `index`. Its former neighbours become adjacent, so
    /// the angles around it are recomputed from them.
    pub fn remove(&mut self, index: usize) -> Option<Point> {
        if index < self.points.len() {
            Some(self.points.remove(index))
        } else {
            None
        }
    }

    /// Reposition an existing point. Its neighbours, and so the angles that
    /// involve it, follow from the new position. Returns the old point.
    pub fn set(&mut self, index: usize, point: Point) -> Option<Point> {
        self.points
            .get_mut(index)
            .map(|slot| std::mem::replace(slot, point))
    }

    pub fn clear(&mut self) {
        self.points.clear();
    }

    pub fn angle_count(&self) -> usize {
        self.points.len().saturating_sub(2)
    }

    pub fn angles_in_degrees(&self) -> Vec<f64> {
        self.points
            .windows(3)
            .map(|w| geometry::angle_at_vertex_degrees(w[0], w[1], w[2]))
            .collect()
    }
}

impl From<Vec<Point>> for PointSequence {
    fn from(points: Vec<Point>) -> Self {
        Self { points }
    }
}

impl FromIterator<Point> for PointSequence {
    fn from_iter<I: IntoIterator<Item = Point>>(iter: I) -> Self {
        Self {
            points: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seq(coords: &[(f64, f64)]) -> PointSequence {
        coords.iter().map(|&(x, y)| Point::new(x, y)).collect()
    }

    #[test]
    fn test_angle_count_never_negative() {
        for n in 0..6usize {
            let points: PointSequence = (0..n).map(|i| Point::new(i as f64, 0.0)).collect();
            assert_eq!(points.angle_count(), n.saturating_sub(2));
            assert_eq!(points.angles_in_degrees().len(), points.angle_count());
        }
        assert!(seq(&[(1.0, 1.0), (2.0, 2.0)]).angles_in_degrees().is_empty());
    }

    #[test]
    fn test_angles_follow_consecutive_triples() {
        // Square path: every corner is a right angle.
        let points = seq(&[(0.0, 0.0), (10.0, 0.0), (10.0, 10.0), (0.0, 10.0)]);
        let angles = points.angles_in_degrees();
        assert_eq!(angles.len(), 2);
        for angle in angles {
            assert!((angle - 90.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_degenerate_triple_yields_nan() {
        let points = seq(&[(0.0, 0.0), (0.0, 0.0), (5.0, 5.0), (5.0, 0.0)]);
        let angles = points.angles_in_degrees();
        assert!(angles[0].is_nan());
        assert!((angles[1] - 45.0).abs() < 1e-9);
    }

    #[test]
    fn test_mutations() {
        let mut points = seq(&[(0.0, 0.0), (5.0, 0.0), (10.0, 0.0)]);
        assert!((points.angles_in_degrees()[0] - 180.0).abs() < 1e-9);

        // Drag the middle point up to make a right angle at (5, 5).
        let old = points.set(1, Point::new(5.0, 5.0));
        assert_eq!(old, Some(Point::new(5.0, 0.0)));
        assert!((points.angles_in_degrees()[0] - 90.0).abs() < 1e-9);
        assert_eq!(points.set(3, Point::new(0.0, 0.0)), None);

        assert_eq!(points.pop(), Some(Point::new(10.0, 0.0)));
        assert_eq!(points.angle_count(), 0);
        assert_eq!(points.remove(0), Some(Point::new(0.0, 0.0)));
        assert_eq!(points.remove(4), None);
        assert_eq!(points.as_slice(), &[Point::new(5.0, 5.0)]);

        points.clear();
        assert!(points.is_empty());
        assert_eq!(points.pop(), None);
    }

    #[test]
    fn test_serializes_as_plain_list() {
        let points = seq(&[(1.5, 2.0)]);
        let json = serde_json::to_string(&points).unwrap();
        assert_eq!(json, r#"[{"x":1.5,"y":2.0}]"#);
        let back: PointSequence = serde_json::from_str(&json).unwrap();
        assert_eq!(back, points);
    }
}
