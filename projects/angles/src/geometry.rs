use crate::model::Point;

/// Euclidean distance between two points
pub fn distance(a: Point, b: Point) -> f64 {
    (a.x - b.x).hypot(a.y - b.y)
}

/// Interior angle at `p2` of the triangle p1-p2-p3, in radians.
///
/// Uses the Law of Cosines, so the result is always in [0, π]. When two of the
/// points coincide a side length is zero and the result is NaN; callers treat
/// that as an undefined angle.
pub fn angle_at_vertex(p1: Point, p2: Point, p3: Point) -> f64 {
    let len12 = distance(p1, p2);
    let len23 = distance(p2, p3);
    let len31 = distance(p3, p1);
    let cos = (len12.powi(2) + len23.powi(2) - len31.powi(2)) / (2.0 * len12 * len23);
    // Rounding can push a straight or spiked angle just past ±1.
    if cos.is_nan() {
        return f64::NAN;
    }
    cos.clamp(-1.0, 1.0).acos()
}

/// Same as [`angle_at_vertex`], in degrees
pub fn angle_at_vertex_degrees(p1: Point, p2: Point, p3: Point) -> f64 {
    radians_to_degrees(angle_at_vertex(p1, p2, p3))
}

pub fn radians_to_degrees(radians: f64) -> f64 {
    radians * 180.0 / std::f64::consts::PI
}

/// Round an angle to two decimals for display. Stored and exported values keep
/// full precision.
pub fn round_for_display(degrees: f64) -> f64 {
    (degrees * 100.0).round() / 100.0
}
