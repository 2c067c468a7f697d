//! Pure geometry for measurements and ROIs
//!
//! Every function here is deterministic and side-effect free. Degenerate
//! input never panics: it yields `None`, `false` or `0.0`.

use crate::annotation::ImagePoint;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Squared lengths below this are treated as zero-length vectors
const DEGENERATE_EPSILON: f64 = 1e-12;

/// Euclidean distance between two points
pub fn distance(a: ImagePoint, b: ImagePoint) -> f64 {
    let dx = b.x - a.x;
    let dy = b.y - a.y;
    (dx * dx + dy * dy).sqrt()
}

/// Midpoint of a segment
pub fn midpoint(a: ImagePoint, b: ImagePoint) -> ImagePoint {
    ImagePoint::new((a.x + b.x) / 2.0, (a.y + b.y) / 2.0)
}

/// Angle in degrees between two vectors, in `[0, 180]`
fn vector_angle(ux: f64, uy: f64, vx: f64, vy: f64) -> Option<f64> {
    let mag_u = (ux * ux + uy * uy).sqrt();
    let mag_v = (vx * vx + vy * vy).sqrt();
    if mag_u * mag_u < DEGENERATE_EPSILON || mag_v * mag_v < DEGENERATE_EPSILON {
        return None;
    }
    let cos_angle = ((ux * vx + uy * vy) / (mag_u * mag_v)).clamp(-1.0, 1.0);
    Some(cos_angle.acos().to_degrees())
}

/// Angle at `vertex` between the rays towards `p1` and `p2`
///
/// Returns degrees in `[0, 180]`, or `None` if either ray has zero length.
pub fn angle(vertex: ImagePoint, p1: ImagePoint, p2: ImagePoint) -> Option<f64> {
    vector_angle(p1.x - vertex.x, p1.y - vertex.y, p2.x - vertex.x, p2.y - vertex.y)
}

/// Cobb angle between two lines
///
/// The lines need not share a vertex. The angle between their direction
/// vectors is reduced to the acute representative, so the result lies in
/// `[0, 90]`. Returns `None` if either line is degenerate.
pub fn cobb_angle(
    line1_start: ImagePoint,
    line1_end: ImagePoint,
    line2_start: ImagePoint,
    line2_end: ImagePoint,
) -> Option<f64> {
    let theta = vector_angle(
        line1_end.x - line1_start.x,
        line1_end.y - line1_start.y,
        line2_end.x - line2_start.x,
        line2_end.y - line2_start.y,
    )?;
    Some(theta.min(180.0 - theta))
}

/// Long and short axis of a bidirectional (RECIST) measurement
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BidirectionalAxes {
    /// Longest diameter in pixels
    pub long_axis: f64,
    /// Perpendicular short diameter in pixels
    pub short_axis: f64,
    /// Acute angle between the axes in degrees (90 = perpendicular)
    pub axes_angle: f64,
}

impl BidirectionalAxes {
    /// Whether the axes are perpendicular within `tolerance_degrees`
    pub fn is_perpendicular(&self, tolerance_degrees: f64) -> bool {
        (90.0 - self.axes_angle).abs() <= tolerance_degrees
    }
}

/// Measure the two axes of a bidirectional measurement
///
/// The first pair of points is the drawn long axis, the second the short
/// axis. If the short axis ends up longer the two are swapped so that
/// `long_axis >= short_axis` always holds.
pub fn bidirectional(
    long_start: ImagePoint,
    long_end: ImagePoint,
    short_start: ImagePoint,
    short_end: ImagePoint,
) -> Option<BidirectionalAxes> {
    let axes_angle = cobb_angle(long_start, long_end, short_start, short_end)?;
    let first = distance(long_start, long_end);
    let second = distance(short_start, short_end);
    Some(BidirectionalAxes {
        long_axis: first.max(second),
        short_axis: first.min(second),
        axes_angle,
    })
}

/// Area of a simple polygon using the shoelace formula
///
/// The polygon is closed implicitly. Returns `None` for fewer than 3 points.
pub fn polygon_area(points: &[ImagePoint]) -> Option<f64> {
    let n = points.len();
    if n < 3 {
        return None;
    }
    let mut area = 0.0;
    for i in 0..n {
        let j = (i + 1) % n;
        area += points[i].x * points[j].y;
        area -= points[j].x * points[i].y;
    }
    Some((area / 2.0).abs())
}

/// Perimeter of a closed polygon including the closing edge
///
/// Returns 0 for fewer than 2 points.
pub fn polygon_perimeter(points: &[ImagePoint]) -> f64 {
    if points.len() < 2 {
        return 0.0;
    }
    let open = polyline_length(points);
    match (points.first(), points.last()) {
        (Some(&first), Some(&last)) => open + distance(last, first),
        _ => open,
    }
}

/// Length of an open path
pub fn polyline_length(points: &[ImagePoint]) -> f64 {
    points.windows(2).map(|w| distance(w[0], w[1])).sum()
}

/// Ellipse defined by two axis pairs
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EllipseParameters {
    pub center: ImagePoint,
    pub semi_major: f64,
    pub semi_minor: f64,
    /// Direction of the major axis in radians, measured from the +x axis
    pub rotation: f64,
}

impl EllipseParameters {
    /// Area `π·a·b`
    pub fn area(&self) -> f64 {
        ellipse_area(self.semi_major, self.semi_minor)
    }

    /// Perimeter by Ramanujan's second approximation
    pub fn perimeter(&self) -> f64 {
        ellipse_perimeter(self.semi_major, self.semi_minor)
    }

    /// Containment in the ellipse's own rotated frame (boundary included)
    pub fn contains(&self, point: ImagePoint) -> bool {
        if self.semi_major <= 0.0 || self.semi_minor <= 0.0 {
            return false;
        }
        let dx = point.x - self.center.x;
        let dy = point.y - self.center.y;
        let (sin, cos) = self.rotation.sin_cos();
        let u = dx * cos + dy * sin;
        let v = -dx * sin + dy * cos;
        let nu = u / self.semi_major;
        let nv = v / self.semi_minor;
        nu * nu + nv * nv <= 1.0
    }
}

/// Derive ellipse parameters from four points
///
/// Points `(p0, p1)` and `(p2, p3)` are the endpoints of the two axes. The
/// center is the mean of all four points; each semi axis is half its pair's
/// length. The longer pair is reported as the major axis.
pub fn ellipse_parameters(points: &[ImagePoint]) -> Option<EllipseParameters> {
    let [p0, p1, p2, p3] = <[ImagePoint; 4]>::try_from(points).ok()?;

    let center = ImagePoint::new(
        (p0.x + p1.x + p2.x + p3.x) / 4.0,
        (p0.y + p1.y + p2.y + p3.y) / 4.0,
    );
    let first = distance(p0, p1) / 2.0;
    let second = distance(p2, p3) / 2.0;

    let (semi_major, semi_minor, axis_start, axis_end) = if first >= second {
        (first, second, p0, p1)
    } else {
        (second, first, p2, p3)
    };
    let rotation = (axis_end.y - axis_start.y).atan2(axis_end.x - axis_start.x);

    Some(EllipseParameters {
        center,
        semi_major,
        semi_minor,
        rotation,
    })
}

/// Ellipse area from its semi axes
pub fn ellipse_area(semi_major: f64, semi_minor: f64) -> f64 {
    PI * semi_major * semi_minor
}

/// Ramanujan's second approximation of the ellipse perimeter
pub fn ellipse_perimeter(semi_major: f64, semi_minor: f64) -> f64 {
    let a = semi_major;
    let b = semi_minor;
    PI * (3.0 * (a + b) - ((3.0 * a + b) * (a + 3.0 * b)).sqrt())
}

/// Circle defined by its center and a point on the edge
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CircleParameters {
    pub center: ImagePoint,
    pub radius: f64,
}

impl CircleParameters {
    pub fn area(&self) -> f64 {
        PI * self.radius * self.radius
    }

    pub fn perimeter(&self) -> f64 {
        2.0 * PI * self.radius
    }

    pub fn contains(&self, point: ImagePoint) -> bool {
        distance(point, self.center) <= self.radius
    }
}

/// Circle through `edge` centred on `center`
pub fn circle_parameters(center: ImagePoint, edge: ImagePoint) -> CircleParameters {
    CircleParameters {
        center,
        radius: distance(center, edge),
    }
}

/// Normalized `(min_x, min_y, max_x, max_y)` of two corners
fn normalized_corners(a: ImagePoint, b: ImagePoint) -> (f64, f64, f64, f64) {
    (a.x.min(b.x), a.y.min(b.y), a.x.max(b.x), a.y.max(b.y))
}

/// Rectangle area; corners may be given in any order
pub fn rectangle_area(top_left: ImagePoint, bottom_right: ImagePoint) -> f64 {
    let (min_x, min_y, max_x, max_y) = normalized_corners(top_left, bottom_right);
    (max_x - min_x) * (max_y - min_y)
}

/// Rectangle perimeter; corners may be given in any order
pub fn rectangle_perimeter(top_left: ImagePoint, bottom_right: ImagePoint) -> f64 {
    let (min_x, min_y, max_x, max_y) = normalized_corners(top_left, bottom_right);
    2.0 * ((max_x - min_x) + (max_y - min_y))
}

/// The four corners of an axis-aligned rectangle, clockwise from the top-left
pub fn rectangle_corners(a: ImagePoint, b: ImagePoint) -> [ImagePoint; 4] {
    let (min_x, min_y, max_x, max_y) = normalized_corners(a, b);
    [
        ImagePoint::new(min_x, min_y),
        ImagePoint::new(max_x, min_y),
        ImagePoint::new(max_x, max_y),
        ImagePoint::new(min_x, max_y),
    ]
}

/// Inclusive bounding-box containment test
pub fn rectangle_contains(
    top_left: ImagePoint,
    bottom_right: ImagePoint,
    point: ImagePoint,
) -> bool {
    let (min_x, min_y, max_x, max_y) = normalized_corners(top_left, bottom_right);
    point.x >= min_x && point.x <= max_x && point.y >= min_y && point.y <= max_y
}

/// Circle containment, boundary included
pub fn circle_contains(center: ImagePoint, radius: f64, point: ImagePoint) -> bool {
    distance(point, center) <= radius
}

/// Even-odd ray casting point-in-polygon test
///
/// Returns `false` for fewer than 3 vertices.
pub fn polygon_contains(vertices: &[ImagePoint], point: ImagePoint) -> bool {
    let n = vertices.len();
    if n < 3 {
        return false;
    }
    let mut inside = false;
    let mut j = n - 1;
    for i in 0..n {
        let vi = vertices[i];
        let vj = vertices[j];
        if (vi.y > point.y) != (vj.y > point.y) {
            let x_cross = (vj.x - vi.x) * (point.y - vi.y) / (vj.y - vi.y) + vi.x;
            if point.x < x_cross {
                inside = !inside;
            }
        }
        j = i;
    }
    inside
}

/// Ellipse containment for an axis-aligned or rotated ellipse
pub fn ellipse_contains(ellipse: &EllipseParameters, point: ImagePoint) -> bool {
    ellipse.contains(point)
}

/// Summary statistics over a set of pixel values
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PixelStatistics {
    pub count: usize,
    pub mean: f64,
    /// Population standard deviation
    pub std_dev: f64,
    pub min: f64,
    pub max: f64,
}

/// Mean, population standard deviation, min and max of `values`
///
/// Empty input yields all zeros; a single sample has a deviation of 0.
pub fn pixel_statistics(values: &[f64]) -> PixelStatistics {
    if values.is_empty() {
        return PixelStatistics::default();
    }
    let count = values.len();
    let n = count as f64;
    let mean = values.iter().sum::<f64>() / n;
    let std_dev = if count > 1 {
        let variance = values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n;
        variance.sqrt()
    } else {
        0.0
    };
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);

    PixelStatistics {
        count,
        mean,
        std_dev,
        min,
        max,
    }
}

/// Axis-aligned bounding box of a point set
///
/// Returns `(min_x, min_y, max_x, max_y)`, or `None` for an empty set.
pub fn bounding_box(points: &[ImagePoint]) -> Option<(f64, f64, f64, f64)> {
    let first = points.first()?;
    let mut min_x = first.x;
    let mut max_x = first.x;
    let mut min_y = first.y;
    let mut max_y = first.y;
    for point in points.iter().skip(1) {
        min_x = min_x.min(point.x);
        max_x = max_x.max(point.x);
        min_y = min_y.min(point.y);
        max_y = max_y.max(point.y);
    }
    Some((min_x, min_y, max_x, max_y))
}

/// Vertex average of a point set
pub fn centroid(points: &[ImagePoint]) -> Option<ImagePoint> {
    if points.is_empty() {
        return None;
    }
    let n = points.len() as f64;
    let sum_x: f64 = points.iter().map(|p| p.x).sum();
    let sum_y: f64 = points.iter().map(|p| p.y).sum();
    Some(ImagePoint::new(sum_x / n, sum_y / n))
}

/// Shortest distance from `point` to the segment `start`-`end`
pub fn distance_to_segment(point: ImagePoint, start: ImagePoint, end: ImagePoint) -> f64 {
    let dx = end.x - start.x;
    let dy = end.y - start.y;
    let length_sq = dx * dx + dy * dy;

    if length_sq < DEGENERATE_EPSILON {
        return distance(point, start);
    }

    // Project point onto the segment
    let t = (((point.x - start.x) * dx + (point.y - start.y) * dy) / length_sq).clamp(0.0, 1.0);
    let closest = ImagePoint::new(start.x + t * dx, start.y + t * dy);
    distance(point, closest)
}

/// Whether `point` lies within `tolerance` of any segment of the path
pub fn point_near_polyline(
    points: &[ImagePoint],
    point: ImagePoint,
    tolerance: f64,
    closed: bool,
) -> bool {
    if let [only] = points {
        return distance(point, *only) <= tolerance;
    }
    let near_open = points
        .windows(2)
        .any(|w| distance_to_segment(point, w[0], w[1]) <= tolerance);
    if near_open {
        return true;
    }
    match (closed && points.len() > 2, points.first(), points.last()) {
        (true, Some(&first), Some(&last)) => distance_to_segment(point, last, first) <= tolerance,
        _ => false,
    }
}
