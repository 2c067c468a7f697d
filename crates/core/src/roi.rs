//! Region-of-interest records and statistics
//!
//! An [`RoiEntry`] is a closed shape (circle, rectangle, ellipse, freehand
//! or polygon) carrying a snapshot of its area, perimeter and the pixel
//! statistics inside it. The snapshot is recomputed whenever the shape or
//! the calibration changes.

use crate::annotation::{now_millis, AnnotationStyle, EntryId, ImageKey, ImagePoint};
use crate::calibration::Calibration;
use crate::geometry::{self, CircleParameters, EllipseParameters, PixelStatistics};
use crate::measurement::{valid_points, ToolType};
use serde::{Deserialize, Serialize};

/// Read access to the stored pixel values of one frame
///
/// Implemented by the host on top of its decoded pixel data; values are
/// typically modality values (e.g. Hounsfield units).
pub trait PixelSource {
    /// Number of columns
    fn width(&self) -> u32;

    /// Number of rows
    fn height(&self) -> u32;

    /// Value at `(col, row)`, or `None` outside the image
    fn value(&self, col: u32, row: u32) -> Option<f64>;
}

/// Row-major in-memory pixel buffer
#[derive(Debug, Clone, PartialEq)]
pub struct PixelBuffer {
    width: u32,
    height: u32,
    values: Vec<f64>,
}

impl PixelBuffer {
    /// Wrap row-major values; `None` if the length does not match
    pub fn new(width: u32, height: u32, values: Vec<f64>) -> Option<Self> {
        (values.len() == width as usize * height as usize).then_some(Self {
            width,
            height,
            values,
        })
    }

    /// Buffer filled by `f(col, row)`
    pub fn from_fn(width: u32, height: u32, f: impl Fn(u32, u32) -> f64) -> Self {
        let values = (0..height)
            .flat_map(|row| (0..width).map(move |col| (col, row)))
            .map(|(col, row)| f(col, row))
            .collect();
        Self {
            width,
            height,
            values,
        }
    }
}

impl PixelSource for PixelBuffer {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn value(&self, col: u32, row: u32) -> Option<f64> {
        if col >= self.width || row >= self.height {
            return None;
        }
        self.values
            .get(row as usize * self.width as usize + col as usize)
            .copied()
    }
}

/// Closed shape derived from an ROI tool's points
#[derive(Debug, Clone, PartialEq)]
pub enum RoiShape {
    Circle(CircleParameters),
    Rectangle {
        top_left: ImagePoint,
        bottom_right: ImagePoint,
    },
    Ellipse(EllipseParameters),
    Polygon(Vec<ImagePoint>),
}

impl RoiShape {
    /// Build the shape for `tool_type`; `None` for non-ROI tools or bad arity
    pub fn from_points(tool_type: ToolType, points: &[ImagePoint]) -> Option<Self> {
        if !tool_type.is_roi() || !valid_points(tool_type, points) {
            return None;
        }
        match (tool_type, points) {
            (ToolType::CircularRoi, &[center, edge]) => {
                Some(RoiShape::Circle(geometry::circle_parameters(center, edge)))
            }
            (ToolType::RectangularRoi, &[top_left, bottom_right]) => Some(RoiShape::Rectangle {
                top_left,
                bottom_right,
            }),
            (ToolType::EllipticalRoi, _) => {
                geometry::ellipse_parameters(points).map(RoiShape::Ellipse)
            }
            (ToolType::FreehandRoi | ToolType::PolygonalRoi, _) => {
                Some(RoiShape::Polygon(points.to_vec()))
            }
            _ => None,
        }
    }

    /// Area in square pixels
    pub fn area(&self) -> f64 {
        match self {
            RoiShape::Circle(circle) => circle.area(),
            RoiShape::Rectangle {
                top_left,
                bottom_right,
            } => geometry::rectangle_area(*top_left, *bottom_right),
            RoiShape::Ellipse(ellipse) => ellipse.area(),
            RoiShape::Polygon(points) => geometry::polygon_area(points).unwrap_or(0.0),
        }
    }

    /// Perimeter in pixels
    pub fn perimeter(&self) -> f64 {
        match self {
            RoiShape::Circle(circle) => circle.perimeter(),
            RoiShape::Rectangle {
                top_left,
                bottom_right,
            } => geometry::rectangle_perimeter(*top_left, *bottom_right),
            RoiShape::Ellipse(ellipse) => ellipse.perimeter(),
            RoiShape::Polygon(points) => geometry::polygon_perimeter(points),
        }
    }

    /// Perimeter in millimetres
    ///
    /// Straight-edged shapes are measured exactly in physical space. Curved
    /// outlines scale by the spacing, using the geometric mean of the two
    /// spacings when they differ.
    pub fn perimeter_mm(&self, calibration: &Calibration) -> Option<f64> {
        match self {
            RoiShape::Rectangle {
                top_left,
                bottom_right,
            } => {
                let corners = geometry::rectangle_corners(*top_left, *bottom_right);
                calibration
                    .to_physical(&corners)
                    .map(|physical| geometry::polygon_perimeter(&physical))
            }
            RoiShape::Polygon(points) => calibration
                .to_physical(points)
                .map(|physical| geometry::polygon_perimeter(&physical)),
            RoiShape::Circle(_) | RoiShape::Ellipse(_) => {
                calibration.mean_spacing_mm().map(|spacing| self.perimeter() * spacing)
            }
        }
    }

    /// Whether `point` lies inside the shape
    pub fn contains(&self, point: ImagePoint) -> bool {
        match self {
            RoiShape::Circle(circle) => circle.contains(point),
            RoiShape::Rectangle {
                top_left,
                bottom_right,
            } => geometry::rectangle_contains(*top_left, *bottom_right, point),
            RoiShape::Ellipse(ellipse) => ellipse.contains(point),
            RoiShape::Polygon(points) => geometry::polygon_contains(points, point),
        }
    }

    /// `(min_x, min_y, max_x, max_y)` enclosing the shape
    pub fn bounding_box(&self) -> (f64, f64, f64, f64) {
        match self {
            RoiShape::Circle(circle) => (
                circle.center.x - circle.radius,
                circle.center.y - circle.radius,
                circle.center.x + circle.radius,
                circle.center.y + circle.radius,
            ),
            RoiShape::Rectangle {
                top_left,
                bottom_right,
            } => geometry::bounding_box(&[*top_left, *bottom_right]).unwrap_or_default(),
            RoiShape::Ellipse(ellipse) => {
                // Conservative: the major-axis circle encloses any rotation
                let r = ellipse.semi_major;
                (
                    ellipse.center.x - r,
                    ellipse.center.y - r,
                    ellipse.center.x + r,
                    ellipse.center.y + r,
                )
            }
            RoiShape::Polygon(points) => geometry::bounding_box(points).unwrap_or_default(),
        }
    }

    /// Values of every pixel whose center lies inside the shape
    ///
    /// Pixel `(col, row)` is centred at `(col + 0.5, row + 0.5)`. Pixels
    /// outside the image are skipped.
    pub fn sample(&self, source: &dyn PixelSource) -> Vec<f64> {
        let (min_x, min_y, max_x, max_y) = self.bounding_box();
        let finite = [min_x, min_y, max_x, max_y].iter().all(|v| v.is_finite());
        if !finite || source.width() == 0 || source.height() == 0 {
            return Vec::new();
        }
        let col_start = min_x.floor().max(0.0) as u32;
        let row_start = min_y.floor().max(0.0) as u32;
        let col_end = max_x.ceil().min(source.width() as f64).max(0.0) as u32;
        let row_end = max_y.ceil().min(source.height() as f64).max(0.0) as u32;

        let mut values = Vec::new();
        for row in row_start..row_end {
            for col in col_start..col_end {
                let center = ImagePoint::new(col as f64 + 0.5, row as f64 + 0.5);
                if !self.contains(center) {
                    continue;
                }
                if let Some(value) = source.value(col, row) {
                    values.push(value);
                }
            }
        }
        values
    }
}

/// Snapshot of an ROI's measurements
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct RoiStatistics {
    pub mean: f64,
    pub std_dev: f64,
    pub min: f64,
    pub max: f64,
    /// Number of pixels sampled for the intensity values (0 if none)
    pub pixel_count: usize,
    pub area_pixels: f64,
    pub area_mm2: Option<f64>,
    pub perimeter_pixels: f64,
    pub perimeter_mm: Option<f64>,
}

impl RoiStatistics {
    /// Copy with the intensity part replaced
    pub fn with_pixel_statistics(mut self, stats: PixelStatistics) -> Self {
        self.mean = stats.mean;
        self.std_dev = stats.std_dev;
        self.min = stats.min;
        self.max = stats.max;
        self.pixel_count = stats.count;
        self
    }

    /// Whether intensity values were sampled
    pub fn has_pixel_data(&self) -> bool {
        self.pixel_count > 0
    }

    /// Display label for the area
    pub fn formatted_area(&self) -> String {
        match self.area_mm2 {
            Some(mm2) => format!("{:.2} mm²", mm2),
            None => format!("{:.2} px²", self.area_pixels),
        }
    }
}

/// Area and perimeter of an ROI shape, in pixels and millimetres
pub fn roi_shape_metrics(
    tool_type: ToolType,
    points: &[ImagePoint],
    calibration: &Calibration,
) -> Option<RoiStatistics> {
    let shape = RoiShape::from_points(tool_type, points)?;
    let area_pixels = shape.area();
    Some(RoiStatistics {
        area_pixels,
        area_mm2: calibration.area_mm2(area_pixels),
        perimeter_pixels: shape.perimeter(),
        perimeter_mm: shape.perimeter_mm(calibration),
        ..RoiStatistics::default()
    })
}

/// Full statistics of an ROI, sampling intensities when pixels are given
pub fn compute_roi_statistics(
    tool_type: ToolType,
    points: &[ImagePoint],
    calibration: &Calibration,
    pixels: Option<&dyn PixelSource>,
) -> Option<RoiStatistics> {
    let metrics = roi_shape_metrics(tool_type, points, calibration)?;
    let Some(source) = pixels else {
        return Some(metrics);
    };
    let shape = RoiShape::from_points(tool_type, points)?;
    let values = shape.sample(source);
    Some(metrics.with_pixel_statistics(geometry::pixel_statistics(&values)))
}

/// A placed region of interest
///
/// Structurally parallel to [`crate::MeasurementEntry`], plus a statistics
/// snapshot. `with_*` copies keep `id` and `created_at`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoiEntry {
    id: EntryId,
    tool_type: ToolType,
    points: Vec<ImagePoint>,
    label: Option<String>,
    style: AnnotationStyle,
    visible: bool,
    locked: bool,
    image_key: ImageKey,
    frame_number: u32,
    /// Unix timestamp in milliseconds
    created_at: i64,
    calibration: Calibration,
    statistics: RoiStatistics,
}

impl RoiEntry {
    /// Create a new ROI with shape metrics computed
    ///
    /// Returns `None` for non-ROI tools or points that do not form the shape.
    /// Intensity statistics are zero until pixels are sampled.
    pub fn new(
        tool_type: ToolType,
        points: Vec<ImagePoint>,
        image_key: impl Into<ImageKey>,
        frame_number: u32,
        calibration: Calibration,
    ) -> Option<Self> {
        let statistics = roi_shape_metrics(tool_type, &points, &calibration)?;
        Some(Self {
            id: EntryId::new_v4(),
            tool_type,
            points,
            label: None,
            style: AnnotationStyle::roi(),
            visible: true,
            locked: false,
            image_key: image_key.into(),
            frame_number,
            created_at: now_millis(),
            calibration,
            statistics,
        })
    }

    pub fn id(&self) -> EntryId {
        self.id
    }

    pub fn tool_type(&self) -> ToolType {
        self.tool_type
    }

    pub fn points(&self) -> &[ImagePoint] {
        &self.points
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    pub fn style(&self) -> &AnnotationStyle {
        &self.style
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    pub fn image_key(&self) -> &str {
        &self.image_key
    }

    pub fn frame_number(&self) -> u32 {
        self.frame_number
    }

    pub fn created_at(&self) -> i64 {
        self.created_at
    }

    pub fn calibration(&self) -> &Calibration {
        &self.calibration
    }

    pub fn statistics(&self) -> &RoiStatistics {
        &self.statistics
    }

    /// The closed shape described by the points
    pub fn shape(&self) -> Option<RoiShape> {
        RoiShape::from_points(self.tool_type, &self.points)
    }

    /// Copy with a new label (an empty label clears it)
    pub fn with_label(&self, label: impl Into<String>) -> Self {
        let label = label.into();
        Self {
            label: (!label.is_empty()).then_some(label),
            ..self.clone()
        }
    }

    pub fn with_style(&self, style: AnnotationStyle) -> Self {
        Self {
            style,
            ..self.clone()
        }
    }

    pub fn with_visible(&self, visible: bool) -> Self {
        Self {
            visible,
            ..self.clone()
        }
    }

    pub fn with_locked(&self, locked: bool) -> Self {
        Self {
            locked,
            ..self.clone()
        }
    }

    /// Copy with a replaced statistics snapshot
    pub fn with_statistics(&self, statistics: RoiStatistics) -> Self {
        Self {
            statistics,
            ..self.clone()
        }
    }

    /// Copy with a reshaped outline and recomputed statistics
    ///
    /// Intensities are resampled from `pixels` when given and cleared
    /// otherwise, since the old values described another region.
    pub fn with_points(
        &self,
        points: Vec<ImagePoint>,
        pixels: Option<&dyn PixelSource>,
    ) -> Option<Self> {
        let statistics =
            compute_roi_statistics(self.tool_type, &points, &self.calibration, pixels)?;
        Some(Self {
            points,
            statistics,
            ..self.clone()
        })
    }

    /// Copy recalibrated to `calibration`; intensities are kept
    pub fn with_calibration(&self, calibration: Calibration) -> Self {
        let statistics = match roi_shape_metrics(self.tool_type, &self.points, &calibration) {
            Some(metrics) => RoiStatistics {
                area_mm2: metrics.area_mm2,
                perimeter_mm: metrics.perimeter_mm,
                ..self.statistics
            },
            None => self.statistics,
        };
        Self {
            calibration,
            statistics,
            ..self.clone()
        }
    }

    /// Copy with intensities sampled from `pixels`
    pub fn recompute_statistics(&self, pixels: &dyn PixelSource) -> Self {
        let statistics =
            compute_roi_statistics(self.tool_type, &self.points, &self.calibration, Some(pixels));
        match statistics {
            Some(statistics) => self.with_statistics(statistics),
            None => self.clone(),
        }
    }

    /// Where the statistics label should be anchored
    pub fn label_position(&self) -> ImagePoint {
        match self.shape() {
            Some(RoiShape::Circle(circle)) => circle.center,
            Some(RoiShape::Ellipse(ellipse)) => ellipse.center,
            _ => geometry::centroid(&self.points).unwrap_or_default(),
        }
    }

    /// Check if a point hits this ROI (inside or near the outline)
    pub fn hit_test(&self, point: ImagePoint, tolerance: f64) -> bool {
        if !self.visible {
            return false;
        }
        let Some(shape) = self.shape() else {
            return false;
        };
        if shape.contains(point) {
            return true;
        }
        match shape {
            RoiShape::Polygon(points) => {
                geometry::point_near_polyline(&points, point, tolerance, true)
            }
            RoiShape::Rectangle {
                top_left,
                bottom_right,
            } => geometry::point_near_polyline(
                &geometry::rectangle_corners(top_left, bottom_right),
                point,
                tolerance,
                true,
            ),
            RoiShape::Circle(circle) => {
                geometry::distance(point, circle.center) <= circle.radius + tolerance
            }
            RoiShape::Ellipse(ellipse) => EllipseParameters {
                semi_major: ellipse.semi_major + tolerance,
                semi_minor: ellipse.semi_minor + tolerance,
                ..ellipse
            }
            .contains(point),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::CalibrationSource;
    use std::f64::consts::PI;

    fn p(x: f64, y: f64) -> ImagePoint {
        ImagePoint::new(x, y)
    }

    fn square(side: f64) -> Vec<ImagePoint> {
        vec![p(0.0, 0.0), p(side, 0.0), p(side, side), p(0.0, side)]
    }

    fn uncalibrated() -> Calibration {
        Calibration::uncalibrated()
    }

    #[test]
    fn test_polygon_roi_area() {
        let roi = RoiEntry::new(ToolType::PolygonalRoi, square(100.0), "img", 0, uncalibrated())
            .unwrap();
        let stats = roi.statistics();
        assert_eq!(stats.area_pixels, 10000.0);
        assert_eq!(stats.area_mm2, None);
        assert_eq!(stats.perimeter_pixels, 400.0);
        assert!(!stats.has_pixel_data());
        assert_eq!(stats.formatted_area(), "10000.00 px²");
    }

    #[test]
    fn test_calibrated_rectangle_roi() {
        let calibration = Calibration::new(0.5, 0.25, CalibrationSource::PixelSpacing);
        let roi = RoiEntry::new(
            ToolType::RectangularRoi,
            vec![p(40.0, 20.0), p(0.0, 0.0)],
            "img",
            0,
            calibration,
        )
        .unwrap();
        let stats = roi.statistics();
        assert_eq!(stats.area_pixels, 800.0);
        assert_eq!(stats.area_mm2, Some(100.0));
        // 40 px wide at 0.25 mm, 20 px high at 0.5 mm: 10 x 10 mm
        assert_eq!(stats.perimeter_mm, Some(40.0));
    }

    #[test]
    fn test_circle_and_ellipse_metrics() {
        let calibration = Calibration::isotropic(2.0, CalibrationSource::Manual);
        let points = vec![p(10.0, 10.0), p(15.0, 10.0)];
        let circle = RoiEntry::new(ToolType::CircularRoi, points, "img", 0, calibration).unwrap();
        let stats = circle.statistics();
        assert!((stats.area_pixels - 25.0 * PI).abs() < 1e-9);
        assert!((stats.area_mm2.unwrap() - 100.0 * PI).abs() < 1e-9);
        assert!((stats.perimeter_mm.unwrap() - 20.0 * PI).abs() < 1e-9);

        let ellipse = RoiEntry::new(
            ToolType::EllipticalRoi,
            vec![p(-10.0, 0.0), p(10.0, 0.0), p(0.0, -5.0), p(0.0, 5.0)],
            "img",
            0,
            Calibration::uncalibrated(),
        )
        .unwrap();
        assert!((ellipse.statistics().area_pixels - 50.0 * PI).abs() < 1e-9);
        assert_eq!(ellipse.label_position(), p(0.0, 0.0));
    }

    #[test]
    fn test_roi_rejects_measurement_tools() {
        let points = vec![p(0.0, 0.0), p(1.0, 1.0)];
        assert!(RoiEntry::new(ToolType::Length, points, "img", 0, uncalibrated()).is_none());
        assert!(RoiEntry::new(
            ToolType::FreehandRoi,
            vec![p(0.0, 0.0), p(1.0, 1.0)],
            "img",
            0,
            Calibration::uncalibrated()
        )
        .is_none());
    }

    #[test]
    fn test_pixel_sampling_rectangle() {
        // Value encodes the column so the mean is easy to predict
        let pixels = PixelBuffer::from_fn(10, 10, |col, _row| col as f64);
        let roi = RoiEntry::new(
            ToolType::RectangularRoi,
            vec![p(2.0, 2.0), p(6.0, 4.0)],
            "img",
            0,
            Calibration::uncalibrated(),
        )
        .unwrap()
        .recompute_statistics(&pixels);
        let stats = roi.statistics();
        // Columns 2..=5, rows 2..=3
        assert_eq!(stats.pixel_count, 8);
        assert_eq!(stats.min, 2.0);
        assert_eq!(stats.max, 5.0);
        assert!((stats.mean - 3.5).abs() < 1e-12);
        assert_eq!(stats.area_pixels, 8.0);
    }

    #[test]
    fn test_pixel_sampling_clips_to_image() {
        let pixels = PixelBuffer::new(2, 2, vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        let stats = compute_roi_statistics(
            ToolType::RectangularRoi,
            &[p(-10.0, -10.0), p(10.0, 10.0)],
            &Calibration::uncalibrated(),
            Some(&pixels),
        )
        .unwrap();
        assert_eq!(stats.pixel_count, 4);
        assert!((stats.mean - 2.5).abs() < 1e-12);
        assert!(PixelBuffer::new(2, 2, vec![1.0]).is_none());
    }

    #[test]
    fn test_with_points_recomputes_and_clears_intensity() {
        let pixels = PixelBuffer::from_fn(20, 20, |_, _| 7.0);
        let roi = RoiEntry::new(ToolType::PolygonalRoi, square(4.0), "img", 0, uncalibrated())
            .unwrap()
            .recompute_statistics(&pixels);
        assert_eq!(roi.statistics().pixel_count, 16);

        let grown = roi.with_points(square(8.0), None).unwrap();
        assert_eq!(grown.id(), roi.id());
        assert_eq!(grown.statistics().area_pixels, 64.0);
        assert_eq!(grown.statistics().pixel_count, 0);

        let resampled = roi.with_points(square(8.0), Some(&pixels)).unwrap();
        assert_eq!(resampled.statistics().pixel_count, 64);
        assert_eq!(resampled.statistics().mean, 7.0);
    }

    #[test]
    fn test_with_calibration_keeps_intensity() {
        let pixels = PixelBuffer::from_fn(20, 20, |_, _| 3.0);
        let roi = RoiEntry::new(ToolType::PolygonalRoi, square(10.0), "img", 0, uncalibrated())
            .unwrap()
            .recompute_statistics(&pixels);
        let calibration = Calibration::isotropic(0.5, CalibrationSource::Manual);
        let calibrated = roi.with_calibration(calibration);
        assert_eq!(calibrated.statistics().mean, 3.0);
        assert_eq!(calibrated.statistics().area_mm2, Some(25.0));
        assert_eq!(calibrated.statistics().perimeter_mm, Some(20.0));
    }

    #[test]
    fn test_roi_hit_test() {
        let points = vec![p(50.0, 50.0), p(60.0, 50.0)];
        let roi = RoiEntry::new(ToolType::CircularRoi, points, "img", 0, uncalibrated()).unwrap();
        assert!(roi.hit_test(p(50.0, 50.0), 1.0));
        assert!(roi.hit_test(p(60.5, 50.0), 1.0));
        assert!(!roi.hit_test(p(70.0, 50.0), 1.0));
        assert!(!roi.with_visible(false).hit_test(p(50.0, 50.0), 1.0));
    }
}
