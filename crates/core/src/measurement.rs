//! Measurement records and calibrated results
//!
//! A [`MeasurementEntry`] is an immutable record of a placed length, angle,
//! Cobb angle, bidirectional measurement, marker or arrow. Results are
//! derived on demand from its points and the calibration captured when it
//! was placed.

use crate::annotation::{now_millis, AnnotationStyle, EntryId, ImageKey, ImagePoint};
use crate::calibration::Calibration;
use crate::geometry;
use serde::{Deserialize, Serialize};

/// Kind of tool that produced an entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ToolType {
    Length,
    Angle,
    CobbAngle,
    Bidirectional,
    Marker,
    ArrowAnnotation,
    #[serde(rename = "CircularROI")]
    CircularRoi,
    #[serde(rename = "RectangularROI")]
    RectangularRoi,
    #[serde(rename = "EllipticalROI")]
    EllipticalRoi,
    #[serde(rename = "FreehandROI")]
    FreehandRoi,
    #[serde(rename = "PolygonalROI")]
    PolygonalRoi,
}

/// Minimum vertex count of the variable-arity ROI tools
pub const VARIABLE_ARITY_MIN_POINTS: usize = 3;

impl ToolType {
    /// Every tool, in palette order
    pub const ALL: [ToolType; 11] = [
        ToolType::Length,
        ToolType::Angle,
        ToolType::CobbAngle,
        ToolType::Bidirectional,
        ToolType::Marker,
        ToolType::ArrowAnnotation,
        ToolType::CircularRoi,
        ToolType::RectangularRoi,
        ToolType::EllipticalRoi,
        ToolType::FreehandRoi,
        ToolType::PolygonalRoi,
    ];

    /// Number of points that completes the tool
    ///
    /// `None` for freehand and polygonal ROIs, which take any number of
    /// points from [`VARIABLE_ARITY_MIN_POINTS`] and are finalized explicitly.
    pub const fn required_point_count(&self) -> Option<usize> {
        match self {
            ToolType::Length => Some(2),
            ToolType::Angle => Some(3),
            ToolType::CobbAngle => Some(4),
            ToolType::Bidirectional => Some(4),
            ToolType::Marker => Some(1),
            ToolType::ArrowAnnotation => Some(2),
            ToolType::CircularRoi => Some(2),
            ToolType::RectangularRoi => Some(2),
            ToolType::EllipticalRoi => Some(4),
            ToolType::FreehandRoi | ToolType::PolygonalRoi => None,
        }
    }

    /// Whether the tool takes a variable number of points
    pub const fn is_variable_arity(&self) -> bool {
        self.required_point_count().is_none()
    }

    /// Whether the tool encloses a region with pixel statistics
    pub const fn is_roi(&self) -> bool {
        matches!(
            self,
            ToolType::CircularRoi
                | ToolType::RectangularRoi
                | ToolType::EllipticalRoi
                | ToolType::FreehandRoi
                | ToolType::PolygonalRoi
        )
    }

    /// Whether `count` points form a complete shape for this tool
    pub const fn accepts_point_count(&self, count: usize) -> bool {
        match self.required_point_count() {
            Some(required) => count == required,
            None => count >= VARIABLE_ARITY_MIN_POINTS,
        }
    }

    /// Stable name used in exports
    pub fn name(&self) -> &'static str {
        match self {
            ToolType::Length => "Length",
            ToolType::Angle => "Angle",
            ToolType::CobbAngle => "CobbAngle",
            ToolType::Bidirectional => "Bidirectional",
            ToolType::Marker => "Marker",
            ToolType::ArrowAnnotation => "ArrowAnnotation",
            ToolType::CircularRoi => "CircularROI",
            ToolType::RectangularRoi => "RectangularROI",
            ToolType::EllipticalRoi => "EllipticalROI",
            ToolType::FreehandRoi => "FreehandROI",
            ToolType::PolygonalRoi => "PolygonalROI",
        }
    }
}

/// Validate points against a tool's arity
pub(crate) fn valid_points(tool_type: ToolType, points: &[ImagePoint]) -> bool {
    tool_type.accepts_point_count(points.len()) && points.iter().all(ImagePoint::is_finite)
}

/// Length of a segment in pixels and, when calibrated, millimetres
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LengthMeasurement {
    pub length_pixels: f64,
    pub length_mm: Option<f64>,
}

/// Measure the segment `p1`-`p2`
pub fn measure_length(
    p1: ImagePoint,
    p2: ImagePoint,
    calibration: &Calibration,
) -> LengthMeasurement {
    LengthMeasurement {
        length_pixels: geometry::distance(p1, p2),
        length_mm: calibration.length_mm(p1, p2),
    }
}

/// Computed value of a measurement entry
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum MeasurementResult {
    Length {
        pixels: f64,
        mm: Option<f64>,
    },
    Angle {
        degrees: f64,
    },
    CobbAngle {
        degrees: f64,
    },
    Bidirectional {
        long_axis_pixels: f64,
        short_axis_pixels: f64,
        long_axis_mm: Option<f64>,
        short_axis_mm: Option<f64>,
        /// Acute angle between the drawn axes in degrees
        axes_angle: f64,
    },
}

impl MeasurementResult {
    /// Display label with value and unit
    ///
    /// Physical units are used when available, pixels otherwise.
    pub fn formatted(&self) -> String {
        match self {
            MeasurementResult::Length { pixels, mm } => match mm {
                Some(mm) => format!("{:.2} mm", mm),
                None => format!("{:.2} px", pixels),
            },
            MeasurementResult::Angle { degrees } | MeasurementResult::CobbAngle { degrees } => {
                format!("{:.1}°", degrees)
            }
            MeasurementResult::Bidirectional {
                long_axis_pixels,
                short_axis_pixels,
                long_axis_mm,
                short_axis_mm,
                ..
            } => match (long_axis_mm, short_axis_mm) {
                (Some(long), Some(short)) => format!("L {:.2} × S {:.2} mm", long, short),
                _ => format!("L {:.2} × S {:.2} px", long_axis_pixels, short_axis_pixels),
            },
        }
    }
}

/// A placed measurement
///
/// Immutable: every `with_*` method returns a copy that keeps the `id` and
/// `created_at` of the original, so the store can match old and new versions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasurementEntry {
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
}

impl MeasurementEntry {
    /// Create a new entry with a generated ID
    ///
    /// Returns `None` for ROI tools, for a point count that does not match
    /// the tool, or for non-finite coordinates.
    pub fn new(
        tool_type: ToolType,
        points: Vec<ImagePoint>,
        image_key: impl Into<ImageKey>,
        frame_number: u32,
        calibration: Calibration,
    ) -> Option<Self> {
        if tool_type.is_roi() || !valid_points(tool_type, &points) {
            return None;
        }
        Some(Self {
            id: EntryId::new_v4(),
            tool_type,
            points,
            label: None,
            style: AnnotationStyle::new(),
            visible: true,
            locked: false,
            image_key: image_key.into(),
            frame_number,
            created_at: now_millis(),
            calibration,
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

    /// Copy with a new label (an empty label clears it)
    pub fn with_label(&self, label: impl Into<String>) -> Self {
        let label = label.into();
        Self {
            label: (!label.is_empty()).then_some(label),
            ..self.clone()
        }
    }

    /// Copy with a new style
    pub fn with_style(&self, style: AnnotationStyle) -> Self {
        Self {
            style,
            ..self.clone()
        }
    }

    /// Copy with a new visibility flag
    pub fn with_visible(&self, visible: bool) -> Self {
        Self {
            visible,
            ..self.clone()
        }
    }

    /// Copy with a new lock flag
    pub fn with_locked(&self, locked: bool) -> Self {
        Self {
            locked,
            ..self.clone()
        }
    }

    /// Copy with moved points; `None` if they do not fit the tool
    pub fn with_points(&self, points: Vec<ImagePoint>) -> Option<Self> {
        valid_points(self.tool_type, &points).then(|| Self {
            points,
            ..self.clone()
        })
    }

    /// Copy recalibrated to `calibration`
    pub fn with_calibration(&self, calibration: Calibration) -> Self {
        Self {
            calibration,
            ..self.clone()
        }
    }

    /// Compute the result of this measurement
    ///
    /// Markers and arrows have no numeric result; degenerate angles yield
    /// `None` as well.
    pub fn result(&self) -> Option<MeasurementResult> {
        let calibration = &self.calibration;
        match (self.tool_type, self.points.as_slice()) {
            (ToolType::Length, &[a, b]) => {
                let length = measure_length(a, b, calibration);
                Some(MeasurementResult::Length {
                    pixels: length.length_pixels,
                    mm: length.length_mm,
                })
            }
            (ToolType::Angle, &[p1, vertex, p2]) => {
                geometry::angle(vertex, p1, p2).map(|degrees| MeasurementResult::Angle { degrees })
            }
            (ToolType::CobbAngle, &[a1, a2, b1, b2]) => geometry::cobb_angle(a1, a2, b1, b2)
                .map(|degrees| MeasurementResult::CobbAngle { degrees }),
            (ToolType::Bidirectional, &[a1, a2, b1, b2]) => {
                let axes = geometry::bidirectional(a1, a2, b1, b2)?;
                let first_mm = calibration.length_mm(a1, a2);
                let second_mm = calibration.length_mm(b1, b2);
                // Keep physical axes paired with the pixel axes after swapping
                let (long_axis_mm, short_axis_mm) = match (first_mm, second_mm) {
                    (Some(first), Some(second))
                        if geometry::distance(a1, a2) >= geometry::distance(b1, b2) =>
                    {
                        (Some(first), Some(second))
                    }
                    (Some(first), Some(second)) => (Some(second), Some(first)),
                    _ => (None, None),
                };
                Some(MeasurementResult::Bidirectional {
                    long_axis_pixels: axes.long_axis,
                    short_axis_pixels: axes.short_axis,
                    long_axis_mm,
                    short_axis_mm,
                    axes_angle: axes.axes_angle,
                })
            }
            _ => None,
        }
    }

    /// Where the result label should be anchored
    pub fn label_position(&self) -> ImagePoint {
        match (self.tool_type, self.points.as_slice()) {
            // Angle: at the vertex
            (ToolType::Angle, &[_, vertex, _]) => vertex,
            // Arrow: at the tail, away from the head
            (ToolType::ArrowAnnotation, &[_, tail]) => tail,
            (ToolType::Length, &[a, b]) => geometry::midpoint(a, b),
            _ => geometry::centroid(&self.points).unwrap_or_default(),
        }
    }

    /// Check if a point hits this entry (for selection)
    pub fn hit_test(&self, point: ImagePoint, tolerance: f64) -> bool {
        if !self.visible {
            return false;
        }
        match (self.tool_type, self.points.as_slice()) {
            (ToolType::CobbAngle | ToolType::Bidirectional, &[a1, a2, b1, b2]) => {
                geometry::distance_to_segment(point, a1, a2) <= tolerance
                    || geometry::distance_to_segment(point, b1, b2) <= tolerance
            }
            _ => geometry::point_near_polyline(&self.points, point, tolerance, false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::CalibrationSource;

    fn p(x: f64, y: f64) -> ImagePoint {
        ImagePoint::new(x, y)
    }

    fn half_mm() -> Calibration {
        Calibration::isotropic(0.5, CalibrationSource::PixelSpacing)
    }

    #[test]
    fn test_required_point_counts() {
        assert_eq!(ToolType::Length.required_point_count(), Some(2));
        assert_eq!(ToolType::Angle.required_point_count(), Some(3));
        assert_eq!(ToolType::CobbAngle.required_point_count(), Some(4));
        assert_eq!(ToolType::Bidirectional.required_point_count(), Some(4));
        assert_eq!(ToolType::Marker.required_point_count(), Some(1));
        assert_eq!(ToolType::ArrowAnnotation.required_point_count(), Some(2));
        assert_eq!(ToolType::CircularRoi.required_point_count(), Some(2));
        assert_eq!(ToolType::RectangularRoi.required_point_count(), Some(2));
        assert_eq!(ToolType::EllipticalRoi.required_point_count(), Some(4));
        assert_eq!(ToolType::FreehandRoi.required_point_count(), None);
        assert_eq!(ToolType::PolygonalRoi.required_point_count(), None);
    }

    #[test]
    fn test_roi_classification() {
        let rois: Vec<_> = ToolType::ALL.iter().filter(|t| t.is_roi()).collect();
        assert_eq!(rois.len(), 5);
        assert!(ToolType::PolygonalRoi.is_variable_arity());
        assert!(!ToolType::EllipticalRoi.is_variable_arity());
        assert!(ToolType::FreehandRoi.accepts_point_count(3));
        assert!(!ToolType::FreehandRoi.accepts_point_count(2));
    }

    #[test]
    fn test_measure_length_scenario() {
        let length = measure_length(p(0.0, 0.0), p(100.0, 0.0), &half_mm());
        assert_eq!(length.length_pixels, 100.0);
        assert_eq!(length.length_mm, Some(50.0));

        let uncalibrated = measure_length(p(0.0, 0.0), p(100.0, 0.0), &Calibration::uncalibrated());
        assert_eq!(uncalibrated.length_mm, None);
    }

    #[test]
    fn test_entry_rejects_wrong_arity() {
        let single = vec![p(0.0, 0.0)];
        assert!(MeasurementEntry::new(ToolType::Length, single, "img", 0, half_mm()).is_none());
        assert!(MeasurementEntry::new(
            ToolType::CircularRoi,
            vec![p(0.0, 0.0), p(1.0, 1.0)],
            "img",
            0,
            half_mm()
        )
        .is_none());
        assert!(MeasurementEntry::new(
            ToolType::Length,
            vec![p(0.0, 0.0), p(f64::INFINITY, 1.0)],
            "img",
            0,
            half_mm()
        )
        .is_none());
    }

    #[test]
    fn test_length_result_and_label() {
        let points = vec![p(0.0, 0.0), p(100.0, 0.0)];
        let entry = MeasurementEntry::new(ToolType::Length, points, "img", 0, half_mm()).unwrap();
        let result = entry.result().unwrap();
        assert_eq!(
            result,
            MeasurementResult::Length {
                pixels: 100.0,
                mm: Some(50.0)
            }
        );
        assert_eq!(result.formatted(), "50.00 mm");
        assert_eq!(entry.label_position(), p(50.0, 0.0));
    }

    #[test]
    fn test_angle_result() {
        let entry = MeasurementEntry::new(
            ToolType::Angle,
            vec![p(10.0, 0.0), p(0.0, 0.0), p(0.0, 10.0)],
            "img",
            0,
            Calibration::uncalibrated(),
        )
        .unwrap();
        match entry.result() {
            Some(MeasurementResult::Angle { degrees }) => assert!((degrees - 90.0).abs() < 1e-9),
            other => panic!("unexpected result {other:?}"),
        }
        assert_eq!(entry.label_position(), p(0.0, 0.0));
    }

    #[test]
    fn test_degenerate_angle_has_no_result() {
        let entry = MeasurementEntry::new(
            ToolType::Angle,
            vec![p(0.0, 0.0), p(0.0, 0.0), p(0.0, 10.0)],
            "img",
            0,
            Calibration::uncalibrated(),
        )
        .unwrap();
        assert_eq!(entry.result(), None);
    }

    #[test]
    fn test_bidirectional_result_pairs_physical_axes() {
        // Drawn "long" axis is actually the shorter one, with anisotropic spacing
        let calibration = Calibration::new(1.0, 0.5, CalibrationSource::PixelSpacing);
        let entry = MeasurementEntry::new(
            ToolType::Bidirectional,
            vec![p(0.0, 0.0), p(0.0, 4.0), p(-5.0, 2.0), p(5.0, 2.0)],
            "img",
            0,
            calibration,
        )
        .unwrap();
        match entry.result() {
            Some(MeasurementResult::Bidirectional {
                long_axis_pixels,
                short_axis_pixels,
                long_axis_mm,
                short_axis_mm,
                axes_angle,
            }) => {
                assert_eq!(long_axis_pixels, 10.0);
                assert_eq!(short_axis_pixels, 4.0);
                assert_eq!(long_axis_mm, Some(5.0));
                assert_eq!(short_axis_mm, Some(4.0));
                assert!((axes_angle - 90.0).abs() < 1e-9);
            }
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[test]
    fn test_marker_has_no_result() {
        let points = vec![p(3.0, 4.0)];
        let entry = MeasurementEntry::new(ToolType::Marker, points, "img", 2, half_mm()).unwrap();
        assert_eq!(entry.result(), None);
        assert_eq!(entry.label_position(), p(3.0, 4.0));
        assert_eq!(entry.frame_number(), 2);
    }

    #[test]
    fn test_with_methods_preserve_identity() {
        let points = vec![p(0.0, 0.0), p(10.0, 0.0)];
        let entry = MeasurementEntry::new(ToolType::Length, points, "img", 0, half_mm()).unwrap();
        let labelled = entry.with_label("aorta");
        assert_eq!(labelled.id(), entry.id());
        assert_eq!(labelled.created_at(), entry.created_at());
        assert_eq!(labelled.label(), Some("aorta"));
        assert_eq!(entry.label(), None);

        let cleared = labelled.with_label("");
        assert_eq!(cleared.label(), None);

        let hidden = entry.with_visible(false).with_locked(true);
        assert!(!hidden.is_visible());
        assert!(hidden.is_locked());
        assert_eq!(hidden.id(), entry.id());

        let moved = entry.with_points(vec![p(0.0, 0.0), p(20.0, 0.0)]).unwrap();
        assert_eq!(moved.id(), entry.id());
        assert!(entry.with_points(vec![p(0.0, 0.0)]).is_none());
    }

    #[test]
    fn test_recalibration_changes_result() {
        let entry = MeasurementEntry::new(
            ToolType::Length,
            vec![p(0.0, 0.0), p(100.0, 0.0)],
            "img",
            0,
            Calibration::uncalibrated(),
        )
        .unwrap();
        assert_eq!(entry.result().unwrap().formatted(), "100.00 px");

        let calibrated = entry.with_calibration(half_mm());
        assert_eq!(calibrated.result().unwrap().formatted(), "50.00 mm");
    }

    #[test]
    fn test_hit_test() {
        let points = vec![p(0.0, 0.0), p(100.0, 0.0)];
        let entry = MeasurementEntry::new(ToolType::Length, points, "img", 0, half_mm()).unwrap();
        assert!(entry.hit_test(p(50.0, 2.0), 3.0));
        assert!(!entry.hit_test(p(50.0, 20.0), 3.0));
        assert!(!entry.with_visible(false).hit_test(p(50.0, 2.0), 3.0));

        let cobb = MeasurementEntry::new(
            ToolType::CobbAngle,
            vec![p(0.0, 0.0), p(10.0, 0.0), p(0.0, 50.0), p(10.0, 55.0)],
            "img",
            0,
            half_mm(),
        )
        .unwrap();
        // The gap between the two lines is not part of the shape
        assert!(!cobb.hit_test(p(5.0, 25.0), 3.0));
        assert!(cobb.hit_test(p(5.0, 52.5), 1.0));
    }
}
