//! Pixel-to-millimetre calibration
//!
//! Resolves a physical scale from the DICOM spacing attributes in a fixed
//! priority order, and supports manual two-point calibration and
//! radiographic magnification correction.

use crate::annotation::ImagePoint;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Where a calibration came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum CalibrationSource {
    /// Pixel Spacing (0028,0030), spacing in the patient plane
    PixelSpacing,
    /// Imager Pixel Spacing (0018,1164), spacing at the detector
    ImagerPixelSpacing,
    /// Nominal Scanned Pixel Spacing (0018,2010), digitized film
    NominalScanned,
    /// Two-point calibration entered by the user
    Manual,
    /// No usable calibration
    #[default]
    Unknown,
}

impl CalibrationSource {
    /// Human readable name
    pub fn name(&self) -> &'static str {
        match self {
            CalibrationSource::PixelSpacing => "PixelSpacing",
            CalibrationSource::ImagerPixelSpacing => "ImagerPixelSpacing",
            CalibrationSource::NominalScanned => "NominalScanned",
            CalibrationSource::Manual => "Manual",
            CalibrationSource::Unknown => "Unknown",
        }
    }
}

/// Physical size of one pixel
///
/// Row spacing is the distance between adjacent rows and scales the y axis;
/// column spacing scales the x axis. The uncalibrated value has both
/// spacings at 0 and source [`CalibrationSource::Unknown`].
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Calibration {
    pub row_spacing_mm: f64,
    pub col_spacing_mm: f64,
    pub source: CalibrationSource,
}

impl Calibration {
    /// Create a calibration; invalid spacings collapse to uncalibrated
    pub fn new(row_spacing_mm: f64, col_spacing_mm: f64, source: CalibrationSource) -> Self {
        if is_valid_spacing(row_spacing_mm) && is_valid_spacing(col_spacing_mm) {
            Self {
                row_spacing_mm,
                col_spacing_mm,
                source,
            }
        } else {
            Self::uncalibrated()
        }
    }

    /// Same spacing on both axes
    pub fn isotropic(spacing_mm: f64, source: CalibrationSource) -> Self {
        Self::new(spacing_mm, spacing_mm, source)
    }

    /// The uncalibrated sentinel
    pub fn uncalibrated() -> Self {
        Self {
            row_spacing_mm: 0.0,
            col_spacing_mm: 0.0,
            source: CalibrationSource::Unknown,
        }
    }

    /// Whether both spacings are positive
    pub fn is_calibrated(&self) -> bool {
        self.row_spacing_mm > 0.0 && self.col_spacing_mm > 0.0
    }

    /// Whether rows and columns share the same spacing
    pub fn is_isotropic(&self) -> bool {
        self.is_calibrated() && (self.row_spacing_mm - self.col_spacing_mm).abs() < 1e-12
    }

    /// Physical length of the segment `a`-`b`
    ///
    /// Handles anisotropic spacing exactly by scaling each axis separately.
    pub fn length_mm(&self, a: ImagePoint, b: ImagePoint) -> Option<f64> {
        if !self.is_calibrated() {
            return None;
        }
        let dx = (b.x - a.x) * self.col_spacing_mm;
        let dy = (b.y - a.y) * self.row_spacing_mm;
        Some((dx * dx + dy * dy).sqrt())
    }

    /// Physical area of a pixel-space area
    pub fn area_mm2(&self, area_pixels: f64) -> Option<f64> {
        self.is_calibrated()
            .then(|| area_pixels * self.row_spacing_mm * self.col_spacing_mm)
    }

    /// Geometric mean of the two spacings
    ///
    /// Used to scale curved outlines under anisotropic spacing.
    pub fn mean_spacing_mm(&self) -> Option<f64> {
        self.is_calibrated()
            .then(|| (self.row_spacing_mm * self.col_spacing_mm).sqrt())
    }

    /// Map pixel points into millimetre space
    pub fn to_physical(&self, points: &[ImagePoint]) -> Option<Vec<ImagePoint>> {
        if !self.is_calibrated() {
            return None;
        }
        Some(
            points
                .iter()
                .map(|p| ImagePoint::new(p.x * self.col_spacing_mm, p.y * self.row_spacing_mm))
                .collect(),
        )
    }
}

fn is_valid_spacing(value: f64) -> bool {
    value.is_finite() && value > 0.0
}

/// Parse a DICOM decimal-string pair `"row\column"`
///
/// Requires exactly two backslash-separated tokens; each is trimmed and must
/// be a finite, strictly positive number.
pub fn parse_pixel_spacing(value: &str) -> Option<(f64, f64)> {
    let mut tokens = value.split('\\');
    let row = tokens.next()?.trim().parse::<f64>().ok()?;
    let col = tokens.next()?.trim().parse::<f64>().ok()?;
    if tokens.next().is_some() {
        return None;
    }
    (is_valid_spacing(row) && is_valid_spacing(col)).then_some((row, col))
}

/// Resolve the calibration for an image
///
/// Sources are tried in priority order: Pixel Spacing, Imager Pixel Spacing,
/// Nominal Scanned Pixel Spacing. The first one that parses wins; if none
/// does the image is uncalibrated.
pub fn resolve_calibration(
    pixel_spacing: Option<&str>,
    imager_pixel_spacing: Option<&str>,
    nominal_scanned_pixel_spacing: Option<&str>,
) -> Calibration {
    let candidates = [
        (pixel_spacing, CalibrationSource::PixelSpacing),
        (imager_pixel_spacing, CalibrationSource::ImagerPixelSpacing),
        (nominal_scanned_pixel_spacing, CalibrationSource::NominalScanned),
    ];

    for (value, source) in candidates {
        let Some(value) = value else {
            continue;
        };
        match parse_pixel_spacing(value) {
            Some((row, col)) => return Calibration::new(row, col, source),
            None => debug!(source = source.name(), value, "ignoring unparseable pixel spacing"),
        }
    }

    debug!("no usable pixel spacing, image is uncalibrated");
    Calibration::uncalibrated()
}

/// Calibration from a user-drawn reference of known length
///
/// Spacing is `known_distance_mm / pixel_distance` on both axes. Non-positive
/// or non-finite input yields an uncalibrated value.
pub fn calibration_from_manual(pixel_distance: f64, known_distance_mm: f64) -> Calibration {
    if !is_valid_spacing(pixel_distance) || !is_valid_spacing(known_distance_mm) {
        return Calibration::uncalibrated();
    }
    Calibration::isotropic(known_distance_mm / pixel_distance, CalibrationSource::Manual)
}

/// Two-point calibration between `p1` and `p2`
pub fn calibration_from_points(
    p1: ImagePoint,
    p2: ImagePoint,
    known_distance_mm: f64,
) -> Calibration {
    calibration_from_manual(p1.distance_to(&p2), known_distance_mm)
}

/// Divide both spacings by a magnification factor
///
/// A non-positive factor or an uncalibrated input is returned unchanged.
pub fn apply_magnification_correction(calibration: Calibration, factor: f64) -> Calibration {
    if !calibration.is_calibrated() || !is_valid_spacing(factor) {
        return calibration;
    }
    Calibration {
        row_spacing_mm: calibration.row_spacing_mm / factor,
        col_spacing_mm: calibration.col_spacing_mm / factor,
        source: calibration.source,
    }
}

/// Estimated radiographic magnification `SID / SOD`
///
/// Distance Source to Detector (0018,1110) over Distance Source to Patient
/// (0018,1111).
pub fn magnification_factor(source_to_detector_mm: f64, source_to_patient_mm: f64) -> Option<f64> {
    (is_valid_spacing(source_to_detector_mm) && is_valid_spacing(source_to_patient_mm))
        .then(|| source_to_detector_mm / source_to_patient_mm)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    #[test]
    fn test_parse_pixel_spacing() {
        assert_eq!(parse_pixel_spacing("0.5\\0.25"), Some((0.5, 0.25)));
        assert_eq!(parse_pixel_spacing(" 0.7 \\ 0.7 "), Some((0.7, 0.7)));
        assert_eq!(parse_pixel_spacing("1e-1\\2"), Some((0.1, 2.0)));
    }

    #[test]
    fn test_parse_pixel_spacing_rejects_bad_input() {
        assert_eq!(parse_pixel_spacing("0\\0"), None);
        assert_eq!(parse_pixel_spacing("0.5"), None);
        assert_eq!(parse_pixel_spacing("0.5\\0.5\\0.5"), None);
        assert_eq!(parse_pixel_spacing("abc\\0.5"), None);
        assert_eq!(parse_pixel_spacing("-0.5\\0.5"), None);
        assert_eq!(parse_pixel_spacing("0.5\\"), None);
        assert_eq!(parse_pixel_spacing("NaN\\0.5"), None);
        assert_eq!(parse_pixel_spacing("inf\\0.5"), None);
        assert_eq!(parse_pixel_spacing(""), None);
    }

    #[test]
    fn test_resolve_prefers_pixel_spacing() {
        let calibration = resolve_calibration(Some("0.2\\0.3"), Some("0.5\\0.5"), Some("1\\1"));
        assert_eq!(calibration.source, CalibrationSource::PixelSpacing);
        assert_eq!(calibration.row_spacing_mm, 0.2);
        assert_eq!(calibration.col_spacing_mm, 0.3);
    }

    #[test]
    fn test_resolve_falls_through_in_order() {
        let imager = resolve_calibration(Some("bogus"), Some("0.5\\0.5"), Some("1\\1"));
        assert_eq!(imager.source, CalibrationSource::ImagerPixelSpacing);

        let scanned = resolve_calibration(None, Some("0\\0"), Some("0.1\\0.1"));
        assert_eq!(scanned.source, CalibrationSource::NominalScanned);

        let none = resolve_calibration(None, None, Some("x\\y"));
        assert_eq!(none, Calibration::uncalibrated());
        assert!(!none.is_calibrated());
    }

    #[test]
    #[traced_test]
    fn test_resolve_logs_fallthrough() {
        resolve_calibration(Some("1\\2\\3"), None, None);
        assert!(logs_contain("ignoring unparseable pixel spacing"));
        assert!(logs_contain("image is uncalibrated"));
    }

    #[test]
    fn test_manual_calibration() {
        let calibration = calibration_from_manual(200.0, 50.0);
        assert_eq!(calibration.source, CalibrationSource::Manual);
        assert_eq!(calibration.row_spacing_mm, 0.25);
        assert_eq!(calibration.col_spacing_mm, 0.25);

        assert!(!calibration_from_manual(0.0, 50.0).is_calibrated());
        assert!(!calibration_from_manual(100.0, -1.0).is_calibrated());
        assert_eq!(
            calibration_from_manual(f64::NAN, 10.0).source,
            CalibrationSource::Unknown
        );
    }

    #[test]
    fn test_two_point_calibration() {
        let calibration =
            calibration_from_points(ImagePoint::new(0.0, 0.0), ImagePoint::new(30.0, 40.0), 10.0);
        assert!((calibration.row_spacing_mm - 0.2).abs() < 1e-12);
    }

    #[test]
    fn test_magnification_correction() {
        let calibration = Calibration::new(0.2, 0.4, CalibrationSource::ImagerPixelSpacing);
        let corrected = apply_magnification_correction(calibration, 2.0);
        assert_eq!(corrected.row_spacing_mm, 0.1);
        assert_eq!(corrected.col_spacing_mm, 0.2);
        assert_eq!(corrected.source, CalibrationSource::ImagerPixelSpacing);

        assert_eq!(apply_magnification_correction(calibration, 0.0), calibration);
        assert_eq!(apply_magnification_correction(calibration, -1.5), calibration);

        let uncalibrated = Calibration::uncalibrated();
        assert_eq!(apply_magnification_correction(uncalibrated, 2.0), uncalibrated);
    }

    #[test]
    fn test_magnification_factor() {
        assert_eq!(magnification_factor(1000.0, 800.0), Some(1.25));
        assert_eq!(magnification_factor(1000.0, 0.0), None);
    }

    #[test]
    fn test_anisotropic_length_and_area() {
        let calibration = Calibration::new(0.5, 0.25, CalibrationSource::PixelSpacing);
        let horizontal = calibration
            .length_mm(ImagePoint::new(0.0, 0.0), ImagePoint::new(100.0, 0.0))
            .unwrap();
        let vertical = calibration
            .length_mm(ImagePoint::new(0.0, 0.0), ImagePoint::new(0.0, 100.0))
            .unwrap();
        assert_eq!(horizontal, 25.0);
        assert_eq!(vertical, 50.0);
        assert_eq!(calibration.area_mm2(100.0), Some(12.5));
        assert!(!calibration.is_isotropic());

        let uncalibrated = Calibration::uncalibrated();
        assert_eq!(uncalibrated.area_mm2(100.0), None);
        assert_eq!(uncalibrated.mean_spacing_mm(), None);
    }

    #[test]
    fn test_new_rejects_invalid_spacing() {
        let calibration = Calibration::new(0.5, 0.0, CalibrationSource::PixelSpacing);
        assert_eq!(calibration, Calibration::uncalibrated());
    }
}
