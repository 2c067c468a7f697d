//! ClinMeasure Core Library
//!
//! Measurement and annotation engine for a diagnostic image viewer:
//! geometry, pixel-spacing calibration, measurement/ROI records, an
//! undoable annotation store and report exports (DICOM SR codes, JSON, CSV).

pub mod annotation;
pub mod calibration;
pub mod csv_export;
pub mod draft;
pub mod error;
pub mod geometry;
pub mod json_export;
pub mod measurement;
pub mod roi;
pub mod sr;
pub mod store;

pub use annotation::{AnnotationStyle, Color, EntryId, ImageKey, ImagePoint};
pub use calibration::{
    apply_magnification_correction, calibration_from_manual, calibration_from_points,
    magnification_factor, parse_pixel_spacing, resolve_calibration, Calibration, CalibrationSource,
};
pub use csv_export::{
    export_measurements_csv, export_rois_csv, measurements_to_csv, rois_to_csv, CsvExportConfig,
};
pub use draft::{DraftStatus, PlacedAnnotation, ToolDraft};
pub use error::{ExportError, ExportResult};
pub use json_export::{
    export_measurements_json, export_rois_json, measurement_to_dict, measurements_to_json,
    measurements_to_json_string, roi_to_dict, rois_to_json, rois_to_json_string,
};
pub use measurement::{
    measure_length, LengthMeasurement, MeasurementEntry, MeasurementResult, ToolType,
    VARIABLE_ARITY_MIN_POINTS,
};
pub use roi::{
    compute_roi_statistics, roi_shape_metrics, PixelBuffer, PixelSource, RoiEntry, RoiShape,
    RoiStatistics,
};
pub use sr::{sr_concept, sr_numeric_items, ucum_unit, SrConcept, SrNumericItem, SrReportable};
pub use store::{
    AnnotationStore, MeasurementAction, MeasurementStore, Record, RoiStore, StoreConfig,
};
