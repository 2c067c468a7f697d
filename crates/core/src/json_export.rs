//! Flat JSON dictionaries for measurements and ROIs
//!
//! Each record becomes one object with camelCase keys. Points are flattened
//! to `point0_x`, `point0_y`, ...; derived values that need a calibration
//! (`lengthMM`, `areaMM2`, ...) are omitted when the image is uncalibrated.

use crate::annotation::{AnnotationStyle, ImagePoint};
use crate::calibration::Calibration;
use crate::error::ExportResult;
use crate::measurement::{MeasurementEntry, MeasurementResult, ToolType};
use crate::roi::RoiEntry;
use serde_json::{json, Map, Value};
use std::io::Write;

/// Fields shared by measurements and ROIs
#[allow(clippy::too_many_arguments)]
fn base_fields(
    id: String,
    tool_type: ToolType,
    label: Option<&str>,
    image_key: &str,
    frame_number: u32,
    visible: bool,
    locked: bool,
    created_at: i64,
    calibration: &Calibration,
    style: &AnnotationStyle,
    points: &[ImagePoint],
) -> Map<String, Value> {
    let mut dict = Map::new();
    dict.insert("id".into(), json!(id));
    dict.insert("type".into(), json!(tool_type.name()));
    dict.insert("label".into(), json!(label));
    dict.insert("imageKey".into(), json!(image_key));
    dict.insert("frameNumber".into(), json!(frame_number));
    dict.insert("isVisible".into(), json!(visible));
    dict.insert("isLocked".into(), json!(locked));
    dict.insert("createdAt".into(), json!(created_at));
    dict.insert("calibrationSource".into(), json!(calibration.source.name()));
    dict.insert("strokeColor".into(), json!(style.stroke_color.to_hex()));
    dict.insert("pointCount".into(), json!(points.len()));
    for (i, point) in points.iter().enumerate() {
        dict.insert(format!("point{i}_x"), json!(point.x));
        dict.insert(format!("point{i}_y"), json!(point.y));
    }
    dict
}

fn insert_optional(dict: &mut Map<String, Value>, key: &str, value: Option<f64>) {
    if let Some(value) = value {
        dict.insert(key.into(), json!(value));
    }
}

/// Flatten one measurement
pub fn measurement_to_dict(entry: &MeasurementEntry) -> Map<String, Value> {
    let mut dict = base_fields(
        entry.id().to_string(),
        entry.tool_type(),
        entry.label(),
        entry.image_key(),
        entry.frame_number(),
        entry.is_visible(),
        entry.is_locked(),
        entry.created_at(),
        entry.calibration(),
        entry.style(),
        entry.points(),
    );

    match entry.result() {
        Some(MeasurementResult::Length { pixels, mm }) => {
            dict.insert("lengthPixels".into(), json!(pixels));
            insert_optional(&mut dict, "lengthMM", mm);
        }
        Some(MeasurementResult::Angle { degrees }) => {
            dict.insert("angleDegrees".into(), json!(degrees));
        }
        Some(MeasurementResult::CobbAngle { degrees }) => {
            dict.insert("cobbAngleDegrees".into(), json!(degrees));
        }
        Some(MeasurementResult::Bidirectional {
            long_axis_pixels,
            short_axis_pixels,
            long_axis_mm,
            short_axis_mm,
            axes_angle,
        }) => {
            dict.insert("longAxisPixels".into(), json!(long_axis_pixels));
            dict.insert("shortAxisPixels".into(), json!(short_axis_pixels));
            insert_optional(&mut dict, "longAxisMM", long_axis_mm);
            insert_optional(&mut dict, "shortAxisMM", short_axis_mm);
            dict.insert("axesAngleDegrees".into(), json!(axes_angle));
        }
        None => {}
    }
    dict
}

/// Flatten one ROI
pub fn roi_to_dict(entry: &RoiEntry) -> Map<String, Value> {
    let mut dict = base_fields(
        entry.id().to_string(),
        entry.tool_type(),
        entry.label(),
        entry.image_key(),
        entry.frame_number(),
        entry.is_visible(),
        entry.is_locked(),
        entry.created_at(),
        entry.calibration(),
        entry.style(),
        entry.points(),
    );

    let stats = entry.statistics();
    dict.insert("areaPixels".into(), json!(stats.area_pixels));
    insert_optional(&mut dict, "areaMM2", stats.area_mm2);
    dict.insert("perimeterPixels".into(), json!(stats.perimeter_pixels));
    insert_optional(&mut dict, "perimeterMM", stats.perimeter_mm);
    dict.insert("mean".into(), json!(stats.mean));
    dict.insert("stdDev".into(), json!(stats.std_dev));
    dict.insert("min".into(), json!(stats.min));
    dict.insert("max".into(), json!(stats.max));
    dict.insert("pixelCount".into(), json!(stats.pixel_count));
    dict
}

/// JSON array of measurement dictionaries (`[]` for no entries)
pub fn measurements_to_json(entries: &[&MeasurementEntry]) -> Value {
    Value::Array(
        entries
            .iter()
            .map(|entry| Value::Object(measurement_to_dict(entry)))
            .collect(),
    )
}

/// JSON array of ROI dictionaries (`[]` for no entries)
pub fn rois_to_json(entries: &[&RoiEntry]) -> Value {
    Value::Array(
        entries
            .iter()
            .map(|entry| Value::Object(roi_to_dict(entry)))
            .collect(),
    )
}

pub fn measurements_to_json_string(entries: &[&MeasurementEntry]) -> ExportResult<String> {
    Ok(serde_json::to_string_pretty(&measurements_to_json(entries))?)
}

pub fn rois_to_json_string(entries: &[&RoiEntry]) -> ExportResult<String> {
    Ok(serde_json::to_string_pretty(&rois_to_json(entries))?)
}

/// Write pretty-printed measurement JSON to any writer
pub fn export_measurements_json<W: Write>(
    writer: W,
    entries: &[&MeasurementEntry],
) -> ExportResult<()> {
    serde_json::to_writer_pretty(writer, &measurements_to_json(entries))?;
    Ok(())
}

/// Write pretty-printed ROI JSON to any writer
pub fn export_rois_json<W: Write>(writer: W, entries: &[&RoiEntry]) -> ExportResult<()> {
    serde_json::to_writer_pretty(writer, &rois_to_json(entries))?;
    Ok(())
}
