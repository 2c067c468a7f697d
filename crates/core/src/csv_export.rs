//! CSV export for measurements and ROIs
//!
//! Rows are written with the `csv` crate, so fields containing the
//! delimiter, quotes or newlines are quoted per RFC 4180. Empty input
//! produces a header-only file.

use crate::annotation::ImagePoint;
use crate::error::ExportResult;
use crate::measurement::{MeasurementEntry, MeasurementResult};
use crate::roi::RoiEntry;
use serde::{Deserialize, Serialize};
use std::io::Write;

/// Configuration for CSV export
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CsvExportConfig {
    /// Include column headers in the output
    pub include_headers: bool,

    /// CSV delimiter character
    pub delimiter: u8,

    /// Include hidden items in export
    pub include_hidden: bool,

    /// Export only items from these images (None = all images)
    pub image_filter: Option<Vec<String>>,
}

impl Default for CsvExportConfig {
    fn default() -> Self {
        Self {
            include_headers: true,
            delimiter: b',',
            include_hidden: false,
            image_filter: None,
        }
    }
}

impl CsvExportConfig {
    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    pub fn with_hidden(mut self, include_hidden: bool) -> Self {
        self.include_hidden = include_hidden;
        self
    }

    pub fn with_image_filter(mut self, image_keys: Vec<String>) -> Self {
        self.image_filter = Some(image_keys);
        self
    }

    fn accepts(&self, image_key: &str, visible: bool) -> bool {
        if !self.include_hidden && !visible {
            return false;
        }
        match &self.image_filter {
            Some(keys) => keys.iter().any(|key| key == image_key),
            None => true,
        }
    }
}

pub const MEASUREMENT_HEADERS: [&str; 12] = [
    "ID",
    "Type",
    "Label",
    "Image Key",
    "Frame",
    "Value",
    "Unit",
    "Pixel Value",
    "Points",
    "Visible",
    "Locked",
    "Created At",
];

pub const ROI_HEADERS: [&str; 17] = [
    "ID",
    "Type",
    "Label",
    "Image Key",
    "Frame",
    "Area",
    "Area Unit",
    "Area Pixels",
    "Perimeter",
    "Perimeter Unit",
    "Mean",
    "Std Dev",
    "Min",
    "Max",
    "Visible",
    "Locked",
    "Created At",
];

/// Export measurements to CSV format
///
/// CSV columns:
/// - ID: Unique entry identifier
/// - Type: Tool name (Length, Angle, CobbAngle, ...)
/// - Label: User-provided label (if any)
/// - Image Key: Image the entry belongs to
/// - Frame: Frame number (0-based)
/// - Value: Primary value, in mm when calibrated (long axis for bidirectional)
/// - Unit: mm, px or deg; empty for markers and arrows
/// - Pixel Value: Primary value in pixels for distance tools
/// - Points: `(x,y)` pairs separated by `;`
/// - Visible / Locked: true/false
/// - Created At: Unix timestamp in milliseconds
pub fn export_measurements_csv<W: Write>(
    writer: W,
    entries: &[&MeasurementEntry],
    config: &CsvExportConfig,
) -> ExportResult<()> {
    let mut csv_writer = csv::WriterBuilder::new()
        .delimiter(config.delimiter)
        .has_headers(config.include_headers)
        .from_writer(writer);

    if config.include_headers {
        csv_writer.write_record(MEASUREMENT_HEADERS)?;
    }

    for entry in entries
        .iter()
        .filter(|e| config.accepts(e.image_key(), e.is_visible()))
    {
        let (value, unit, pixel_value) = measurement_value(entry);
        csv_writer.write_record(&[
            entry.id().to_string(),
            entry.tool_type().name().to_string(),
            entry.label().unwrap_or("").to_string(),
            entry.image_key().to_string(),
            entry.frame_number().to_string(),
            value,
            unit.to_string(),
            pixel_value,
            format_points(entry.points()),
            entry.is_visible().to_string(),
            entry.is_locked().to_string(),
            entry.created_at().to_string(),
        ])?;
    }

    csv_writer.flush()?;
    Ok(())
}

/// Export ROIs to CSV format
///
/// Area and perimeter are in mm²/mm when calibrated, pixels otherwise.
/// Intensity columns are empty when no pixels were sampled.
pub fn export_rois_csv<W: Write>(
    writer: W,
    entries: &[&RoiEntry],
    config: &CsvExportConfig,
) -> ExportResult<()> {
    let mut csv_writer = csv::WriterBuilder::new()
        .delimiter(config.delimiter)
        .has_headers(config.include_headers)
        .from_writer(writer);

    if config.include_headers {
        csv_writer.write_record(ROI_HEADERS)?;
    }

    for entry in entries
        .iter()
        .filter(|e| config.accepts(e.image_key(), e.is_visible()))
    {
        let stats = entry.statistics();
        let (area, area_unit) = match stats.area_mm2 {
            Some(mm2) => (mm2, "mm2"),
            None => (stats.area_pixels, "px2"),
        };
        let (perimeter, perimeter_unit) = match stats.perimeter_mm {
            Some(mm) => (mm, "mm"),
            None => (stats.perimeter_pixels, "px"),
        };
        let intensity = |value: f64| {
            if stats.has_pixel_data() {
                format!("{:.2}", value)
            } else {
                String::new()
            }
        };

        csv_writer.write_record(&[
            entry.id().to_string(),
            entry.tool_type().name().to_string(),
            entry.label().unwrap_or("").to_string(),
            entry.image_key().to_string(),
            entry.frame_number().to_string(),
            format!("{:.2}", area),
            area_unit.to_string(),
            format!("{:.2}", stats.area_pixels),
            format!("{:.2}", perimeter),
            perimeter_unit.to_string(),
            intensity(stats.mean),
            intensity(stats.std_dev),
            intensity(stats.min),
            intensity(stats.max),
            entry.is_visible().to_string(),
            entry.is_locked().to_string(),
            entry.created_at().to_string(),
        ])?;
    }

    csv_writer.flush()?;
    Ok(())
}

/// Measurements as a CSV string
pub fn measurements_to_csv(
    entries: &[&MeasurementEntry],
    config: &CsvExportConfig,
) -> ExportResult<String> {
    let mut output = Vec::new();
    export_measurements_csv(&mut output, entries, config)?;
    Ok(String::from_utf8(output)?)
}

/// ROIs as a CSV string
pub fn rois_to_csv(entries: &[&RoiEntry], config: &CsvExportConfig) -> ExportResult<String> {
    let mut output = Vec::new();
    export_rois_csv(&mut output, entries, config)?;
    Ok(String::from_utf8(output)?)
}

/// Value, unit and pixel value columns for one measurement
fn measurement_value(entry: &MeasurementEntry) -> (String, &'static str, String) {
    match entry.result() {
        Some(MeasurementResult::Length { pixels, mm }) => match mm {
            Some(mm) => (format!("{:.2}", mm), "mm", format!("{:.2}", pixels)),
            None => (format!("{:.2}", pixels), "px", format!("{:.2}", pixels)),
        },
        Some(MeasurementResult::Angle { degrees })
        | Some(MeasurementResult::CobbAngle { degrees }) => {
            (format!("{:.2}", degrees), "deg", String::new())
        }
        Some(MeasurementResult::Bidirectional {
            long_axis_pixels,
            long_axis_mm,
            ..
        }) => match long_axis_mm {
            Some(mm) => (format!("{:.2}", mm), "mm", format!("{:.2}", long_axis_pixels)),
            None => (
                format!("{:.2}", long_axis_pixels),
                "px",
                format!("{:.2}", long_axis_pixels),
            ),
        },
        None => (String::new(), "", String::new()),
    }
}

fn format_points(points: &[ImagePoint]) -> String {
    points
        .iter()
        .map(|p| format!("({:.2},{:.2})", p.x, p.y))
        .collect::<Vec<_>>()
        .join(";")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::{Calibration, CalibrationSource};
    use crate::measurement::ToolType;
    use crate::roi::PixelBuffer;

    fn length(label: &str) -> MeasurementEntry {
        MeasurementEntry::new(
            ToolType::Length,
            vec![ImagePoint::new(0.0, 0.0), ImagePoint::new(100.0, 0.0)],
            "1.2.3",
            0,
            Calibration::isotropic(0.5, CalibrationSource::PixelSpacing),
        )
        .unwrap()
        .with_label(label)
    }

    #[test]
    fn test_export_measurements_csv() {
        let entry = length("renal");
        let csv_content = measurements_to_csv(&[&entry], &CsvExportConfig::default()).unwrap();

        let mut lines = csv_content.lines();
        assert_eq!(lines.next(), Some(MEASUREMENT_HEADERS.join(",").as_str()));
        let row = lines.next().unwrap();
        assert!(row.contains(",Length,renal,1.2.3,0,50.00,mm,100.00,"));
        assert!(row.contains("\"(0.00,0.00);(100.00,0.00)\""));
        assert!(lines.next().is_none());
    }

    #[test]
    fn test_label_with_comma_is_quoted() {
        let entry = length("a, b");
        let csv_content = measurements_to_csv(&[&entry], &CsvExportConfig::default()).unwrap();
        assert!(csv_content.contains(",\"a, b\","));

        // Round-trips through a CSV reader with the comma intact
        let mut reader = csv::Reader::from_reader(csv_content.as_bytes());
        let record = reader.records().next().unwrap().unwrap();
        assert_eq!(&record[2], "a, b");
    }

    #[test]
    fn test_empty_input_is_header_only() {
        let csv_content = measurements_to_csv(&[], &CsvExportConfig::default()).unwrap();
        assert_eq!(csv_content, format!("{}\n", MEASUREMENT_HEADERS.join(",")));

        let csv_content = rois_to_csv(&[], &CsvExportConfig::default()).unwrap();
        assert_eq!(csv_content.lines().count(), 1);
        assert!(csv_content.starts_with("ID,Type,Label,Image Key,Frame,Area,Area Unit"));
    }

    #[test]
    fn test_csv_without_headers() {
        let config = CsvExportConfig {
            include_headers: false,
            ..Default::default()
        };
        let csv_content = measurements_to_csv(&[], &config).unwrap();
        assert!(csv_content.is_empty());
    }

    #[test]
    fn test_csv_include_hidden() {
        let visible = length("shown");
        let hidden = length("hidden").with_visible(false);
        let entries = [&visible, &hidden];

        let csv_content = measurements_to_csv(&entries, &CsvExportConfig::default()).unwrap();
        assert!(csv_content.contains("shown"));
        assert!(!csv_content.contains("hidden"));

        let config = CsvExportConfig::default().with_hidden(true);
        let csv_content = measurements_to_csv(&entries, &config).unwrap();
        assert!(csv_content.contains("hidden"));
    }

    #[test]
    fn test_csv_with_image_filter() {
        let first = length("first");
        let other = MeasurementEntry::new(
            ToolType::Marker,
            vec![ImagePoint::new(5.0, 5.0)],
            "9.9.9",
            1,
            Calibration::uncalibrated(),
        )
        .unwrap()
        .with_label("second");

        let config = CsvExportConfig::default().with_image_filter(vec!["9.9.9".into()]);
        let csv_content = measurements_to_csv(&[&first, &other], &config).unwrap();
        assert!(!csv_content.contains("first"));
        assert!(csv_content.contains(",Marker,second,9.9.9,1,,,,\"(5.00,5.00)\",true,false,"));
    }

    #[test]
    fn test_csv_custom_delimiter() {
        let entry = length("a, b");
        let config = CsvExportConfig::default().with_delimiter(b';');
        let csv_content = measurements_to_csv(&[&entry], &config).unwrap();
        assert!(csv_content.starts_with("ID;Type;Label"));
        // Commas no longer need quoting, semicolons do
        assert!(csv_content.contains(";a, b;"));
        assert!(csv_content.contains("\"(0.00,0.00);(100.00,0.00)\""));
    }

    #[test]
    fn test_uncalibrated_and_angle_values() {
        let raw = MeasurementEntry::new(
            ToolType::Length,
            vec![ImagePoint::new(0.0, 0.0), ImagePoint::new(3.0, 4.0)],
            "img",
            0,
            Calibration::uncalibrated(),
        )
        .unwrap();
        assert_eq!(
            measurement_value(&raw),
            ("5.00".to_string(), "px", "5.00".to_string())
        );

        let angle = MeasurementEntry::new(
            ToolType::Angle,
            vec![
                ImagePoint::new(10.0, 0.0),
                ImagePoint::new(0.0, 0.0),
                ImagePoint::new(10.0, 10.0),
            ],
            "img",
            0,
            Calibration::uncalibrated(),
        )
        .unwrap();
        assert_eq!(measurement_value(&angle), ("45.00".to_string(), "deg", String::new()));
    }

    #[test]
    fn test_export_rois_csv() {
        let roi = RoiEntry::new(
            ToolType::RectangularRoi,
            vec![ImagePoint::new(0.0, 0.0), ImagePoint::new(4.0, 4.0)],
            "img",
            0,
            Calibration::isotropic(0.5, CalibrationSource::PixelSpacing),
        )
        .unwrap();
        let csv_content = rois_to_csv(&[&roi], &CsvExportConfig::default()).unwrap();
        assert!(csv_content
            .contains(",RectangularROI,,img,0,4.00,mm2,16.00,8.00,mm,,,,,true,false,"));

        let pixels = PixelBuffer::from_fn(8, 8, |col, _| col as f64);
        let sampled = roi.recompute_statistics(&pixels);
        let csv_content = rois_to_csv(&[&sampled], &CsvExportConfig::default()).unwrap();
        assert!(csv_content.contains(",4.00,mm2,16.00,8.00,mm,1.50,1.12,0.00,3.00,true,false,"));
    }
}
