//! DICOM Structured Reporting concepts and UCUM units per tool

use crate::measurement::{MeasurementEntry, MeasurementResult, ToolType};
use crate::roi::RoiEntry;
use serde::Serialize;

/// Coded concept (value, scheme, meaning) naming a measurement in an SR
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SrConcept {
    pub code_value: &'static str,
    pub coding_scheme_designator: &'static str,
    pub code_meaning: &'static str,
}

impl SrConcept {
    const fn sct(code_value: &'static str, code_meaning: &'static str) -> Self {
        Self {
            code_value,
            coding_scheme_designator: "SCT",
            code_meaning,
        }
    }

    const fn dcm(code_value: &'static str, code_meaning: &'static str) -> Self {
        Self {
            code_value,
            coding_scheme_designator: "DCM",
            code_meaning,
        }
    }
}

pub const LENGTH: SrConcept = SrConcept::sct("410668003", "Length");
pub const ANGLE: SrConcept = SrConcept::sct("1483009", "Angle");
pub const COBB_ANGLE: SrConcept = SrConcept::sct("285285000", "Cobb angle");
pub const LONG_AXIS: SrConcept = SrConcept::sct("103339001", "Long axis");
pub const SHORT_AXIS: SrConcept = SrConcept::sct("103340004", "Short axis");
pub const AREA: SrConcept = SrConcept::sct("42798000", "Area");
pub const PERIMETER: SrConcept = SrConcept::sct("131191004", "Perimeter");
pub const MEAN: SrConcept = SrConcept::sct("373098007", "Mean");
pub const STANDARD_DEVIATION: SrConcept = SrConcept::sct("386136009", "Standard deviation");
pub const MINIMUM: SrConcept = SrConcept::sct("255605001", "Minimum");
pub const MAXIMUM: SrConcept = SrConcept::sct("56851009", "Maximum");
pub const FINDING: SrConcept = SrConcept::dcm("121071", "Finding");

/// Concept reported for a tool's primary value
pub const fn sr_concept(tool_type: ToolType) -> SrConcept {
    match tool_type {
        ToolType::Length => LENGTH,
        ToolType::Angle => ANGLE,
        ToolType::CobbAngle => COBB_ANGLE,
        ToolType::Bidirectional => LONG_AXIS,
        ToolType::CircularRoi
        | ToolType::RectangularRoi
        | ToolType::EllipticalRoi
        | ToolType::FreehandRoi
        | ToolType::PolygonalRoi => AREA,
        ToolType::Marker | ToolType::ArrowAnnotation => FINDING,
    }
}

/// UCUM unit of a tool's primary value; empty for non-numeric annotations
pub const fn ucum_unit(tool_type: ToolType) -> &'static str {
    match tool_type {
        ToolType::Length | ToolType::Bidirectional => "mm",
        ToolType::Angle | ToolType::CobbAngle => "deg",
        ToolType::CircularRoi
        | ToolType::RectangularRoi
        | ToolType::EllipticalRoi
        | ToolType::FreehandRoi
        | ToolType::PolygonalRoi => "mm2",
        ToolType::Marker | ToolType::ArrowAnnotation => "",
    }
}

/// One numeric content item of an SR
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SrNumericItem {
    pub concept: SrConcept,
    pub value: f64,
    /// UCUM code, empty when the value has no calibrated unit
    pub unit: &'static str,
}

impl SrNumericItem {
    fn new(concept: SrConcept, value: f64, unit: &'static str) -> Self {
        Self {
            concept,
            value,
            unit,
        }
    }
}

/// Anything that can be reported as SR numeric content items
pub trait SrReportable {
    fn sr_numeric_items(&self) -> Vec<SrNumericItem>;
}

impl SrReportable for MeasurementEntry {
    /// Lengths are only reported when calibrated; angles always are
    fn sr_numeric_items(&self) -> Vec<SrNumericItem> {
        match self.result() {
            Some(MeasurementResult::Length { mm: Some(mm), .. }) => {
                vec![SrNumericItem::new(LENGTH, mm, "mm")]
            }
            Some(MeasurementResult::Angle { degrees }) => {
                vec![SrNumericItem::new(ANGLE, degrees, "deg")]
            }
            Some(MeasurementResult::CobbAngle { degrees }) => {
                vec![SrNumericItem::new(COBB_ANGLE, degrees, "deg")]
            }
            Some(MeasurementResult::Bidirectional {
                long_axis_mm: Some(long),
                short_axis_mm: Some(short),
                ..
            }) => vec![
                SrNumericItem::new(LONG_AXIS, long, "mm"),
                SrNumericItem::new(SHORT_AXIS, short, "mm"),
            ],
            _ => Vec::new(),
        }
    }
}

impl SrReportable for RoiEntry {
    /// Area and perimeter when calibrated, intensities when sampled
    fn sr_numeric_items(&self) -> Vec<SrNumericItem> {
        let stats = self.statistics();
        let mut items = Vec::new();
        if let Some(area) = stats.area_mm2 {
            items.push(SrNumericItem::new(AREA, area, "mm2"));
        }
        if let Some(perimeter) = stats.perimeter_mm {
            items.push(SrNumericItem::new(PERIMETER, perimeter, "mm"));
        }
        if stats.has_pixel_data() {
            items.push(SrNumericItem::new(MEAN, stats.mean, ""));
            items.push(SrNumericItem::new(STANDARD_DEVIATION, stats.std_dev, ""));
            items.push(SrNumericItem::new(MINIMUM, stats.min, ""));
            items.push(SrNumericItem::new(MAXIMUM, stats.max, ""));
        }
        items
    }
}

/// SR numeric content items for a measurement or ROI
pub fn sr_numeric_items(entry: &impl SrReportable) -> Vec<SrNumericItem> {
    entry.sr_numeric_items()
}
