//! Shared annotation value types
//!
//! Points, colors and styles used by every measurement and ROI record.
//! All coordinates are stored in image pixel space.

use serde::{Deserialize, Serialize};

/// Unique identifier for a measurement or ROI entry
///
/// Stable across undo/redo and identity-preserving copies.
/// Generated using UUID v4 for guaranteed uniqueness.
pub type EntryId = uuid::Uuid;

/// Key of the image an entry belongs to (the SOP Instance UID)
pub type ImageKey = String;

/// Coordinate in image pixel space
///
/// - Origin (0, 0) at the top-left corner of the image
/// - X increases to the right (columns)
/// - Y increases downward (rows)
/// - Units are pixels; fractional positions are allowed
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ImagePoint {
    pub x: f64,
    pub y: f64,
}

impl ImagePoint {
    /// Create a new image point
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Calculate distance to another point in pixels
    pub fn distance_to(&self, other: &ImagePoint) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }

    /// Whether both coordinates are finite
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

impl From<(f64, f64)> for ImagePoint {
    fn from((x, y): (f64, f64)) -> Self {
        Self { x, y }
    }
}

/// RGBA color representation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    /// Create a new color
    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// Create an opaque color
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    /// Hex string without alpha (e.g., #FF0000)
    pub fn to_hex(&self) -> String {
        format!("#{:02X}{:02X}{:02X}", self.r, self.g, self.b)
    }
}

/// Common overlay colors
impl Color {
    pub const RED: Color = Color::rgb(255, 0, 0);
    pub const GREEN: Color = Color::rgb(0, 255, 0);
    pub const YELLOW: Color = Color::rgb(255, 255, 0);
    pub const CYAN: Color = Color::rgb(0, 255, 255);
    pub const WHITE: Color = Color::rgb(255, 255, 255);
}

/// Visual styling for an overlay
///
/// Immutable like the rest of an entry. To change appearance, replace the
/// style through the store so the change is undoable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotationStyle {
    /// Stroke color for lines and outlines
    pub stroke_color: Color,

    /// Stroke width in screen points
    pub stroke_width: f64,

    /// Fill color for closed shapes (None for no fill)
    pub fill_color: Option<Color>,

    /// Opacity (0.0 = transparent, 1.0 = opaque)
    pub opacity: f64,

    /// Font size of the result label in screen points
    pub font_size: f64,

    /// Whether the result label is drawn next to the shape
    pub show_label: bool,
}

impl AnnotationStyle {
    /// Default measurement style (yellow stroke, labelled)
    pub fn new() -> Self {
        Self {
            stroke_color: Color::YELLOW,
            stroke_width: 1.5,
            fill_color: None,
            opacity: 1.0,
            font_size: 12.0,
            show_label: true,
        }
    }

    /// Default ROI style (cyan outline with a faint fill)
    pub fn roi() -> Self {
        Self {
            stroke_color: Color::CYAN,
            fill_color: Some(Color::new(0, 255, 255, 40)),
            ..Self::new()
        }
    }

    /// Copy of this style with another stroke color
    pub fn with_stroke_color(mut self, color: Color) -> Self {
        self.stroke_color = color;
        self
    }
}

impl Default for AnnotationStyle {
    fn default() -> Self {
        Self::new()
    }
}

/// Current time as a Unix timestamp in milliseconds
pub(crate) fn now_millis() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}
