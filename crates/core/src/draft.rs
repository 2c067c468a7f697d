//! In-progress placement of a single annotation
//!
//! The interaction layer feeds clicked points into a [`ToolDraft`]. Fixed
//! arity tools complete as soon as the last point arrives; freehand and
//! polygonal ROIs complete when finalized. A completed draft turns into
//! exactly one [`PlacedAnnotation`].

use crate::annotation::{EntryId, ImageKey, ImagePoint};
use crate::calibration::Calibration;
use crate::measurement::{MeasurementEntry, ToolType, VARIABLE_ARITY_MIN_POINTS};
use crate::roi::{PixelSource, RoiEntry};
use crate::store::{MeasurementStore, RoiStore};

/// Placement progress reported after each point
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DraftStatus {
    /// More points (or a finalize) are needed
    Incomplete {
        placed: usize,
        required: Option<usize>,
    },
    /// The draft can be turned into a record
    Complete,
}

/// Record produced by a completed draft
#[derive(Debug, Clone, PartialEq)]
pub enum PlacedAnnotation {
    Measurement(MeasurementEntry),
    Roi(RoiEntry),
}

impl PlacedAnnotation {
    pub fn id(&self) -> EntryId {
        match self {
            PlacedAnnotation::Measurement(entry) => entry.id(),
            PlacedAnnotation::Roi(entry) => entry.id(),
        }
    }

    pub fn tool_type(&self) -> ToolType {
        match self {
            PlacedAnnotation::Measurement(entry) => entry.tool_type(),
            PlacedAnnotation::Roi(entry) => entry.tool_type(),
        }
    }

    /// Add the record to the matching store as a single undoable action
    ///
    /// Returns `None` if the store already holds an entry with this ID.
    pub fn commit(
        self,
        measurements: &mut MeasurementStore,
        rois: &mut RoiStore,
    ) -> Option<EntryId> {
        let id = self.id();
        let added = match self {
            PlacedAnnotation::Measurement(entry) => measurements.add(entry),
            PlacedAnnotation::Roi(entry) => rois.add(entry),
        };
        added.then_some(id)
    }
}

/// Points collected so far for one tool on one frame
#[derive(Debug, Clone, PartialEq)]
pub struct ToolDraft {
    tool_type: ToolType,
    image_key: ImageKey,
    frame_number: u32,
    calibration: Calibration,
    points: Vec<ImagePoint>,
    finalized: bool,
}

impl ToolDraft {
    pub fn new(
        tool_type: ToolType,
        image_key: impl Into<ImageKey>,
        frame_number: u32,
        calibration: Calibration,
    ) -> Self {
        Self {
            tool_type,
            image_key: image_key.into(),
            frame_number,
            calibration,
            points: Vec::new(),
            finalized: false,
        }
    }

    pub fn tool_type(&self) -> ToolType {
        self.tool_type
    }

    pub fn points(&self) -> &[ImagePoint] {
        &self.points
    }

    pub fn status(&self) -> DraftStatus {
        if self.is_complete() {
            DraftStatus::Complete
        } else {
            DraftStatus::Incomplete {
                placed: self.points.len(),
                required: self.tool_type.required_point_count(),
            }
        }
    }

    pub fn is_complete(&self) -> bool {
        match self.tool_type.required_point_count() {
            Some(required) => self.points.len() == required,
            None => self.finalized,
        }
    }

    /// Add a point
    ///
    /// Non-finite points and points past completion are ignored.
    pub fn push_point(&mut self, point: ImagePoint) -> DraftStatus {
        if point.is_finite() && !self.is_complete() {
            self.points.push(point);
        }
        self.status()
    }

    /// Remove the most recent point, reopening a finalized draft
    pub fn pop_point(&mut self) -> Option<ImagePoint> {
        self.finalized = false;
        self.points.pop()
    }

    /// Close a variable-arity shape
    ///
    /// Returns `false` for fixed-arity tools and for shapes with fewer than
    /// the minimum number of vertices.
    pub fn finalize(&mut self) -> bool {
        if self.tool_type.is_variable_arity() && self.points.len() >= VARIABLE_ARITY_MIN_POINTS {
            self.finalized = true;
        }
        self.finalized
    }

    /// Turn the draft into a record, or `None` if it is not complete
    ///
    /// ROI statistics include intensities when `pixels` is given.
    pub fn complete(self, pixels: Option<&dyn PixelSource>) -> Option<PlacedAnnotation> {
        if !self.is_complete() {
            return None;
        }
        if self.tool_type.is_roi() {
            let entry = RoiEntry::new(
                self.tool_type,
                self.points,
                self.image_key,
                self.frame_number,
                self.calibration,
            )?;
            let entry = match pixels {
                Some(pixels) => entry.recompute_statistics(pixels),
                None => entry,
            };
            Some(PlacedAnnotation::Roi(entry))
        } else {
            MeasurementEntry::new(
                self.tool_type,
                self.points,
                self.image_key,
                self.frame_number,
                self.calibration,
            )
            .map(PlacedAnnotation::Measurement)
        }
    }

    /// Abandon the draft without producing anything
    pub fn cancel(self) {}
}
