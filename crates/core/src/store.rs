//! Annotation store with bounded undo/redo history
//!
//! Entries are partitioned by `(image key, frame number)`. Every successful
//! add, remove or update is recorded as a [`MeasurementAction`]; undo applies
//! the inverse of the latest action and redo re-applies it. The action log
//! is the only way to mutate the collection.
//!
//! The store is not synchronized. Keep it on one thread (usually the UI
//! thread) or wrap it in a mutex.

use crate::annotation::{AnnotationStyle, EntryId, ImageKey};
use crate::calibration::Calibration;
use crate::measurement::MeasurementEntry;
use crate::roi::{RoiEntry, RoiStatistics};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

/// An entry that can live in an [`AnnotationStore`]
pub trait Record: Clone + PartialEq {
    fn id(&self) -> EntryId;
    fn image_key(&self) -> &str;
    fn frame_number(&self) -> u32;
    fn is_visible(&self) -> bool;

    fn with_visible(&self, visible: bool) -> Self;
    fn with_locked(&self, locked: bool) -> Self;
    fn with_label(&self, label: String) -> Self;
    fn with_style(&self, style: AnnotationStyle) -> Self;
    fn with_calibration(&self, calibration: Calibration) -> Self;
}

impl Record for MeasurementEntry {
    fn id(&self) -> EntryId {
        MeasurementEntry::id(self)
    }

    fn image_key(&self) -> &str {
        MeasurementEntry::image_key(self)
    }

    fn frame_number(&self) -> u32 {
        MeasurementEntry::frame_number(self)
    }

    fn is_visible(&self) -> bool {
        MeasurementEntry::is_visible(self)
    }

    fn with_visible(&self, visible: bool) -> Self {
        MeasurementEntry::with_visible(self, visible)
    }

    fn with_locked(&self, locked: bool) -> Self {
        MeasurementEntry::with_locked(self, locked)
    }

    fn with_label(&self, label: String) -> Self {
        MeasurementEntry::with_label(self, label)
    }

    fn with_style(&self, style: AnnotationStyle) -> Self {
        MeasurementEntry::with_style(self, style)
    }

    fn with_calibration(&self, calibration: Calibration) -> Self {
        MeasurementEntry::with_calibration(self, calibration)
    }
}

impl Record for RoiEntry {
    fn id(&self) -> EntryId {
        RoiEntry::id(self)
    }

    fn image_key(&self) -> &str {
        RoiEntry::image_key(self)
    }

    fn frame_number(&self) -> u32 {
        RoiEntry::frame_number(self)
    }

    fn is_visible(&self) -> bool {
        RoiEntry::is_visible(self)
    }

    fn with_visible(&self, visible: bool) -> Self {
        RoiEntry::with_visible(self, visible)
    }

    fn with_locked(&self, locked: bool) -> Self {
        RoiEntry::with_locked(self, locked)
    }

    fn with_label(&self, label: String) -> Self {
        RoiEntry::with_label(self, label)
    }

    fn with_style(&self, style: AnnotationStyle) -> Self {
        RoiEntry::with_style(self, style)
    }

    fn with_calibration(&self, calibration: Calibration) -> Self {
        RoiEntry::with_calibration(self, calibration)
    }
}

/// One undoable change to the store
#[derive(Debug, Clone, PartialEq)]
pub enum MeasurementAction<T> {
    Add(T),
    Remove(T),
    Update { old: T, new: T },
}

impl<T: Record> MeasurementAction<T> {
    /// ID of the entry the action touches
    pub fn entry_id(&self) -> EntryId {
        match self {
            MeasurementAction::Add(entry) | MeasurementAction::Remove(entry) => entry.id(),
            MeasurementAction::Update { new, .. } => new.id(),
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            MeasurementAction::Add(_) => "add",
            MeasurementAction::Remove(_) => "remove",
            MeasurementAction::Update { .. } => "update",
        }
    }
}

/// Configuration for an annotation store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Maximum number of actions kept for undo; older ones are dropped
    pub max_undo_history: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            max_undo_history: 100,
        }
    }
}

impl StoreConfig {
    /// Sets the undo history bound.
    pub fn with_max_undo_history(mut self, max_undo_history: usize) -> Self {
        self.max_undo_history = max_undo_history;
        self
    }
}

type PartitionKey = (ImageKey, u32);

fn partition_of<T: Record>(entry: &T) -> PartitionKey {
    (entry.image_key().to_string(), entry.frame_number())
}

/// Collection of entries for all open images, plus the edit history
#[derive(Debug)]
pub struct AnnotationStore<T> {
    config: StoreConfig,
    /// All entries indexed by ID
    entries: HashMap<EntryId, T>,
    /// Entry IDs per (image, frame), in insertion order
    by_partition: HashMap<PartitionKey, Vec<EntryId>>,
    /// First-insertion sequence number per ID still present or in history
    order: HashMap<EntryId, u64>,
    next_order: u64,
    undo_stack: Vec<MeasurementAction<T>>,
    redo_stack: Vec<MeasurementAction<T>>,
}

/// Store of length/angle/marker style measurements
pub type MeasurementStore = AnnotationStore<MeasurementEntry>;

/// Store of regions of interest
pub type RoiStore = AnnotationStore<RoiEntry>;

impl<T: Record> Default for AnnotationStore<T> {
    fn default() -> Self {
        Self::new(StoreConfig::default())
    }
}

impl<T: Record> AnnotationStore<T> {
    /// Create an empty store
    pub fn new(config: StoreConfig) -> Self {
        Self {
            config,
            entries: HashMap::new(),
            by_partition: HashMap::new(),
            order: HashMap::new(),
            next_order: 0,
            undo_stack: Vec::new(),
            redo_stack: Vec::new(),
        }
    }

    /// Rebuild a store from persisted entries, with empty history
    pub fn from_entries(config: StoreConfig, entries: impl IntoIterator<Item = T>) -> Self {
        let mut store = Self::new(config);
        for entry in entries {
            if !store.entries.contains_key(&entry.id()) {
                store.insert(entry);
            }
        }
        store
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    // ---- raw collection edits (history is handled by the callers) ----

    fn insert(&mut self, entry: T) {
        let id = entry.id();
        let next_order = &mut self.next_order;
        let rank = *self.order.entry(id).or_insert_with(|| {
            let rank = *next_order;
            *next_order += 1;
            rank
        });

        let ids = self.by_partition.entry(partition_of(&entry)).or_default();
        let position = ids
            .iter()
            .position(|other| self.order.get(other).is_some_and(|&r| r > rank))
            .unwrap_or(ids.len());
        ids.insert(position, id);
        self.entries.insert(id, entry);
    }

    fn take(&mut self, id: EntryId) -> Option<T> {
        let entry = self.entries.remove(&id)?;
        let key = partition_of(&entry);
        if let Some(ids) = self.by_partition.get_mut(&key) {
            ids.retain(|&other| other != id);
            if ids.is_empty() {
                self.by_partition.remove(&key);
            }
        }
        Some(entry)
    }

    fn replace(&mut self, entry: T) -> Option<T> {
        let old = self.take(entry.id())?;
        self.insert(entry);
        Some(old)
    }

    fn record(&mut self, action: MeasurementAction<T>) {
        debug!(action = action.kind(), id = %action.entry_id(), "recorded edit");
        self.undo_stack.push(action);
        self.discard_redo();
        self.trim_undo();
    }

    fn discard_redo(&mut self) {
        if !self.redo_stack.is_empty() {
            self.redo_stack.clear();
            self.prune_order();
        }
    }

    fn trim_undo(&mut self) {
        let max = self.config.max_undo_history;
        if self.undo_stack.len() > max {
            let excess = self.undo_stack.len() - max;
            self.undo_stack.drain(..excess);
            debug!(dropped = excess, max, "undo history full, dropped oldest actions");
            self.prune_order();
        }
    }

    /// Forget ranks of ids that are neither stored nor reachable by undo/redo
    fn prune_order(&mut self) {
        let referenced: HashSet<EntryId> = self
            .undo_stack
            .iter()
            .chain(self.redo_stack.iter())
            .map(MeasurementAction::entry_id)
            .collect();
        let entries = &self.entries;
        self.order
            .retain(|id, _| entries.contains_key(id) || referenced.contains(id));
    }

    // ---- undoable operations ----

    /// Add a new entry
    ///
    /// Returns `false` (and records nothing) if an entry with the same ID is
    /// already present.
    pub fn add(&mut self, entry: T) -> bool {
        if self.entries.contains_key(&entry.id()) {
            debug!(id = %entry.id(), "add ignored, id already present");
            return false;
        }
        self.insert(entry.clone());
        self.record(MeasurementAction::Add(entry));
        true
    }

    /// Remove an entry by ID, returning it
    pub fn remove(&mut self, id: EntryId) -> Option<T> {
        let Some(entry) = self.take(id) else {
            warn!(%id, "remove ignored, unknown id");
            return None;
        };
        self.record(MeasurementAction::Remove(entry.clone()));
        Some(entry)
    }

    /// Replace the entry with the same ID, returning the previous version
    ///
    /// Returns `None` if the ID is unknown. Replacing an entry with an
    /// identical copy returns the old version without recording an action,
    /// but still counts as a fresh edit and discards the redo history.
    pub fn update(&mut self, entry: T) -> Option<T> {
        let id = entry.id();
        let Some(current) = self.entries.get(&id) else {
            warn!(%id, "update ignored, unknown id");
            return None;
        };
        if *current == entry {
            let unchanged = current.clone();
            self.discard_redo();
            return Some(unchanged);
        }
        let old = self.replace(entry.clone())?;
        self.record(MeasurementAction::Update {
            old: old.clone(),
            new: entry,
        });
        Some(old)
    }

    /// Show or hide an entry
    pub fn set_visible(&mut self, id: EntryId, visible: bool) -> Option<T> {
        let updated = self.entries.get(&id)?.with_visible(visible);
        self.update(updated)
    }

    /// Lock or unlock an entry
    pub fn set_locked(&mut self, id: EntryId, locked: bool) -> Option<T> {
        let updated = self.entries.get(&id)?.with_locked(locked);
        self.update(updated)
    }

    /// Relabel an entry (an empty label clears it)
    pub fn set_label(&mut self, id: EntryId, label: impl Into<String>) -> Option<T> {
        let updated = self.entries.get(&id)?.with_label(label.into());
        self.update(updated)
    }

    /// Restyle an entry
    pub fn set_style(&mut self, id: EntryId, style: AnnotationStyle) -> Option<T> {
        let updated = self.entries.get(&id)?.with_style(style);
        self.update(updated)
    }

    /// Apply a new calibration to every entry of an image
    ///
    /// Each changed entry is recorded as its own update. Returns the number
    /// of entries that changed.
    pub fn recalibrate_image(&mut self, image_key: &str, calibration: Calibration) -> usize {
        let changed: Vec<T> = self
            .all_for_image(image_key)
            .into_iter()
            .filter_map(|entry| {
                let updated = entry.with_calibration(calibration);
                (updated != *entry).then_some(updated)
            })
            .collect();
        changed
            .into_iter()
            .filter_map(|entry| self.update(entry))
            .count()
    }

    /// Remove every entry of an image, one undoable action per entry
    pub fn remove_all_for_image(&mut self, image_key: &str) -> Vec<T> {
        let ids: Vec<EntryId> = self.all_for_image(image_key).iter().map(|e| e.id()).collect();
        ids.into_iter().filter_map(|id| self.remove(id)).collect()
    }

    // ---- history ----

    /// Revert the latest action; `false` if there is nothing to undo
    pub fn undo(&mut self) -> bool {
        let Some(action) = self.undo_stack.pop() else {
            return false;
        };
        match &action {
            MeasurementAction::Add(entry) => {
                self.take(entry.id());
            }
            MeasurementAction::Remove(entry) => self.insert(entry.clone()),
            MeasurementAction::Update { old, .. } => {
                self.replace(old.clone());
            }
        }
        debug!(action = action.kind(), id = %action.entry_id(), "undo");
        self.redo_stack.push(action);
        true
    }

    /// Re-apply the latest undone action; `false` if there is nothing to redo
    pub fn redo(&mut self) -> bool {
        let Some(action) = self.redo_stack.pop() else {
            return false;
        };
        match &action {
            MeasurementAction::Add(entry) => self.insert(entry.clone()),
            MeasurementAction::Remove(entry) => {
                self.take(entry.id());
            }
            MeasurementAction::Update { new, .. } => {
                self.replace(new.clone());
            }
        }
        debug!(action = action.kind(), id = %action.entry_id(), "redo");
        self.undo_stack.push(action);
        self.trim_undo();
        true
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    /// Number of actions available to undo
    pub fn undo_depth(&self) -> usize {
        self.undo_stack.len()
    }

    /// Number of actions available to redo
    pub fn redo_depth(&self) -> usize {
        self.redo_stack.len()
    }

    /// Pending undo actions, oldest first
    pub fn undo_actions(&self) -> &[MeasurementAction<T>] {
        &self.undo_stack
    }

    /// Forget the history without touching the entries
    pub fn clear_history(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
        self.prune_order();
    }

    /// Drop every entry and the history
    pub fn clear_all(&mut self) {
        self.entries.clear();
        self.by_partition.clear();
        self.order.clear();
        self.next_order = 0;
        self.clear_history();
    }

    // ---- queries ----

    /// Get an entry by ID
    pub fn get(&self, id: EntryId) -> Option<&T> {
        self.entries.get(&id)
    }

    pub fn contains(&self, id: EntryId) -> bool {
        self.entries.contains_key(&id)
    }

    /// Number of entries across all images
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn sorted<'a>(&'a self, ids: impl Iterator<Item = &'a EntryId>) -> Vec<&'a T> {
        let mut entries: Vec<(u64, &T)> = ids
            .filter_map(|id| {
                let entry = self.entries.get(id)?;
                Some((self.order.get(id).copied().unwrap_or(u64::MAX), entry))
            })
            .collect();
        entries.sort_by_key(|(rank, _)| *rank);
        entries.into_iter().map(|(_, entry)| entry).collect()
    }

    /// Every entry, in insertion order
    pub fn all(&self) -> Vec<&T> {
        self.sorted(self.entries.keys())
    }

    /// Every entry of an image across all frames, in insertion order
    pub fn all_for_image(&self, image_key: &str) -> Vec<&T> {
        let ids = self
            .by_partition
            .iter()
            .filter(|((key, _), _)| key == image_key)
            .flat_map(|(_, ids)| ids.iter());
        self.sorted(ids)
    }

    /// Entries of one frame of an image, hidden ones included
    pub fn for_image_and_frame(&self, image_key: &str, frame_number: u32) -> Vec<&T> {
        self.by_partition
            .get(&(image_key.to_string(), frame_number))
            .map(|ids| ids.iter().filter_map(|id| self.entries.get(id)).collect())
            .unwrap_or_default()
    }

    /// Visible entries of the displayed frame
    ///
    /// A frame the image does not have simply matches nothing.
    pub fn visible_for_image_and_frame(&self, image_key: &str, frame_number: u32) -> Vec<&T> {
        let mut entries = self.for_image_and_frame(image_key, frame_number);
        entries.retain(|entry| entry.is_visible());
        entries
    }

    /// Keys of every image with at least one entry, sorted
    pub fn image_keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.by_partition.keys().map(|(key, _)| key.as_str()).collect();
        keys.sort_unstable();
        keys.dedup();
        keys
    }

    /// Owned snapshot of every entry for the persistence layer
    pub fn entries(&self) -> Vec<T> {
        self.all().into_iter().cloned().collect()
    }
}

impl RoiStore {
    /// Replace the statistics snapshot of an ROI
    pub fn set_statistics(&mut self, id: EntryId, statistics: RoiStatistics) -> Option<RoiEntry> {
        let updated = self.entries.get(&id)?.with_statistics(statistics);
        self.update(updated)
    }
}
