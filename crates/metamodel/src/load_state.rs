//! Attribute load states
//!
//! Lazy loading needs to distinguish "never fetched" from "fetched and
//! absent". Each managed entity carries a [`LoadStateDescriptor`] parallel
//! to its attribute table; triggering a load flips the slot to `Loaded`
//! exactly once, which is what makes repeated triggers free.

use crate::attribute::AttributeIndex;

/// Load state of one attribute or of the instance itself
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoadState {
    /// Nothing is known; treated conservatively as not loaded
    #[default]
    Unknown,
    /// The value has not been fetched yet
    NotLoaded,
    /// The value is present in memory (possibly absent in storage)
    Loaded,
}

/// Per-entity load-state vector
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadStateDescriptor {
    /// State of the instance itself (identifier and types)
    pub instance: LoadState,
    attributes: Vec<LoadState>,
}

impl LoadStateDescriptor {
    /// Descriptor for a fully loaded instance; lazy slots stay not-loaded
    pub fn loaded(slot_count: usize) -> Self {
        Self {
            instance: LoadState::Loaded,
            attributes: vec![LoadState::Loaded; slot_count],
        }
    }

    /// Descriptor for a reference shell: nothing fetched yet
    pub fn not_loaded(slot_count: usize) -> Self {
        Self {
            instance: LoadState::NotLoaded,
            attributes: vec![LoadState::NotLoaded; slot_count],
        }
    }

    /// State of one attribute slot
    pub fn attribute_state(&self, index: AttributeIndex) -> LoadState {
        self.attributes
            .get(index.as_usize())
            .copied()
            .unwrap_or(LoadState::Unknown)
    }

    /// Record the state of one attribute slot
    pub fn set_attribute_state(&mut self, index: AttributeIndex, state: LoadState) {
        if let Some(slot) = self.attributes.get_mut(index.as_usize()) {
            *slot = state;
        }
    }

    /// True when the slot holds a fetched value
    pub fn is_loaded(&self, index: AttributeIndex) -> bool {
        self.attribute_state(index) == LoadState::Loaded
    }

    /// Mark every slot and the instance loaded
    pub fn mark_all_loaded(&mut self) {
        self.instance = LoadState::Loaded;
        for slot in &mut self.attributes {
            *slot = LoadState::Loaded;
        }
    }
}
