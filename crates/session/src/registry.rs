//! Persistence context registries
//!
//! The clone registry is the identity map of a unit of work. Each managed
//! individual owns exactly one working copy handed to the application and
//! one pristine original snapshot kept for change calculation; reading the
//! same individual twice must yield the same working copy. The load state
//! registry tracks which attribute slots of each managed individual have
//! been fetched from storage.

use ontomap_core::{Descriptor, Iri};
use ontomap_metamodel::{LoadStateDescriptor, ObjectInstance};
use rustc_hash::FxHashMap;
use std::cell::RefCell;
use std::rc::Rc;

/// Working copy of a managed individual, shared with the application
///
/// Entities are reference-counted and interior-mutable; they are bound to
/// the thread of the unit of work that produced them.
pub type Entity = Rc<RefCell<ObjectInstance>>;

/// Lifecycle state of an object relative to one unit of work
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityState {
    /// Unknown to the unit of work
    NotManaged,
    /// Registered for persistence in this transaction, not yet in storage
    ManagedNew,
    /// Loaded from storage and tracked for changes
    Managed,
    /// Scheduled for removal at commit
    Removed,
}

/// Registry slot of one managed individual
#[derive(Debug)]
pub(crate) struct ManagedEntry {
    /// The working copy the application holds
    pub entity: Entity,
    /// Pristine snapshot for diffing; tracks staged state, never app edits
    pub original: ObjectInstance,
    /// Context selection the individual was registered under
    pub descriptor: Descriptor,
    /// Lifecycle state, never `NotManaged` while the entry exists
    pub state: EntityState,
}

/// Identity map of a unit of work
#[derive(Debug, Default)]
pub(crate) struct CloneRegistry {
    entries: FxHashMap<Iri, ManagedEntry>,
}

impl CloneRegistry {
    pub fn insert(&mut self, identifier: Iri, entry: ManagedEntry) {
        self.entries.insert(identifier, entry);
    }

    pub fn get(&self, identifier: &Iri) -> Option<&ManagedEntry> {
        self.entries.get(identifier)
    }

    pub fn get_mut(&mut self, identifier: &Iri) -> Option<&mut ManagedEntry> {
        self.entries.get_mut(identifier)
    }

    pub fn remove(&mut self, identifier: &Iri) -> Option<ManagedEntry> {
        self.entries.remove(identifier)
    }

    pub fn contains(&self, identifier: &Iri) -> bool {
        self.entries.contains_key(identifier)
    }

    /// True when `entity` is the working copy registered for `identifier`
    ///
    /// A detached instance that merely shares the identifier is not managed.
    pub fn is_managed_clone(&self, identifier: &Iri, entity: &Entity) -> bool {
        self.entries
            .get(identifier)
            .is_some_and(|entry| Rc::ptr_eq(&entry.entity, entity))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Iri, &ManagedEntry)> {
        self.entries.iter()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Load states of all managed individuals, keyed like the clone registry
#[derive(Debug, Default)]
pub(crate) struct LoadStateRegistry {
    states: FxHashMap<Iri, LoadStateDescriptor>,
}

impl LoadStateRegistry {
    pub fn insert(&mut self, identifier: Iri, state: LoadStateDescriptor) {
        self.states.insert(identifier, state);
    }

    pub fn get(&self, identifier: &Iri) -> Option<&LoadStateDescriptor> {
        self.states.get(identifier)
    }

    pub fn get_mut(&mut self, identifier: &Iri) -> Option<&mut LoadStateDescriptor> {
        self.states.get_mut(identifier)
    }

    pub fn remove(&mut self, identifier: &Iri) {
        self.states.remove(identifier);
    }

    pub fn clear(&mut self) {
        self.states.clear();
    }
}
