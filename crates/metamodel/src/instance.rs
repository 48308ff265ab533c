//! Dynamic entity instances
//!
//! An [`ObjectInstance`] is the record the session layer manipulates: an
//! optional identifier, the resolved entity type, the additional asserted
//! class IRIs, and one value slot per attribute of the type. Slots are
//! written through the type's accessor table, never directly.

use crate::entity_type::TypeIndex;
use ontomap_core::{Iri, Value};
use rustc_hash::FxHashSet;

/// One entity instance
///
/// `types` holds asserted class IRIs beyond the entity type's own class;
/// the type's class is implied by `type_index` and never stored here.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectInstance {
    /// Individual identifier, `None` until assigned or generated
    pub identifier: Option<Iri>,
    /// Resolved entity type
    pub type_index: TypeIndex,
    /// Additional asserted class IRIs
    pub types: FxHashSet<Iri>,
    pub(crate) attributes: Vec<Option<Value>>,
}

impl ObjectInstance {
    /// Create an instance with all slots unset
    pub fn new(type_index: TypeIndex, slot_count: usize) -> Self {
        Self {
            identifier: None,
            type_index,
            types: FxHashSet::default(),
            attributes: vec![None; slot_count],
        }
    }

    /// Create an instance with an identifier and all slots unset
    pub fn with_identifier(type_index: TypeIndex, slot_count: usize, identifier: Iri) -> Self {
        let mut instance = Self::new(type_index, slot_count);
        instance.identifier = Some(identifier);
        instance
    }

    /// Number of attribute slots
    pub fn slot_count(&self) -> usize {
        self.attributes.len()
    }

    /// Read a slot by raw position
    pub fn slot(&self, index: usize) -> Option<&Value> {
        self.attributes.get(index).and_then(|slot| slot.as_ref())
    }

    /// The identifier, when assigned
    pub fn identifier(&self) -> Option<&Iri> {
        self.identifier.as_ref()
    }
}
