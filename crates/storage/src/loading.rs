//! Entity loading parameters and results

use ontomap_core::Descriptor;
use ontomap_core::Iri;
use ontomap_metamodel::{LoadStateDescriptor, ObjectInstance, TypeIndex};

/// Parameters of one entity load
#[derive(Debug, Clone)]
pub struct LoadingParameters {
    /// Individual to load
    pub identifier: Iri,
    /// Requested root entity type; the load may resolve a subtype
    pub type_index: TypeIndex,
    /// Context selection for the entity and its attributes
    pub descriptor: Descriptor,
    /// Skip the second-level cache for this load (refresh semantics)
    pub bypass_cache: bool,
}

impl LoadingParameters {
    /// Parameters for a cache-eligible load
    pub fn new(identifier: Iri, type_index: TypeIndex, descriptor: Descriptor) -> Self {
        Self {
            identifier,
            type_index,
            descriptor,
            bypass_cache: false,
        }
    }

    /// Mark this load as cache-bypassing
    pub fn bypassing_cache(mut self) -> Self {
        self.bypass_cache = true;
        self
    }
}

/// A materialized entity together with its load states
#[derive(Debug, Clone)]
pub struct LoadedEntity {
    /// The materialized instance; eager attributes are filled in
    pub instance: ObjectInstance,
    /// Which attributes the load actually fetched
    pub load_state: LoadStateDescriptor,
}
