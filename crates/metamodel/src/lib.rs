//! Entity metamodel for the object-ontological mapping layer
//!
//! This crate turns declarative entity type specs into an immutable,
//! shareable metamodel:
//! - EntityType / Attribute: built declarations with dense indices
//! - accessor tables: function-pointer dispatch for slot reads and writes
//! - ObjectInstance: the dynamic record sessions manipulate
//! - LoadState / LoadStateDescriptor: per-attribute fetch bookkeeping
//! - resolver: most-specific instantiable type for an individual

#![warn(missing_docs)]
#![warn(clippy::all)]

mod accessor;
pub mod attribute;
pub mod builder;
pub mod entity_type;
pub mod instance;
pub mod load_state;
pub mod resolver;

pub use attribute::{
    Attribute, AttributeIndex, AttributeKind, AttributeSpec, Cardinality, Cascade,
    ParticipationConstraint,
};
pub use builder::{Metamodel, MetamodelBuilder};
pub use entity_type::{EntityType, EntityTypeSpec, TypeIndex};
pub use instance::ObjectInstance;
pub use load_state::{LoadState, LoadStateDescriptor};
pub use resolver::resolve_entity_type;
