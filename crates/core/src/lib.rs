//! Core types for the object-ontological mapping layer
//!
//! This crate defines the foundational types used throughout the system:
//! - Iri: interned identifier for individuals, classes, properties, contexts
//! - Literal / Term / Value: attribute payloads
//! - Assertion / Axiom: the statements the storage accessor speaks in
//! - Descriptor: repository context selection for entities and attributes
//! - OntomapError / Result: error type hierarchy
//! - OntomapConfig: explicit configuration object (`ontomap.toml`)

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod axiom;
pub mod config;
pub mod descriptor;
pub mod error;
pub mod iri;
pub mod value;

// Re-export commonly used types at the crate root
pub use axiom::{Assertion, AssertionKind, Axiom};
pub use config::{
    CacheConfig, CacheKind, ChangeTrackingMode, OntomapConfig, SessionConfig, StorageConfig,
    CONFIG_FILE_NAME,
};
pub use descriptor::Descriptor;
pub use error::{OntomapError, Result};
pub use iri::{vocab, Iri};
pub use value::{Literal, Term, Value};
