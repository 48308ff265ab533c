//! Error types for the object-ontological mapping layer
//!
//! This module defines all error types used throughout the system.
//! We use `thiserror` for automatic `Display` and `Error` trait implementations.
//!
//! Every failure path surfaces one of these variants; nothing is swallowed
//! and no operation retries internally.

use thiserror::Error;

/// Result type alias for mapping-layer operations
pub type Result<T> = std::result::Result<T, OntomapError>;

/// Error types for the object-ontological mapping layer
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum OntomapError {
    /// An individual is already registered under a conflicting identity
    /// (different type, context, or a second clone for the same key)
    #[error("Identity conflict for individual {identifier}: {detail}")]
    IdentityConflict {
        /// Identifier of the conflicting individual
        identifier: String,
        /// What clashed
        detail: String,
    },

    /// Operation invoked on a session or proxy in the wrong lifecycle state
    #[error("Illegal state: {0}")]
    IllegalState(String),

    /// Mutation attempted through a read-only session
    #[error("Operation {operation} is not supported by a read-only session")]
    UnsupportedOperation {
        /// Name of the rejected operation
        operation: String,
    },

    /// Storage accessor failure (lookup, flush, commit, rollback)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Participation constraint violated by the pending change set
    #[error("Cardinality violation on attribute {attribute}: {detail}")]
    CardinalityViolation {
        /// Property IRI of the violated attribute
        attribute: String,
        /// Which bound was broken and how
        detail: String,
    },

    /// Value written to an attribute slot does not fit its declaration
    #[error("Invalid value for attribute {attribute}: {detail}")]
    InvalidValue {
        /// Property IRI of the attribute
        attribute: String,
        /// Shape or term-kind mismatch
        detail: String,
    },

    /// Entity type unknown to the metamodel
    #[error("Unknown entity type: {0}")]
    UnknownType(String),

    /// Attribute not declared by the entity type
    #[error("Type {type_name} has no attribute {attribute}")]
    UnknownAttribute {
        /// Entity type name
        type_name: String,
        /// Requested attribute name or property IRI
        attribute: String,
    },

    /// More than one most-specific entity type matches the individual's
    /// asserted types
    #[error(
        "Unable to determine unique entity type for individual {individual}; matching types are {candidates}"
    )]
    AmbiguousType {
        /// Identifier of the individual being loaded
        individual: String,
        /// Comma-separated list of the matching type IRIs
        candidates: String,
    },

    /// Write attempted against an inferred attribute
    #[error("Attribute {attribute} is inferred and cannot be modified")]
    InferredAttributeModified {
        /// Property IRI of the inferred attribute
        attribute: String,
    },

    /// Operation requires a managed entity but the argument is not managed
    /// by this session
    #[error("Entity is not managed by this persistence context: {0}")]
    EntityNotManaged(String),

    /// Configuration file or value error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl OntomapError {
    /// Shorthand for an [`OntomapError::IllegalState`]
    pub fn illegal_state(msg: impl Into<String>) -> Self {
        OntomapError::IllegalState(msg.into())
    }

    /// Shorthand for an [`OntomapError::UnsupportedOperation`]
    pub fn unsupported(operation: impl Into<String>) -> Self {
        OntomapError::UnsupportedOperation {
            operation: operation.into(),
        }
    }

    /// Shorthand for an [`OntomapError::Storage`]
    pub fn storage(msg: impl Into<String>) -> Self {
        OntomapError::Storage(msg.into())
    }
}
