//! Storage accessor traits
//!
//! A [`StorageAccessor`] owns the data and hands out transactional
//! [`StorageConnection`]s. Everything a session does against storage goes
//! through one connection: reads observe the connection's own uncommitted
//! writes, `commit` publishes them atomically, `rollback` discards them.

use crate::delta::{AxiomValueDescriptor, EntityDelta};
use crate::loading::{LoadedEntity, LoadingParameters};
use ontomap_core::{Descriptor, Iri, Result, Value};
use ontomap_metamodel::{Attribute, TypeIndex};
use rustc_hash::FxHashSet;

/// One transactional connection to the store
pub trait StorageConnection {
    /// Find and materialize an individual
    ///
    /// Resolves the most specific entity type from the individual's
    /// asserted classes, fills eager attributes, and leaves lazy ones
    /// not-loaded. Absence is `Ok(None)`, never an error.
    ///
    /// # Errors
    ///
    /// Returns an error on ambiguous type resolution or when stored values
    /// violate the attribute's declared cardinality.
    fn find(&self, params: &LoadingParameters) -> Result<Option<LoadedEntity>>;

    /// Fetch the value of a single attribute
    ///
    /// `Ok(None)` means the individual holds no statement for the
    /// attribute's assertion in the descriptor-selected context.
    fn load_field(
        &self,
        subject: &Iri,
        attribute: &Attribute,
        descriptor: &Descriptor,
    ) -> Result<Option<Value>>;

    /// Stage the axioms of a new individual
    fn persist(&mut self, descriptor: &AxiomValueDescriptor) -> Result<()>;

    /// Stage the delta of a modified individual
    fn update(&mut self, delta: &EntityDelta) -> Result<()>;

    /// Stage removal of an individual's statements in every context the
    /// descriptor addresses
    fn remove(&mut self, subject: &Iri, type_index: TypeIndex, descriptor: &Descriptor)
        -> Result<()>;

    /// True when the individual asserts the class in the given context
    fn contains(&self, subject: &Iri, class_iri: &Iri, context: Option<&Iri>) -> Result<bool>;

    /// Asserted class IRIs of the individual in the given context
    fn types(&self, subject: &Iri, context: Option<&Iri>) -> Result<FxHashSet<Iri>>;

    /// Generate a fresh identifier for an instance of the given type
    fn generate_identifier(&self, type_index: TypeIndex) -> Result<Iri>;

    /// Atomically publish all staged writes
    ///
    /// # Errors
    ///
    /// A failed commit leaves the store untouched; staged writes remain on
    /// the connection for the caller to roll back.
    fn commit(&mut self) -> Result<()>;

    /// Discard all staged writes
    fn rollback(&mut self) -> Result<()>;
}

/// Factory for transactional connections
pub trait StorageAccessor: Send + Sync {
    /// Open a fresh connection with an empty write set
    fn open_connection(&self) -> Result<Box<dyn StorageConnection>>;
}
