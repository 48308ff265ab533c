//! Ontomap - transactional object-ontological mapping
//!
//! Ontomap maps typed objects onto RDF individuals and runs all access
//! through unit-of-work transactions: working copies are tracked against
//! pristine originals, changes become incremental storage deltas, and a
//! shared second-level cache short-circuits repeated loads.
//!
//! # Quick Start
//!
//! ```ignore
//! use ontomap::{AttributeSpec, EntityTypeSpec, MetamodelBuilder, Ontomap, OntomapConfig};
//! use std::sync::Arc;
//!
//! let metamodel = Arc::new(
//!     MetamodelBuilder::new()
//!         .add_type(
//!             EntityTypeSpec::new("Person", "http://example.org/Person")
//!                 .with_attribute(AttributeSpec::data("name", "http://example.org/name")),
//!         )
//!         .build()?,
//! );
//!
//! // In-memory repository with default cache and change tracking
//! let ontomap = Ontomap::open(metamodel.clone(), OntomapConfig::default());
//!
//! let person = metamodel.type_by_name("Person")?;
//! let mut uow = ontomap.unit_of_work()?;
//! let instance = metamodel.new_instance(person);
//! uow.register_new_object(instance, &Descriptor::new())?;
//! uow.commit()?;
//! ```
//!
//! # Architecture
//!
//! The workspace splits along the session's seams: `ontomap-core` carries
//! values, axioms, errors, and configuration; `ontomap-metamodel` the
//! entity types and instances; `ontomap-storage` the connection trait and
//! the in-memory store; `ontomap-cache` the shared second-level cache;
//! `ontomap-session` the server session and both unit-of-work kinds. This
//! crate re-exports the public API and adds the [`Ontomap`] entry point.

#![warn(missing_docs)]
#![warn(clippy::all)]

use std::sync::Arc;

pub use ontomap_cache::{CacheStats, SecondLevelCache};
pub use ontomap_core::{
    Assertion, Axiom, CacheConfig, CacheKind, ChangeTrackingMode, Descriptor, Iri, Literal,
    OntomapConfig, OntomapError, Result, SessionConfig, StorageConfig, Term, Value,
};
pub use ontomap_metamodel::{
    Attribute, AttributeIndex, AttributeKind, AttributeSpec, Cardinality, Cascade, EntityType,
    EntityTypeSpec, LoadState, LoadStateDescriptor, Metamodel, MetamodelBuilder, ObjectInstance,
    ParticipationConstraint, TypeIndex,
};
pub use ontomap_session::{
    AttributeChange, ChangeRecord, Entity, EntityState, FieldLoader, LazyRef, ObjectChangeSet,
    ReadOnlyUnitOfWork, ServerSession, UnitOfWork,
};
pub use ontomap_storage::{
    AxiomValueDescriptor, DeltaKind, DeltaOp, EntityDelta, ListOp, LoadedEntity,
    LoadingParameters, MemoryStore, StorageAccessor, StorageConnection, StoreStats,
};

/// High-level handle over one repository
///
/// Wraps a [`ServerSession`]; transactions are acquired per thread and the
/// handle itself is cheap to clone.
#[derive(Debug, Clone)]
pub struct Ontomap {
    session: ServerSession,
}

impl Ontomap {
    /// Open an in-memory repository
    pub fn open(metamodel: Arc<Metamodel>, config: OntomapConfig) -> Self {
        let store = Arc::new(MemoryStore::new(Arc::clone(&metamodel), config.storage.clone()));
        Self::with_accessor(metamodel, store, config)
    }

    /// Open a repository over a caller-provided storage backend
    pub fn with_accessor(
        metamodel: Arc<Metamodel>,
        accessor: Arc<dyn StorageAccessor>,
        config: OntomapConfig,
    ) -> Self {
        Self {
            session: ServerSession::new(metamodel, accessor, config),
        }
    }

    /// Begin a read-write transaction
    ///
    /// # Errors
    ///
    /// Fails when the session is closed or the connection cannot be opened.
    pub fn unit_of_work(&self) -> Result<UnitOfWork> {
        self.session.acquire_unit_of_work()
    }

    /// Begin a read-only transaction
    ///
    /// # Errors
    ///
    /// Fails when the session is closed or the connection cannot be opened.
    pub fn read_only_unit_of_work(&self) -> Result<ReadOnlyUnitOfWork> {
        self.session.acquire_read_only()
    }

    /// The underlying server session
    pub fn session(&self) -> &ServerSession {
        &self.session
    }

    /// The metamodel this repository maps against
    pub fn metamodel(&self) -> &Arc<Metamodel> {
        self.session.metamodel()
    }

    /// Close the repository; open transactions keep their connections
    pub fn close(&self) {
        self.session.close();
    }
}
