//! Storage layer for ontomap
//!
//! This crate defines the storage seam sessions speak through and ships the
//! in-memory implementation:
//! - StorageConnection: transactional per-session connection trait
//! - StorageAccessor: connection factory shared by the server session
//! - LoadingParameters / LoadedEntity: entity materialization inputs and
//!   outputs
//! - EntityDelta / AxiomValueDescriptor: incremental update and persist
//!   payloads
//! - MemoryStore: context-partitioned triple store with overlay
//!   transactions
//!
//! # Transaction model
//!
//! A connection stages its writes in a private overlay:
//! - Reads merge the overlay over the shared state (read-your-writes)
//! - `commit` applies the overlay atomically under one write lock
//! - `rollback` discards the overlay without touching shared state

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod connection;
pub mod delta;
pub mod loading;
pub mod store;

pub use connection::{StorageAccessor, StorageConnection};
pub use delta::{AxiomEntry, AxiomValueDescriptor, DeltaKind, DeltaOp, EntityDelta, ListOp};
pub use loading::{LoadedEntity, LoadingParameters};
pub use store::{MemoryConnection, MemoryStore, StoreStats};
