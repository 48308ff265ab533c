//! Transactional sessions for ontomap
//!
//! This crate is the heart of the object-ontological mapping: it turns the
//! storage and cache layers into a JPA-flavored persistence context over
//! RDF individuals. It offers:
//! - ServerSession: long-lived entry point owning the metamodel, the
//!   storage accessor, and the shared cache
//! - UnitOfWork: read-write transaction with clone/original bookkeeping,
//!   immediate or on-commit change tracking, cascades, and a one-way
//!   commit state machine
//! - ReadOnlyUnitOfWork: clone-free reads that reject every mutation
//! - LazyRef / FieldLoader: on-demand attribute loading shared by both
//!   transaction kinds
//! - Change calculation: scalar, set, and list diffs between working
//!   copies and their pristine originals
//!
//! # Identity model
//!
//! Working copies are `Rc<RefCell<_>>` handles; a unit of work is
//! single-threaded and holds at most one copy per individual. The server
//! session and everything below it stay `Send + Sync`, so concurrency
//! happens by acquiring one unit of work per thread.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod cascade;
mod integrity;
mod registry;

pub mod change;
pub mod lazy;
pub mod read_only;
pub mod server_session;
pub mod unit_of_work;

pub use change::{AttributeChange, ChangeRecord, ObjectChangeSet};
pub use lazy::{FieldLoader, LazyRef};
pub use read_only::ReadOnlyUnitOfWork;
pub use registry::{Entity, EntityState};
pub use server_session::ServerSession;
pub use unit_of_work::UnitOfWork;
