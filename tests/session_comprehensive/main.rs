//! Session integration tests
//!
//! End-to-end coverage of the persistence context over the in-memory
//! store: identity and polymorphic reads, persist and removal flows,
//! both change tracking modes, lazy loading, cache coordination,
//! read-only transactions, rollback paths, server session lifecycle,
//! and repository contexts.

mod fixtures;

mod cache_coordination;
mod multi_context;
mod read_operations;
mod server_sessions;
