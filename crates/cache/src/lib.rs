//! Second-level cache for ontomap
//!
//! Sessions come and go; the cache outlives them and short-circuits entity
//! materialization for individuals that were loaded before. It offers:
//! - SecondLevelCache: snapshot store keyed by individual and context
//! - LRU and TTL eviction policies plus a disabled mode, selected from the
//!   `[cache]` config section
//! - Advisory try-locks so sessions can fall through to storage instead of
//!   blocking on a contended cache
//! - Wholesale invalidation of entries whose types carry inferred
//!   attribute values

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod manager;
mod policy;

pub use manager::{CacheReadGuard, CacheStats, CacheWriteGuard, SecondLevelCache};
