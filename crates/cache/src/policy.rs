//! Cache keys, entries, and eviction policy
//!
//! An entry is keyed by individual and repository context; the resolved
//! entity type lives inside the stored instance and participates in lookup
//! matching, not in the key. The policy decides admission and expiry and is
//! fixed at construction from the `[cache]` config section.

use chrono::{DateTime, Duration, Utc};
use ontomap_core::{CacheConfig, CacheKind, Iri};
use ontomap_metamodel::{LoadStateDescriptor, ObjectInstance};
use std::sync::atomic::AtomicU64;

/// One individual in one repository context
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct CacheKey {
    pub context: Option<Iri>,
    pub identifier: Iri,
}

/// Stored entity snapshot plus bookkeeping for the eviction policy
#[derive(Debug)]
pub(crate) struct CachedEntity {
    pub instance: ObjectInstance,
    pub load_state: LoadStateDescriptor,
    pub inserted_at: DateTime<Utc>,
    /// Recency stamp, bumped on every hit; atomic so hits stay read-locked
    pub last_access: AtomicU64,
}

/// Eviction policy selected from [`CacheConfig`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Policy {
    /// Admit nothing, miss on every lookup
    Disabled,
    /// Evict the least recently used entry of a class once that class
    /// reaches `capacity`
    Lru { capacity: usize },
    /// Entries expire `ttl` after insertion
    Ttl { ttl: Duration },
}

impl Policy {
    pub fn from_config(config: &CacheConfig) -> Self {
        if !config.enabled {
            return Policy::Disabled;
        }
        match config.kind {
            CacheKind::Lru => Policy::Lru {
                capacity: config.capacity,
            },
            CacheKind::Ttl => Policy::Ttl {
                ttl: Duration::seconds(config.ttl_secs as i64),
            },
        }
    }

    /// True when the policy stores entries at all
    pub fn admits(&self) -> bool {
        !matches!(self, Policy::Disabled | Policy::Lru { capacity: 0 })
    }

    /// True when the entry has outlived a TTL policy
    pub fn expired(&self, entry: &CachedEntity) -> bool {
        match self {
            Policy::Ttl { ttl } => Utc::now().signed_duration_since(entry.inserted_at) >= *ttl,
            _ => false,
        }
    }
}
