//! Second-level cache shared across sessions
//!
//! The cache keeps materialized entity snapshots together with their load
//! states so repeated reads of the same individual skip storage entirely.
//! Lookups hand out deep copies; the cached snapshot is never aliased by
//! session clones.
//!
//! Locking is two-level. The entry map sits behind a `RwLock` taken
//! internally by `get` and `add`. On top of that, sessions can take the
//! advisory `try_read_lock` / `try_write_lock` guards: a `None` result
//! means the cache is contended and the caller should fall through to
//! storage instead of blocking its transaction on cache availability.
//!
//! Entries of entity types carrying reasoner-inferred attributes are
//! invalidated wholesale after any data-changing commit; see
//! [`SecondLevelCache::clear_inferred_objects`].

use crate::policy::{CacheKey, CachedEntity, Policy};
use chrono::Utc;
use ontomap_core::{CacheConfig, Iri};
use ontomap_metamodel::{LoadStateDescriptor, Metamodel, ObjectInstance, TypeIndex};
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use rustc_hash::{FxHashMap, FxHashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, trace};

type EntryMap = FxHashMap<CacheKey, CachedEntity>;

#[derive(Debug, Default)]
struct CacheCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

/// Snapshot of cache activity counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    /// Lookups answered from the cache
    pub hits: u64,
    /// Lookups that fell through to storage
    pub misses: u64,
    /// Entries removed by policy or invalidation
    pub evictions: u64,
}

/// Second-level entity cache
pub struct SecondLevelCache {
    metamodel: Arc<Metamodel>,
    policy: Policy,
    entries: RwLock<EntryMap>,
    inferred_types: RwLock<FxHashSet<Iri>>,
    clock: AtomicU64,
    counters: CacheCounters,
}

impl std::fmt::Debug for SecondLevelCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecondLevelCache")
            .field("policy", &self.policy)
            .field("len", &self.entries.read().len())
            .finish()
    }
}

impl SecondLevelCache {
    /// Build a cache from the `[cache]` config section
    pub fn from_config(metamodel: Arc<Metamodel>, config: &CacheConfig) -> Self {
        Self::with_policy(metamodel, Policy::from_config(config))
    }

    /// Build a cache that admits nothing and misses on every lookup
    pub fn disabled(metamodel: Arc<Metamodel>) -> Self {
        Self::with_policy(metamodel, Policy::Disabled)
    }

    fn with_policy(metamodel: Arc<Metamodel>, policy: Policy) -> Self {
        Self {
            metamodel,
            policy,
            entries: RwLock::new(EntryMap::default()),
            inferred_types: RwLock::new(FxHashSet::default()),
            clock: AtomicU64::new(0),
            counters: CacheCounters::default(),
        }
    }

    /// Record the class IRIs whose entries carry inferred attribute values
    ///
    /// Usually the metamodel's [`Metamodel::inferred_types`] set, installed
    /// once when the server session is opened.
    pub fn set_inferred_types(&self, types: FxHashSet<Iri>) {
        *self.inferred_types.write() = types;
    }

    /// Look up an individual loaded as the given root type
    ///
    /// Hits when an entry exists for the individual in the context and its
    /// resolved type is the root or one of the root's subtypes. The returned
    /// instance and load state are copies.
    pub fn get(
        &self,
        root: TypeIndex,
        identifier: &Iri,
        context: Option<&Iri>,
    ) -> Option<(ObjectInstance, LoadStateDescriptor)> {
        let entries = self.entries.read();
        self.lookup(&entries, root, identifier, context)
    }

    /// True when [`SecondLevelCache::get`] would hit; bumps no counters
    pub fn contains(&self, root: TypeIndex, identifier: &Iri, context: Option<&Iri>) -> bool {
        if !self.policy.admits() {
            return false;
        }
        let entries = self.entries.read();
        let key = CacheKey {
            context: context.cloned(),
            identifier: identifier.clone(),
        };
        entries
            .get(&key)
            .filter(|entry| !self.policy.expired(entry))
            .is_some_and(|entry| self.type_matches(root, entry.instance.type_index))
    }

    /// Store an entity snapshot under its identifier and context
    ///
    /// Instances without an identifier cannot be keyed and are skipped.
    pub fn add(
        &self,
        instance: ObjectInstance,
        load_state: LoadStateDescriptor,
        context: Option<Iri>,
    ) {
        if !self.policy.admits() {
            return;
        }
        let mut entries = self.entries.write();
        self.insert_into(&mut entries, instance, load_state, context);
    }

    /// Try to take the advisory read guard without blocking
    ///
    /// `None` means a writer holds the cache; the caller should read from
    /// storage instead of waiting.
    pub fn try_read_lock(&self) -> Option<CacheReadGuard<'_>> {
        self.entries.try_read().map(|entries| CacheReadGuard {
            cache: self,
            entries,
        })
    }

    /// Try to take the advisory write guard without blocking
    pub fn try_write_lock(&self) -> Option<CacheWriteGuard<'_>> {
        self.entries.try_write().map(|entries| CacheWriteGuard {
            cache: self,
            entries,
        })
    }

    /// Drop one individual's entry, when its type matches the given root
    pub fn evict(&self, root: TypeIndex, identifier: &Iri, context: Option<&Iri>) {
        let mut entries = self.entries.write();
        let key = CacheKey {
            context: context.cloned(),
            identifier: identifier.clone(),
        };
        if entries
            .get(&key)
            .is_some_and(|entry| self.type_matches(root, entry.instance.type_index))
        {
            entries.remove(&key);
        }
    }

    /// Drop every entry of the given entity type, subtypes included
    pub fn evict_type(&self, type_index: TypeIndex) {
        let mut entries = self.entries.write();
        entries.retain(|_, entry| !self.type_matches(type_index, entry.instance.type_index));
    }

    /// Drop every entry in the given repository context
    pub fn evict_context(&self, context: Option<&Iri>) {
        let mut entries = self.entries.write();
        entries.retain(|key, _| key.context.as_ref() != context);
    }

    /// Drop everything
    pub fn evict_all(&self) {
        self.entries.write().clear();
        debug!("cache cleared");
    }

    /// Invalidate every entry whose type carries inferred attribute values
    ///
    /// A data-changing commit can alter what a reasoner would infer for any
    /// individual, so entries of the registered inferred types are dropped
    /// wholesale rather than tracked individually.
    pub fn clear_inferred_objects(&self) {
        let inferred = self.inferred_types.read();
        if inferred.is_empty() {
            return;
        }
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, entry| {
            let class_iri = &self.metamodel.entity_type(entry.instance.type_index).iri;
            !inferred.contains(class_iri)
                && !entry.instance.types.iter().any(|t| inferred.contains(t))
        });
        let dropped = (before - entries.len()) as u64;
        if dropped > 0 {
            self.counters.evictions.fetch_add(dropped, Ordering::Relaxed);
            debug!(dropped, "invalidated inferred-type cache entries");
        }
    }

    /// Number of live entries
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// True when the cache holds no entries
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot the activity counters
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            evictions: self.counters.evictions.load(Ordering::Relaxed),
        }
    }

    fn type_matches(&self, root: TypeIndex, stored: TypeIndex) -> bool {
        stored == root || self.metamodel.entity_type(root).has_descendant(stored)
    }

    fn lookup(
        &self,
        entries: &EntryMap,
        root: TypeIndex,
        identifier: &Iri,
        context: Option<&Iri>,
    ) -> Option<(ObjectInstance, LoadStateDescriptor)> {
        if !self.policy.admits() {
            return None;
        }
        let key = CacheKey {
            context: context.cloned(),
            identifier: identifier.clone(),
        };
        let entry = match entries.get(&key) {
            Some(entry) => entry,
            None => {
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                return None;
            }
        };
        if self.policy.expired(entry) || !self.type_matches(root, entry.instance.type_index) {
            self.counters.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        }
        entry
            .last_access
            .store(self.clock.fetch_add(1, Ordering::Relaxed) + 1, Ordering::Relaxed);
        self.counters.hits.fetch_add(1, Ordering::Relaxed);
        Some((entry.instance.clone(), entry.load_state.clone()))
    }

    fn insert_into(
        &self,
        entries: &mut EntryMap,
        instance: ObjectInstance,
        load_state: LoadStateDescriptor,
        context: Option<Iri>,
    ) {
        let identifier = match instance.identifier().cloned() {
            Some(identifier) => identifier,
            None => {
                trace!("skipping cache add for instance without identifier");
                return;
            }
        };
        self.purge_expired(entries);
        let key = CacheKey {
            context,
            identifier,
        };
        // The LRU budget is per resolved class: filling one class never
        // pushes another class's entries out.
        if let Policy::Lru { capacity } = self.policy {
            let class = instance.type_index;
            let replacing = entries
                .get(&key)
                .is_some_and(|entry| entry.instance.type_index == class);
            if !replacing && self.class_len(entries, class) >= capacity {
                self.evict_least_recent(entries, class);
            }
        }
        entries.insert(
            key,
            CachedEntity {
                instance,
                load_state,
                inserted_at: Utc::now(),
                last_access: AtomicU64::new(self.clock.fetch_add(1, Ordering::Relaxed) + 1),
            },
        );
    }

    fn purge_expired(&self, entries: &mut EntryMap) {
        if !matches!(self.policy, Policy::Ttl { .. }) {
            return;
        }
        let before = entries.len();
        entries.retain(|_, entry| !self.policy.expired(entry));
        let dropped = (before - entries.len()) as u64;
        if dropped > 0 {
            self.counters.evictions.fetch_add(dropped, Ordering::Relaxed);
        }
    }

    fn class_len(&self, entries: &EntryMap, class: TypeIndex) -> usize {
        entries
            .values()
            .filter(|entry| entry.instance.type_index == class)
            .count()
    }

    fn evict_least_recent(&self, entries: &mut EntryMap, class: TypeIndex) {
        let victim = entries
            .iter()
            .filter(|(_, entry)| entry.instance.type_index == class)
            .min_by_key(|(_, entry)| entry.last_access.load(Ordering::Relaxed))
            .map(|(key, _)| key.clone());
        if let Some(key) = victim {
            entries.remove(&key);
            self.counters.evictions.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// Advisory read guard over the cache
///
/// Holding it keeps writers out; lookups through it answer from a stable
/// view of the entry map.
pub struct CacheReadGuard<'a> {
    cache: &'a SecondLevelCache,
    entries: RwLockReadGuard<'a, EntryMap>,
}

impl CacheReadGuard<'_> {
    /// Look up an individual; same contract as [`SecondLevelCache::get`]
    pub fn get(
        &self,
        root: TypeIndex,
        identifier: &Iri,
        context: Option<&Iri>,
    ) -> Option<(ObjectInstance, LoadStateDescriptor)> {
        self.cache.lookup(&self.entries, root, identifier, context)
    }
}

/// Advisory write guard over the cache
pub struct CacheWriteGuard<'a> {
    cache: &'a SecondLevelCache,
    entries: RwLockWriteGuard<'a, EntryMap>,
}

impl CacheWriteGuard<'_> {
    /// Store a snapshot; same contract as [`SecondLevelCache::add`]
    pub fn add(
        &mut self,
        instance: ObjectInstance,
        load_state: LoadStateDescriptor,
        context: Option<Iri>,
    ) {
        if self.cache.policy.admits() {
            self.cache
                .insert_into(&mut self.entries, instance, load_state, context);
        }
    }

    /// Drop one individual's entry
    pub fn evict(&mut self, root: TypeIndex, identifier: &Iri, context: Option<&Iri>) {
        let key = CacheKey {
            context: context.cloned(),
            identifier: identifier.clone(),
        };
        if self
            .entries
            .get(&key)
            .is_some_and(|entry| self.cache.type_matches(root, entry.instance.type_index))
        {
            self.entries.remove(&key);
        }
    }
}
