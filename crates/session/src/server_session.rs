//! Server session
//!
//! The server session is the long-lived entry point of the persistence
//! layer. It owns the metamodel, the storage accessor, and the shared
//! second-level cache, and it hands out transactional units of work. Every
//! unit of work reports back on completion so the session can invalidate
//! reasoner-derived cache entries after data changes.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use ontomap_cache::SecondLevelCache;
use ontomap_core::{Iri, OntomapConfig, OntomapError, Result};
use ontomap_metamodel::Metamodel;
use ontomap_storage::StorageAccessor;
use parking_lot::Mutex;
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::debug;

use crate::read_only::ReadOnlyUnitOfWork;
use crate::unit_of_work::UnitOfWork;

/// Identity of one registered individual: identifier plus context
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct EntityKey {
    identifier: Iri,
    context: Option<Iri>,
}

/// Shared state behind every session handle and unit of work
pub(crate) struct SessionCore {
    metamodel: Arc<Metamodel>,
    accessor: Arc<dyn StorageAccessor>,
    cache: Arc<SecondLevelCache>,
    config: OntomapConfig,
    next_transaction: AtomicU64,
    active: Mutex<FxHashSet<u64>>,
    // Persistence-context ownership, both directions. Ownership is explicit
    // rather than weakly referenced: entries live exactly as long as their
    // transaction, dropped in transaction_finished.
    entity_owners: Mutex<FxHashMap<EntityKey, u64>>,
    transaction_entities: Mutex<FxHashMap<u64, FxHashSet<EntityKey>>>,
    closed: AtomicBool,
}

impl SessionCore {
    pub(crate) fn metamodel(&self) -> &Arc<Metamodel> {
        &self.metamodel
    }

    pub(crate) fn cache(&self) -> &SecondLevelCache {
        &self.cache
    }

    /// Record that `transaction` now manages `identifier` in `context`
    ///
    /// A later registration of the same key takes the ownership over; the
    /// earlier transaction still holds its working copy, but the session
    /// answers ownership queries with the most recent registrant.
    pub(crate) fn register_entity_with_context(
        &self,
        identifier: Iri,
        context: Option<Iri>,
        transaction: u64,
    ) {
        let key = EntityKey {
            identifier,
            context,
        };
        self.entity_owners.lock().insert(key.clone(), transaction);
        self.transaction_entities
            .lock()
            .entry(transaction)
            .or_default()
            .insert(key);
    }

    /// Drop one registration made by `transaction`
    ///
    /// A no-op when the key has since been re-registered by another
    /// transaction.
    pub(crate) fn deregister_entity(
        &self,
        identifier: &Iri,
        context: Option<&Iri>,
        transaction: u64,
    ) {
        let key = EntityKey {
            identifier: identifier.clone(),
            context: context.cloned(),
        };
        {
            let mut owners = self.entity_owners.lock();
            if owners.get(&key) == Some(&transaction) {
                owners.remove(&key);
            }
        }
        if let Some(keys) = self.transaction_entities.lock().get_mut(&transaction) {
            keys.remove(&key);
        }
    }

    /// The live transaction registered for an individual, if any
    pub(crate) fn owning_transaction(&self, identifier: &Iri, context: Option<&Iri>) -> Option<u64> {
        let key = EntityKey {
            identifier: identifier.clone(),
            context: context.cloned(),
        };
        self.entity_owners.lock().get(&key).copied()
    }

    /// Transaction completion hook
    ///
    /// Deregisters the transaction together with its persistence-context
    /// registrations and, when it changed data, evicts every cached
    /// individual whose type carries inferred attributes. Reasoning
    /// outcomes may shift after any write, so those entries cannot be
    /// trusted across a completed writing transaction.
    pub(crate) fn transaction_finished(&self, id: u64, data_changed: bool) {
        self.active.lock().remove(&id);
        if let Some(keys) = self.transaction_entities.lock().remove(&id) {
            let mut owners = self.entity_owners.lock();
            for key in keys {
                if owners.get(&key) == Some(&id) {
                    owners.remove(&key);
                }
            }
        }
        if data_changed {
            self.cache.clear_inferred_objects();
        }
        debug!(transaction = id, data_changed, "transaction finished");
    }
}

/// Long-lived session producing transactional units of work
///
/// Handles are cheap to clone and share one cache and transaction counter.
#[derive(Clone)]
pub struct ServerSession {
    core: Arc<SessionCore>,
}

impl ServerSession {
    /// Open a session over `accessor`
    ///
    /// The second-level cache is configured from `config.cache` and primed
    /// with the metamodel's inferred-capable types.
    pub fn new(
        metamodel: Arc<Metamodel>,
        accessor: Arc<dyn StorageAccessor>,
        config: OntomapConfig,
    ) -> Self {
        let cache = SecondLevelCache::from_config(Arc::clone(&metamodel), &config.cache);
        cache.set_inferred_types(metamodel.inferred_types());
        Self {
            core: Arc::new(SessionCore {
                metamodel,
                accessor,
                cache: Arc::new(cache),
                config,
                next_transaction: AtomicU64::new(0),
                active: Mutex::new(FxHashSet::default()),
                entity_owners: Mutex::new(FxHashMap::default()),
                transaction_entities: Mutex::new(FxHashMap::default()),
                closed: AtomicBool::new(false),
            }),
        }
    }

    fn ensure_open(&self) -> Result<()> {
        if self.core.closed.load(Ordering::Acquire) {
            return Err(OntomapError::illegal_state("Server session is closed"));
        }
        Ok(())
    }

    fn next_transaction_id(&self) -> u64 {
        self.core.next_transaction.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Begin a read-write unit of work
    ///
    /// # Errors
    ///
    /// Fails when the session is closed or the connection cannot be opened.
    pub fn acquire_unit_of_work(&self) -> Result<UnitOfWork> {
        self.ensure_open()?;
        let id = self.next_transaction_id();
        let connection = self.core.accessor.open_connection()?;
        self.core.active.lock().insert(id);
        debug!(transaction = id, "unit of work acquired");
        Ok(UnitOfWork::new(
            Arc::clone(&self.core),
            id,
            connection,
            self.core.config.session.change_tracking,
        ))
    }

    /// Begin a read-only unit of work
    ///
    /// Read-only transactions skip clone bookkeeping and reject every
    /// mutation.
    ///
    /// # Errors
    ///
    /// Fails when the session is closed or the connection cannot be opened.
    pub fn acquire_read_only(&self) -> Result<ReadOnlyUnitOfWork> {
        self.ensure_open()?;
        let id = self.next_transaction_id();
        let connection = self.core.accessor.open_connection()?;
        self.core.active.lock().insert(id);
        debug!(transaction = id, "read-only unit of work acquired");
        Ok(ReadOnlyUnitOfWork::new(Arc::clone(&self.core), id, connection))
    }

    /// The session's metamodel
    pub fn metamodel(&self) -> &Arc<Metamodel> {
        self.core.metamodel()
    }

    /// The shared second-level cache
    pub fn cache(&self) -> &SecondLevelCache {
        self.core.cache()
    }

    /// Effective configuration
    pub fn config(&self) -> &OntomapConfig {
        &self.core.config
    }

    /// Number of transactions not yet finished
    pub fn active_transactions(&self) -> usize {
        self.core.active.lock().len()
    }

    /// The transaction currently registered for an individual, if any
    ///
    /// Answers from the session's persistence-context registry: a
    /// read-write unit of work registers each individual as it becomes
    /// managed and the registration is dropped when the transaction
    /// finishes.
    pub fn owning_transaction(&self, identifier: &Iri, context: Option<&Iri>) -> Option<u64> {
        self.core.owning_transaction(identifier, context)
    }

    /// Close the session; new units of work are refused afterwards
    ///
    /// Already-running transactions keep their connections and finish
    /// normally.
    pub fn close(&self) {
        if !self.core.closed.swap(true, Ordering::AcqRel) {
            self.core.cache.evict_all();
            debug!("server session closed");
        }
    }

    /// True once [`close`](Self::close) has run
    pub fn is_closed(&self) -> bool {
        self.core.closed.load(Ordering::Acquire)
    }
}

impl fmt::Debug for ServerSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerSession")
            .field("closed", &self.is_closed())
            .field("active_transactions", &self.active_transactions())
            .field("cached_entities", &self.core.cache.len())
            .finish()
    }
}
