//! In-memory triple store with transactional connections
//!
//! The store keeps one graph per context behind a single `RwLock`. Every
//! connection carries a private overlay of staged writes: reads merge the
//! overlay over the shared state (read-your-writes), `commit` applies the
//! overlay atomically under the write lock, and `rollback` is a plain
//! overlay discard. Connections never block each other between reads; only
//! the commit window takes the write lock.

use crate::connection::{StorageAccessor, StorageConnection};
use crate::delta::{AxiomValueDescriptor, DeltaKind, EntityDelta, ListOp};
use crate::loading::{LoadedEntity, LoadingParameters};
use ontomap_core::{
    Assertion, Axiom, Descriptor, Iri, OntomapError, Result, StorageConfig, Term, Value,
};
use ontomap_metamodel::{Attribute, Cardinality, LoadState, LoadStateDescriptor, Metamodel, TypeIndex};
use parking_lot::RwLock;
use rustc_hash::{FxHashMap, FxHashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, trace};
use uuid::Uuid;

type AssertionValues = FxHashMap<Assertion, Vec<Term>>;

#[derive(Debug, Default)]
struct Graph {
    subjects: FxHashMap<Iri, AssertionValues>,
}

#[derive(Debug, Default)]
struct StoreState {
    contexts: FxHashMap<Option<Iri>, Graph>,
}

#[derive(Debug, Default)]
struct StoreCounters {
    connections_opened: AtomicU64,
    commits: AtomicU64,
    rollbacks: AtomicU64,
    finds: AtomicU64,
    field_loads: AtomicU64,
}

/// Snapshot of store activity counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreStats {
    /// Connections handed out
    pub connections_opened: u64,
    /// Committed transactions
    pub commits: u64,
    /// Rolled back transactions
    pub rollbacks: u64,
    /// Entity materializations served
    pub finds: u64,
    /// Single-attribute fetches served (lazy loading)
    pub field_loads: u64,
}

/// Shared in-memory store
///
/// Cheap to share: the graph state, counters, and metamodel all sit behind
/// `Arc`s, so the accessor can be cloned into every connection it opens.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    state: Arc<RwLock<StoreState>>,
    counters: Arc<StoreCounters>,
    metamodel: Arc<Metamodel>,
    config: StorageConfig,
}

impl MemoryStore {
    /// Create an empty store over the given metamodel
    pub fn new(metamodel: Arc<Metamodel>, config: StorageConfig) -> Self {
        Self {
            state: Arc::new(RwLock::new(StoreState::default())),
            counters: Arc::new(StoreCounters::default()),
            metamodel,
            config,
        }
    }

    /// The metamodel this store materializes against
    pub fn metamodel(&self) -> &Arc<Metamodel> {
        &self.metamodel
    }

    /// Snapshot the activity counters
    pub fn stats(&self) -> StoreStats {
        StoreStats {
            connections_opened: self.counters.connections_opened.load(Ordering::Relaxed),
            commits: self.counters.commits.load(Ordering::Relaxed),
            rollbacks: self.counters.rollbacks.load(Ordering::Relaxed),
            finds: self.counters.finds.load(Ordering::Relaxed),
            field_loads: self.counters.field_loads.load(Ordering::Relaxed),
        }
    }

    /// Bulk-load axioms outside any transaction
    ///
    /// Used for imports and test fixtures; duplicate values are skipped.
    pub fn insert_axioms(&self, axioms: impl IntoIterator<Item = (Option<Iri>, Axiom)>) {
        let mut state = self.state.write();
        for (context, axiom) in axioms {
            let values = state
                .contexts
                .entry(context)
                .or_default()
                .subjects
                .entry(axiom.subject)
                .or_default()
                .entry(axiom.assertion)
                .or_default();
            if !values.contains(&axiom.value) {
                values.push(axiom.value);
            }
        }
    }
}

impl StorageAccessor for MemoryStore {
    fn open_connection(&self) -> Result<Box<dyn StorageConnection>> {
        self.counters
            .connections_opened
            .fetch_add(1, Ordering::Relaxed);
        Ok(Box::new(MemoryConnection {
            state: Arc::clone(&self.state),
            counters: Arc::clone(&self.counters),
            metamodel: Arc::clone(&self.metamodel),
            namespace: self.config.identifier_namespace.clone(),
            overlay: Overlay::default(),
        }))
    }
}

#[derive(Debug, Default)]
struct Overlay {
    removed: FxHashSet<(Option<Iri>, Iri)>,
    patches: FxHashMap<(Option<Iri>, Iri, Assertion), Vec<Term>>,
}

impl Overlay {
    fn is_empty(&self) -> bool {
        self.removed.is_empty() && self.patches.is_empty()
    }
}

/// One transactional connection to a [`MemoryStore`]
#[derive(Debug)]
pub struct MemoryConnection {
    state: Arc<RwLock<StoreState>>,
    counters: Arc<StoreCounters>,
    metamodel: Arc<Metamodel>,
    namespace: String,
    overlay: Overlay,
}

impl MemoryConnection {
    /// Merge the overlay over the shared state for one assertion.
    ///
    /// Patch entries win over removals, which win over base state; `remove`
    /// purges the subject's patches, so a patch present after a removal was
    /// written after it.
    fn view_values(
        &self,
        state: &StoreState,
        context: Option<&Iri>,
        subject: &Iri,
        assertion: &Assertion,
    ) -> Option<Vec<Term>> {
        let patch_key = (context.cloned(), subject.clone(), assertion.clone());
        if let Some(patched) = self.overlay.patches.get(&patch_key) {
            return if patched.is_empty() {
                None
            } else {
                Some(patched.clone())
            };
        }
        if self
            .overlay
            .removed
            .contains(&(context.cloned(), subject.clone()))
        {
            return None;
        }
        state
            .contexts
            .get(&context.cloned())?
            .subjects
            .get(subject)?
            .get(assertion)
            .filter(|values| !values.is_empty())
            .cloned()
    }

    fn attribute_value(
        &self,
        state: &StoreState,
        subject: &Iri,
        attribute: &Attribute,
        descriptor: &Descriptor,
    ) -> Result<Option<Value>> {
        let context = descriptor.attribute_context(&attribute.property);
        let mut terms = self
            .view_values(state, context.as_ref(), subject, &attribute.assertion())
            .unwrap_or_default();
        if attribute.inferred {
            // Inferred attributes also see explicitly asserted statements.
            let mut asserted = attribute.assertion();
            asserted.inferred = false;
            if let Some(extra) = self.view_values(state, context.as_ref(), subject, &asserted) {
                for term in extra {
                    if !terms.contains(&term) {
                        terms.push(term);
                    }
                }
            }
        }
        if terms.is_empty() {
            return Ok(None);
        }
        match attribute.cardinality {
            Cardinality::Single => {
                if terms.len() > 1 {
                    return Err(OntomapError::CardinalityViolation {
                        attribute: attribute.property.to_string(),
                        detail: format!(
                            "storage holds {} values for a single-valued attribute",
                            terms.len()
                        ),
                    });
                }
                Ok(terms.pop().map(Value::Single))
            }
            Cardinality::Set => Ok(Some(Value::set(terms))),
            Cardinality::List => Ok(Some(Value::List(terms))),
        }
    }

    fn asserted_types(
        &self,
        state: &StoreState,
        context: Option<&Iri>,
        subject: &Iri,
    ) -> FxHashSet<Iri> {
        self.view_values(state, context, subject, &Assertion::class())
            .map(|terms| {
                terms
                    .iter()
                    .filter_map(Term::as_resource)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl StorageConnection for MemoryConnection {
    fn find(&self, params: &LoadingParameters) -> Result<Option<LoadedEntity>> {
        self.counters.finds.fetch_add(1, Ordering::Relaxed);
        let state = self.state.read();
        let context = params.descriptor.context();

        let asserted = self.asserted_types(&state, context, &params.identifier);
        if asserted.is_empty() {
            return Ok(None);
        }
        let resolved = match self.metamodel.resolve_instantiable_type(
            params.type_index,
            &params.identifier,
            &asserted,
        )? {
            Some(index) => index,
            None => return Ok(None),
        };

        let entity_type = self.metamodel.entity_type(resolved);
        let mut instance = self
            .metamodel
            .new_instance_with_id(resolved, params.identifier.clone());
        instance.types = asserted
            .into_iter()
            .filter(|iri| *iri != entity_type.iri)
            .collect();

        let mut load_state = LoadStateDescriptor::loaded(entity_type.slot_count());
        for attribute in entity_type.attributes() {
            if attribute.lazy {
                load_state.set_attribute_state(attribute.index, LoadState::NotLoaded);
                continue;
            }
            let value =
                self.attribute_value(&state, &params.identifier, attribute, &params.descriptor)?;
            attribute.set_value(&mut instance, value)?;
        }

        trace!(
            individual = %params.identifier,
            entity_type = %entity_type.name,
            "materialized individual"
        );
        Ok(Some(LoadedEntity {
            instance,
            load_state,
        }))
    }

    fn load_field(
        &self,
        subject: &Iri,
        attribute: &Attribute,
        descriptor: &Descriptor,
    ) -> Result<Option<Value>> {
        self.counters.field_loads.fetch_add(1, Ordering::Relaxed);
        let state = self.state.read();
        trace!(individual = %subject, attribute = %attribute.property, "loading attribute");
        self.attribute_value(&state, subject, attribute, descriptor)
    }

    fn persist(&mut self, descriptor: &AxiomValueDescriptor) -> Result<()> {
        for entry in &descriptor.entries {
            self.overlay.patches.insert(
                (
                    entry.context.clone(),
                    descriptor.subject.clone(),
                    entry.assertion.clone(),
                ),
                entry.values.clone(),
            );
        }
        debug!(individual = %descriptor.subject, entries = descriptor.entries.len(), "staged persist");
        Ok(())
    }

    fn update(&mut self, delta: &EntityDelta) -> Result<()> {
        let mut staged = Vec::with_capacity(delta.ops.len());
        {
            let state = self.state.read();
            for op in &delta.ops {
                let current = self
                    .view_values(&state, op.context.as_ref(), &delta.subject, &op.assertion)
                    .unwrap_or_default();
                let next = apply_delta_kind(current, &op.kind, &op.assertion)?;
                staged.push((
                    (
                        op.context.clone(),
                        delta.subject.clone(),
                        op.assertion.clone(),
                    ),
                    next,
                ));
            }
        }
        for (key, values) in staged {
            self.overlay.patches.insert(key, values);
        }
        debug!(individual = %delta.subject, ops = delta.ops.len(), "staged update");
        Ok(())
    }

    fn remove(
        &mut self,
        subject: &Iri,
        _type_index: TypeIndex,
        descriptor: &Descriptor,
    ) -> Result<()> {
        for context in descriptor.all_contexts() {
            self.overlay
                .patches
                .retain(|(ctx, subj, _), _| !(*ctx == context && subj == subject));
            self.overlay.removed.insert((context, subject.clone()));
        }
        debug!(individual = %subject, "staged removal");
        Ok(())
    }

    fn contains(&self, subject: &Iri, class_iri: &Iri, context: Option<&Iri>) -> Result<bool> {
        let state = self.state.read();
        Ok(self
            .asserted_types(&state, context, subject)
            .contains(class_iri))
    }

    fn types(&self, subject: &Iri, context: Option<&Iri>) -> Result<FxHashSet<Iri>> {
        let state = self.state.read();
        Ok(self.asserted_types(&state, context, subject))
    }

    fn generate_identifier(&self, type_index: TypeIndex) -> Result<Iri> {
        let entity_type = self.metamodel.entity_type(type_index);
        Ok(Iri::new(format!(
            "{}{}-{}",
            self.namespace,
            entity_type.iri.local_name(),
            Uuid::new_v4()
        )))
    }

    fn commit(&mut self) -> Result<()> {
        let overlay = std::mem::take(&mut self.overlay);
        if !overlay.is_empty() {
            let mut state = self.state.write();
            for (context, subject) in overlay.removed {
                if let Some(graph) = state.contexts.get_mut(&context) {
                    graph.subjects.remove(&subject);
                }
            }
            for ((context, subject, assertion), values) in overlay.patches {
                let graph = state.contexts.entry(context).or_default();
                if values.is_empty() {
                    if let Some(subject_values) = graph.subjects.get_mut(&subject) {
                        subject_values.remove(&assertion);
                        if subject_values.is_empty() {
                            graph.subjects.remove(&subject);
                        }
                    }
                } else {
                    graph
                        .subjects
                        .entry(subject)
                        .or_default()
                        .insert(assertion, values);
                }
            }
        }
        self.counters.commits.fetch_add(1, Ordering::Relaxed);
        debug!("transaction committed");
        Ok(())
    }

    fn rollback(&mut self) -> Result<()> {
        self.overlay = Overlay::default();
        self.counters.rollbacks.fetch_add(1, Ordering::Relaxed);
        debug!("transaction rolled back");
        Ok(())
    }
}

fn apply_delta_kind(
    mut current: Vec<Term>,
    kind: &DeltaKind,
    assertion: &Assertion,
) -> Result<Vec<Term>> {
    match kind {
        DeltaKind::Add(terms) => {
            for term in terms {
                if !current.contains(term) {
                    current.push(term.clone());
                }
            }
            Ok(current)
        }
        DeltaKind::Remove(terms) => {
            current.retain(|term| !terms.contains(term));
            Ok(current)
        }
        DeltaKind::Replace(terms) => Ok(terms.clone()),
        DeltaKind::Clear => Ok(Vec::new()),
        DeltaKind::ListEdit(script) => {
            for op in script {
                match op {
                    ListOp::Remove { index } => {
                        if *index >= current.len() {
                            return Err(OntomapError::storage(format!(
                                "list edit removal index {} out of bounds for {}",
                                index, assertion
                            )));
                        }
                        current.remove(*index);
                    }
                    ListOp::Insert { index, value } => {
                        if *index > current.len() {
                            return Err(OntomapError::storage(format!(
                                "list edit insert index {} out of bounds for {}",
                                index, assertion
                            )));
                        }
                        current.insert(*index, value.clone());
                    }
                }
            }
            Ok(current)
        }
    }
}
