//! Read-write unit of work
//!
//! A [`UnitOfWork`] is one transaction of the persistence context:
//! - Every individual read or registered gets exactly one working copy
//!   (clone) plus a pristine original snapshot for diffing
//! - Reads resolve registry first, then the shared cache under an advisory
//!   lock, then the storage connection
//! - Changes stage on the connection (immediate tracking) or get computed
//!   by diffing at commit (on-commit tracking); nothing is visible to
//!   other connections until `commit`
//! - The lifecycle is a one-way state machine; a failed commit parks the
//!   transaction in `Failed` until it is rolled back or dropped

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use ontomap_core::{
    Assertion, ChangeTrackingMode, Descriptor, Iri, OntomapError, Result, Term, Value,
};
use ontomap_metamodel::{
    AttributeKind, LoadState, LoadStateDescriptor, Metamodel, ObjectInstance, TypeIndex,
};
use ontomap_storage::{
    AxiomValueDescriptor, DeltaKind, DeltaOp, EntityDelta, LoadedEntity, LoadingParameters,
    StorageConnection,
};
use tracing::{debug, trace, warn};

use crate::cascade;
use crate::change::{self, ObjectChangeSet};
use crate::integrity;
use crate::lazy::{FieldLoader, LazyRef};
use crate::registry::{CloneRegistry, Entity, EntityState, LoadStateRegistry, ManagedEntry};
use crate::server_session::SessionCore;
use rustc_hash::FxHashSet;

/// Transaction lifecycle; transitions are one-way
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UowState {
    Active,
    Committing,
    RollingBack,
    Failed,
    Cleared,
}

/// One read-write transaction over the repository
///
/// Holds `Rc` working copies and is deliberately single-threaded; acquire
/// one unit of work per thread from the server session.
pub struct UnitOfWork {
    core: Arc<SessionCore>,
    id: u64,
    connection: Box<dyn StorageConnection>,
    registry: CloneRegistry,
    load_states: LoadStateRegistry,
    changed: FxHashSet<Iri>,
    change_tracking: ChangeTrackingMode,
    state: UowState,
    has_changes: bool,
}

impl UnitOfWork {
    pub(crate) fn new(
        core: Arc<SessionCore>,
        id: u64,
        connection: Box<dyn StorageConnection>,
        change_tracking: ChangeTrackingMode,
    ) -> Self {
        Self {
            core,
            id,
            connection,
            registry: CloneRegistry::default(),
            load_states: LoadStateRegistry::default(),
            changed: FxHashSet::default(),
            change_tracking,
            state: UowState::Active,
            has_changes: false,
        }
    }

    /// Transaction identifier assigned by the server session
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Effective change tracking mode
    pub fn change_tracking(&self) -> ChangeTrackingMode {
        self.change_tracking
    }

    fn ensure_active(&self) -> Result<()> {
        if self.state != UowState::Active {
            return Err(OntomapError::illegal_state(format!(
                "Unit of work {} is not active ({:?})",
                self.id, self.state
            )));
        }
        Ok(())
    }

    /// Identifier and lifecycle state of a managed working copy
    ///
    /// The argument must be the registered clone itself; a detached copy
    /// with the same identifier is not managed.
    fn managed_state(&self, entity: &Entity) -> Result<(Iri, EntityState)> {
        let identifier = match entity.borrow().identifier().cloned() {
            Some(identifier) => identifier,
            None => {
                return Err(OntomapError::EntityNotManaged(
                    "instance has no identifier".to_string(),
                ))
            }
        };
        match self.registry.get(&identifier) {
            Some(entry) if Rc::ptr_eq(&entry.entity, entity) => Ok((identifier, entry.state)),
            _ => Err(OntomapError::EntityNotManaged(format!(
                "<{identifier}> is not managed by this unit of work"
            ))),
        }
    }

    fn check_compatible(
        &self,
        entry: &ManagedEntry,
        requested: TypeIndex,
        descriptor: &Descriptor,
        identifier: &Iri,
    ) -> Result<()> {
        let stored = entry.entity.borrow().type_index;
        let compatible = stored == requested
            || self
                .core
                .metamodel()
                .entity_type(requested)
                .has_descendant(stored);
        if !compatible {
            return Err(OntomapError::IdentityConflict {
                identifier: identifier.to_string(),
                detail: format!(
                    "already managed as {}",
                    self.core.metamodel().entity_type(stored).name
                ),
            });
        }
        if !entry.descriptor.same_context(descriptor) {
            return Err(OntomapError::IdentityConflict {
                identifier: identifier.to_string(),
                detail: "already managed in a different repository context".to_string(),
            });
        }
        Ok(())
    }

    fn register_loaded(
        &mut self,
        identifier: Iri,
        instance: ObjectInstance,
        load_state: LoadStateDescriptor,
        descriptor: Descriptor,
    ) -> Entity {
        let entity: Entity = Rc::new(RefCell::new(instance.clone()));
        self.load_states.insert(identifier.clone(), load_state);
        self.core.register_entity_with_context(
            identifier.clone(),
            descriptor.context().cloned(),
            self.id,
        );
        self.registry.insert(
            identifier,
            ManagedEntry {
                entity: Rc::clone(&entity),
                original: instance,
                descriptor,
                state: EntityState::Managed,
            },
        );
        entity
    }

    /// Cache-then-storage load
    ///
    /// The cache is advisory: a contended lock falls through to storage.
    /// Storage hits seed the cache; bypassing parameters skip both the
    /// lookup and the seed, so uncommitted connection state never reaches
    /// the shared cache.
    fn load_through(&mut self, params: &LoadingParameters) -> Result<Option<LoadedEntity>> {
        if !params.bypass_cache {
            let cached = self.core.cache().try_read_lock().and_then(|guard| {
                guard.get(params.type_index, &params.identifier, params.descriptor.context())
            });
            if let Some((instance, load_state)) = cached {
                trace!(subject = %params.identifier, "cache hit");
                return Ok(Some(LoadedEntity {
                    instance,
                    load_state,
                }));
            }
        }
        let loaded = match self.connection.find(params)? {
            Some(loaded) => loaded,
            None => return Ok(None),
        };
        if !params.bypass_cache {
            if let Some(mut guard) = self.core.cache().try_write_lock() {
                guard.add(
                    loaded.instance.clone(),
                    loaded.load_state.clone(),
                    params.descriptor.context().cloned(),
                );
            }
        }
        Ok(Some(loaded))
    }

    /// Read an individual as an instance of `type_index`
    ///
    /// Absence is `Ok(None)`; so is an individual already scheduled for
    /// removal in this transaction. A repeated read returns the same
    /// working copy.
    ///
    /// # Errors
    ///
    /// Returns [`OntomapError::IdentityConflict`] when the individual is
    /// already managed under an incompatible type or context.
    pub fn read_object(
        &mut self,
        type_index: TypeIndex,
        identifier: &Iri,
        descriptor: &Descriptor,
    ) -> Result<Option<Entity>> {
        self.ensure_active()?;
        if let Some(entry) = self.registry.get(identifier) {
            if entry.state == EntityState::Removed {
                return Ok(None);
            }
            self.check_compatible(entry, type_index, descriptor, identifier)?;
            return Ok(Some(Rc::clone(&entry.entity)));
        }
        let params = LoadingParameters::new(identifier.clone(), type_index, descriptor.clone());
        let loaded = match self.load_through(&params)? {
            Some(loaded) => loaded,
            None => return Ok(None),
        };
        Ok(Some(self.register_loaded(
            identifier.clone(),
            loaded.instance,
            loaded.load_state,
            descriptor.clone(),
        )))
    }

    /// Register an instance assumed to exist in storage
    ///
    /// Idempotent: when the identifier is already managed, the registered
    /// working copy comes back and the argument is discarded.
    ///
    /// # Errors
    ///
    /// Fails on identifier-less instances, removed individuals, and
    /// incompatible prior registrations.
    pub fn register_existing_object(
        &mut self,
        instance: ObjectInstance,
        descriptor: &Descriptor,
    ) -> Result<Entity> {
        self.ensure_active()?;
        let identifier = match instance.identifier().cloned() {
            Some(identifier) => identifier,
            None => {
                return Err(OntomapError::EntityNotManaged(
                    "cannot register an instance without an identifier".to_string(),
                ))
            }
        };
        if let Some(entry) = self.registry.get(&identifier) {
            if entry.state == EntityState::Removed {
                return Err(OntomapError::EntityNotManaged(format!(
                    "<{identifier}> has been removed in this transaction"
                )));
            }
            self.check_compatible(entry, instance.type_index, descriptor, &identifier)?;
            return Ok(Rc::clone(&entry.entity));
        }
        let slots = instance.slot_count();
        Ok(self.register_loaded(
            identifier,
            instance,
            LoadStateDescriptor::loaded(slots),
            descriptor.clone(),
        ))
    }

    /// Return a managed shell for `identifier` without touching storage
    ///
    /// The shell carries only the identifier; every attribute starts
    /// not-loaded and resolves lazily on first access.
    ///
    /// # Errors
    ///
    /// Fails when the individual was removed in this transaction or is
    /// managed under an incompatible type.
    pub fn get_reference(
        &mut self,
        type_index: TypeIndex,
        identifier: &Iri,
        descriptor: &Descriptor,
    ) -> Result<Entity> {
        self.ensure_active()?;
        if let Some(entry) = self.registry.get(identifier) {
            if entry.state == EntityState::Removed {
                return Err(OntomapError::EntityNotManaged(format!(
                    "<{identifier}> has been removed in this transaction"
                )));
            }
            self.check_compatible(entry, type_index, descriptor, identifier)?;
            return Ok(Rc::clone(&entry.entity));
        }
        let instance = self
            .core
            .metamodel()
            .new_instance_with_id(type_index, identifier.clone());
        let slots = instance.slot_count();
        let entity: Entity = Rc::new(RefCell::new(instance.clone()));
        self.load_states
            .insert(identifier.clone(), LoadStateDescriptor::not_loaded(slots));
        self.core.register_entity_with_context(
            identifier.clone(),
            descriptor.context().cloned(),
            self.id,
        );
        self.registry.insert(
            identifier.clone(),
            ManagedEntry {
                entity: Rc::clone(&entity),
                original: instance,
                descriptor: descriptor.clone(),
                state: EntityState::Managed,
            },
        );
        Ok(entity)
    }

    /// Register a new individual for persistence
    ///
    /// Generates an identifier when the instance carries none. The
    /// instance is flushed to storage at commit or on
    /// [`write_uncommitted_changes`](Self::write_uncommitted_changes).
    ///
    /// # Errors
    ///
    /// Returns [`OntomapError::IdentityConflict`] when the identifier is
    /// already managed or already present in storage, and
    /// [`OntomapError::IllegalState`] for abstract types.
    pub fn register_new_object(
        &mut self,
        mut instance: ObjectInstance,
        descriptor: &Descriptor,
    ) -> Result<Entity> {
        self.ensure_active()?;
        let type_index = instance.type_index;
        let (class_iri, type_name, is_abstract) = {
            let entity_type = self.core.metamodel().entity_type(type_index);
            (
                entity_type.iri.clone(),
                entity_type.name.clone(),
                entity_type.abstract_type,
            )
        };
        if is_abstract {
            return Err(OntomapError::illegal_state(format!(
                "Cannot persist an instance of abstract type {type_name}"
            )));
        }
        let identifier = match instance.identifier().cloned() {
            Some(identifier) => identifier,
            None => {
                let generated = self.connection.generate_identifier(type_index)?;
                instance.identifier = Some(generated.clone());
                generated
            }
        };
        if self.registry.contains(&identifier) {
            return Err(OntomapError::IdentityConflict {
                identifier: identifier.to_string(),
                detail: "already managed by this unit of work".to_string(),
            });
        }
        if self
            .connection
            .contains(&identifier, &class_iri, descriptor.context())?
        {
            return Err(OntomapError::IdentityConflict {
                identifier: identifier.to_string(),
                detail: "already exists in storage".to_string(),
            });
        }
        // The entity's own class is implied by its type, not listed twice.
        instance.types.remove(&class_iri);
        let slots = instance.slot_count();
        let entity: Entity = Rc::new(RefCell::new(instance.clone()));
        self.load_states
            .insert(identifier.clone(), LoadStateDescriptor::loaded(slots));
        self.core.register_entity_with_context(
            identifier.clone(),
            descriptor.context().cloned(),
            self.id,
        );
        self.registry.insert(
            identifier.clone(),
            ManagedEntry {
                entity: Rc::clone(&entity),
                original: instance,
                descriptor: descriptor.clone(),
                state: EntityState::ManagedNew,
            },
        );
        self.changed.insert(identifier.clone());
        self.has_changes = true;
        debug!(transaction = self.id, subject = %identifier, "new object registered");
        Ok(entity)
    }

    /// Schedule a managed individual for removal
    ///
    /// A never-persisted object is simply deregistered. Removal cascades
    /// through remove-cascading object attributes, resolving referenced
    /// individuals through this unit of work; the walk is cycle-safe.
    ///
    /// # Errors
    ///
    /// Returns [`OntomapError::EntityNotManaged`] when the argument is not
    /// a working copy of this unit of work.
    pub fn remove_object(&mut self, entity: &Entity) -> Result<()> {
        self.ensure_active()?;
        let (identifier, _) = self.managed_state(entity)?;
        let mut queue = vec![identifier];
        let mut visited: FxHashSet<Iri> = FxHashSet::default();
        while let Some(current) = queue.pop() {
            if !visited.insert(current.clone()) {
                continue;
            }
            let staged = {
                let entry = match self.registry.get(&current) {
                    Some(entry) => entry,
                    None => continue,
                };
                let clone = entry.entity.borrow();
                let entity_type = self.core.metamodel().entity_type(clone.type_index);
                (
                    cascade::remove_cascade_targets(entity_type, &clone),
                    entry.state,
                    entry.descriptor.clone(),
                )
            };
            let (targets, state, descriptor) = staged;
            match state {
                EntityState::ManagedNew => {
                    self.registry.remove(&current);
                    self.load_states.remove(&current);
                    self.changed.remove(&current);
                    self.core
                        .deregister_entity(&current, descriptor.context(), self.id);
                }
                EntityState::Removed => {}
                _ => {
                    if let Some(entry) = self.registry.get_mut(&current) {
                        entry.state = EntityState::Removed;
                    }
                    self.has_changes = true;
                }
            }
            for (target_type, target) in targets {
                if visited.contains(&target) {
                    continue;
                }
                if self.registry.contains(&target)
                    || self.read_object(target_type, &target, &descriptor)?.is_some()
                {
                    queue.push(target);
                }
            }
        }
        Ok(())
    }

    /// Record a change to one attribute of a managed working copy
    ///
    /// Under immediate tracking the delta against the original is computed
    /// and staged on the connection right away; under on-commit tracking
    /// the entity is only marked loaded and diffed later.
    ///
    /// # Errors
    ///
    /// Returns [`OntomapError::InferredAttributeModified`] for inferred
    /// attributes and [`OntomapError::IllegalState`] for removed entities.
    pub fn attribute_changed(&mut self, entity: &Entity, attribute_name: &str) -> Result<()> {
        self.ensure_active()?;
        let (identifier, state) = self.managed_state(entity)?;
        if state == EntityState::Removed {
            return Err(OntomapError::illegal_state(format!(
                "<{identifier}> is scheduled for removal; its attributes cannot change"
            )));
        }
        let attribute = {
            let type_index = entity.borrow().type_index;
            self.core
                .metamodel()
                .entity_type(type_index)
                .attribute_by_name(attribute_name)?
                .clone()
        };
        if attribute.inferred {
            return Err(OntomapError::InferredAttributeModified {
                attribute: attribute.property.to_string(),
            });
        }
        if let Some(states) = self.load_states.get_mut(&identifier) {
            states.set_attribute_state(attribute.index, LoadState::Loaded);
        }
        if self.change_tracking == ChangeTrackingMode::OnCommit {
            return Ok(());
        }
        if state == EntityState::ManagedNew {
            // flushed wholesale from the working copy
            self.changed.insert(identifier);
            return Ok(());
        }
        let staged = {
            let entry = match self.registry.get(&identifier) {
                Some(entry) => entry,
                None => return Err(OntomapError::EntityNotManaged(identifier.to_string())),
            };
            let clone = entry.entity.borrow();
            let record = change::attribute_change(&attribute, &entry.original, &clone)?;
            record.map(|record| {
                let context = entry.descriptor.attribute_context(&attribute.property);
                (record, context, attribute.get(&clone).cloned())
            })
        };
        let (record, context, new_value) = match staged {
            Some(staged) => staged,
            None => return Ok(()),
        };
        let mut delta = EntityDelta::new(identifier.clone());
        for kind in record.delta_kinds() {
            delta.push(DeltaOp {
                assertion: record.assertion.clone(),
                context: context.clone(),
                kind,
            });
        }
        self.connection.update(&delta)?;
        if let Some(entry) = self.registry.get_mut(&identifier) {
            attribute.set_value(&mut entry.original, new_value)?;
        }
        trace!(transaction = self.id, subject = %identifier, property = %attribute.property,
               "attribute change staged");
        self.changed.insert(identifier);
        self.has_changes = true;
        Ok(())
    }

    /// Merge a detached instance into the persistence context
    ///
    /// An individual known to the registry or storage gets its working
    /// copy overwritten from the detached state; an unknown one is
    /// registered for persistence.
    ///
    /// # Errors
    ///
    /// Fails on identifier-less instances and incompatible registrations.
    pub fn merge_detached(
        &mut self,
        instance: ObjectInstance,
        descriptor: &Descriptor,
    ) -> Result<Entity> {
        self.ensure_active()?;
        let identifier = match instance.identifier().cloned() {
            Some(identifier) => identifier,
            None => {
                return Err(OntomapError::EntityNotManaged(
                    "cannot merge an instance without an identifier".to_string(),
                ))
            }
        };
        if !self.registry.contains(&identifier) {
            let params =
                LoadingParameters::new(identifier.clone(), instance.type_index, descriptor.clone());
            match self.load_through(&params)? {
                Some(loaded) => {
                    self.register_loaded(
                        identifier.clone(),
                        loaded.instance,
                        loaded.load_state,
                        descriptor.clone(),
                    );
                }
                None => return self.register_new_object(instance, descriptor),
            }
        }
        self.merge_into_managed(&identifier, &instance, descriptor)
    }

    fn merge_into_managed(
        &mut self,
        identifier: &Iri,
        incoming: &ObjectInstance,
        descriptor: &Descriptor,
    ) -> Result<Entity> {
        let metamodel = Arc::clone(self.core.metamodel());
        {
            let entry = match self.registry.get(identifier) {
                Some(entry) => entry,
                None => return Err(OntomapError::EntityNotManaged(identifier.to_string())),
            };
            if entry.state == EntityState::Removed {
                return Err(OntomapError::EntityNotManaged(format!(
                    "<{identifier}> has been removed in this transaction"
                )));
            }
            self.check_compatible(entry, incoming.type_index, descriptor, identifier)?;
        }
        let incoming_et = metamodel.entity_type(incoming.type_index);

        // Overwrite the working copy property by property; the managed
        // clone may be of a more specific type with a different slot table.
        let (entity, state, stored_type) = {
            let entry = match self.registry.get_mut(identifier) {
                Some(entry) => entry,
                None => return Err(OntomapError::EntityNotManaged(identifier.to_string())),
            };
            let mut clone = entry.entity.borrow_mut();
            let stored_type = clone.type_index;
            let stored_et = metamodel.entity_type(stored_type);
            for attribute in incoming_et.attributes() {
                let target = match stored_et.attribute_by_property(&attribute.property) {
                    Some(target) => target,
                    None => continue,
                };
                target.set_value(&mut clone, attribute.get(incoming).cloned())?;
            }
            clone.types = incoming
                .types
                .iter()
                .chain(std::iter::once(&incoming_et.iri))
                .filter(|t| **t != stored_et.iri)
                .cloned()
                .collect();
            drop(clone);
            if let Some(states) = self.load_states.get_mut(identifier) {
                for attribute in incoming_et.attributes() {
                    if let Some(target) = stored_et.attribute_by_property(&attribute.property) {
                        states.set_attribute_state(target.index, LoadState::Loaded);
                    }
                }
            }
            (Rc::clone(&entry.entity), entry.state, stored_type)
        };

        if state == EntityState::ManagedNew {
            self.changed.insert(identifier.clone());
            return Ok(entity);
        }
        if self.change_tracking == ChangeTrackingMode::OnCommit {
            return Ok(entity);
        }
        let staged = {
            let entry = match self.registry.get(identifier) {
                Some(entry) => entry,
                None => return Err(OntomapError::EntityNotManaged(identifier.to_string())),
            };
            let clone = entry.entity.borrow();
            let entity_type = metamodel.entity_type(clone.type_index);
            let changeset =
                change::calculate_changes(identifier, entity_type, &entry.original, &clone)?;
            if changeset.is_empty() {
                None
            } else {
                Some((
                    delta_from_changeset(&changeset, &entry.descriptor),
                    clone.clone(),
                ))
            }
        };
        if let Some((delta, snapshot)) = staged {
            self.connection.update(&delta)?;
            if let Some(entry) = self.registry.get_mut(identifier) {
                entry.original = snapshot;
            }
            self.changed.insert(identifier.clone());
            self.has_changes = true;
            // the merged state supersedes whatever the cache holds
            self.core
                .cache()
                .evict(stored_type, identifier, descriptor.context());
        }
        Ok(entity)
    }

    /// Reload a managed individual from storage, discarding local edits
    ///
    /// Reads through this transaction's connection while bypassing the
    /// shared cache, so already-staged writes remain visible.
    ///
    /// # Errors
    ///
    /// Refreshing a never-persisted or removed object is an
    /// [`OntomapError::IllegalState`]; an individual gone from storage is
    /// [`OntomapError::EntityNotManaged`].
    pub fn refresh_object(&mut self, entity: &Entity) -> Result<()> {
        self.ensure_active()?;
        let (identifier, state) = self.managed_state(entity)?;
        match state {
            EntityState::ManagedNew => {
                return Err(OntomapError::illegal_state(format!(
                    "<{identifier}> is not persistent yet; refresh requires a stored individual"
                )))
            }
            EntityState::Removed => {
                return Err(OntomapError::illegal_state(format!(
                    "<{identifier}> is scheduled for removal"
                )))
            }
            _ => {}
        }
        let (registered_type, descriptor) = {
            let entry = match self.registry.get(&identifier) {
                Some(entry) => entry,
                None => return Err(OntomapError::EntityNotManaged(identifier.to_string())),
            };
            (entry.entity.borrow().type_index, entry.descriptor.clone())
        };
        let params = LoadingParameters::new(identifier.clone(), registered_type, descriptor)
            .bypassing_cache();
        let loaded = match self.load_through(&params)? {
            Some(loaded) => loaded,
            None => {
                return Err(OntomapError::EntityNotManaged(format!(
                    "<{identifier}> no longer exists in storage"
                )))
            }
        };

        // Rebuild in the registered type's slot layout; the freshly
        // resolved type may be more specific.
        let metamodel = Arc::clone(self.core.metamodel());
        let registered_et = metamodel.entity_type(registered_type);
        let loaded_et = metamodel.entity_type(loaded.instance.type_index);
        let mut fresh = metamodel.new_instance_with_id(registered_type, identifier.clone());
        let mut fresh_states = LoadStateDescriptor::not_loaded(registered_et.slot_count());
        for attribute in registered_et.attributes() {
            let source = match loaded_et.attribute_by_property(&attribute.property) {
                Some(source) => source,
                None => continue,
            };
            attribute.set_value(&mut fresh, source.get(&loaded.instance).cloned())?;
            fresh_states
                .set_attribute_state(attribute.index, loaded.load_state.attribute_state(source.index));
        }
        fresh_states.instance = LoadState::Loaded;
        fresh.types = loaded
            .instance
            .types
            .iter()
            .chain(std::iter::once(&loaded_et.iri))
            .filter(|t| **t != registered_et.iri)
            .cloned()
            .collect();

        *entity.borrow_mut() = fresh.clone();
        if let Some(entry) = self.registry.get_mut(&identifier) {
            entry.original = fresh;
        }
        self.load_states.insert(identifier, fresh_states);
        Ok(())
    }

    /// Load one attribute of a managed entity by name
    ///
    /// Already-loaded attributes answer from memory; otherwise exactly one
    /// storage fetch runs and referenced individuals become managed.
    ///
    /// # Errors
    ///
    /// Fails for unmanaged entities and unknown attribute names.
    pub fn load_entity_field(&mut self, entity: &Entity, attribute_name: &str) -> Result<()> {
        self.ensure_active()?;
        let (identifier, _) = self.managed_state(entity)?;
        let property = {
            let type_index = entity.borrow().type_index;
            self.core
                .metamodel()
                .entity_type(type_index)
                .attribute_by_name(attribute_name)?
                .property
                .clone()
        };
        self.load_field_value(&identifier, &property)?;
        Ok(())
    }

    /// Lazy reference to one attribute of a managed entity
    ///
    /// # Errors
    ///
    /// Fails for unmanaged entities and unknown attribute names.
    pub fn lazy_ref(&self, entity: &Entity, attribute_name: &str) -> Result<LazyRef> {
        self.ensure_active()?;
        let (identifier, _) = self.managed_state(entity)?;
        let property = {
            let type_index = entity.borrow().type_index;
            self.core
                .metamodel()
                .entity_type(type_index)
                .attribute_by_name(attribute_name)?
                .property
                .clone()
        };
        Ok(LazyRef::new(identifier, property))
    }

    /// True when the named attribute of a managed entity is loaded
    ///
    /// # Errors
    ///
    /// Fails for unmanaged entities and unknown attribute names.
    pub fn is_attribute_loaded(&self, entity: &Entity, attribute_name: &str) -> Result<bool> {
        let (identifier, _) = self.managed_state(entity)?;
        let index = {
            let type_index = entity.borrow().type_index;
            self.core
                .metamodel()
                .entity_type(type_index)
                .attribute_by_name(attribute_name)?
                .index
        };
        Ok(self
            .load_states
            .get(&identifier)
            .is_some_and(|states| states.is_loaded(index)))
    }

    /// Lifecycle state of an instance relative to this unit of work
    pub fn entity_state(&self, entity: &Entity) -> EntityState {
        match self.managed_state(entity) {
            Ok((_, state)) => state,
            Err(_) => EntityState::NotManaged,
        }
    }

    /// True for managed and managed-new working copies
    pub fn is_object_managed(&self, entity: &Entity) -> bool {
        matches!(
            self.entity_state(entity),
            EntityState::Managed | EntityState::ManagedNew
        )
    }

    /// Alias of [`is_object_managed`](Self::is_object_managed)
    pub fn contains(&self, entity: &Entity) -> bool {
        self.is_object_managed(entity)
    }

    /// Stage all pending work on the connection without committing
    ///
    /// Persists new objects from their current working-copy state and,
    /// under on-commit tracking, stages the diffs of modified clones.
    ///
    /// # Errors
    ///
    /// Propagates change calculation and staging failures.
    pub fn write_uncommitted_changes(&mut self) -> Result<()> {
        self.ensure_active()?;
        self.stage_pending()?;
        Ok(())
    }

    fn stage_pending(&mut self) -> Result<bool> {
        let metamodel = Arc::clone(self.core.metamodel());
        let mut persists = Vec::new();
        let mut updates = Vec::new();
        let mut synced: Vec<(Iri, ObjectInstance)> = Vec::new();
        for (identifier, entry) in self.registry.iter() {
            match entry.state {
                EntityState::ManagedNew => {
                    let clone = entry.entity.borrow();
                    persists.push(build_persist_descriptor(
                        &metamodel,
                        identifier,
                        &clone,
                        &entry.descriptor,
                    ));
                }
                EntityState::Managed
                    if self.change_tracking == ChangeTrackingMode::OnCommit =>
                {
                    let clone = entry.entity.borrow();
                    let entity_type = metamodel.entity_type(clone.type_index);
                    let changeset = change::calculate_changes(
                        identifier,
                        entity_type,
                        &entry.original,
                        &clone,
                    )?;
                    if !changeset.is_empty() {
                        updates.push(delta_from_changeset(&changeset, &entry.descriptor));
                        synced.push((identifier.clone(), clone.clone()));
                    }
                }
                _ => {}
            }
        }
        let staged_any = !persists.is_empty() || !updates.is_empty();
        for persist in &persists {
            self.connection.persist(persist)?;
        }
        for delta in &updates {
            self.connection.update(delta)?;
        }
        for (identifier, snapshot) in synced {
            if let Some(entry) = self.registry.get_mut(&identifier) {
                entry.original = snapshot;
            }
            self.changed.insert(identifier);
        }
        if staged_any {
            self.has_changes = true;
        }
        Ok(staged_any)
    }

    /// Persist-cascaded references must resolve to a managed individual or
    /// one present in storage.
    fn validate_references(&self) -> Result<()> {
        for (identifier, entry) in self.registry.iter() {
            if entry.state == EntityState::Removed {
                continue;
            }
            if entry.state != EntityState::ManagedNew && !self.changed.contains(identifier) {
                continue;
            }
            let clone = entry.entity.borrow();
            let entity_type = self.core.metamodel().entity_type(clone.type_index);
            for (property, target) in cascade::persist_checked_references(entity_type, &clone) {
                let managed = matches!(
                    self.registry.get(&target),
                    Some(target_entry) if target_entry.state != EntityState::Removed
                );
                if managed {
                    continue;
                }
                let context = entry.descriptor.attribute_context(&property);
                if self.connection.types(&target, context.as_ref())?.is_empty() {
                    return Err(OntomapError::EntityNotManaged(format!(
                        "Attribute <{property}> of <{identifier}> references <{target}>, \
                         which is neither managed in this unit of work nor present in storage"
                    )));
                }
            }
        }
        Ok(())
    }

    /// Commit the transaction
    ///
    /// Protocol:
    /// 1. ensure the transaction is active, transition to committing
    /// 2. stage pending work (persists; on-commit diffs)
    /// 3. validate integrity constraints and cascaded references
    /// 4. flush removals
    /// 5. publish atomically through the connection
    /// 6. synchronize the shared cache (evict removed, refresh touched)
    /// 7. clear registries and notify the server session
    ///
    /// # Errors
    ///
    /// Any failure leaves the unit of work in a failed state with nothing
    /// published; call [`rollback`](Self::rollback) to discard.
    pub fn commit(&mut self) -> Result<()> {
        self.ensure_active()?;
        self.state = UowState::Committing;
        match self.commit_inner() {
            Ok(has_changes) => {
                self.clear();
                self.state = UowState::Cleared;
                self.core.transaction_finished(self.id, has_changes);
                debug!(transaction = self.id, has_changes, "commit finished");
                Ok(())
            }
            Err(err) => {
                self.state = UowState::Failed;
                warn!(transaction = self.id, error = %err, "commit failed");
                Err(err)
            }
        }
    }

    fn commit_inner(&mut self) -> Result<bool> {
        let staged = self.stage_pending()?;
        let has_changes = self.has_changes || staged;

        let metamodel = Arc::clone(self.core.metamodel());
        let mut removed: Vec<(Iri, TypeIndex, Descriptor)> = Vec::new();
        for (identifier, entry) in self.registry.iter() {
            let clone = entry.entity.borrow();
            if entry.state == EntityState::Removed {
                removed.push((identifier.clone(), clone.type_index, entry.descriptor.clone()));
                continue;
            }
            let entity_type = metamodel.entity_type(clone.type_index);
            integrity::validate_instance(entity_type, &clone)?;
            if entry.state == EntityState::ManagedNew {
                integrity::ensure_no_inferred_values(entity_type, &clone)?;
            }
        }
        self.validate_references()?;

        // Removals flush last so cascade checks ran against intact data.
        for (identifier, type_index, descriptor) in &removed {
            self.connection.remove(identifier, *type_index, descriptor)?;
        }

        self.connection.commit()?;

        let cache = self.core.cache();
        for (identifier, type_index, descriptor) in &removed {
            cache.evict(*type_index, identifier, descriptor.context());
        }
        for (identifier, entry) in self.registry.iter() {
            if entry.state == EntityState::Removed {
                continue;
            }
            if entry.state != EntityState::ManagedNew && !self.changed.contains(identifier) {
                continue;
            }
            let snapshot = entry.entity.borrow().clone();
            let load_state = match self.load_states.get(identifier) {
                Some(states) => states.clone(),
                None => LoadStateDescriptor::loaded(snapshot.slot_count()),
            };
            cache.add(snapshot, load_state, entry.descriptor.context().cloned());
        }
        Ok(has_changes)
    }

    /// Discard the transaction
    ///
    /// Allowed while active and after a failed commit.
    ///
    /// # Errors
    ///
    /// Rolling back a committed or cleared transaction is an
    /// [`OntomapError::IllegalState`].
    pub fn rollback(&mut self) -> Result<()> {
        match self.state {
            UowState::Active | UowState::Failed => {}
            _ => {
                return Err(OntomapError::illegal_state(format!(
                    "Unit of work {} cannot roll back ({:?})",
                    self.id, self.state
                )))
            }
        }
        self.state = UowState::RollingBack;
        match self.connection.rollback() {
            Ok(()) => {
                self.clear();
                self.state = UowState::Cleared;
                self.core.transaction_finished(self.id, false);
                debug!(transaction = self.id, "rolled back");
                Ok(())
            }
            Err(err) => {
                self.state = UowState::Failed;
                Err(err)
            }
        }
    }

    /// Release the unit of work; uncommitted work is rolled back
    pub fn release(self) {}

    fn clear(&mut self) {
        self.registry.clear();
        self.load_states.clear();
        self.changed.clear();
        self.has_changes = false;
    }
}

impl FieldLoader for UnitOfWork {
    fn load_field_value(&mut self, owner: &Iri, property: &Iri) -> Result<Option<Value>> {
        self.ensure_active()?;
        let (attribute, descriptor) = {
            let entry = match self.registry.get(owner) {
                Some(entry) => entry,
                None => return Err(OntomapError::EntityNotManaged(owner.to_string())),
            };
            if entry.state == EntityState::Removed {
                return Err(OntomapError::illegal_state(format!(
                    "<{owner}> is scheduled for removal"
                )));
            }
            let type_index = entry.entity.borrow().type_index;
            let entity_type = self.core.metamodel().entity_type(type_index);
            let attribute = match entity_type.attribute_by_property(property) {
                Some(attribute) => attribute.clone(),
                None => {
                    return Err(OntomapError::UnknownAttribute {
                        type_name: entity_type.name.clone(),
                        attribute: property.to_string(),
                    })
                }
            };
            (attribute, entry.descriptor.clone())
        };
        let already = self
            .load_states
            .get(owner)
            .is_some_and(|states| states.is_loaded(attribute.index));
        if already {
            let entry = match self.registry.get(owner) {
                Some(entry) => entry,
                None => return Err(OntomapError::EntityNotManaged(owner.to_string())),
            };
            return Ok(attribute.get(&entry.entity.borrow()).cloned());
        }
        let value = self.connection.load_field(owner, &attribute, &descriptor)?;
        if let Some(entry) = self.registry.get_mut(owner) {
            attribute.set_value(&mut entry.entity.borrow_mut(), value.clone())?;
            attribute.set_value(&mut entry.original, value.clone())?;
        }
        if let Some(states) = self.load_states.get_mut(owner) {
            states.set_attribute_state(attribute.index, LoadState::Loaded);
        }
        trace!(transaction = self.id, subject = %owner, property = %property,
               "lazy attribute loaded");

        // Referenced individuals become managed so navigation stays inside
        // the persistence context.
        if attribute.kind == AttributeKind::Object {
            if let (Some(target_type), Some(value)) = (attribute.target_type, value.as_ref()) {
                let targets: Vec<Iri> = value
                    .terms()
                    .into_iter()
                    .filter_map(Term::as_resource)
                    .cloned()
                    .collect();
                for target in targets {
                    if !self.registry.contains(&target) {
                        self.read_object(target_type, &target, &descriptor)?;
                    }
                }
            }
        }
        Ok(value)
    }
}

impl Drop for UnitOfWork {
    fn drop(&mut self) {
        if !matches!(self.state, UowState::Cleared) {
            let _ = self.connection.rollback();
            self.core.transaction_finished(self.id, false);
            debug!(transaction = self.id, "unit of work dropped; uncommitted work rolled back");
        }
    }
}

impl std::fmt::Debug for UnitOfWork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnitOfWork")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("managed", &self.registry.len())
            .field("has_changes", &self.has_changes)
            .finish()
    }
}

/// Axioms of a new individual: its classes plus every populated
/// non-inferred attribute, each in its descriptor-selected context.
fn build_persist_descriptor(
    metamodel: &Metamodel,
    identifier: &Iri,
    instance: &ObjectInstance,
    descriptor: &Descriptor,
) -> AxiomValueDescriptor {
    let entity_type = metamodel.entity_type(instance.type_index);
    let mut axioms = AxiomValueDescriptor::new(identifier.clone());
    let mut classes: Vec<Term> = vec![Term::Resource(entity_type.iri.clone())];
    classes.extend(instance.types.iter().cloned().map(Term::Resource));
    axioms.add_entry(Assertion::class(), descriptor.context().cloned(), classes);
    for attribute in entity_type.attributes() {
        if attribute.inferred {
            continue;
        }
        let value = match attribute.get(instance) {
            Some(value) => value,
            None => continue,
        };
        let terms: Vec<Term> = value.terms().into_iter().cloned().collect();
        axioms.add_entry(
            attribute.assertion(),
            descriptor.attribute_context(&attribute.property),
            terms,
        );
    }
    axioms
}

/// Translate a change set into storage update operations.
fn delta_from_changeset(changeset: &ObjectChangeSet, descriptor: &Descriptor) -> EntityDelta {
    let mut delta = EntityDelta::new(changeset.identifier.clone());
    for record in &changeset.records {
        let context = descriptor.attribute_context(&record.assertion.property);
        for kind in record.delta_kinds() {
            delta.push(DeltaOp {
                assertion: record.assertion.clone(),
                context: context.clone(),
                kind,
            });
        }
    }
    let class_context = descriptor.context().cloned();
    if !changeset.type_removals.is_empty() {
        delta.push(DeltaOp {
            assertion: Assertion::class(),
            context: class_context.clone(),
            kind: DeltaKind::Remove(
                changeset.type_removals.iter().cloned().map(Term::Resource).collect(),
            ),
        });
    }
    if !changeset.type_additions.is_empty() {
        delta.push(DeltaOp {
            assertion: Assertion::class(),
            context: class_context,
            kind: DeltaKind::Add(
                changeset.type_additions.iter().cloned().map(Term::Resource).collect(),
            ),
        });
    }
    delta
}
