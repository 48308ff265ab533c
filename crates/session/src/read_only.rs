//! Read-only unit of work
//!
//! A [`ReadOnlyUnitOfWork`] hands out the loaded originals themselves
//! instead of clones: no diffing, no change staging, no commit flush.
//! Reads go registry, then the shared cache, then storage, and loaded
//! state is never written back to the shared cache. Every mutating
//! operation fails fast with [`OntomapError::UnsupportedOperation`].

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use ontomap_core::{Descriptor, Iri, OntomapError, Result, Term, Value};
use ontomap_metamodel::{AttributeKind, LoadState, LoadStateDescriptor, ObjectInstance, TypeIndex};
use ontomap_storage::{LoadingParameters, StorageConnection};
use rustc_hash::FxHashMap;
use tracing::{debug, trace};

use crate::lazy::{FieldLoader, LazyRef};
use crate::registry::{Entity, LoadStateRegistry};
use crate::server_session::SessionCore;

/// One read-only transaction over the repository
pub struct ReadOnlyUnitOfWork {
    core: Arc<SessionCore>,
    id: u64,
    connection: Box<dyn StorageConnection>,
    originals: FxHashMap<Iri, Entity>,
    descriptors: FxHashMap<Iri, Descriptor>,
    load_states: LoadStateRegistry,
    active: bool,
}

impl ReadOnlyUnitOfWork {
    pub(crate) fn new(
        core: Arc<SessionCore>,
        id: u64,
        connection: Box<dyn StorageConnection>,
    ) -> Self {
        Self {
            core,
            id,
            connection,
            originals: FxHashMap::default(),
            descriptors: FxHashMap::default(),
            load_states: LoadStateRegistry::default(),
            active: true,
        }
    }

    /// Transaction identifier assigned by the server session
    pub fn id(&self) -> u64 {
        self.id
    }

    fn ensure_active(&self) -> Result<()> {
        if !self.active {
            return Err(OntomapError::illegal_state(format!(
                "Read-only unit of work {} is not active",
                self.id
            )));
        }
        Ok(())
    }

    fn check_compatible(
        &self,
        existing: &Entity,
        requested: TypeIndex,
        descriptor: &Descriptor,
        identifier: &Iri,
    ) -> Result<()> {
        let stored = existing.borrow().type_index;
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
        let same = self
            .descriptors
            .get(identifier)
            .is_some_and(|registered| registered.same_context(descriptor));
        if !same {
            return Err(OntomapError::IdentityConflict {
                identifier: identifier.to_string(),
                detail: "already managed in a different repository context".to_string(),
            });
        }
        Ok(())
    }

    /// Shared-cache-then-storage load; the shared cache is never seeded.
    fn fetch(
        &mut self,
        params: &LoadingParameters,
    ) -> Result<Option<(ObjectInstance, LoadStateDescriptor)>> {
        let cached = self.core.cache().try_read_lock().and_then(|guard| {
            guard.get(params.type_index, &params.identifier, params.descriptor.context())
        });
        if let Some(hit) = cached {
            trace!(subject = %params.identifier, "cache hit");
            return Ok(Some(hit));
        }
        match self.connection.find(params)? {
            Some(loaded) => Ok(Some((loaded.instance, loaded.load_state))),
            None => Ok(None),
        }
    }

    fn register(
        &mut self,
        identifier: Iri,
        instance: ObjectInstance,
        load_state: LoadStateDescriptor,
        descriptor: Descriptor,
    ) -> Entity {
        let entity: Entity = Rc::new(RefCell::new(instance));
        self.load_states.insert(identifier.clone(), load_state);
        self.descriptors.insert(identifier.clone(), descriptor);
        self.originals.insert(identifier, Rc::clone(&entity));
        entity
    }

    /// Read an individual as an instance of `type_index`
    ///
    /// A repeated read returns the same original.
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
        if let Some(existing) = self.originals.get(identifier) {
            self.check_compatible(existing, type_index, descriptor, identifier)?;
            return Ok(Some(Rc::clone(existing)));
        }
        let params = LoadingParameters::new(identifier.clone(), type_index, descriptor.clone());
        let (instance, load_state) = match self.fetch(&params)? {
            Some(found) => found,
            None => return Ok(None),
        };
        Ok(Some(self.register(
            identifier.clone(),
            instance,
            load_state,
            descriptor.clone(),
        )))
    }

    /// Register an instance assumed to exist in storage; idempotent
    ///
    /// # Errors
    ///
    /// Fails on identifier-less instances and incompatible prior
    /// registrations.
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
        if let Some(existing) = self.originals.get(&identifier) {
            self.check_compatible(existing, instance.type_index, descriptor, &identifier)?;
            return Ok(Rc::clone(existing));
        }
        let slots = instance.slot_count();
        Ok(self.register(
            identifier,
            instance,
            LoadStateDescriptor::loaded(slots),
            descriptor.clone(),
        ))
    }

    /// Load one attribute of a managed original by name
    ///
    /// # Errors
    ///
    /// Fails for unmanaged entities and unknown attribute names.
    pub fn load_entity_field(&mut self, entity: &Entity, attribute_name: &str) -> Result<()> {
        self.ensure_active()?;
        let identifier = self.managed_identifier(entity)?;
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

    /// Lazy reference to one attribute of a managed original
    ///
    /// # Errors
    ///
    /// Fails for unmanaged entities and unknown attribute names.
    pub fn lazy_ref(&self, entity: &Entity, attribute_name: &str) -> Result<LazyRef> {
        self.ensure_active()?;
        let identifier = self.managed_identifier(entity)?;
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

    /// True when the named attribute of a managed original is loaded
    ///
    /// # Errors
    ///
    /// Fails for unmanaged entities and unknown attribute names.
    pub fn is_attribute_loaded(&self, entity: &Entity, attribute_name: &str) -> Result<bool> {
        let identifier = self.managed_identifier(entity)?;
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

    fn managed_identifier(&self, entity: &Entity) -> Result<Iri> {
        let identifier = match entity.borrow().identifier().cloned() {
            Some(identifier) => identifier,
            None => {
                return Err(OntomapError::EntityNotManaged(
                    "instance has no identifier".to_string(),
                ))
            }
        };
        match self.originals.get(&identifier) {
            Some(existing) if Rc::ptr_eq(existing, entity) => Ok(identifier),
            _ => Err(OntomapError::EntityNotManaged(format!(
                "<{identifier}> is not managed by this unit of work"
            ))),
        }
    }

    /// True when the argument is an original managed here
    pub fn is_object_managed(&self, entity: &Entity) -> bool {
        self.managed_identifier(entity).is_ok()
    }

    /// Alias of [`is_object_managed`](Self::is_object_managed)
    pub fn contains(&self, entity: &Entity) -> bool {
        self.is_object_managed(entity)
    }

    /// Rejected: read-only transactions cannot persist
    ///
    /// # Errors
    ///
    /// Always [`OntomapError::UnsupportedOperation`].
    pub fn register_new_object(
        &mut self,
        _instance: ObjectInstance,
        _descriptor: &Descriptor,
    ) -> Result<Entity> {
        Err(OntomapError::unsupported("register_new_object"))
    }

    /// Rejected: read-only transactions cannot remove
    ///
    /// # Errors
    ///
    /// Always [`OntomapError::UnsupportedOperation`].
    pub fn remove_object(&mut self, _entity: &Entity) -> Result<()> {
        Err(OntomapError::unsupported("remove_object"))
    }

    /// Rejected: read-only transactions track no changes
    ///
    /// # Errors
    ///
    /// Always [`OntomapError::UnsupportedOperation`].
    pub fn attribute_changed(&mut self, _entity: &Entity, _attribute_name: &str) -> Result<()> {
        Err(OntomapError::unsupported("attribute_changed"))
    }

    /// Rejected: read-only transactions cannot merge
    ///
    /// # Errors
    ///
    /// Always [`OntomapError::UnsupportedOperation`].
    pub fn merge_detached(
        &mut self,
        _instance: ObjectInstance,
        _descriptor: &Descriptor,
    ) -> Result<Entity> {
        Err(OntomapError::unsupported("merge_detached"))
    }

    /// Rejected: read-only transactions have nothing to flush
    ///
    /// # Errors
    ///
    /// Always [`OntomapError::UnsupportedOperation`].
    pub fn write_uncommitted_changes(&mut self) -> Result<()> {
        Err(OntomapError::unsupported("write_uncommitted_changes"))
    }

    /// Rejected: there is no state to roll back
    ///
    /// # Errors
    ///
    /// Always [`OntomapError::UnsupportedOperation`].
    pub fn rollback(&mut self) -> Result<()> {
        Err(OntomapError::unsupported("rollback"))
    }

    /// End the transaction; nothing is flushed
    ///
    /// # Errors
    ///
    /// Committing twice is an [`OntomapError::IllegalState`].
    pub fn commit(&mut self) -> Result<()> {
        self.ensure_active()?;
        self.originals.clear();
        self.descriptors.clear();
        self.load_states.clear();
        self.active = false;
        self.core.transaction_finished(self.id, false);
        debug!(transaction = self.id, "read-only transaction finished");
        Ok(())
    }

    /// Release the unit of work
    pub fn release(self) {}
}

impl FieldLoader for ReadOnlyUnitOfWork {
    fn load_field_value(&mut self, owner: &Iri, property: &Iri) -> Result<Option<Value>> {
        self.ensure_active()?;
        let (attribute, descriptor) = {
            let entity = match self.originals.get(owner) {
                Some(entity) => entity,
                None => return Err(OntomapError::EntityNotManaged(owner.to_string())),
            };
            let type_index = entity.borrow().type_index;
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
            let descriptor = match self.descriptors.get(owner) {
                Some(descriptor) => descriptor.clone(),
                None => Descriptor::new(),
            };
            (attribute, descriptor)
        };
        let already = self
            .load_states
            .get(owner)
            .is_some_and(|states| states.is_loaded(attribute.index));
        if already {
            let entity = match self.originals.get(owner) {
                Some(entity) => entity,
                None => return Err(OntomapError::EntityNotManaged(owner.to_string())),
            };
            return Ok(attribute.get(&entity.borrow()).cloned());
        }
        let value = self.connection.load_field(owner, &attribute, &descriptor)?;
        if let Some(entity) = self.originals.get(owner) {
            attribute.set_value(&mut entity.borrow_mut(), value.clone())?;
        }
        if let Some(states) = self.load_states.get_mut(owner) {
            states.set_attribute_state(attribute.index, LoadState::Loaded);
        }
        trace!(transaction = self.id, subject = %owner, property = %property,
               "lazy attribute loaded");
        if attribute.kind == AttributeKind::Object {
            if let (Some(target_type), Some(value)) = (attribute.target_type, value.as_ref()) {
                let targets: Vec<Iri> = value
                    .terms()
                    .into_iter()
                    .filter_map(Term::as_resource)
                    .cloned()
                    .collect();
                for target in targets {
                    if !self.originals.contains_key(&target) {
                        self.read_object(target_type, &target, &descriptor)?;
                    }
                }
            }
        }
        Ok(value)
    }
}

impl Drop for ReadOnlyUnitOfWork {
    fn drop(&mut self) {
        if self.active {
            self.core.transaction_finished(self.id, false);
            debug!(transaction = self.id, "read-only unit of work dropped");
        }
    }
}

impl std::fmt::Debug for ReadOnlyUnitOfWork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadOnlyUnitOfWork")
            .field("id", &self.id)
            .field("active", &self.active)
            .field("managed", &self.originals.len())
            .finish()
    }
}
