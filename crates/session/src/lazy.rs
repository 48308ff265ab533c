//! Lazy attribute references
//!
//! A [`LazyRef`] stands in for an attribute value that has not been fetched
//! yet. The contract:
//! - [`LazyRef::is_loaded`] never touches storage
//! - [`LazyRef::trigger`] fetches on first call and is a no-op afterwards,
//!   so N triggers cost exactly one storage read
//! - [`LazyRef::loaded_value`] before a trigger is an error, never an
//!   implicit fetch
//!
//! Clones share their load cell, so triggering any clone satisfies all of
//! them.

use std::rc::Rc;

use once_cell::unsync::OnceCell;
use ontomap_core::{Iri, OntomapError, Result, Value};

/// Source a lazy reference pulls its value from
pub trait FieldLoader {
    /// Fetch the current value of `property` on `owner`
    ///
    /// # Errors
    ///
    /// Propagates storage errors; fails when `owner` is not managed.
    fn load_field_value(&mut self, owner: &Iri, property: &Iri) -> Result<Option<Value>>;
}

/// Unloaded reference to one attribute of one individual
#[derive(Debug, Clone)]
pub struct LazyRef {
    owner: Iri,
    property: Iri,
    cell: Rc<OnceCell<Option<Value>>>,
}

impl LazyRef {
    pub(crate) fn new(owner: Iri, property: Iri) -> Self {
        Self {
            owner,
            property,
            cell: Rc::new(OnceCell::new()),
        }
    }

    /// Individual this reference belongs to
    pub fn owner(&self) -> &Iri {
        &self.owner
    }

    /// Property this reference resolves
    pub fn property(&self) -> &Iri {
        &self.property
    }

    /// True once a trigger has run
    pub fn is_loaded(&self) -> bool {
        self.cell.get().is_some()
    }

    /// Fetch the value unless it is already present
    ///
    /// # Errors
    ///
    /// Propagates the loader's error; the reference stays unloaded so the
    /// trigger can be retried.
    pub fn trigger(&self, loader: &mut impl FieldLoader) -> Result<()> {
        if self.is_loaded() {
            return Ok(());
        }
        let value = loader.load_field_value(&self.owner, &self.property)?;
        let _ = self.cell.set(value);
        Ok(())
    }

    /// Trigger if necessary, then return the value
    ///
    /// # Errors
    ///
    /// Propagates the loader's error on the first call.
    pub fn resolve(&self, loader: &mut impl FieldLoader) -> Result<Option<&Value>> {
        self.trigger(loader)?;
        self.loaded_value()
    }

    /// The fetched value; `None` when storage holds nothing
    ///
    /// # Errors
    ///
    /// Returns [`OntomapError::IllegalState`] when no trigger has run yet.
    pub fn loaded_value(&self) -> Result<Option<&Value>> {
        match self.cell.get() {
            Some(value) => Ok(value.as_ref()),
            None => Err(OntomapError::illegal_state(format!(
                "Lazy attribute <{}> of <{}> has not been loaded; trigger the reference first",
                self.property, self.owner
            ))),
        }
    }
}
