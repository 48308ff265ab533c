//! Entity descriptors
//!
//! A descriptor names the repository context an entity lives in and any
//! per-attribute context overrides. The descriptor used to load an entity is
//! recorded with it for the lifetime of the persistence context, so lazy
//! loads and flushes read and write the same graphs the original load did.

use crate::iri::Iri;
use rustc_hash::FxHashMap;

/// Repository context selector for one entity
///
/// `context == None` addresses the default graph. Attribute overrides come
/// in two forms: a missing entry means the attribute inherits the entity
/// context, while an explicit `None` entry pins the attribute to the
/// default graph even when the entity lives elsewhere.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Descriptor {
    context: Option<Iri>,
    attribute_contexts: FxHashMap<Iri, Option<Iri>>,
}

impl Descriptor {
    /// Descriptor for the default graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Descriptor for a named context
    pub fn in_context(context: Iri) -> Self {
        Self {
            context: Some(context),
            attribute_contexts: FxHashMap::default(),
        }
    }

    /// The entity context, `None` for the default graph
    pub fn context(&self) -> Option<&Iri> {
        self.context.as_ref()
    }

    /// Override the context of one attribute
    ///
    /// Passing `None` pins the attribute to the default graph; omitting the
    /// call leaves the attribute in the entity context.
    pub fn set_attribute_context(&mut self, property: Iri, context: Option<Iri>) -> &mut Self {
        self.attribute_contexts.insert(property, context);
        self
    }

    /// Builder-style variant of [`Descriptor::set_attribute_context`]
    pub fn with_attribute_context(mut self, property: Iri, context: Option<Iri>) -> Self {
        self.attribute_contexts.insert(property, context);
        self
    }

    /// Resolve the context a property is read from and written to
    pub fn attribute_context(&self, property: &Iri) -> Option<Iri> {
        match self.attribute_contexts.get(property) {
            Some(overridden) => overridden.clone(),
            None => self.context.clone(),
        }
    }

    /// True when the other descriptor addresses the same entity context
    ///
    /// Attribute overrides do not participate: two loads of one individual
    /// may refine attribute placement differently without clashing.
    pub fn same_context(&self, other: &Descriptor) -> bool {
        self.context == other.context
    }

    /// Every context this descriptor addresses: the entity context plus all
    /// distinct attribute overrides
    ///
    /// Removal uses this set to drop an individual's statements from each
    /// graph the descriptor may have written to.
    pub fn all_contexts(&self) -> Vec<Option<Iri>> {
        let mut contexts = vec![self.context.clone()];
        for overridden in self.attribute_contexts.values() {
            if !contexts.contains(overridden) {
                contexts.push(overridden.clone());
            }
        }
        contexts
    }
}
