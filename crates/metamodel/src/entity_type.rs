//! Entity type declarations and their built form
//!
//! Entity types form a DAG: a type may extend several supertypes, and the
//! builder materializes subtype edges plus the full descendant closure so
//! polymorphic resolution never walks the graph more than once per load.

use crate::attribute::{Attribute, AttributeIndex};
use ontomap_core::{Iri, OntomapError, Result};
use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;

use crate::attribute::AttributeSpec;

/// Dense index of an entity type in the built metamodel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeIndex(u32);

impl TypeIndex {
    /// Wrap a raw index
    pub fn new(index: u32) -> Self {
        Self(index)
    }

    /// The raw index
    pub fn as_usize(&self) -> usize {
        self.0 as usize
    }
}

/// Declarative entity type description
#[derive(Debug, Clone)]
pub struct EntityTypeSpec {
    /// Type name, unique within the metamodel
    pub name: String,
    /// Mapped class IRI
    pub iri: Iri,
    /// Abstract types are traversed during resolution but never instantiated
    pub abstract_type: bool,
    /// Names of extended entity types
    pub supertypes: Vec<String>,
    /// Declared attributes, in slot order after inherited ones
    pub attributes: Vec<AttributeSpec>,
}

impl EntityTypeSpec {
    /// Declare an entity type mapped to a class IRI
    pub fn new(name: &str, iri: &str) -> Self {
        Self {
            name: name.to_string(),
            iri: Iri::new(iri),
            abstract_type: false,
            supertypes: Vec::new(),
            attributes: Vec::new(),
        }
    }

    /// Mark the type abstract
    pub fn abstract_entity(mut self) -> Self {
        self.abstract_type = true;
        self
    }

    /// Extend the named entity type
    pub fn extends(mut self, supertype: &str) -> Self {
        self.supertypes.push(supertype.to_string());
        self
    }

    /// Declare an attribute
    pub fn with_attribute(mut self, attribute: AttributeSpec) -> Self {
        self.attributes.push(attribute);
        self
    }
}

/// Built entity type
///
/// The attribute table is flattened: inherited attributes come first in
/// supertype declaration order, own declarations after, and
/// [`AttributeIndex`] values address this table. Instances of this type
/// allocate exactly `slot_count()` value slots.
#[derive(Debug, Clone)]
pub struct EntityType {
    /// Type name
    pub name: String,
    /// Mapped class IRI
    pub iri: Iri,
    /// Abstract types are never resolved as load targets
    pub abstract_type: bool,
    /// This type's index in the metamodel
    pub index: TypeIndex,
    pub(crate) supertypes: SmallVec<[TypeIndex; 4]>,
    pub(crate) subtypes: SmallVec<[TypeIndex; 4]>,
    pub(crate) descendants: FxHashSet<TypeIndex>,
    pub(crate) attributes: Vec<Attribute>,
    pub(crate) by_name: FxHashMap<String, AttributeIndex>,
    pub(crate) by_property: FxHashMap<Iri, AttributeIndex>,
}

impl EntityType {
    /// Number of attribute slots instances of this type allocate
    pub fn slot_count(&self) -> usize {
        self.attributes.len()
    }

    /// Attribute at the given slot
    ///
    /// # Panics
    ///
    /// Panics when the index does not address this type's table; indices
    /// are only ever produced by lookups on the same type.
    pub fn attribute(&self, index: AttributeIndex) -> &Attribute {
        &self.attributes[index.as_usize()]
    }

    /// All attributes in slot order
    pub fn attributes(&self) -> impl Iterator<Item = &Attribute> {
        self.attributes.iter()
    }

    /// Look up an attribute by name
    ///
    /// # Errors
    ///
    /// Returns [`OntomapError::UnknownAttribute`] when the type declares no
    /// such attribute.
    pub fn attribute_by_name(&self, name: &str) -> Result<&Attribute> {
        self.by_name
            .get(name)
            .map(|idx| self.attribute(*idx))
            .ok_or_else(|| OntomapError::UnknownAttribute {
                type_name: self.name.clone(),
                attribute: name.to_string(),
            })
    }

    /// Look up an attribute by its mapped property IRI
    pub fn attribute_by_property(&self, property: &Iri) -> Option<&Attribute> {
        self.by_property.get(property).map(|idx| self.attribute(*idx))
    }

    /// Direct supertypes
    pub fn supertypes(&self) -> &[TypeIndex] {
        &self.supertypes
    }

    /// Direct subtypes
    pub fn subtypes(&self) -> &[TypeIndex] {
        &self.subtypes
    }

    /// True when `other` is a strict descendant of this type
    pub fn has_descendant(&self, other: TypeIndex) -> bool {
        self.descendants.contains(&other)
    }
}
