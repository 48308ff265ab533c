//! Attribute declarations and their built form
//!
//! An [`AttributeSpec`] is what application code declares; the builder turns
//! it into an [`Attribute`] with a resolved slot index, a resolved target
//! type, and a bound accessor.

use crate::accessor::{AttributeAccessor, SlotError};
use crate::entity_type::TypeIndex;
use crate::instance::ObjectInstance;
use ontomap_core::{Assertion, Iri, OntomapError, Result, Value};

/// Kind of property an attribute maps to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttributeKind {
    /// Literal-valued property
    Data,
    /// Reference-valued property
    Object,
    /// Annotation property, accepts both references and literals
    Annotation,
}

/// Declared cardinality of an attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Cardinality {
    /// At most one value
    Single,
    /// Unordered values
    Set,
    /// Ordered values
    List,
}

/// Participation constraint checked during commit validation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParticipationConstraint {
    /// Minimum number of values the individual must keep
    pub min: u32,
    /// Maximum number of values, unbounded when `None`
    pub max: Option<u32>,
}

/// Cascade behavior over an object attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Cascade {
    /// Referenced individuals must be managed or persistent at flush time
    pub persist: bool,
    /// Removing the owner also removes referenced managed individuals
    pub remove: bool,
}

/// Position of an attribute in its entity type's slot table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AttributeIndex(u32);

impl AttributeIndex {
    /// Wrap a raw slot position
    pub fn new(index: u32) -> Self {
        Self(index)
    }

    /// The raw slot position
    pub fn as_usize(&self) -> usize {
        self.0 as usize
    }
}

/// Declarative attribute description
#[derive(Debug, Clone)]
pub struct AttributeSpec {
    /// Attribute name, unique within its entity type
    pub name: String,
    /// Mapped property IRI
    pub property: Iri,
    /// Property kind
    pub kind: AttributeKind,
    /// Declared cardinality
    pub cardinality: Cardinality,
    /// Load on first access instead of at entity load
    pub lazy: bool,
    /// Values come from reasoning; the attribute is read-only
    pub inferred: bool,
    /// Entity type name referenced values resolve to (object attributes)
    pub target: Option<String>,
    /// Optional participation constraint
    pub constraint: Option<ParticipationConstraint>,
    /// Cascade behavior (object attributes)
    pub cascade: Cascade,
}

impl AttributeSpec {
    fn new(name: &str, property: &str, kind: AttributeKind) -> Self {
        Self {
            name: name.to_string(),
            property: Iri::new(property),
            kind,
            cardinality: Cardinality::Single,
            lazy: false,
            inferred: false,
            target: None,
            constraint: None,
            cascade: Cascade::default(),
        }
    }

    /// Declare a data attribute
    pub fn data(name: &str, property: &str) -> Self {
        Self::new(name, property, AttributeKind::Data)
    }

    /// Declare an object attribute referencing the named entity type
    pub fn object(name: &str, property: &str, target: &str) -> Self {
        let mut spec = Self::new(name, property, AttributeKind::Object);
        spec.target = Some(target.to_string());
        spec
    }

    /// Declare an annotation attribute
    pub fn annotation(name: &str, property: &str) -> Self {
        Self::new(name, property, AttributeKind::Annotation)
    }

    /// Set the cardinality
    pub fn with_cardinality(mut self, cardinality: Cardinality) -> Self {
        self.cardinality = cardinality;
        self
    }

    /// Mark the attribute lazily loaded
    pub fn lazy(mut self) -> Self {
        self.lazy = true;
        self
    }

    /// Mark the attribute inferred (read-only)
    pub fn inferred(mut self) -> Self {
        self.inferred = true;
        self
    }

    /// Attach a participation constraint
    pub fn with_constraint(mut self, min: u32, max: Option<u32>) -> Self {
        self.constraint = Some(ParticipationConstraint { min, max });
        self
    }

    /// Set cascade behavior
    pub fn cascading(mut self, persist: bool, remove: bool) -> Self {
        self.cascade = Cascade { persist, remove };
        self
    }
}

/// Built attribute bound to its entity type
#[derive(Debug, Clone)]
pub struct Attribute {
    /// Attribute name
    pub name: String,
    /// Mapped property IRI
    pub property: Iri,
    /// Property kind
    pub kind: AttributeKind,
    /// Declared cardinality
    pub cardinality: Cardinality,
    /// Load on first access instead of at entity load
    pub lazy: bool,
    /// Values come from reasoning; the attribute is read-only
    pub inferred: bool,
    /// Slot index in the declaring entity type's table
    pub index: AttributeIndex,
    /// Entity type that declared this attribute
    pub declared_by: TypeIndex,
    /// Resolved target entity type (object attributes)
    pub target_type: Option<TypeIndex>,
    /// Optional participation constraint
    pub constraint: Option<ParticipationConstraint>,
    /// Cascade behavior
    pub cascade: Cascade,
    pub(crate) accessor: AttributeAccessor,
}

impl Attribute {
    /// The storage assertion this attribute reads and writes
    pub fn assertion(&self) -> Assertion {
        match self.kind {
            AttributeKind::Data => Assertion::data_property(self.property.clone(), self.inferred),
            AttributeKind::Object => {
                Assertion::object_property(self.property.clone(), self.inferred)
            }
            AttributeKind::Annotation => {
                Assertion::annotation_property(self.property.clone(), self.inferred)
            }
        }
    }

    /// Read this attribute's slot
    pub fn get<'a>(&self, instance: &'a ObjectInstance) -> Option<&'a Value> {
        (self.accessor.get)(instance, self.index)
    }

    /// Write this attribute's slot, validating payload shape and term kinds
    ///
    /// # Errors
    ///
    /// Returns [`OntomapError::InvalidValue`] when the payload shape does
    /// not match the declared cardinality or a term fails the kind check.
    pub fn set_value(&self, instance: &mut ObjectInstance, value: Option<Value>) -> Result<()> {
        (self.accessor.set)(instance, self.index, value, self.accessor.elem_check).map_err(
            |err| match err {
                SlotError::Shape { expected, got } => OntomapError::InvalidValue {
                    attribute: self.property.to_string(),
                    detail: format!("expected a {} payload, got {}", expected, got),
                },
                SlotError::Element(detail) => OntomapError::InvalidValue {
                    attribute: self.property.to_string(),
                    detail: detail.to_string(),
                },
            },
        )
    }
}
