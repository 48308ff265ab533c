//! Assertions and axioms
//!
//! An assertion identifies a property together with its kind and whether its
//! values are inferred by a reasoner. An axiom is one (subject, assertion,
//! value) statement, the unit the storage accessor speaks in.

use crate::iri::{vocab, Iri};
use crate::value::Term;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of property an assertion refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AssertionKind {
    /// `rdf:type` class assertion
    Class,
    /// Reference-valued property
    ObjectProperty,
    /// Literal-valued property
    DataProperty,
    /// Annotation property, accepts both references and literals
    AnnotationProperty,
}

/// Property assertion
///
/// Two assertions are equal when property, kind, and inferred flag all
/// match; an inferred assertion and its asserted twin address different
/// statement sets.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Assertion {
    /// Property IRI
    pub property: Iri,
    /// Property kind
    pub kind: AssertionKind,
    /// True when the values come from reasoning rather than explicit
    /// statements
    pub inferred: bool,
}

impl Assertion {
    /// The `rdf:type` class assertion
    pub fn class() -> Self {
        Self {
            property: vocab::rdf_type(),
            kind: AssertionKind::Class,
            inferred: false,
        }
    }

    /// An object property assertion
    pub fn object_property(property: Iri, inferred: bool) -> Self {
        Self {
            property,
            kind: AssertionKind::ObjectProperty,
            inferred,
        }
    }

    /// A data property assertion
    pub fn data_property(property: Iri, inferred: bool) -> Self {
        Self {
            property,
            kind: AssertionKind::DataProperty,
            inferred,
        }
    }

    /// An annotation property assertion
    pub fn annotation_property(property: Iri, inferred: bool) -> Self {
        Self {
            property,
            kind: AssertionKind::AnnotationProperty,
            inferred,
        }
    }

    /// True for the `rdf:type` class assertion
    pub fn is_class(&self) -> bool {
        self.kind == AssertionKind::Class
    }
}

impl fmt::Display for Assertion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.inferred {
            write!(f, "<{}> (inferred)", self.property)
        } else {
            write!(f, "<{}>", self.property)
        }
    }
}

/// One statement: subject, assertion, value
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Axiom {
    /// Subject individual
    pub subject: Iri,
    /// Property assertion
    pub assertion: Assertion,
    /// Assertion value
    pub value: Term,
}

impl Axiom {
    /// Create an axiom
    pub fn new(subject: Iri, assertion: Assertion, value: Term) -> Self {
        Self {
            subject,
            assertion,
            value,
        }
    }
}

impl fmt::Display for Axiom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}> {} {}", self.subject, self.assertion, self.value)
    }
}
