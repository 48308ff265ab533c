//! Literal, term, and attribute value types
//!
//! This module defines the payload types flowing between sessions and
//! storage:
//! - Literal: typed RDF literal values
//! - Term: either a resource reference or a literal
//! - Value: the payload of one attribute slot (single, set, or list)

use crate::iri::Iri;
use chrono::{DateTime, Utc};
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::mem::discriminant;

/// Typed literal value
///
/// Literals participate in hash-set valued attributes, so the type must be
/// `Eq + Hash`. Doubles are compared and hashed by bit pattern; two NaNs
/// with the same payload are therefore equal, which is what set membership
/// needs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Literal {
    /// Boolean literal
    Boolean(bool),
    /// Integer literal
    Integer(i64),
    /// Double-precision float literal
    Double(f64),
    /// Plain string literal
    String(String),
    /// Language-tagged string literal
    LangString {
        /// The lexical value
        value: String,
        /// BCP 47 language tag
        language: String,
    },
    /// Timestamp literal in UTC
    DateTime(DateTime<Utc>),
}

impl PartialEq for Literal {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Literal::Boolean(a), Literal::Boolean(b)) => a == b,
            (Literal::Integer(a), Literal::Integer(b)) => a == b,
            (Literal::Double(a), Literal::Double(b)) => a.to_bits() == b.to_bits(),
            (Literal::String(a), Literal::String(b)) => a == b,
            (
                Literal::LangString {
                    value: av,
                    language: al,
                },
                Literal::LangString {
                    value: bv,
                    language: bl,
                },
            ) => av == bv && al == bl,
            (Literal::DateTime(a), Literal::DateTime(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Literal {}

impl Hash for Literal {
    fn hash<H: Hasher>(&self, state: &mut H) {
        discriminant(self).hash(state);
        match self {
            Literal::Boolean(b) => b.hash(state),
            Literal::Integer(i) => i.hash(state),
            Literal::Double(d) => d.to_bits().hash(state),
            Literal::String(s) => s.hash(state),
            Literal::LangString { value, language } => {
                value.hash(state);
                language.hash(state);
            }
            Literal::DateTime(t) => t.hash(state),
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Boolean(b) => write!(f, "{}", b),
            Literal::Integer(i) => write!(f, "{}", i),
            Literal::Double(d) => write!(f, "{}", d),
            Literal::String(s) => write!(f, "{}", s),
            Literal::LangString { value, language } => write!(f, "{}@{}", value, language),
            Literal::DateTime(t) => write!(f, "{}", t.to_rfc3339()),
        }
    }
}

impl From<bool> for Literal {
    fn from(value: bool) -> Self {
        Literal::Boolean(value)
    }
}

impl From<i64> for Literal {
    fn from(value: i64) -> Self {
        Literal::Integer(value)
    }
}

impl From<f64> for Literal {
    fn from(value: f64) -> Self {
        Literal::Double(value)
    }
}

impl From<&str> for Literal {
    fn from(value: &str) -> Self {
        Literal::String(value.to_string())
    }
}

impl From<String> for Literal {
    fn from(value: String) -> Self {
        Literal::String(value)
    }
}

/// One assertion value: a resource reference or a literal
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Term {
    /// Reference to another individual
    Resource(Iri),
    /// Literal value
    Literal(Literal),
}

impl Term {
    /// The referenced individual, when this term is a resource
    pub fn as_resource(&self) -> Option<&Iri> {
        match self {
            Term::Resource(iri) => Some(iri),
            Term::Literal(_) => None,
        }
    }

    /// True when this term references an individual
    pub fn is_resource(&self) -> bool {
        matches!(self, Term::Resource(_))
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Term::Resource(iri) => write!(f, "<{}>", iri),
            Term::Literal(lit) => write!(f, "{}", lit),
        }
    }
}

impl From<Iri> for Term {
    fn from(value: Iri) -> Self {
        Term::Resource(value)
    }
}

impl From<Literal> for Term {
    fn from(value: Literal) -> Self {
        Term::Literal(value)
    }
}

/// Payload of one attribute slot
///
/// The variant mirrors the attribute's declared cardinality: single-valued
/// attributes hold a [`Value::Single`], unordered multi-valued attributes a
/// [`Value::Set`], and ordered ones a [`Value::List`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Value {
    /// Exactly one term
    Single(Term),
    /// Unordered set of terms
    Set(FxHashSet<Term>),
    /// Ordered list of terms
    List(Vec<Term>),
}

impl Value {
    /// Build a single-valued payload
    pub fn single(term: impl Into<Term>) -> Self {
        Value::Single(term.into())
    }

    /// Build a set payload from any term collection
    pub fn set(terms: impl IntoIterator<Item = Term>) -> Self {
        Value::Set(terms.into_iter().collect())
    }

    /// Build a list payload from any term collection
    pub fn list(terms: impl IntoIterator<Item = Term>) -> Self {
        Value::List(terms.into_iter().collect())
    }

    /// The single term, when this is a [`Value::Single`]
    pub fn as_single(&self) -> Option<&Term> {
        match self {
            Value::Single(term) => Some(term),
            _ => None,
        }
    }

    /// The term set, when this is a [`Value::Set`]
    pub fn as_set(&self) -> Option<&FxHashSet<Term>> {
        match self {
            Value::Set(set) => Some(set),
            _ => None,
        }
    }

    /// The term list, when this is a [`Value::List`]
    pub fn as_list(&self) -> Option<&[Term]> {
        match self {
            Value::List(list) => Some(list),
            _ => None,
        }
    }

    /// All terms in this payload, in iteration order
    pub fn terms(&self) -> Vec<&Term> {
        match self {
            Value::Single(term) => vec![term],
            Value::Set(set) => set.iter().collect(),
            Value::List(list) => list.iter().collect(),
        }
    }

    /// Number of terms held
    pub fn len(&self) -> usize {
        match self {
            Value::Single(_) => 1,
            Value::Set(set) => set.len(),
            Value::List(list) => list.len(),
        }
    }

    /// True when no terms are held (empty set or list)
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Short label for the payload shape, used in error messages
    pub fn shape(&self) -> &'static str {
        match self {
            Value::Single(_) => "single",
            Value::Set(_) => "set",
            Value::List(_) => "list",
        }
    }
}
