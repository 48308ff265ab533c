//! Attribute accessor tables
//!
//! Attribute reads and writes dispatch through per-attribute tables of plain
//! function pointers selected once at metamodel build time. The selection is
//! keyed by the attribute's kind and cardinality, so a write pays one
//! indirect call and no runtime type inspection.

use crate::attribute::AttributeIndex;
use crate::instance::ObjectInstance;
use ontomap_core::{Term, Value};

/// Element admissibility check, selected by attribute kind
pub(crate) type ElemCheck = fn(&Term) -> bool;

/// Slot write routine, selected by attribute cardinality
pub(crate) type SetFn =
    fn(&mut ObjectInstance, AttributeIndex, Option<Value>, ElemCheck) -> Result<(), SlotError>;

/// Slot read routine
pub(crate) type GetFn = fn(&ObjectInstance, AttributeIndex) -> Option<&Value>;

/// Why a slot write was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SlotError {
    /// Payload shape does not match the declared cardinality
    Shape {
        /// Shape the attribute requires
        expected: &'static str,
        /// Shape that was written
        got: &'static str,
    },
    /// A term failed the kind check
    Element(&'static str),
}

/// Accessor entry for one attribute
///
/// Copied into every built [`crate::attribute::Attribute`]; the function
/// pointers are the only dispatch the hot path performs.
#[derive(Debug, Clone, Copy)]
pub(crate) struct AttributeAccessor {
    pub(crate) get: GetFn,
    pub(crate) set: SetFn,
    pub(crate) elem_check: ElemCheck,
}

impl AttributeAccessor {
    /// Select the accessor for a (kind check, cardinality writer) pair
    pub(crate) fn select(elem_check: ElemCheck, set: SetFn) -> Self {
        Self {
            get: slot_get,
            set,
            elem_check,
        }
    }
}

pub(crate) fn slot_get(instance: &ObjectInstance, index: AttributeIndex) -> Option<&Value> {
    instance
        .attributes
        .get(index.as_usize())
        .and_then(|slot| slot.as_ref())
}

pub(crate) fn set_single(
    instance: &mut ObjectInstance,
    index: AttributeIndex,
    value: Option<Value>,
    elem_check: ElemCheck,
) -> Result<(), SlotError> {
    match value {
        None => {
            instance.attributes[index.as_usize()] = None;
            Ok(())
        }
        Some(Value::Single(term)) => {
            check_term(&term, elem_check)?;
            instance.attributes[index.as_usize()] = Some(Value::Single(term));
            Ok(())
        }
        Some(other) => Err(SlotError::Shape {
            expected: "single",
            got: other.shape(),
        }),
    }
}

pub(crate) fn set_set(
    instance: &mut ObjectInstance,
    index: AttributeIndex,
    value: Option<Value>,
    elem_check: ElemCheck,
) -> Result<(), SlotError> {
    match value {
        None => {
            instance.attributes[index.as_usize()] = None;
            Ok(())
        }
        Some(Value::Set(terms)) => {
            for term in &terms {
                check_term(term, elem_check)?;
            }
            instance.attributes[index.as_usize()] = Some(Value::Set(terms));
            Ok(())
        }
        Some(other) => Err(SlotError::Shape {
            expected: "set",
            got: other.shape(),
        }),
    }
}

pub(crate) fn set_list(
    instance: &mut ObjectInstance,
    index: AttributeIndex,
    value: Option<Value>,
    elem_check: ElemCheck,
) -> Result<(), SlotError> {
    match value {
        None => {
            instance.attributes[index.as_usize()] = None;
            Ok(())
        }
        Some(Value::List(terms)) => {
            for term in &terms {
                check_term(term, elem_check)?;
            }
            instance.attributes[index.as_usize()] = Some(Value::List(terms));
            Ok(())
        }
        Some(other) => Err(SlotError::Shape {
            expected: "list",
            got: other.shape(),
        }),
    }
}

fn check_term(term: &Term, elem_check: ElemCheck) -> Result<(), SlotError> {
    if elem_check(term) {
        Ok(())
    } else {
        Err(SlotError::Element(match term {
            Term::Resource(_) => "resource term not admissible for this attribute",
            Term::Literal(_) => "literal term not admissible for this attribute",
        }))
    }
}

pub(crate) fn check_data(term: &Term) -> bool {
    matches!(term, Term::Literal(_))
}

pub(crate) fn check_object(term: &Term) -> bool {
    matches!(term, Term::Resource(_))
}

pub(crate) fn check_annotation(_term: &Term) -> bool {
    true
}
