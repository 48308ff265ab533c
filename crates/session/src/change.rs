//! Change calculation
//!
//! The calculator diffs a working copy against its pristine original and
//! produces per-attribute change records:
//! - Single-valued attributes yield a scalar old/new pair
//! - Set-valued attributes yield the symmetric difference, never a full
//!   replacement
//! - List-valued attributes yield a minimal edit script over the longest
//!   common subsequence
//!
//! Any detected change on a reasoner-inferred attribute aborts the
//! calculation; inferred values are read-only.

use ontomap_core::{Assertion, Iri, OntomapError, Result, Term, Value};
use ontomap_metamodel::{Attribute, AttributeIndex, Cardinality, EntityType, ObjectInstance, TypeIndex};
use ontomap_storage::{DeltaKind, ListOp};
use rustc_hash::FxHashSet;

/// Change detected on one attribute slot
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributeChange {
    /// Single-valued transition; `None` means the value is absent
    Scalar {
        /// Value before the change
        old: Option<Term>,
        /// Value after the change
        new: Option<Term>,
    },
    /// Set-valued symmetric difference
    SetDelta {
        /// Members present only in the working copy
        additions: Vec<Term>,
        /// Members present only in the original
        removals: Vec<Term>,
    },
    /// List-valued edit script; removals first, then inserts
    ListEdit {
        /// Edit operations in application order
        script: Vec<ListOp>,
    },
}

/// One attribute's change, bound to its storage assertion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeRecord {
    /// Slot index in the entity type's attribute table
    pub attribute: AttributeIndex,
    /// Assertion the change writes to
    pub assertion: Assertion,
    /// The detected change
    pub change: AttributeChange,
}

impl ChangeRecord {
    /// Storage update operations realizing this change
    ///
    /// A set delta maps to up to two operations, removals before additions.
    pub fn delta_kinds(&self) -> Vec<DeltaKind> {
        match &self.change {
            AttributeChange::Scalar { new: Some(term), .. } => {
                vec![DeltaKind::Replace(vec![term.clone()])]
            }
            AttributeChange::Scalar { new: None, .. } => vec![DeltaKind::Clear],
            AttributeChange::SetDelta {
                additions,
                removals,
            } => {
                let mut kinds = Vec::with_capacity(2);
                if !removals.is_empty() {
                    kinds.push(DeltaKind::Remove(removals.clone()));
                }
                if !additions.is_empty() {
                    kinds.push(DeltaKind::Add(additions.clone()));
                }
                kinds
            }
            AttributeChange::ListEdit { script } => vec![DeltaKind::ListEdit(script.clone())],
        }
    }
}

/// All changes of one managed individual
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectChangeSet {
    /// The changed individual
    pub identifier: Iri,
    /// Its resolved entity type
    pub type_index: TypeIndex,
    /// Per-attribute changes
    pub records: Vec<ChangeRecord>,
    /// Additional class IRIs asserted by the working copy
    pub type_additions: Vec<Iri>,
    /// Additional class IRIs retracted by the working copy
    pub type_removals: Vec<Iri>,
}

impl ObjectChangeSet {
    /// True when nothing changed
    pub fn is_empty(&self) -> bool {
        self.records.is_empty() && self.type_additions.is_empty() && self.type_removals.is_empty()
    }
}

/// Diff one attribute slot of the working copy against the original
///
/// # Errors
///
/// Returns [`OntomapError::InferredAttributeModified`] when the attribute is
/// inferred and its value differs.
pub fn attribute_change(
    attribute: &Attribute,
    original: &ObjectInstance,
    current: &ObjectInstance,
) -> Result<Option<ChangeRecord>> {
    let old = attribute.get(original);
    let new = attribute.get(current);

    let change = match attribute.cardinality {
        Cardinality::Single => {
            let old_term = old.and_then(Value::as_single);
            let new_term = new.and_then(Value::as_single);
            if old_term == new_term {
                None
            } else {
                Some(AttributeChange::Scalar {
                    old: old_term.cloned(),
                    new: new_term.cloned(),
                })
            }
        }
        Cardinality::Set => {
            let empty = FxHashSet::default();
            let old_set = old.and_then(Value::as_set).unwrap_or(&empty);
            let new_set = new.and_then(Value::as_set).unwrap_or(&empty);
            let additions: Vec<Term> = new_set.difference(old_set).cloned().collect();
            let removals: Vec<Term> = old_set.difference(new_set).cloned().collect();
            if additions.is_empty() && removals.is_empty() {
                None
            } else {
                Some(AttributeChange::SetDelta {
                    additions,
                    removals,
                })
            }
        }
        Cardinality::List => {
            let old_list = old.and_then(Value::as_list).unwrap_or(&[]);
            let new_list = new.and_then(Value::as_list).unwrap_or(&[]);
            let script = list_diff(old_list, new_list);
            if script.is_empty() {
                None
            } else {
                Some(AttributeChange::ListEdit { script })
            }
        }
    };

    if change.is_some() && attribute.inferred {
        return Err(OntomapError::InferredAttributeModified {
            attribute: attribute.property.to_string(),
        });
    }
    Ok(change.map(|change| ChangeRecord {
        attribute: attribute.index,
        assertion: attribute.assertion(),
        change,
    }))
}

/// Diff a whole working copy against its original
///
/// # Errors
///
/// Returns [`OntomapError::InferredAttributeModified`] when any inferred
/// attribute was modified.
pub fn calculate_changes(
    identifier: &Iri,
    entity_type: &EntityType,
    original: &ObjectInstance,
    current: &ObjectInstance,
) -> Result<ObjectChangeSet> {
    let mut records = Vec::new();
    for attribute in entity_type.attributes() {
        if let Some(record) = attribute_change(attribute, original, current)? {
            records.push(record);
        }
    }
    let type_additions: Vec<Iri> = current.types.difference(&original.types).cloned().collect();
    let type_removals: Vec<Iri> = original.types.difference(&current.types).cloned().collect();
    Ok(ObjectChangeSet {
        identifier: identifier.clone(),
        type_index: current.type_index,
        records,
        type_additions,
        type_removals,
    })
}

/// Minimal edit script turning `old` into `new`
///
/// The script keeps the longest common subsequence in place. Removal
/// indices address the old list and are emitted in descending order, so
/// applying them in sequence never shifts a pending index; insert indices
/// address the list being built and are emitted ascending.
pub(crate) fn list_diff(old: &[Term], new: &[Term]) -> Vec<ListOp> {
    if old == new {
        return Vec::new();
    }
    let n = old.len();
    let m = new.len();
    let mut lcs = vec![vec![0u32; m + 1]; n + 1];
    for i in (0..n).rev() {
        for j in (0..m).rev() {
            lcs[i][j] = if old[i] == new[j] {
                lcs[i + 1][j + 1] + 1
            } else {
                lcs[i + 1][j].max(lcs[i][j + 1])
            };
        }
    }

    let mut removals = Vec::new();
    let mut inserts = Vec::new();
    let (mut i, mut j) = (0, 0);
    while i < n && j < m {
        if old[i] == new[j] {
            i += 1;
            j += 1;
        } else if lcs[i + 1][j] >= lcs[i][j + 1] {
            removals.push(i);
            i += 1;
        } else {
            inserts.push(j);
            j += 1;
        }
    }
    removals.extend(i..n);
    inserts.extend(j..m);

    let mut script: Vec<ListOp> = removals
        .into_iter()
        .rev()
        .map(|index| ListOp::Remove { index })
        .collect();
    script.extend(inserts.into_iter().map(|index| ListOp::Insert {
        index,
        value: new[index].clone(),
    }));
    script
}
