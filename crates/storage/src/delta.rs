//! Entity deltas
//!
//! The flush protocol never rewrites whole entities. Change sets translate
//! into [`EntityDelta`] records, one per modified individual, carrying the
//! minimal per-assertion operations the store applies atomically at commit.

use ontomap_core::{Assertion, Iri, Term};
use serde::{Deserialize, Serialize};

/// One edit in a position-sensitive list script
///
/// Remove indices address the list as it stood before the script, insert
/// indices the list being built; scripts are applied in order, removals
/// first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ListOp {
    /// Insert a value at the given position
    Insert {
        /// Target position in the new list
        index: usize,
        /// Inserted term
        value: Term,
    },
    /// Remove the value at the given position
    Remove {
        /// Position in the old list
        index: usize,
    },
}

/// Operation applied to one assertion's value set
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeltaKind {
    /// Add the given terms
    Add(Vec<Term>),
    /// Remove the given terms
    Remove(Vec<Term>),
    /// Replace all values with the given terms
    Replace(Vec<Term>),
    /// Drop all values
    Clear,
    /// Apply a list edit script
    ListEdit(Vec<ListOp>),
}

/// One assertion-level operation in an entity delta
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeltaOp {
    /// Assertion being modified
    pub assertion: Assertion,
    /// Context the modification applies in, `None` for the default graph
    pub context: Option<Iri>,
    /// The operation
    pub kind: DeltaKind,
}

/// All operations of one modified individual
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityDelta {
    /// Modified individual
    pub subject: Iri,
    /// Assertion operations, applied in order
    pub ops: Vec<DeltaOp>,
}

impl EntityDelta {
    /// Empty delta for a subject
    pub fn new(subject: Iri) -> Self {
        Self {
            subject,
            ops: Vec::new(),
        }
    }

    /// Append an operation
    pub fn push(&mut self, op: DeltaOp) {
        self.ops.push(op);
    }

    /// True when no operations were recorded
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

/// Full assertion-to-values map used to persist a new individual
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AxiomValueDescriptor {
    /// Individual being persisted
    pub subject: Iri,
    /// Assertion entries, one per attribute with values
    pub entries: Vec<AxiomEntry>,
}

/// One assertion's values and placement within an [`AxiomValueDescriptor`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AxiomEntry {
    /// The assertion
    pub assertion: Assertion,
    /// Context the values are written to, `None` for the default graph
    pub context: Option<Iri>,
    /// The values
    pub values: Vec<Term>,
}

impl AxiomValueDescriptor {
    /// Empty descriptor for a subject
    pub fn new(subject: Iri) -> Self {
        Self {
            subject,
            entries: Vec::new(),
        }
    }

    /// Append an entry, skipping empty value lists
    pub fn add_entry(&mut self, assertion: Assertion, context: Option<Iri>, values: Vec<Term>) {
        if !values.is_empty() {
            self.entries.push(AxiomEntry {
                assertion,
                context,
                values,
            });
        }
    }
}
