//! Polymorphic entity type resolution
//!
//! Loading an individual as type `T` must produce the most specific
//! instantiable type in `T`'s subtype tree whose class IRI the individual
//! asserts. Abstract intermediates are traversed but never returned. When
//! two maximal candidates survive (sibling subtrees both match), the load
//! fails rather than guessing.

use crate::builder::Metamodel;
use crate::entity_type::TypeIndex;
use ontomap_core::{Iri, OntomapError, Result};
use rustc_hash::FxHashSet;

/// Resolve the entity type to instantiate for an individual
///
/// `asserted` is the set of class IRIs the individual has `rdf:type`
/// statements for. Returns `Ok(None)` when no type in the subtree matches.
///
/// # Errors
///
/// Returns [`OntomapError::AmbiguousType`] when more than one most-specific
/// candidate matches.
pub fn resolve_entity_type(
    metamodel: &Metamodel,
    root: TypeIndex,
    individual: &Iri,
    asserted: &FxHashSet<Iri>,
) -> Result<Option<TypeIndex>> {
    let mut candidates: Vec<TypeIndex> = Vec::new();
    let mut visited: FxHashSet<TypeIndex> = FxHashSet::default();
    let mut stack = vec![root];

    while let Some(index) = stack.pop() {
        if !visited.insert(index) {
            continue;
        }
        let entity_type = metamodel.entity_type(index);
        if !entity_type.abstract_type && asserted.contains(&entity_type.iri) {
            candidates.push(index);
        }
        stack.extend_from_slice(entity_type.subtypes());
    }

    // Keep only candidates with no more specific candidate below them.
    let maximal: Vec<TypeIndex> = candidates
        .iter()
        .copied()
        .filter(|c| {
            !candidates
                .iter()
                .any(|d| d != c && metamodel.entity_type(*c).has_descendant(*d))
        })
        .collect();

    match maximal.as_slice() {
        [] => Ok(None),
        [single] => Ok(Some(*single)),
        several => {
            let mut iris: Vec<String> = several
                .iter()
                .map(|idx| metamodel.entity_type(*idx).iri.to_string())
                .collect();
            iris.sort();
            Err(OntomapError::AmbiguousType {
                individual: individual.to_string(),
                candidates: iris.join(", "),
            })
        }
    }
}
