//! Cascade resolution over object attributes
//!
//! Persist cascades collect the references a flushing individual must be
//! able to resolve; remove cascades collect the individuals that follow
//! their owner out of the repository.

use ontomap_core::{Iri, Term};
use ontomap_metamodel::{AttributeKind, EntityType, ObjectInstance, TypeIndex};

/// References that must resolve to managed or persistent individuals
///
/// Returns `(property, target)` pairs for every resource held by an object
/// attribute with persist cascading.
pub(crate) fn persist_checked_references(
    entity_type: &EntityType,
    instance: &ObjectInstance,
) -> Vec<(Iri, Iri)> {
    let mut references = Vec::new();
    for attribute in entity_type.attributes() {
        if attribute.kind != AttributeKind::Object || !attribute.cascade.persist {
            continue;
        }
        let value = match attribute.get(instance) {
            Some(v) => v,
            None => continue,
        };
        for term in value.terms() {
            if let Term::Resource(target) = term {
                references.push((attribute.property.clone(), target.clone()));
            }
        }
    }
    references
}

/// Individuals removed together with their owner
///
/// Returns `(target_type, identifier)` pairs for every resource held by an
/// object attribute with remove cascading. Attributes without a declared
/// target type cannot be followed and are skipped.
pub(crate) fn remove_cascade_targets(
    entity_type: &EntityType,
    instance: &ObjectInstance,
) -> Vec<(TypeIndex, Iri)> {
    let mut targets = Vec::new();
    for attribute in entity_type.attributes() {
        if !attribute.cascade.remove {
            continue;
        }
        let target_type = match attribute.target_type {
            Some(t) => t,
            None => continue,
        };
        let value = match attribute.get(instance) {
            Some(v) => v,
            None => continue,
        };
        for term in value.terms() {
            if let Term::Resource(target) = term {
                targets.push((target_type, target.clone()));
            }
        }
    }
    targets
}
