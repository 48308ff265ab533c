//! Pre-commit integrity checks
//!
//! Validation runs against the working copies right before flush, so a
//! violation fails the commit instead of corrupting the store.

use ontomap_core::{OntomapError, Result, Value};
use ontomap_metamodel::{EntityType, ObjectInstance};

/// Check every declared participation constraint of `instance`
///
/// # Errors
///
/// Returns [`OntomapError::CardinalityViolation`] naming the offending
/// attribute and the observed count.
pub(crate) fn validate_instance(entity_type: &EntityType, instance: &ObjectInstance) -> Result<()> {
    for attribute in entity_type.attributes() {
        let constraint = match attribute.constraint {
            Some(c) => c,
            None => continue,
        };
        let count = attribute.get(instance).map_or(0, Value::len);
        if count < constraint.min as usize {
            return Err(OntomapError::CardinalityViolation {
                attribute: attribute.property.to_string(),
                detail: format!(
                    "requires at least {} values, found {}",
                    constraint.min, count
                ),
            });
        }
        if let Some(max) = constraint.max {
            if count > max as usize {
                return Err(OntomapError::CardinalityViolation {
                    attribute: attribute.property.to_string(),
                    detail: format!("admits at most {} values, found {}", max, count),
                });
            }
        }
    }
    Ok(())
}

/// Reject newly registered instances that carry inferred values
///
/// Inferred attributes belong to the reasoner; a fresh individual cannot
/// assert them.
///
/// # Errors
///
/// Returns [`OntomapError::InferredAttributeModified`] for the first
/// populated inferred slot.
pub(crate) fn ensure_no_inferred_values(
    entity_type: &EntityType,
    instance: &ObjectInstance,
) -> Result<()> {
    for attribute in entity_type.attributes() {
        if !attribute.inferred {
            continue;
        }
        let occupied = attribute.get(instance).is_some_and(|v| !v.is_empty());
        if occupied {
            return Err(OntomapError::InferredAttributeModified {
                attribute: attribute.property.to_string(),
            });
        }
    }
    Ok(())
}
