//! Metamodel construction
//!
//! The builder consumes declarative type specs and produces the immutable
//! [`Metamodel`]: dense type indices, flattened per-type attribute tables
//! with bound accessors, subtype edges, and the descendant closure used by
//! polymorphic resolution. All validation happens here; once built, lookups
//! cannot fail structurally.

use crate::accessor::{
    check_annotation, check_data, check_object, set_list, set_set, set_single, AttributeAccessor,
};
use crate::attribute::{Attribute, AttributeIndex, AttributeKind, AttributeSpec, Cardinality};
use crate::entity_type::{EntityType, EntityTypeSpec, TypeIndex};
use crate::instance::ObjectInstance;
use crate::resolver;
use ontomap_core::{Iri, OntomapError, Result};
use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;

/// Builder for a [`Metamodel`]
#[derive(Debug, Default)]
pub struct MetamodelBuilder {
    specs: Vec<EntityTypeSpec>,
}

impl MetamodelBuilder {
    /// Create an empty builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare an entity type
    pub fn add_type(mut self, spec: EntityTypeSpec) -> Self {
        self.specs.push(spec);
        self
    }

    /// Validate the declarations and build the metamodel
    ///
    /// # Errors
    ///
    /// Returns a [`OntomapError::Config`] or [`OntomapError::UnknownType`]
    /// for duplicate names or class IRIs, unknown supertypes or target
    /// types, hierarchy cycles, and conflicting attribute declarations.
    pub fn build(self) -> Result<Metamodel> {
        let specs = self.specs;

        let mut by_name: FxHashMap<String, TypeIndex> = FxHashMap::default();
        let mut by_iri: FxHashMap<Iri, TypeIndex> = FxHashMap::default();
        for (i, spec) in specs.iter().enumerate() {
            let index = TypeIndex::new(i as u32);
            if by_name.insert(spec.name.clone(), index).is_some() {
                return Err(OntomapError::Config(format!(
                    "Duplicate entity type name '{}'",
                    spec.name
                )));
            }
            if by_iri.insert(spec.iri.clone(), index).is_some() {
                return Err(OntomapError::Config(format!(
                    "Duplicate entity type IRI '{}'",
                    spec.iri
                )));
            }
        }

        let mut super_indices: Vec<Vec<usize>> = Vec::with_capacity(specs.len());
        for spec in &specs {
            let mut supers = Vec::with_capacity(spec.supertypes.len());
            for super_name in &spec.supertypes {
                let idx = by_name.get(super_name).ok_or_else(|| {
                    OntomapError::UnknownType(format!(
                        "Supertype '{}' of '{}' is not declared",
                        super_name, spec.name
                    ))
                })?;
                supers.push(idx.as_usize());
            }
            super_indices.push(supers);
        }

        // Flatten attribute tables: inherited first, own declarations after.
        let mut flattened: Vec<Option<Vec<(AttributeSpec, TypeIndex)>>> = vec![None; specs.len()];
        let mut visit_state: Vec<u8> = vec![0; specs.len()];
        for i in 0..specs.len() {
            flatten_attributes(i, &specs, &super_indices, &mut flattened, &mut visit_state)?;
        }

        // Subtype edges, in declaration order.
        let mut subtype_lists: Vec<SmallVec<[TypeIndex; 4]>> =
            vec![SmallVec::new(); specs.len()];
        for (i, supers) in super_indices.iter().enumerate() {
            for s in supers {
                subtype_lists[*s].push(TypeIndex::new(i as u32));
            }
        }

        // Descendant closure per type.
        let mut descendant_sets: Vec<FxHashSet<TypeIndex>> = Vec::with_capacity(specs.len());
        for i in 0..specs.len() {
            let mut descendants = FxHashSet::default();
            let mut stack: Vec<TypeIndex> = subtype_lists[i].to_vec();
            while let Some(sub) = stack.pop() {
                if descendants.insert(sub) {
                    stack.extend_from_slice(&subtype_lists[sub.as_usize()]);
                }
            }
            descendant_sets.push(descendants);
        }

        let mut types: Vec<EntityType> = Vec::with_capacity(specs.len());
        for (i, spec) in specs.iter().enumerate() {
            let protos = flattened[i]
                .as_ref()
                .ok_or_else(|| OntomapError::Config("attribute flattening incomplete".into()))?;

            let mut attributes = Vec::with_capacity(protos.len());
            let mut attr_by_name = FxHashMap::default();
            let mut attr_by_property = FxHashMap::default();
            for (pos, (attr_spec, declared_by)) in protos.iter().enumerate() {
                let index = AttributeIndex::new(pos as u32);
                let attribute =
                    build_attribute(attr_spec, *declared_by, index, &by_name)?;
                attr_by_name.insert(attribute.name.clone(), index);
                attr_by_property.insert(attribute.property.clone(), index);
                attributes.push(attribute);
            }

            types.push(EntityType {
                name: spec.name.clone(),
                iri: spec.iri.clone(),
                abstract_type: spec.abstract_type,
                index: TypeIndex::new(i as u32),
                supertypes: super_indices[i]
                    .iter()
                    .map(|s| TypeIndex::new(*s as u32))
                    .collect(),
                subtypes: subtype_lists[i].clone(),
                descendants: descendant_sets[i].clone(),
                attributes,
                by_name: attr_by_name,
                by_property: attr_by_property,
            });
        }

        Ok(Metamodel {
            types,
            by_name,
            by_iri,
        })
    }
}

fn flatten_attributes(
    idx: usize,
    specs: &[EntityTypeSpec],
    super_indices: &[Vec<usize>],
    flattened: &mut Vec<Option<Vec<(AttributeSpec, TypeIndex)>>>,
    visit_state: &mut Vec<u8>,
) -> Result<()> {
    match visit_state[idx] {
        2 => return Ok(()),
        1 => {
            return Err(OntomapError::Config(format!(
                "Cycle in entity type hierarchy involving '{}'",
                specs[idx].name
            )))
        }
        _ => {}
    }
    visit_state[idx] = 1;

    let mut table: Vec<(AttributeSpec, TypeIndex)> = Vec::new();
    let mut seen: FxHashMap<Iri, TypeIndex> = FxHashMap::default();
    let mut seen_names: FxHashMap<String, Iri> = FxHashMap::default();

    for super_idx in &super_indices[idx] {
        flatten_attributes(*super_idx, specs, super_indices, flattened, visit_state)?;
        let inherited = flattened[*super_idx]
            .as_ref()
            .ok_or_else(|| OntomapError::Config("attribute flattening incomplete".into()))?
            .clone();
        for (attr_spec, declared_by) in inherited {
            merge_attribute(
                &mut table,
                &mut seen,
                &mut seen_names,
                attr_spec,
                declared_by,
                &specs[idx].name,
            )?;
        }
    }
    for attr_spec in &specs[idx].attributes {
        merge_attribute(
            &mut table,
            &mut seen,
            &mut seen_names,
            attr_spec.clone(),
            TypeIndex::new(idx as u32),
            &specs[idx].name,
        )?;
    }

    flattened[idx] = Some(table);
    visit_state[idx] = 2;
    Ok(())
}

fn merge_attribute(
    table: &mut Vec<(AttributeSpec, TypeIndex)>,
    seen: &mut FxHashMap<Iri, TypeIndex>,
    seen_names: &mut FxHashMap<String, Iri>,
    attr_spec: AttributeSpec,
    declared_by: TypeIndex,
    type_name: &str,
) -> Result<()> {
    if let Some(previous) = seen.get(&attr_spec.property) {
        // The same declaration arriving over two inheritance paths is fine;
        // two distinct declarations of one property are not.
        if *previous == declared_by {
            return Ok(());
        }
        return Err(OntomapError::Config(format!(
            "Property '{}' is mapped twice in the hierarchy of '{}'",
            attr_spec.property, type_name
        )));
    }
    if let Some(other_property) = seen_names.get(&attr_spec.name) {
        if *other_property != attr_spec.property {
            return Err(OntomapError::Config(format!(
                "Attribute name '{}' is used for two properties in the hierarchy of '{}'",
                attr_spec.name, type_name
            )));
        }
    }
    seen.insert(attr_spec.property.clone(), declared_by);
    seen_names.insert(attr_spec.name.clone(), attr_spec.property.clone());
    table.push((attr_spec, declared_by));
    Ok(())
}

fn build_attribute(
    spec: &AttributeSpec,
    declared_by: TypeIndex,
    index: AttributeIndex,
    types_by_name: &FxHashMap<String, TypeIndex>,
) -> Result<Attribute> {
    let target_type = match (&spec.target, spec.kind) {
        (Some(name), AttributeKind::Object) => Some(
            *types_by_name.get(name).ok_or_else(|| {
                OntomapError::UnknownType(format!(
                    "Target type '{}' of attribute '{}' is not declared",
                    name, spec.name
                ))
            })?,
        ),
        (Some(name), _) => {
            return Err(OntomapError::Config(format!(
                "Attribute '{}' declares target type '{}' but is not an object attribute",
                spec.name, name
            )))
        }
        (None, _) => None,
    };

    let elem_check = match spec.kind {
        AttributeKind::Data => check_data,
        AttributeKind::Object => check_object,
        AttributeKind::Annotation => check_annotation,
    };
    let set = match spec.cardinality {
        Cardinality::Single => set_single,
        Cardinality::Set => set_set,
        Cardinality::List => set_list,
    };

    Ok(Attribute {
        name: spec.name.clone(),
        property: spec.property.clone(),
        kind: spec.kind,
        cardinality: spec.cardinality,
        lazy: spec.lazy,
        inferred: spec.inferred,
        index,
        declared_by,
        target_type,
        constraint: spec.constraint,
        cascade: spec.cascade,
        accessor: AttributeAccessor::select(elem_check, set),
    })
}

/// Immutable entity metamodel
///
/// Built once, then shared read-only by sessions, the cache, and storage.
#[derive(Debug, Clone)]
pub struct Metamodel {
    types: Vec<EntityType>,
    by_name: FxHashMap<String, TypeIndex>,
    by_iri: FxHashMap<Iri, TypeIndex>,
}

impl Metamodel {
    /// Entity type at the given index
    ///
    /// # Panics
    ///
    /// Panics when the index was not produced by this metamodel.
    pub fn entity_type(&self, index: TypeIndex) -> &EntityType {
        &self.types[index.as_usize()]
    }

    /// Look up an entity type by name
    ///
    /// # Errors
    ///
    /// Returns [`OntomapError::UnknownType`] when no type has that name.
    pub fn type_by_name(&self, name: &str) -> Result<TypeIndex> {
        self.by_name
            .get(name)
            .copied()
            .ok_or_else(|| OntomapError::UnknownType(name.to_string()))
    }

    /// Look up an entity type by class IRI
    pub fn type_by_iri(&self, iri: &Iri) -> Option<TypeIndex> {
        self.by_iri.get(iri).copied()
    }

    /// All entity types in declaration order
    pub fn types(&self) -> impl Iterator<Item = &EntityType> {
        self.types.iter()
    }

    /// Number of entity types
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// True when no types are declared
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Create an unmanaged instance of the given type with empty slots
    pub fn new_instance(&self, type_index: TypeIndex) -> ObjectInstance {
        ObjectInstance::new(type_index, self.entity_type(type_index).slot_count())
    }

    /// Create an unmanaged instance carrying an identifier
    pub fn new_instance_with_id(&self, type_index: TypeIndex, identifier: Iri) -> ObjectInstance {
        ObjectInstance::with_identifier(
            type_index,
            self.entity_type(type_index).slot_count(),
            identifier,
        )
    }

    /// Class IRIs of entity types carrying at least one inferred attribute
    ///
    /// This is the invalidation set the second-level cache clears after any
    /// data-changing commit.
    pub fn inferred_types(&self) -> FxHashSet<Iri> {
        self.types
            .iter()
            .filter(|t| t.attributes().any(|a| a.inferred))
            .map(|t| t.iri.clone())
            .collect()
    }

    /// Resolve the most specific instantiable type for an individual
    ///
    /// Delegates to [`resolver::resolve_entity_type`].
    pub fn resolve_instantiable_type(
        &self,
        root: TypeIndex,
        individual: &Iri,
        asserted: &FxHashSet<Iri>,
    ) -> Result<Option<TypeIndex>> {
        resolver::resolve_entity_type(self, root, individual, asserted)
    }
}
