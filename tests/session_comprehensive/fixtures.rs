//! Shared fixtures for the session integration suite.
//!
//! One metamodel serves every area: an abstract root, a three-level
//! concrete hierarchy with sibling branches, object references with
//! cascades, lazy and inferred attributes, and a participation
//! constraint.

#![allow(dead_code)]

use std::sync::{Arc, Once};

use ontomap::{
    Assertion, Attribute, Axiom, CacheConfig, ChangeTrackingMode, Iri, MemoryStore, Metamodel,
    Ontomap, OntomapConfig, ReadOnlyUnitOfWork, StorageAccessor, Term, TypeIndex, UnitOfWork,
};
use ontomap::{AttributeSpec, Cardinality, EntityTypeSpec, MetamodelBuilder};

pub const NS: &str = "http://example.org/";

static INIT_TRACING: Once = Once::new();

fn init_tracing() {
    INIT_TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    });
}

pub fn iri(suffix: &str) -> Iri {
    Iri::new(format!("{NS}{suffix}"))
}

/// The suite's standard metamodel
///
/// Agent (abstract)
///   └─ Person ── Employee ── Manager
///          └─── Contractor
/// plus Project, Organization, and Report.
pub fn metamodel() -> Arc<Metamodel> {
    Arc::new(
        MetamodelBuilder::new()
            .add_type(
                EntityTypeSpec::new("Agent", &format!("{NS}Agent"))
                    .abstract_entity()
                    .with_attribute(AttributeSpec::annotation("label", &format!("{NS}label"))),
            )
            .add_type(
                EntityTypeSpec::new("Person", &format!("{NS}Person"))
                    .extends("Agent")
                    .with_attribute(AttributeSpec::data("name", &format!("{NS}name")))
                    .with_attribute(
                        AttributeSpec::data("nickname", &format!("{NS}nickname"))
                            .with_cardinality(Cardinality::Set)
                            .lazy(),
                    )
                    .with_attribute(
                        AttributeSpec::data("scores", &format!("{NS}scores"))
                            .with_cardinality(Cardinality::List),
                    )
                    .with_attribute(AttributeSpec::object("spouse", &format!("{NS}spouse"), "Person"))
                    .with_attribute(
                        AttributeSpec::object("mentor", &format!("{NS}mentor"), "Person").lazy(),
                    )
                    .with_attribute(
                        AttributeSpec::object("projects", &format!("{NS}project"), "Project")
                            .with_cardinality(Cardinality::Set)
                            .cascading(true, false),
                    ),
            )
            .add_type(
                EntityTypeSpec::new("Employee", &format!("{NS}Employee"))
                    .extends("Person")
                    .with_attribute(AttributeSpec::data("salary", &format!("{NS}salary"))),
            )
            .add_type(
                EntityTypeSpec::new("Manager", &format!("{NS}Manager")).extends("Employee"),
            )
            .add_type(
                EntityTypeSpec::new("Contractor", &format!("{NS}Contractor"))
                    .extends("Person")
                    .with_attribute(AttributeSpec::data("rate", &format!("{NS}rate"))),
            )
            .add_type(
                EntityTypeSpec::new("Project", &format!("{NS}Project"))
                    .with_attribute(
                        AttributeSpec::data("title", &format!("{NS}title")).with_constraint(1, None),
                    )
                    .with_attribute(
                        AttributeSpec::object("owner", &format!("{NS}owner"), "Person")
                            .cascading(true, false),
                    ),
            )
            .add_type(
                EntityTypeSpec::new("Organization", &format!("{NS}Organization"))
                    .with_attribute(AttributeSpec::data("org_name", &format!("{NS}orgName")))
                    .with_attribute(
                        AttributeSpec::object("members", &format!("{NS}member"), "Person")
                            .with_cardinality(Cardinality::Set)
                            .cascading(false, true),
                    ),
            )
            .add_type(
                EntityTypeSpec::new("Report", &format!("{NS}Report"))
                    .with_attribute(AttributeSpec::data("content", &format!("{NS}content")))
                    .with_attribute(
                        AttributeSpec::data("status", &format!("{NS}status")).inferred(),
                    ),
            )
            .build()
            .expect("fixture metamodel must build"),
    )
}

// ============================================================================
// TestRepo - repository wrapper with direct store access
// ============================================================================

/// In-memory repository plus a handle on its backing store for
/// stat assertions and independent connections.
pub struct TestRepo {
    pub ontomap: Ontomap,
    pub store: Arc<MemoryStore>,
}

impl TestRepo {
    pub fn new() -> Self {
        Self::with_config(OntomapConfig::default())
    }

    pub fn with_config(config: OntomapConfig) -> Self {
        init_tracing();
        let metamodel = metamodel();
        let store = Arc::new(MemoryStore::new(Arc::clone(&metamodel), config.storage.clone()));
        let accessor: Arc<dyn StorageAccessor> = store.clone();
        let ontomap = Ontomap::with_accessor(metamodel, accessor, config);
        TestRepo { ontomap, store }
    }

    /// Repository with on-commit change tracking
    pub fn on_commit() -> Self {
        let mut config = OntomapConfig::default();
        config.session.change_tracking = ChangeTrackingMode::OnCommit;
        Self::with_config(config)
    }

    /// Repository with the given cache section
    pub fn with_cache(cache: CacheConfig) -> Self {
        let config = OntomapConfig {
            cache,
            ..OntomapConfig::default()
        };
        Self::with_config(config)
    }

    pub fn metamodel(&self) -> &Arc<Metamodel> {
        self.ontomap.metamodel()
    }

    pub fn uow(&self) -> UnitOfWork {
        self.ontomap.unit_of_work().expect("unit of work")
    }

    pub fn read_only(&self) -> ReadOnlyUnitOfWork {
        self.ontomap.read_only_unit_of_work().expect("read-only unit of work")
    }

    pub fn type_index(&self, name: &str) -> TypeIndex {
        self.metamodel().type_by_name(name).expect("known type")
    }

    pub fn attribute(&self, type_name: &str, attribute: &str) -> Attribute {
        let index = self.type_index(type_name);
        self.metamodel()
            .entity_type(index)
            .attribute_by_name(attribute)
            .expect("known attribute")
            .clone()
    }

    /// Assert a class axiom and data values for a fresh individual
    pub fn seed(&self, local: &str, class: &str, data: &[(&str, Term)]) -> Iri {
        let subject = iri(local);
        let mut axioms = vec![(
            None,
            Axiom::new(subject.clone(), Assertion::class(), Term::Resource(iri(class))),
        )];
        for (property, value) in data {
            axioms.push((
                None,
                Axiom::new(
                    subject.clone(),
                    Assertion::data_property(iri(property), false),
                    value.clone(),
                ),
            ));
        }
        self.store.insert_axioms(axioms);
        subject
    }

    pub fn seed_person(&self, local: &str, name: &str) -> Iri {
        self.seed(local, "Person", &[("name", Term::Literal(name.into()))])
    }

    pub fn seed_employee(&self, local: &str, name: &str) -> Iri {
        let subject = self.seed_person(local, name);
        self.store.insert_axioms(vec![(
            None,
            Axiom::new(
                subject.clone(),
                Assertion::class(),
                Term::Resource(iri("Employee")),
            ),
        )]);
        subject
    }

    /// Link two individuals with an object property in the default graph
    pub fn seed_link(&self, subject: &Iri, property: &str, object: &Iri) {
        self.store.insert_axioms(vec![(
            None,
            Axiom::new(
                subject.clone(),
                Assertion::object_property(iri(property), false),
                Term::Resource(object.clone()),
            ),
        )]);
    }
}

impl Default for TestRepo {
    fn default() -> Self {
        Self::new()
    }
}
