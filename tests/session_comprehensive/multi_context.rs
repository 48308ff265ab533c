//! Repository context tests
//!
//! Entities and single attributes placed in named graphs, read/write
//! symmetry of context resolution, context-scoped removal, and the
//! context component of cache keys.

use crate::fixtures::{iri, TestRepo};
use ontomap::{
    Assertion, Axiom, CacheConfig, Descriptor, OntomapError, StorageAccessor, StorageConnection,
    Term, Value,
};

fn no_cache() -> TestRepo {
    TestRepo::with_cache(CacheConfig {
        enabled: false,
        ..CacheConfig::default()
    })
}

fn ctx1() -> ontomap::Iri {
    iri("contexts/one")
}

fn ctx2() -> ontomap::Iri {
    iri("contexts/two")
}

/// Seed a Person with a name directly into a named graph
fn seed_person_in(repo: &TestRepo, local: &str, name: &str, context: Option<ontomap::Iri>) -> ontomap::Iri {
    let subject = iri(local);
    repo.store.insert_axioms(vec![
        (
            context.clone(),
            Axiom::new(subject.clone(), Assertion::class(), Term::Resource(iri("Person"))),
        ),
        (
            context,
            Axiom::new(
                subject.clone(),
                Assertion::data_property(iri("name"), false),
                Term::Literal(name.into()),
            ),
        ),
    ]);
    subject
}

// ============================================================================
// Context-scoped reads
// ============================================================================

#[test]
fn entities_load_only_from_their_descriptor_context() {
    let repo = no_cache();
    let nina = seed_person_in(&repo, "nina", "Nina", Some(ctx1()));
    let person = repo.type_index("Person");
    let mut uow = repo.uow();

    let hit = uow
        .read_object(person, &nina, &Descriptor::in_context(ctx1()))
        .unwrap();
    assert!(hit.is_some());

    let mut other = repo.uow();
    assert!(other.read_object(person, &nina, &Descriptor::new()).unwrap().is_none());
    let mut third = repo.uow();
    assert!(third
        .read_object(person, &nina, &Descriptor::in_context(ctx2()))
        .unwrap()
        .is_none());
}

#[test]
fn conflicting_context_on_a_registered_individual_is_an_identity_conflict() {
    let repo = no_cache();
    let nina = seed_person_in(&repo, "nina", "Nina", Some(ctx1()));
    seed_person_in(&repo, "nina", "Nina", Some(ctx2()));
    let person = repo.type_index("Person");
    let mut uow = repo.uow();

    uow.read_object(person, &nina, &Descriptor::in_context(ctx1())).unwrap().unwrap();
    let err = uow
        .read_object(person, &nina, &Descriptor::in_context(ctx2()))
        .unwrap_err();
    assert!(matches!(err, OntomapError::IdentityConflict { .. }));
}

#[test]
fn attribute_overrides_do_not_clash_with_the_registered_descriptor() {
    let repo = no_cache();
    let nina = seed_person_in(&repo, "nina", "Nina", Some(ctx1()));
    let person = repo.type_index("Person");
    let mut uow = repo.uow();

    let first = uow
        .read_object(person, &nina, &Descriptor::in_context(ctx1()))
        .unwrap()
        .unwrap();
    // Same entity context, different attribute placement: still the same
    // working copy, no conflict.
    let refined = Descriptor::in_context(ctx1()).with_attribute_context(iri("name"), None);
    let second = uow.read_object(person, &nina, &refined).unwrap().unwrap();
    assert!(std::rc::Rc::ptr_eq(&first, &second));
}

// ============================================================================
// Read/write symmetry
// ============================================================================

#[test]
fn persist_places_each_attribute_in_its_resolved_context() {
    let repo = no_cache();
    let person = repo.type_index("Person");
    let name = repo.attribute("Person", "name");

    let descriptor = Descriptor::in_context(ctx1()).with_attribute_context(iri("name"), None);
    let mut uow = repo.uow();
    let mut instance = repo.metamodel().new_instance_with_id(person, iri("otto"));
    name.set_value(&mut instance, Some(Value::single(Term::Literal("Otto".into()))))
        .unwrap();
    uow.register_new_object(instance, &descriptor).unwrap();
    uow.commit().unwrap();

    // Class assertion went to the entity context, the pinned attribute to
    // the default graph.
    let conn = repo.store.open_connection().unwrap();
    assert!(conn.contains(&iri("otto"), &iri("Person"), Some(&ctx1())).unwrap());
    assert!(!conn.contains(&iri("otto"), &iri("Person"), None).unwrap());
    assert_eq!(
        conn.load_field(&iri("otto"), &name, &descriptor).unwrap(),
        Some(Value::single(Term::Literal("Otto".into())))
    );
    assert_eq!(
        conn.load_field(&iri("otto"), &name, &Descriptor::in_context(ctx1())).unwrap(),
        None
    );
}

#[test]
fn updates_flush_to_the_context_the_load_used() {
    let repo = no_cache();
    let nina = seed_person_in(&repo, "nina", "Nina", Some(ctx1()));
    let person = repo.type_index("Person");
    let name = repo.attribute("Person", "name");

    let mut uow = repo.uow();
    let entity = uow
        .read_object(person, &nina, &Descriptor::in_context(ctx1()))
        .unwrap()
        .unwrap();
    name.set_value(
        &mut entity.borrow_mut(),
        Some(Value::single(Term::Literal("Nina Simone".into()))),
    )
    .unwrap();
    uow.attribute_changed(&entity, "name").unwrap();
    uow.commit().unwrap();

    let mut reader = repo.uow();
    let reread = reader
        .read_object(person, &nina, &Descriptor::in_context(ctx1()))
        .unwrap()
        .unwrap();
    assert_eq!(
        name.get(&reread.borrow()).cloned(),
        Some(Value::single(Term::Literal("Nina Simone".into())))
    );
    // Nothing leaked into the default graph.
    let conn = repo.store.open_connection().unwrap();
    assert_eq!(conn.load_field(&nina, &name, &Descriptor::new()).unwrap(), None);
}

#[test]
fn lazy_loads_read_the_recorded_descriptor_context() {
    let repo = no_cache();
    let nina = seed_person_in(&repo, "nina", "Nina", Some(ctx1()));
    repo.store.insert_axioms(vec![(
        Some(ctx1()),
        Axiom::new(
            nina.clone(),
            Assertion::data_property(iri("nickname"), false),
            Term::Literal("Simone".into()),
        ),
    )]);
    let person = repo.type_index("Person");
    let nickname = repo.attribute("Person", "nickname");
    let mut uow = repo.uow();

    let entity = uow
        .read_object(person, &nina, &Descriptor::in_context(ctx1()))
        .unwrap()
        .unwrap();
    assert!(!uow.is_attribute_loaded(&entity, "nickname").unwrap());
    uow.load_entity_field(&entity, "nickname").unwrap();
    assert_eq!(
        nickname.get(&entity.borrow()).cloned(),
        Some(Value::set([Term::Literal("Simone".into())]))
    );
}

// ============================================================================
// Context-scoped removal
// ============================================================================

#[test]
fn removal_clears_every_context_the_descriptor_addresses() {
    let repo = no_cache();
    let person = repo.type_index("Person");
    let name = repo.attribute("Person", "name");

    let descriptor = Descriptor::in_context(ctx1()).with_attribute_context(iri("name"), None);
    let mut writer = repo.uow();
    let mut instance = repo.metamodel().new_instance_with_id(person, iri("otto"));
    name.set_value(&mut instance, Some(Value::single(Term::Literal("Otto".into()))))
        .unwrap();
    writer.register_new_object(instance, &descriptor).unwrap();
    writer.commit().unwrap();

    let mut remover = repo.uow();
    let entity = remover.read_object(person, &iri("otto"), &descriptor).unwrap().unwrap();
    remover.remove_object(&entity).unwrap();
    remover.commit().unwrap();

    let conn = repo.store.open_connection().unwrap();
    assert!(!conn.contains(&iri("otto"), &iri("Person"), Some(&ctx1())).unwrap());
    assert_eq!(conn.load_field(&iri("otto"), &name, &descriptor).unwrap(), None);
}

// ============================================================================
// Context-keyed caching
// ============================================================================

#[test]
fn cache_hits_require_a_matching_context() {
    let repo = TestRepo::new();
    let nina = seed_person_in(&repo, "nina", "Nina", Some(ctx1()));
    let person = repo.type_index("Person");

    let mut first = repo.uow();
    first
        .read_object(person, &nina, &Descriptor::in_context(ctx1()))
        .unwrap()
        .unwrap();
    drop(first);
    let finds_after_fill = repo.store.stats().finds;

    // Same context: served from the cache, no extra storage find.
    let mut cached = repo.uow();
    cached
        .read_object(person, &nina, &Descriptor::in_context(ctx1()))
        .unwrap()
        .unwrap();
    drop(cached);
    assert_eq!(repo.store.stats().finds, finds_after_fill);

    // Different context: the cached snapshot does not answer and storage
    // reports the individual absent there.
    let mut other = repo.uow();
    assert!(other.read_object(person, &nina, &Descriptor::new()).unwrap().is_none());
    assert!(repo.store.stats().finds > finds_after_fill);
}
