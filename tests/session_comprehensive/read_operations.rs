//! Read path tests
//!
//! Identity map guarantees, polymorphic type resolution over the
//! hierarchy, reference shells, and registration of detached instances.

use crate::fixtures::{iri, TestRepo};
use ontomap::{Descriptor, EntityState, OntomapError, Term, Value};
use proptest::prelude::*;
use std::rc::Rc;

// ============================================================================
// Identity map
// ============================================================================

#[test]
fn repeated_reads_return_the_identical_working_copy() {
    let repo = TestRepo::new();
    let alice = repo.seed_person("alice", "Alice");
    let person = repo.type_index("Person");
    let mut uow = repo.uow();

    let first = uow.read_object(person, &alice, &Descriptor::new()).unwrap().unwrap();
    let second = uow.read_object(person, &alice, &Descriptor::new()).unwrap().unwrap();
    let third = uow.read_object(person, &alice, &Descriptor::new()).unwrap().unwrap();

    assert!(Rc::ptr_eq(&first, &second));
    assert!(Rc::ptr_eq(&second, &third));
    assert_eq!(repo.store.stats().finds, 1);
}

#[test]
fn distinct_individuals_get_distinct_working_copies() {
    let repo = TestRepo::new();
    let alice = repo.seed_person("alice", "Alice");
    let bob = repo.seed_person("bob", "Bob");
    let person = repo.type_index("Person");
    let mut uow = repo.uow();

    let a = uow.read_object(person, &alice, &Descriptor::new()).unwrap().unwrap();
    let b = uow.read_object(person, &bob, &Descriptor::new()).unwrap().unwrap();
    assert!(!Rc::ptr_eq(&a, &b));
}

#[test]
fn working_copy_edits_do_not_leak_into_fresh_transactions() {
    let repo = TestRepo::new();
    let alice = repo.seed_person("alice", "Alice");
    let person = repo.type_index("Person");
    let name = repo.attribute("Person", "name");

    let mut uow = repo.uow();
    let entity = uow.read_object(person, &alice, &Descriptor::new()).unwrap().unwrap();
    name.set_value(
        &mut entity.borrow_mut(),
        Some(Value::single(Term::Literal("Edited".into()))),
    )
    .unwrap();
    // No attribute_changed call: the edit is local to this working copy.
    drop(uow);

    let mut next = repo.uow();
    let reread = next.read_object(person, &alice, &Descriptor::new()).unwrap().unwrap();
    assert_eq!(
        name.get(&reread.borrow()),
        Some(&Value::single(Term::Literal("Alice".into())))
    );
}

// Arbitrary interleavings of reads over a small population never mint a
// second working copy for the same individual.
proptest! {
    #[test]
    fn interleaved_reads_keep_one_clone_per_individual(order in proptest::collection::vec(0usize..3, 1..40)) {
        let repo = TestRepo::new();
        let people = [
            repo.seed_person("p0", "P0"),
            repo.seed_person("p1", "P1"),
            repo.seed_person("p2", "P2"),
        ];
        let person = repo.type_index("Person");
        let mut uow = repo.uow();

        let mut firsts: [Option<ontomap::Entity>; 3] = [None, None, None];
        for pick in order {
            let entity = uow
                .read_object(person, &people[pick], &Descriptor::new())
                .unwrap()
                .unwrap();
            match &firsts[pick] {
                Some(first) => prop_assert!(Rc::ptr_eq(first, &entity)),
                None => firsts[pick] = Some(entity),
            }
        }
        // At most one storage find per distinct individual.
        let distinct = firsts.iter().filter(|f| f.is_some()).count() as u64;
        prop_assert_eq!(repo.store.stats().finds, distinct);
    }
}

// ============================================================================
// Polymorphic resolution
// ============================================================================

#[test]
fn read_resolves_the_most_specific_asserted_type() {
    let repo = TestRepo::new();
    let bob = repo.seed_employee("bob", "Bob");
    let person = repo.type_index("Person");
    let employee = repo.type_index("Employee");
    let mut uow = repo.uow();

    let entity = uow.read_object(person, &bob, &Descriptor::new()).unwrap().unwrap();
    assert_eq!(entity.borrow().type_index, employee);
    // The resolved class is carried by the type, not repeated in `types`.
    assert!(entity.borrow().types.contains(&iri("Person")));
    assert!(!entity.borrow().types.contains(&iri("Employee")));
}

#[test]
fn resolution_descends_multiple_levels() {
    let repo = TestRepo::new();
    let eve = repo.seed_employee("eve", "Eve");
    repo.store.insert_axioms(vec![(
        None,
        ontomap::Axiom::new(
            eve.clone(),
            ontomap::Assertion::class(),
            Term::Resource(iri("Manager")),
        ),
    )]);
    let person = repo.type_index("Person");
    let manager = repo.type_index("Manager");
    let mut uow = repo.uow();

    let entity = uow.read_object(person, &eve, &Descriptor::new()).unwrap().unwrap();
    assert_eq!(entity.borrow().type_index, manager);
}

#[test]
fn incomparable_sibling_types_are_ambiguous() {
    let repo = TestRepo::new();
    let kay = repo.seed_employee("kay", "Kay");
    repo.store.insert_axioms(vec![(
        None,
        ontomap::Axiom::new(
            kay.clone(),
            ontomap::Assertion::class(),
            Term::Resource(iri("Contractor")),
        ),
    )]);
    let person = repo.type_index("Person");
    let mut uow = repo.uow();

    let err = uow.read_object(person, &kay, &Descriptor::new()).unwrap_err();
    assert!(matches!(err, OntomapError::AmbiguousType { .. }));
}

#[test]
fn read_as_unasserted_subtype_is_a_miss() {
    let repo = TestRepo::new();
    let alice = repo.seed_person("alice", "Alice");
    let employee = repo.type_index("Employee");
    let mut uow = repo.uow();

    assert!(uow.read_object(employee, &alice, &Descriptor::new()).unwrap().is_none());
}

#[test]
fn subtype_clone_satisfies_a_supertype_read() {
    let repo = TestRepo::new();
    let bob = repo.seed_employee("bob", "Bob");
    let person = repo.type_index("Person");
    let employee = repo.type_index("Employee");
    let mut uow = repo.uow();

    let as_employee = uow.read_object(employee, &bob, &Descriptor::new()).unwrap().unwrap();
    let as_person = uow.read_object(person, &bob, &Descriptor::new()).unwrap().unwrap();
    assert!(Rc::ptr_eq(&as_employee, &as_person));
}

#[test]
fn supertype_clone_conflicts_with_a_subtype_read() {
    let repo = TestRepo::new();
    let alice = repo.seed_person("alice", "Alice");
    let person = repo.type_index("Person");
    let employee = repo.type_index("Employee");
    let mut uow = repo.uow();

    uow.read_object(person, &alice, &Descriptor::new()).unwrap().unwrap();
    let err = uow.read_object(employee, &alice, &Descriptor::new()).unwrap_err();
    assert!(matches!(err, OntomapError::IdentityConflict { .. }));
}

// ============================================================================
// Reference shells and registration
// ============================================================================

#[test]
fn get_reference_touches_no_storage() {
    let repo = TestRepo::new();
    let alice = repo.seed_person("alice", "Alice");
    let person = repo.type_index("Person");
    let mut uow = repo.uow();

    let shell = uow.get_reference(person, &alice, &Descriptor::new()).unwrap();
    assert_eq!(repo.store.stats().finds, 0);
    assert!(!uow.is_attribute_loaded(&shell, "name").unwrap());
    assert_eq!(uow.entity_state(&shell), EntityState::Managed);

    // A later read resolves to the same managed shell.
    let read = uow.read_object(person, &alice, &Descriptor::new()).unwrap().unwrap();
    assert!(Rc::ptr_eq(&shell, &read));
    assert_eq!(repo.store.stats().finds, 0);
}

#[test]
fn register_existing_object_is_idempotent() {
    let repo = TestRepo::new();
    let person = repo.type_index("Person");
    let mut uow = repo.uow();
    let instance = repo.metamodel().new_instance_with_id(person, iri("walter"));

    let first = uow.register_existing_object(instance.clone(), &Descriptor::new()).unwrap();
    let second = uow.register_existing_object(instance.clone(), &Descriptor::new()).unwrap();
    let third = uow.register_existing_object(instance, &Descriptor::new()).unwrap();
    assert!(Rc::ptr_eq(&first, &second));
    assert!(Rc::ptr_eq(&second, &third));
    assert!(uow.is_object_managed(&first));
}

#[test]
fn registered_instance_answers_reads_without_storage() {
    let repo = TestRepo::new();
    let person = repo.type_index("Person");
    let mut uow = repo.uow();
    let instance = repo.metamodel().new_instance_with_id(person, iri("walter"));

    let registered = uow.register_existing_object(instance, &Descriptor::new()).unwrap();
    let read = uow.read_object(person, &iri("walter"), &Descriptor::new()).unwrap().unwrap();
    assert!(Rc::ptr_eq(&registered, &read));
    assert_eq!(repo.store.stats().finds, 0);
}
