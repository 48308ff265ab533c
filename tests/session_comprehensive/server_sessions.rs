//! Server session lifecycle tests
//!
//! Transaction bookkeeping, close semantics, shared handles, and units of
//! work driven from multiple threads against one session.

use crate::fixtures::{iri, TestRepo};
use ontomap::{ChangeTrackingMode, Descriptor, Term, Value};
use std::thread;

// ============================================================================
// Bookkeeping
// ============================================================================

#[test]
fn transaction_identifiers_are_unique() {
    let repo = TestRepo::new();
    let a = repo.uow();
    let b = repo.uow();
    let c = repo.read_only();
    assert_ne!(a.id(), b.id());
    assert_ne!(b.id(), c.id());
    assert_eq!(repo.ontomap.session().active_transactions(), 3);
    drop(a);
    drop(b);
    drop(c);
    assert_eq!(repo.ontomap.session().active_transactions(), 0);
}

#[test]
fn config_reflects_overrides() {
    let repo = TestRepo::new();
    assert_eq!(
        repo.ontomap.session().config().session.change_tracking,
        ChangeTrackingMode::Immediate
    );
    assert_eq!(repo.uow().change_tracking(), ChangeTrackingMode::Immediate);

    let deferred = TestRepo::on_commit();
    assert_eq!(
        deferred.uow().change_tracking(),
        ChangeTrackingMode::OnCommit
    );
}

#[test]
fn handles_share_one_transaction_counter() {
    let repo = TestRepo::new();
    let other = repo.ontomap.session().clone();
    let a = repo.uow();
    let b = other.acquire_unit_of_work().unwrap();
    assert_ne!(a.id(), b.id());
    assert_eq!(other.active_transactions(), 2);
}

// ============================================================================
// Persistence-context registrations
// ============================================================================

#[test]
fn managed_entities_register_with_their_transaction() {
    let repo = TestRepo::new();
    let alice = repo.seed_person("alice", "Alice");
    let person = repo.type_index("Person");
    let session = repo.ontomap.session();

    let mut uow = repo.uow();
    assert_eq!(session.owning_transaction(&alice, None), None);
    uow.read_object(person, &alice, &Descriptor::new()).unwrap().unwrap();
    assert_eq!(session.owning_transaction(&alice, None), Some(uow.id()));

    drop(uow);
    assert_eq!(session.owning_transaction(&alice, None), None);
}

#[test]
fn commit_releases_the_transaction_registrations() {
    let repo = TestRepo::new();
    let person = repo.type_index("Person");
    let name = repo.attribute("Person", "name");
    let session = repo.ontomap.session();

    let mut uow = repo.uow();
    let mut instance = repo.metamodel().new_instance_with_id(person, iri("amy"));
    name.set_value(&mut instance, Some(Value::single(Term::Literal("Amy".into()))))
        .unwrap();
    uow.register_new_object(instance, &Descriptor::new()).unwrap();
    assert_eq!(session.owning_transaction(&iri("amy"), None), Some(uow.id()));

    uow.commit().unwrap();
    assert_eq!(session.owning_transaction(&iri("amy"), None), None);
}

#[test]
fn removing_a_pending_persist_drops_its_registration() {
    let repo = TestRepo::new();
    let person = repo.type_index("Person");
    let session = repo.ontomap.session();

    let mut uow = repo.uow();
    let instance = repo.metamodel().new_instance_with_id(person, iri("amy"));
    let entity = uow.register_new_object(instance, &Descriptor::new()).unwrap();
    assert_eq!(session.owning_transaction(&iri("amy"), None), Some(uow.id()));

    uow.remove_object(&entity).unwrap();
    assert_eq!(session.owning_transaction(&iri("amy"), None), None);
}

// ============================================================================
// Close
// ============================================================================

#[test]
fn close_refuses_new_transactions_and_clears_the_cache() {
    let repo = TestRepo::new();
    let alice = repo.seed_person("alice", "Alice");
    let person = repo.type_index("Person");

    let mut uow = repo.uow();
    uow.read_object(person, &alice, &Descriptor::new()).unwrap().unwrap();
    drop(uow);
    assert_eq!(repo.ontomap.session().cache().len(), 1);

    repo.ontomap.close();
    repo.ontomap.close();
    assert!(repo.ontomap.session().is_closed());
    assert!(repo.ontomap.session().cache().is_empty());
    assert!(repo.ontomap.unit_of_work().is_err());
    assert!(repo.ontomap.read_only_unit_of_work().is_err());
}

#[test]
fn open_transactions_outlive_close() {
    let repo = TestRepo::new();
    let alice = repo.seed_person("alice", "Alice");
    let person = repo.type_index("Person");

    let mut uow = repo.uow();
    repo.ontomap.close();

    let entity = uow.read_object(person, &alice, &Descriptor::new()).unwrap().unwrap();
    assert!(uow.is_object_managed(&entity));
    uow.commit().unwrap();
}

// ============================================================================
// Concurrency
// ============================================================================

#[test]
fn threads_write_through_their_own_units_of_work() {
    let repo = TestRepo::new();
    let person = repo.type_index("Person");

    let mut workers = Vec::new();
    for i in 0..4 {
        let session = repo.ontomap.session().clone();
        workers.push(thread::spawn(move || {
            let metamodel = std::sync::Arc::clone(session.metamodel());
            let name = metamodel
                .entity_type(metamodel.type_by_name("Person").unwrap())
                .attribute_by_name("name")
                .unwrap()
                .clone();
            let mut uow = session.acquire_unit_of_work().unwrap();
            let mut instance = metamodel.new_instance_with_id(
                metamodel.type_by_name("Person").unwrap(),
                iri(&format!("p{i}")),
            );
            name.set_value(
                &mut instance,
                Some(Value::single(Term::Literal(format!("P{i}").into()))),
            )
            .unwrap();
            uow.register_new_object(instance, &Descriptor::new()).unwrap();
            uow.commit().unwrap();
        }));
    }
    for worker in workers {
        worker.join().unwrap();
    }

    assert_eq!(repo.ontomap.session().active_transactions(), 0);
    assert_eq!(repo.store.stats().commits, 4);
    let mut reader = repo.uow();
    for i in 0..4 {
        assert!(reader
            .read_object(person, &iri(&format!("p{i}")), &Descriptor::new())
            .unwrap()
            .is_some());
    }
}
