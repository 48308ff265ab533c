//! Second-level cache coordination tests
//!
//! Cross-transaction hits, LRU and TTL policies, commit synchronization,
//! and inferred-type invalidation after data-changing commits.

use crate::fixtures::TestRepo;
use ontomap::{CacheConfig, CacheKind, Descriptor, Term, Value};
use std::thread::sleep;
use std::time::Duration;

fn no_cache() -> TestRepo {
    TestRepo::with_cache(CacheConfig {
        enabled: false,
        ..CacheConfig::default()
    })
}

// ============================================================================
// Hit and miss behavior
// ============================================================================

#[test]
fn second_transaction_reads_from_the_cache() {
    let repo = TestRepo::new();
    let alice = repo.seed_person("alice", "Alice");
    let person = repo.type_index("Person");
    let name = repo.attribute("Person", "name");

    let mut first = repo.uow();
    first.read_object(person, &alice, &Descriptor::new()).unwrap().unwrap();
    assert_eq!(repo.store.stats().finds, 1);
    drop(first);

    let mut second = repo.uow();
    let entity = second.read_object(person, &alice, &Descriptor::new()).unwrap().unwrap();
    assert_eq!(repo.store.stats().finds, 1);
    assert_eq!(
        name.get(&entity.borrow()).cloned(),
        Some(Value::single(Term::Literal("Alice".into())))
    );
    assert!(repo.ontomap.session().cache().stats().hits >= 1);
}

#[test]
fn disabled_cache_reads_always_hit_storage() {
    let repo = no_cache();
    let alice = repo.seed_person("alice", "Alice");
    let person = repo.type_index("Person");

    let mut first = repo.uow();
    first.read_object(person, &alice, &Descriptor::new()).unwrap().unwrap();
    drop(first);
    let mut second = repo.uow();
    second.read_object(person, &alice, &Descriptor::new()).unwrap().unwrap();

    assert_eq!(repo.store.stats().finds, 2);
    assert_eq!(repo.ontomap.session().cache().len(), 0);
}

// ============================================================================
// Policies
// ============================================================================

#[test]
fn lru_eviction_follows_capacity() {
    let repo = TestRepo::with_cache(CacheConfig {
        enabled: true,
        kind: CacheKind::Lru,
        capacity: 2,
        ttl_secs: 60,
    });
    let people = [
        repo.seed_person("p0", "P0"),
        repo.seed_person("p1", "P1"),
        repo.seed_person("p2", "P2"),
    ];
    let person = repo.type_index("Person");

    let mut uow = repo.uow();
    for identifier in &people {
        uow.read_object(person, identifier, &Descriptor::new()).unwrap().unwrap();
    }
    drop(uow);

    // Three inserts into two slots push the first individual out.
    let cache = repo.ontomap.session().cache();
    assert_eq!(cache.len(), 2);
    assert!(!cache.contains(person, &people[0], None));
    assert!(cache.contains(person, &people[1], None));
    assert!(cache.contains(person, &people[2], None));
    assert_eq!(cache.stats().evictions, 1);
}

#[test]
fn lru_budgets_do_not_cross_entity_classes() {
    let repo = TestRepo::with_cache(CacheConfig {
        enabled: true,
        kind: CacheKind::Lru,
        capacity: 2,
        ttl_secs: 60,
    });
    let people = [
        repo.seed_person("p0", "P0"),
        repo.seed_person("p1", "P1"),
    ];
    let quarterly = repo.seed("q1", "Report", &[("content", Term::Literal("Q1".into()))]);
    let person = repo.type_index("Person");
    let report = repo.type_index("Report");

    let mut uow = repo.uow();
    for identifier in &people {
        uow.read_object(person, identifier, &Descriptor::new()).unwrap().unwrap();
    }
    uow.read_object(report, &quarterly, &Descriptor::new()).unwrap().unwrap();
    drop(uow);

    // The Person budget is full, but the Report insert neither fails nor
    // displaces a Person entry.
    let cache = repo.ontomap.session().cache();
    assert_eq!(cache.len(), 3);
    assert!(cache.contains(person, &people[0], None));
    assert!(cache.contains(person, &people[1], None));
    assert!(cache.contains(report, &quarterly, None));
    assert_eq!(cache.stats().evictions, 0);
}

#[test]
fn expired_entries_read_as_misses() {
    let repo = TestRepo::with_cache(CacheConfig {
        enabled: true,
        kind: CacheKind::Ttl,
        capacity: 64,
        ttl_secs: 1,
    });
    let alice = repo.seed_person("alice", "Alice");
    let person = repo.type_index("Person");

    let mut first = repo.uow();
    first.read_object(person, &alice, &Descriptor::new()).unwrap().unwrap();
    drop(first);

    let mut warm = repo.uow();
    warm.read_object(person, &alice, &Descriptor::new()).unwrap().unwrap();
    assert_eq!(repo.store.stats().finds, 1);
    drop(warm);

    sleep(Duration::from_millis(1200));

    let mut expired = repo.uow();
    expired.read_object(person, &alice, &Descriptor::new()).unwrap().unwrap();
    assert_eq!(repo.store.stats().finds, 2);
}

// ============================================================================
// Commit synchronization
// ============================================================================

#[test]
fn commit_publishes_updated_snapshots_to_the_cache() {
    let repo = TestRepo::new();
    let alice = repo.seed_person("alice", "Alice");
    let person = repo.type_index("Person");
    let name = repo.attribute("Person", "name");

    let mut writer = repo.uow();
    let entity = writer.read_object(person, &alice, &Descriptor::new()).unwrap().unwrap();
    name.set_value(
        &mut entity.borrow_mut(),
        Some(Value::single(Term::Literal("Alicia".into()))),
    )
    .unwrap();
    writer.attribute_changed(&entity, "name").unwrap();
    writer.commit().unwrap();

    let mut reader = repo.uow();
    let reread = reader.read_object(person, &alice, &Descriptor::new()).unwrap().unwrap();
    assert_eq!(repo.store.stats().finds, 1);
    assert_eq!(
        name.get(&reread.borrow()).cloned(),
        Some(Value::single(Term::Literal("Alicia".into())))
    );
}

#[test]
fn removal_evicts_the_cached_entry() {
    let repo = TestRepo::new();
    let alice = repo.seed_person("alice", "Alice");
    let person = repo.type_index("Person");

    let mut writer = repo.uow();
    let entity = writer.read_object(person, &alice, &Descriptor::new()).unwrap().unwrap();
    writer.remove_object(&entity).unwrap();
    writer.commit().unwrap();

    assert!(!repo.ontomap.session().cache().contains(person, &alice, None));
    let mut reader = repo.uow();
    assert!(reader.read_object(person, &alice, &Descriptor::new()).unwrap().is_none());
    assert_eq!(repo.store.stats().finds, 2);
}

#[test]
fn refresh_bypasses_cached_snapshots() {
    let repo = TestRepo::new();
    let alice = repo.seed_person("alice", "Alice");
    let person = repo.type_index("Person");

    let mut uow = repo.uow();
    let entity = uow.read_object(person, &alice, &Descriptor::new()).unwrap().unwrap();
    assert_eq!(repo.store.stats().finds, 1);
    uow.refresh_object(&entity).unwrap();
    assert_eq!(repo.store.stats().finds, 2);
}

// ============================================================================
// Inferred-type invalidation
// ============================================================================

#[test]
fn writing_commits_invalidate_inferred_typed_entries() {
    let repo = TestRepo::new();
    let quarterly = repo.seed("q1", "Report", &[("content", Term::Literal("Q1".into()))]);
    let alice = repo.seed_person("alice", "Alice");
    let report = repo.type_index("Report");
    let person = repo.type_index("Person");
    let name = repo.attribute("Person", "name");

    let mut reader = repo.uow();
    reader.read_object(report, &quarterly, &Descriptor::new()).unwrap().unwrap();
    drop(reader);
    let cache = repo.ontomap.session().cache();
    assert!(cache.contains(report, &quarterly, None));

    // An unrelated data change makes every reasoner-visible entry stale.
    let mut writer = repo.uow();
    let entity = writer.read_object(person, &alice, &Descriptor::new()).unwrap().unwrap();
    name.set_value(
        &mut entity.borrow_mut(),
        Some(Value::single(Term::Literal("Alicia".into()))),
    )
    .unwrap();
    writer.attribute_changed(&entity, "name").unwrap();
    writer.commit().unwrap();

    assert!(!cache.contains(report, &quarterly, None));
    assert!(cache.contains(person, &alice, None));
}

#[test]
fn commits_without_changes_keep_inferred_entries() {
    let repo = TestRepo::new();
    let quarterly = repo.seed("q1", "Report", &[("content", Term::Literal("Q1".into()))]);
    let alice = repo.seed_person("alice", "Alice");
    let report = repo.type_index("Report");
    let person = repo.type_index("Person");

    let mut reader = repo.uow();
    reader.read_object(report, &quarterly, &Descriptor::new()).unwrap().unwrap();
    drop(reader);

    let mut idle = repo.uow();
    idle.read_object(person, &alice, &Descriptor::new()).unwrap().unwrap();
    idle.commit().unwrap();

    assert!(repo.ontomap.session().cache().contains(report, &quarterly, None));
}

#[test]
fn read_only_transactions_never_seed_the_cache() {
    let repo = TestRepo::new();
    let bob = repo.seed_person("bob", "Bob");
    let person = repo.type_index("Person");

    let mut reader = repo.read_only();
    reader.read_object(person, &bob, &Descriptor::new()).unwrap().unwrap();
    assert_eq!(repo.store.stats().finds, 1);
    assert!(!repo.ontomap.session().cache().contains(person, &bob, None));

    let mut writer = repo.uow();
    writer.read_object(person, &bob, &Descriptor::new()).unwrap().unwrap();
    assert_eq!(repo.store.stats().finds, 2);
    assert!(repo.ontomap.session().cache().contains(person, &bob, None));
}
