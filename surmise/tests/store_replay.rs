use std::fs;
use std::sync::{Arc, Mutex};

use surmise::*;
use tempfile::TempDir;

fn failing_property(
    store_dir: &std::path::Path,
    seed: u64,
) -> Property<Vectors<Integers<u32>>, impl Fn(Vec<u32>) -> bool> {
    Property::new("sum_below_limit", vectors(integers(0u32, 1000)), |v: Vec<u32>| {
        v.iter().sum::<u32>() < 1200
    })
    .config(Config::new().seed(seed).store_dir(store_dir))
}

#[test]
fn test_minimal_example_is_saved_and_replayed() {
    let temp_dir = TempDir::new().unwrap();

    let first = failing_property(temp_dir.path(), 1).check().unwrap();
    assert!(first.is_falsified());
    let saved_choices = first.record().unwrap().choices.clone();

    let store = DirectoryStore::open(temp_dir.path()).unwrap();
    let saved = store.lookup(&first.key).unwrap().unwrap();
    assert_eq!(saved.record.choices, saved_choices);
    assert_eq!(saved.kind, ExampleKind::Fail);

    // A different seed still reports the stored example, found by replay
    let second = failing_property(temp_dir.path(), 99).check().unwrap();
    assert_eq!(second.record().unwrap().choices, saved_choices);
    assert_eq!(second.record().unwrap().generation, 1);
    assert_eq!(store.keys().unwrap(), vec![first.key.clone()]);
}

#[test]
fn test_stored_example_is_replayed_before_random_attempts() {
    let temp_dir = TempDir::new().unwrap();
    let first = failing_property(temp_dir.path(), 3).check().unwrap();
    let expected = first.value().cloned().unwrap();

    let seen = Mutex::new(Vec::new());
    let outcome = Property::new("sum_below_limit", vectors(integers(0u32, 1000)), |v: Vec<u32>| {
        let passes = v.iter().sum::<u32>() < 1200;
        seen.lock().unwrap().push(v);
        passes
    })
    .config(Config::new().seed(4).store_dir(temp_dir.path()))
    .check()
    .unwrap();

    assert_eq!(seen.lock().unwrap()[0], expected);
    assert_eq!(outcome.value(), Some(&expected));
}

#[test]
fn test_fixed_property_removes_stale_example() {
    let temp_dir = TempDir::new().unwrap();
    let first = failing_property(temp_dir.path(), 5).check().unwrap();
    let store = DirectoryStore::open(temp_dir.path()).unwrap();
    assert!(store.lookup(&first.key).unwrap().is_some());

    let fixed = Property::new("sum_below_limit", vectors(integers(0u32, 1000)), |_: Vec<u32>| true)
        .config(Config::new().seed(5).store_dir(temp_dir.path()).max_examples(20))
        .check()
        .unwrap();

    assert!(fixed.is_pass());
    assert!(store.lookup(&first.key).unwrap().is_none());
}

#[test]
fn test_error_kind_is_persisted() {
    let temp_dir = TempDir::new().unwrap();
    let outcome = Property::new("bounded", integers(0i32, 100), |x: i32| {
        assert!(x < 37, "{} is too large", x);
        true
    })
    .config(Config::new().seed(2).store_dir(temp_dir.path()))
    .check()
    .unwrap();

    assert_eq!(outcome.value(), Some(&37));
    let store = DirectoryStore::open(temp_dir.path()).unwrap();
    let saved = store.lookup(&outcome.key).unwrap().unwrap();
    match saved.kind {
        ExampleKind::Error { kind } => assert!(kind.starts_with("panic at ")),
        other => panic!("expected an error entry, got {:?}", other),
    }
}

#[test]
fn test_unusable_store_is_not_fatal() {
    let temp_dir = TempDir::new().unwrap();
    let blocker = temp_dir.path().join("not-a-directory");
    fs::write(&blocker, "occupied").unwrap();

    let outcome = Property::new("lt_five", integers(0, 10), |x: i32| x < 5)
        .config(Config::new().seed(1).store_dir(&blocker))
        .check()
        .unwrap();

    assert_eq!(outcome.value(), Some(&5));
    assert!(
        outcome
            .diagnostics
            .iter()
            .any(|d| matches!(d, Diagnostic::LookupFailed { .. }))
    );
    assert!(outcome.to_string().contains("warning:"));
}

#[test]
fn test_malformed_entry_is_reported_and_replaced() {
    let temp_dir = TempDir::new().unwrap();
    let property = failing_property(temp_dir.path(), 8);
    let store = DirectoryStore::open(temp_dir.path()).unwrap();
    fs::write(store.path_for(&property.key()), "{ not json").unwrap();

    let outcome = property.check().unwrap();
    assert!(outcome.is_falsified());
    assert!(
        outcome
            .diagnostics
            .iter()
            .any(|d| matches!(d, Diagnostic::LookupFailed { .. }))
    );
    assert!(store.lookup(&property.key()).unwrap().is_some());
}

/// Store that can be read but rejects every write
struct ReadOnlyStore {
    inner: InMemoryStore,
}

impl ExampleStore for ReadOnlyStore {
    fn lookup(&self, key: &str) -> Result<Option<StoredExample>, StoreError> {
        self.inner.lookup(key)
    }

    fn store(&self, _example: &StoredExample) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("read-only".to_string()))
    }

    fn remove(&self, _key: &str) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("read-only".to_string()))
    }

    fn keys(&self) -> Result<Vec<String>, StoreError> {
        self.inner.keys()
    }
}

#[test]
fn test_failed_save_is_not_fatal() {
    let store = Arc::new(ReadOnlyStore {
        inner: InMemoryStore::new(),
    });

    let outcome = Property::new("lt_five", integers(0, 10), |x: i32| x < 5)
        .config(Config::new().seed(3).store(store.clone()))
        .check()
        .unwrap();

    assert_eq!(outcome.value(), Some(&5));
    assert!(
        outcome
            .diagnostics
            .iter()
            .any(|d| matches!(d, Diagnostic::StoreFailed { .. }))
    );
    assert!(store.lookup(&outcome.key).unwrap().is_none());
}

#[test]
fn test_failed_stale_removal_is_not_fatal() {
    let inner = InMemoryStore::new();
    let property = Property::new("always_holds", integers(0, 10), |_: i32| true)
        .config(Config::new().seed(3).max_examples(20));
    let stale = StoredExample::new(
        property.key(),
        Record {
            choices: vec![4],
            generation: 2,
            max_choices: 8192,
        },
        ExampleKind::Fail,
    );
    inner.store(&stale).unwrap();
    let store = Arc::new(ReadOnlyStore { inner });

    let outcome = property
        .config(Config::new().seed(3).max_examples(20).store(store.clone()))
        .check()
        .unwrap();

    assert!(outcome.is_pass());
    assert!(
        outcome
            .diagnostics
            .iter()
            .any(|d| matches!(d, Diagnostic::RemoveFailed { .. }))
    );
    assert!(store.lookup(&outcome.key).unwrap().is_some());
}
