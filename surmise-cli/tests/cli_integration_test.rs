#[allow(deprecated)]
use assert_cmd::{Command, cargo::cargo_bin};
use predicates::prelude::*;
use std::fs;
use std::process;
use surmise::{DirectoryStore, ExampleKind, ExampleStore, Record, StoredExample};
use tempfile::TempDir;

/// Helper to save a stored example the way a property run would
fn create_stored_example(dir: &std::path::Path, key: &str, choices: Vec<u64>, kind: ExampleKind) {
    let store = DirectoryStore::open(dir).unwrap();
    let record = Record {
        choices,
        generation: 7,
        max_choices: 10_000,
    };
    store
        .store(&StoredExample::new(key.to_string(), record, kind))
        .unwrap();
}

fn surmise(dir: &std::path::Path) -> Command {
    let mut cmd = Command::from_std(process::Command::new(cargo_bin!("surmise")));
    cmd.arg("--dir").arg(dir);
    cmd
}

fn json_files(dir: &std::path::Path) -> usize {
    fs::read_dir(dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.path().extension().is_some_and(|ext| ext == "json"))
        .count()
}

#[test]
fn test_list_no_examples() {
    let temp_dir = TempDir::new().unwrap();

    surmise(temp_dir.path())
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("No stored examples found"));
}

#[test]
fn test_list_with_examples() {
    let temp_dir = TempDir::new().unwrap();

    create_stored_example(temp_dir.path(), "props::sorted::u32", vec![5], ExampleKind::Fail);
    create_stored_example(
        temp_dir.path(),
        "props::parse::alloc::string::String",
        vec![1, 65, 0],
        ExampleKind::Error {
            kind: "panic at src/parse.rs:12".to_string(),
        },
    );

    surmise(temp_dir.path())
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("Found 2 stored example(s)"))
        .stdout(predicate::str::contains("props::sorted::u32"))
        .stdout(predicate::str::contains("1 choice, fail"))
        .stdout(predicate::str::contains("3 choices, error: panic at src/parse.rs:12"));
}

#[test]
fn test_list_verbose() {
    let temp_dir = TempDir::new().unwrap();

    create_stored_example(temp_dir.path(), "verbose::u8", vec![3, 4], ExampleKind::Fail);

    surmise(temp_dir.path())
        .arg("list")
        .arg("--verbose")
        .assert()
        .success()
        .stdout(predicate::str::contains("verbose::u8"))
        .stdout(predicate::str::contains("generation=7"))
        .stdout(predicate::str::contains("Choices: [3, 4]"))
        .stdout(predicate::str::contains("Saved:"));
}

#[test]
fn test_show_command() {
    let temp_dir = TempDir::new().unwrap();

    create_stored_example(temp_dir.path(), "show::i64", vec![0, 9, 2], ExampleKind::Fail);

    surmise(temp_dir.path())
        .arg("show")
        .arg("show::i64")
        .assert()
        .success()
        .stdout(predicate::str::contains("Stored example for 'show::i64'"))
        .stdout(predicate::str::contains("Kind: fail"))
        .stdout(predicate::str::contains("Choices: [0, 9, 2]"))
        .stdout(predicate::str::contains("Generation: 7"))
        .stdout(predicate::str::contains("Choice limit: 10000"));
}

#[test]
fn test_show_json() {
    let temp_dir = TempDir::new().unwrap();

    create_stored_example(temp_dir.path(), "json::bool", vec![1], ExampleKind::Fail);

    surmise(temp_dir.path())
        .arg("show")
        .arg("json::bool")
        .arg("--json")
        .assert()
        .success()
        .stdout(predicate::str::contains("\"key\": \"json::bool\""))
        .stdout(predicate::str::contains("\"type\": \"fail\""));
}

#[test]
fn test_show_missing_key() {
    let temp_dir = TempDir::new().unwrap();

    surmise(temp_dir.path())
        .arg("show")
        .arg("nonexistent")
        .assert()
        .success()
        .stdout(predicate::str::contains("No stored example for 'nonexistent'"));
}

#[test]
fn test_stats_command() {
    let temp_dir = TempDir::new().unwrap();

    create_stored_example(temp_dir.path(), "stats::a", vec![1, 2], ExampleKind::Fail);
    create_stored_example(temp_dir.path(), "stats::b", vec![1, 2, 3, 4], ExampleKind::Fail);
    create_stored_example(
        temp_dir.path(),
        "stats::c",
        vec![],
        ExampleKind::Error {
            kind: "core::num::ParseIntError".to_string(),
        },
    );

    surmise(temp_dir.path())
        .arg("stats")
        .assert()
        .success()
        .stdout(predicate::str::contains("Example Store Statistics"))
        .stdout(predicate::str::contains("Stored examples: 3"))
        .stdout(predicate::str::contains("Failures: 2"))
        .stdout(predicate::str::contains("Errors: 1"))
        .stdout(predicate::str::contains("Total choices: 6"))
        .stdout(predicate::str::contains("Average choices per example: 2.0"))
        .stdout(predicate::str::contains("Longest example: stats::b (4 choices)"));
}

#[test]
fn test_stats_no_examples() {
    let temp_dir = TempDir::new().unwrap();

    surmise(temp_dir.path())
        .arg("stats")
        .assert()
        .success()
        .stdout(predicate::str::contains("No stored examples found"));
}

#[test]
fn test_clean_single_key() {
    let temp_dir = TempDir::new().unwrap();

    create_stored_example(temp_dir.path(), "clean::keep", vec![1], ExampleKind::Fail);
    create_stored_example(temp_dir.path(), "clean::drop", vec![2], ExampleKind::Fail);

    surmise(temp_dir.path())
        .arg("clean")
        .arg("clean::drop")
        .arg("-y")
        .assert()
        .success()
        .stdout(predicate::str::contains("Deleted stored example for 'clean::drop'"));

    let store = DirectoryStore::open(temp_dir.path()).unwrap();
    assert_eq!(store.keys().unwrap(), vec!["clean::keep".to_string()]);
    assert_eq!(json_files(temp_dir.path()), 1);
}

#[test]
fn test_clean_missing_key() {
    let temp_dir = TempDir::new().unwrap();

    surmise(temp_dir.path())
        .arg("clean")
        .arg("missing::key")
        .arg("-y")
        .assert()
        .success()
        .stdout(predicate::str::contains("No stored example for 'missing::key'"));
}

#[test]
fn test_clean_all() {
    let temp_dir = TempDir::new().unwrap();

    create_stored_example(temp_dir.path(), "all::a", vec![1], ExampleKind::Fail);
    create_stored_example(temp_dir.path(), "all::b", vec![2], ExampleKind::Fail);
    create_stored_example(temp_dir.path(), "all::c", vec![3], ExampleKind::Fail);

    surmise(temp_dir.path())
        .arg("clean")
        .arg("-y")
        .assert()
        .success()
        .stdout(predicate::str::contains("Deleted 3 stored example(s)"));

    assert_eq!(json_files(temp_dir.path()), 0);
}

#[test]
fn test_clean_cancelled_without_confirmation() {
    let temp_dir = TempDir::new().unwrap();

    create_stored_example(temp_dir.path(), "confirm::a", vec![1], ExampleKind::Fail);

    surmise(temp_dir.path())
        .arg("clean")
        .write_stdin("n\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("Cancelled."));

    assert_eq!(json_files(temp_dir.path()), 1);
}

#[test]
fn test_unreadable_entries_are_skipped() {
    let temp_dir = TempDir::new().unwrap();

    create_stored_example(temp_dir.path(), "good::u8", vec![1], ExampleKind::Fail);
    fs::write(temp_dir.path().join("garbage.json"), "{ not json").unwrap();

    surmise(temp_dir.path())
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("Found 1 stored example(s)"))
        .stdout(predicate::str::contains("good::u8"));
}

#[test]
fn test_help_lists_commands() {
    let mut cmd = Command::from_std(process::Command::new(cargo_bin!("surmise")));
    cmd.arg("--help");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("list"))
        .stdout(predicate::str::contains("show"))
        .stdout(predicate::str::contains("clean"))
        .stdout(predicate::str::contains("stats"));
}
