//! Example persistence and regression replay
//!
//! Minimal failing examples are saved per property key so the next run can
//! replay them before generating anything new.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::StoreError;
use crate::outcome::Record;

/// How the stored example failed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExampleKind {
    /// The predicate returned false
    Fail,
    /// The predicate raised an error of this kind
    Error { kind: String },
}

/// A persisted minimal example
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredExample {
    /// Property key: `<name>::<argument type>`
    pub key: String,
    /// Choice sequence with its generation and cap
    pub record: Record,
    /// Failure classification at the time it was saved
    pub kind: ExampleKind,
    /// When it was saved
    pub saved_at: DateTime<Utc>,
}

impl StoredExample {
    /// Create an entry stamped with the current time
    pub fn new(key: String, record: Record, kind: ExampleKind) -> Self {
        Self {
            key,
            record,
            kind,
            saved_at: Utc::now(),
        }
    }
}

/// Storage for minimal examples, keyed by property
///
/// Failures are reported to the caller but never abort a run.
pub trait ExampleStore: Send + Sync {
    /// The stored example for `key`, if any
    fn lookup(&self, key: &str) -> Result<Option<StoredExample>, StoreError>;

    /// Save `example` under its key, replacing any previous entry
    fn store(&self, example: &StoredExample) -> Result<(), StoreError>;

    /// Delete the entry for `key`; a missing entry is not an error
    fn remove(&self, key: &str) -> Result<(), StoreError>;

    /// All keys with a stored example
    fn keys(&self) -> Result<Vec<String>, StoreError>;
}

/// Process-local store, mostly for tests
#[derive(Debug, Default)]
pub struct InMemoryStore {
    entries: Mutex<HashMap<String, StoredExample>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, StoredExample>>, StoreError> {
        self.entries
            .lock()
            .map_err(|_| StoreError::Unavailable("in-memory store lock poisoned".to_string()))
    }
}

impl ExampleStore for InMemoryStore {
    fn lookup(&self, key: &str) -> Result<Option<StoredExample>, StoreError> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn store(&self, example: &StoredExample) -> Result<(), StoreError> {
        self.lock()?.insert(example.key.clone(), example.clone());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.lock()?.remove(key);
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>, StoreError> {
        let mut keys: Vec<String> = self.lock()?.keys().cloned().collect();
        keys.sort();
        Ok(keys)
    }
}

/// One JSON file per property under a root directory
#[derive(Debug, Clone)]
pub struct DirectoryStore {
    root_dir: PathBuf,
}

impl DirectoryStore {
    /// Open (creating if needed) a store rooted at `path`
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let root_dir = path.as_ref().to_path_buf();
        fs::create_dir_all(&root_dir).map_err(|source| StoreError::Io {
            path: root_dir.clone(),
            source,
        })?;
        Ok(Self { root_dir })
    }

    pub fn root(&self) -> &Path {
        &self.root_dir
    }

    /// File that holds the example for `key`
    pub fn path_for(&self, key: &str) -> PathBuf {
        self.root_dir.join(file_name(key))
    }

    /// Every readable entry, sorted by key; unreadable files are skipped
    pub fn entries(&self) -> Result<Vec<StoredExample>, StoreError> {
        let dir = fs::read_dir(&self.root_dir).map_err(|source| self.io_error(&self.root_dir, source))?;

        let mut entries = Vec::new();
        for entry in dir {
            let path = entry.map_err(|source| self.io_error(&self.root_dir, source))?.path();
            if path.extension().and_then(|s| s.to_str()) != Some("json") {
                continue;
            }
            match read_example(&path) {
                Ok(example) => entries.push(example),
                Err(err) => tracing::warn!(path = %path.display(), error = %err, "skipping unreadable example"),
            }
        }
        entries.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(entries)
    }

    fn io_error(&self, path: &Path, source: io::Error) -> StoreError {
        StoreError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

impl ExampleStore for DirectoryStore {
    fn lookup(&self, key: &str) -> Result<Option<StoredExample>, StoreError> {
        let path = self.path_for(key);
        match read_example(&path) {
            // A hash collision would hand back another property's entry
            Ok(example) if example.key == key => Ok(Some(example)),
            Ok(_) => Ok(None),
            Err(StoreError::Io { source, .. }) if source.kind() == io::ErrorKind::NotFound => {
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    fn store(&self, example: &StoredExample) -> Result<(), StoreError> {
        let path = self.path_for(&example.key);
        let json = serde_json::to_string_pretty(example).map_err(|source| StoreError::Malformed {
            name: example.key.clone(),
            source,
        })?;

        // Write then rename so readers never see a partial file
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json).map_err(|source| self.io_error(&tmp, source))?;
        fs::rename(&tmp, &path).map_err(|source| self.io_error(&path, source))
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        let path = self.path_for(key);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(source) if source.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(self.io_error(&path, source)),
        }
    }

    fn keys(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.entries()?.into_iter().map(|e| e.key).collect())
    }
}

fn read_example(path: &Path) -> Result<StoredExample, StoreError> {
    let contents = fs::read_to_string(path).map_err(|source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&contents).map_err(|source| StoreError::Malformed {
        name: path.display().to_string(),
        source,
    })
}

/// Readable, collision-resistant file name for a key
fn file_name(key: &str) -> String {
    let readable: String = key
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .take(80)
        .collect();
    let digest = Sha256::digest(key.as_bytes());
    format!("{}-{}.json", readable, &hex::encode(digest)[..16])
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn example(key: &str, choices: Vec<u64>) -> StoredExample {
        StoredExample::new(
            key.to_string(),
            Record {
                choices,
                generation: 4,
                max_choices: 100,
            },
            ExampleKind::Fail,
        )
    }

    #[test]
    fn test_in_memory_roundtrip() {
        let store = InMemoryStore::new();
        assert!(store.lookup("a").unwrap().is_none());

        store.store(&example("a", vec![1, 2])).unwrap();
        store.store(&example("b", vec![3])).unwrap();
        assert_eq!(store.lookup("a").unwrap().unwrap().record.choices, vec![1, 2]);
        assert_eq!(store.keys().unwrap(), vec!["a", "b"]);

        store.remove("a").unwrap();
        store.remove("missing").unwrap();
        assert!(store.lookup("a").unwrap().is_none());
    }

    #[test]
    fn test_directory_store_persists_across_instances() {
        let temp_dir = TempDir::new().unwrap();
        let key = "tests::sorted::alloc::vec::Vec<u8>";

        let store = DirectoryStore::open(temp_dir.path()).unwrap();
        store.store(&example(key, vec![5, 0, 7])).unwrap();

        let reopened = DirectoryStore::open(temp_dir.path()).unwrap();
        let loaded = reopened.lookup(key).unwrap().unwrap();
        assert_eq!(loaded.key, key);
        assert_eq!(loaded.record.choices, vec![5, 0, 7]);
        assert_eq!(loaded.record.generation, 4);
        assert_eq!(loaded.kind, ExampleKind::Fail);
        assert_eq!(reopened.keys().unwrap(), vec![key.to_string()]);
    }

    #[test]
    fn test_directory_store_replaces_and_removes() {
        let temp_dir = TempDir::new().unwrap();
        let store = DirectoryStore::open(temp_dir.path()).unwrap();

        store.store(&example("k", vec![9, 9])).unwrap();
        store.store(&example("k", vec![1])).unwrap();
        assert_eq!(store.lookup("k").unwrap().unwrap().record.choices, vec![1]);
        assert_eq!(store.entries().unwrap().len(), 1);

        store.remove("k").unwrap();
        store.remove("k").unwrap();
        assert!(store.lookup("k").unwrap().is_none());
    }

    #[test]
    fn test_directory_store_reports_malformed_entries() {
        let temp_dir = TempDir::new().unwrap();
        let store = DirectoryStore::open(temp_dir.path()).unwrap();
        fs::write(store.path_for("broken"), "{ not json").unwrap();

        assert!(matches!(
            store.lookup("broken"),
            Err(StoreError::Malformed { .. })
        ));
        assert!(store.entries().unwrap().is_empty());
    }

    #[test]
    fn test_error_kind_serialization() {
        let kind = ExampleKind::Error {
            kind: "panic at src/lib.rs:3".to_string(),
        };
        let json = serde_json::to_string(&kind).unwrap();
        assert_eq!(json, r#"{"type":"error","kind":"panic at src/lib.rs:3"}"#);
    }

    #[test]
    fn test_file_names_are_distinct_and_safe() {
        let a = file_name("mod::prop::u8");
        let b = file_name("mod::prop::u16");
        assert_ne!(a, b);
        assert!(a.starts_with("mod__prop__u8-"));
        assert!(a.ends_with(".json"));
        assert!(!a.contains(':'));
    }
}
