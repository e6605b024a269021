//! # Component Storage
//!
//! Backends holding encoded component documents keyed by dependency string.
//!
//! - [`DirectoryStore`]: one file per component under a library root,
//!   laid out as `<root>/<author>/<name>/<version>.gwc`
//! - [`RedbStore`]: a single `redb` database file (ACID, crash safe)
//! - [`MemoryStore`]: an in-process map, used by tests and as a scratch
//!   library
//!
//! Stores only move bytes. Decoding and dependency resolution live in
//! [`Registry`](crate::Registry).

mod redb_store;

pub use redb_store::RedbStore;

use crate::primitives::COMPONENT_EXTENSION;
use crate::{DependencyKey, GateworkError};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// A backend that stores encoded component documents.
pub trait ComponentStore {
    /// Encoded document stored under `key`, if any.
    fn load(&self, key: &DependencyKey) -> Result<Option<Vec<u8>>, GateworkError>;

    /// Store an encoded document under `key`, replacing any previous one.
    fn save(&mut self, key: &DependencyKey, bytes: &[u8]) -> Result<(), GateworkError>;

    /// All stored keys in ascending order.
    fn keys(&self) -> Result<Vec<DependencyKey>, GateworkError>;
}

fn reject_std(key: &DependencyKey) -> Result<(), GateworkError> {
    match key {
        DependencyKey::Std { .. } => Err(GateworkError::InvalidDependencyFormat(format!(
            "{key} is a standard-library component and cannot be stored"
        ))),
        DependencyKey::Stored { .. } => Ok(()),
    }
}

// =============================================================================
// IN-MEMORY STORE
// =============================================================================

/// Component documents held in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    documents: BTreeMap<DependencyKey, Vec<u8>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

impl ComponentStore for MemoryStore {
    fn load(&self, key: &DependencyKey) -> Result<Option<Vec<u8>>, GateworkError> {
        Ok(self.documents.get(key).cloned())
    }

    fn save(&mut self, key: &DependencyKey, bytes: &[u8]) -> Result<(), GateworkError> {
        reject_std(key)?;
        self.documents.insert(key.clone(), bytes.to_vec());
        Ok(())
    }

    fn keys(&self) -> Result<Vec<DependencyKey>, GateworkError> {
        Ok(self.documents.keys().cloned().collect())
    }
}

// =============================================================================
// DIRECTORY STORE
// =============================================================================

/// Component documents stored as files under a library root.
#[derive(Debug, Clone)]
pub struct DirectoryStore {
    root: PathBuf,
}

impl DirectoryStore {
    /// Use `root` as the library directory. It is created on first save.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_of(&self, key: &DependencyKey) -> Result<PathBuf, GateworkError> {
        reject_std(key)?;
        key.path_in(&self.root)
            .ok_or_else(|| GateworkError::InvalidDependencyFormat(key.to_string()))
    }

    fn subdirectories(dir: &Path) -> Result<Vec<(String, PathBuf)>, GateworkError> {
        let mut found = Vec::new();
        for entry in std::fs::read_dir(dir).map_err(|e| GateworkError::IoError(e.to_string()))? {
            let entry = entry.map_err(|e| GateworkError::IoError(e.to_string()))?;
            let path = entry.path();
            if path.is_dir()
                && let Some(name) = path.file_name().and_then(|n| n.to_str())
            {
                found.push((name.to_string(), path.clone()));
            }
        }
        Ok(found)
    }
}

impl ComponentStore for DirectoryStore {
    fn load(&self, key: &DependencyKey) -> Result<Option<Vec<u8>>, GateworkError> {
        let path = self.path_of(key)?;
        match std::fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(GateworkError::IoError(format!(
                "{}: {}",
                path.display(),
                e
            ))),
        }
    }

    fn save(&mut self, key: &DependencyKey, bytes: &[u8]) -> Result<(), GateworkError> {
        let path = self.path_of(key)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| GateworkError::IoError(e.to_string()))?;
        }
        std::fs::write(&path, bytes)
            .map_err(|e| GateworkError::IoError(format!("{}: {}", path.display(), e)))?;
        tracing::debug!(target: "gatework_core::storage", "stored {} at {}", key, path.display());
        Ok(())
    }

    fn keys(&self) -> Result<Vec<DependencyKey>, GateworkError> {
        if !self.root.is_dir() {
            return Ok(Vec::new());
        }
        let mut keys = Vec::new();
        for (author, author_dir) in Self::subdirectories(&self.root)? {
            for (name, name_dir) in Self::subdirectories(&author_dir)? {
                let entries =
                    std::fs::read_dir(&name_dir).map_err(|e| GateworkError::IoError(e.to_string()))?;
                for entry in entries {
                    let path = entry.map_err(|e| GateworkError::IoError(e.to_string()))?.path();
                    if path.extension().and_then(|e| e.to_str()) != Some(COMPONENT_EXTENSION) {
                        continue;
                    }
                    let Some(version) = path.file_stem().and_then(|s| s.to_str()) else {
                        continue;
                    };
                    // Foreign files in the tree are skipped, not reported.
                    if let Ok(key) = DependencyKey::parse(&format!("{author}/{name}/{version}")) {
                        keys.push(key);
                    }
                }
            }
        }
        keys.sort();
        Ok(keys)
    }
}

impl<S: ComponentStore + ?Sized> ComponentStore for Box<S> {
    fn load(&self, key: &DependencyKey) -> Result<Option<Vec<u8>>, GateworkError> {
        (**self).load(key)
    }

    fn save(&mut self, key: &DependencyKey, bytes: &[u8]) -> Result<(), GateworkError> {
        (**self).save(key, bytes)
    }

    fn keys(&self) -> Result<Vec<DependencyKey>, GateworkError> {
        (**self).keys()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn key(s: &str) -> DependencyKey {
        DependencyKey::parse(s).expect("key")
    }

    #[test]
    fn memory_store_roundtrip() {
        let mut store = MemoryStore::new();
        store.save(&key("me/xor/1"), b"abc").expect("save");
        assert_eq!(store.load(&key("me/xor/1")).expect("load"), Some(b"abc".to_vec()));
        assert_eq!(store.load(&key("me/xor/2")).expect("load"), None);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn std_keys_are_not_stored() {
        let mut store = MemoryStore::new();
        assert!(store.save(&key("@xor"), b"abc").is_err());
        assert!(store.is_empty());
    }

    #[test]
    fn directory_layout_and_listing() {
        let temp = tempdir().expect("temp dir");
        let mut store = DirectoryStore::new(temp.path().join("lib"));
        assert!(store.keys().expect("keys").is_empty());

        store.save(&key("bob/mux/2"), b"two").expect("save");
        store.save(&key("alice/adder/1"), b"one").expect("save");
        std::fs::write(temp.path().join("lib/bob/mux/notes.txt"), b"x").expect("write");

        assert!(temp.path().join("lib/bob/mux/2.gwc").is_file());
        assert_eq!(
            store.keys().expect("keys"),
            vec![key("alice/adder/1"), key("bob/mux/2")]
        );
        assert_eq!(
            store.load(&key("bob/mux/2")).expect("load"),
            Some(b"two".to_vec())
        );
        assert_eq!(store.load(&key("bob/mux/3")).expect("load"), None);
    }

    #[test]
    fn directory_store_stays_under_root() {
        let temp = tempdir().expect("temp dir");
        let mut store = DirectoryStore::new(temp.path().join("lib"));
        assert!(DependencyKey::parse("../escaped/1").is_err());

        let escaping = DependencyKey::Stored {
            author: "..".to_string(),
            name: "escaped".to_string(),
            version: 1,
        };
        assert!(matches!(
            store.save(&escaping, b"x"),
            Err(GateworkError::InvalidDependencyFormat(_))
        ));
        assert!(store.load(&escaping).is_err());
        assert!(!temp.path().join("escaped").exists());
    }
}
