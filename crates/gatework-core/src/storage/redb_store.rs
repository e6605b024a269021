//! # redb-backed Component Store
//!
//! A component library kept in one `redb` database file:
//! - ACID transactions
//! - Crash safety (copy-on-write B-trees)
//! - Zero configuration
//!
//! Documents are stored as opaque bytes keyed by their dependency string.

use super::ComponentStore;
use crate::{DependencyKey, GateworkError};
use redb::{Database, ReadableDatabase, ReadableTable, ReadableTableMetadata, TableDefinition};
use std::path::Path;

/// Table for components: dependency string -> encoded document bytes
const COMPONENTS: TableDefinition<&str, &[u8]> = TableDefinition::new("components");

/// A disk-backed component library using redb.
pub struct RedbStore {
    db: Database,
}

impl std::fmt::Debug for RedbStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbStore").finish_non_exhaustive()
    }
}

impl RedbStore {
    /// Open or create a component database at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, GateworkError> {
        let db =
            Database::create(path.as_ref()).map_err(|e| GateworkError::IoError(e.to_string()))?;

        // Initialize the table if it doesn't exist
        {
            let write_txn = db
                .begin_write()
                .map_err(|e| GateworkError::IoError(e.to_string()))?;
            let _ = write_txn
                .open_table(COMPONENTS)
                .map_err(|e| GateworkError::IoError(e.to_string()))?;
            write_txn
                .commit()
                .map_err(|e| GateworkError::IoError(e.to_string()))?;
        }

        Ok(Self { db })
    }

    /// Number of stored components.
    pub fn len(&self) -> Result<u64, GateworkError> {
        let read_txn = self
            .db
            .begin_read()
            .map_err(|e| GateworkError::IoError(e.to_string()))?;
        let table = read_txn
            .open_table(COMPONENTS)
            .map_err(|e| GateworkError::IoError(e.to_string()))?;
        table.len().map_err(|e| GateworkError::IoError(e.to_string()))
    }

    /// Compact the database file.
    pub fn compact(&mut self) -> Result<(), GateworkError> {
        self.db
            .compact()
            .map_err(|e| GateworkError::IoError(e.to_string()))?;
        Ok(())
    }
}

impl ComponentStore for RedbStore {
    fn load(&self, key: &DependencyKey) -> Result<Option<Vec<u8>>, GateworkError> {
        let read_txn = self
            .db
            .begin_read()
            .map_err(|e| GateworkError::IoError(e.to_string()))?;
        let table = read_txn
            .open_table(COMPONENTS)
            .map_err(|e| GateworkError::IoError(e.to_string()))?;
        let name = key.to_string();
        Ok(table
            .get(name.as_str())
            .map_err(|e| GateworkError::IoError(e.to_string()))?
            .map(|v| v.value().to_vec()))
    }

    fn save(&mut self, key: &DependencyKey, bytes: &[u8]) -> Result<(), GateworkError> {
        super::reject_std(key)?;
        let name = key.to_string();
        let write_txn = self
            .db
            .begin_write()
            .map_err(|e| GateworkError::IoError(e.to_string()))?;
        {
            let mut table = write_txn
                .open_table(COMPONENTS)
                .map_err(|e| GateworkError::IoError(e.to_string()))?;
            table
                .insert(name.as_str(), bytes)
                .map_err(|e| GateworkError::IoError(e.to_string()))?;
        }
        write_txn
            .commit()
            .map_err(|e| GateworkError::IoError(e.to_string()))?;
        tracing::debug!(target: "gatework_core::storage", "stored {} in redb", name);
        Ok(())
    }

    fn keys(&self) -> Result<Vec<DependencyKey>, GateworkError> {
        let read_txn = self
            .db
            .begin_read()
            .map_err(|e| GateworkError::IoError(e.to_string()))?;
        let table = read_txn
            .open_table(COMPONENTS)
            .map_err(|e| GateworkError::IoError(e.to_string()))?;

        let mut keys = Vec::new();
        for entry in table
            .iter()
            .map_err(|e| GateworkError::IoError(e.to_string()))?
        {
            let (key, _) = entry.map_err(|e| GateworkError::IoError(e.to_string()))?;
            keys.push(DependencyKey::parse(key.value())?);
        }
        keys.sort();
        Ok(keys)
    }
}
