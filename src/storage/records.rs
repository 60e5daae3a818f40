//! JSON-backed structured-data store
//!
//! Keeps the institution's records (students, staff, attendance, ...) as
//! named tables of JSON objects in a single document. Exports are taken
//! under one read lock, so a snapshot never mixes states from different
//! writes.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{VaultError, VaultResult};

use super::file_io::{read_json, write_bytes_atomic};
use super::DataStore;

/// Serializable record document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordSet {
    /// Records keyed by table name
    #[serde(default)]
    pub tables: BTreeMap<String, Vec<serde_json::Value>>,
}

impl RecordSet {
    /// Total number of records across all tables
    pub fn record_count(&self) -> usize {
        self.tables.values().map(Vec::len).sum()
    }
}

/// Structured-data store persisted to one JSON file
pub struct JsonDataStore {
    path: PathBuf,
    data: RwLock<RecordSet>,
}

impl JsonDataStore {
    /// Create a new store backed by `path`
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            data: RwLock::new(RecordSet::default()),
        }
    }

    /// Open the store and load its contents from disk
    pub fn open(path: PathBuf) -> VaultResult<Self> {
        let store = Self::new(path);
        store.load()?;
        Ok(store)
    }

    /// Load records from disk
    pub fn load(&self) -> VaultResult<()> {
        let file_data: RecordSet = read_json(&self.path)?;

        let mut data = self
            .data
            .write()
            .map_err(|e| VaultError::Storage(format!("Failed to acquire write lock: {}", e)))?;
        *data = file_data;

        Ok(())
    }

    /// Append a record to a table and persist
    pub fn insert(&self, table: &str, record: serde_json::Value) -> VaultResult<()> {
        let mut data = self
            .data
            .write()
            .map_err(|e| VaultError::Storage(format!("Failed to acquire write lock: {}", e)))?;

        let mut updated = data.clone();
        updated
            .tables
            .entry(table.to_string())
            .or_default()
            .push(record);

        write_bytes_atomic(&self.path, &serde_json::to_vec(&updated)?)?;
        *data = updated;
        Ok(())
    }

    /// Get all records of a table
    pub fn records(&self, table: &str) -> VaultResult<Vec<serde_json::Value>> {
        let data = self
            .data
            .read()
            .map_err(|e| VaultError::Storage(format!("Failed to acquire read lock: {}", e)))?;

        Ok(data.tables.get(table).cloned().unwrap_or_default())
    }

    /// Get a copy of the whole document
    pub fn snapshot(&self) -> VaultResult<RecordSet> {
        let data = self
            .data
            .read()
            .map_err(|e| VaultError::Storage(format!("Failed to acquire read lock: {}", e)))?;
        Ok(data.clone())
    }
}

impl DataStore for JsonDataStore {
    fn export_all(&self) -> VaultResult<Vec<u8>> {
        let data = self.data.read().map_err(|e| {
            VaultError::MissingDataExport(format!("Failed to acquire read lock: {}", e))
        })?;

        let bytes = serde_json::to_vec(&*data)
            .map_err(|e| VaultError::MissingDataExport(format!("Failed to serialize: {}", e)))?;

        debug!(
            records = data.record_count(),
            bytes = bytes.len(),
            "exported data store"
        );
        Ok(bytes)
    }

    fn import_all(&self, snapshot: &[u8]) -> VaultResult<()> {
        let incoming: RecordSet = serde_json::from_slice(snapshot).map_err(|e| {
            VaultError::Storage(format!("Data export is not a valid record set: {}", e))
        })?;

        let mut data = self
            .data
            .write()
            .map_err(|e| VaultError::Storage(format!("Failed to acquire write lock: {}", e)))?;

        write_bytes_atomic(&self.path, snapshot)?;
        debug!(records = incoming.record_count(), "imported data store");
        *data = incoming;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn create_test_store() -> (JsonDataStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = JsonDataStore::open(temp_dir.path().join("records.json")).unwrap();
        (store, temp_dir)
    }

    #[test]
    fn test_insert_and_read() {
        let (store, _temp) = create_test_store();
        store
            .insert("students", json!({"id": 1, "name": "Test"}))
            .unwrap();

        let students = store.records("students").unwrap();
        assert_eq!(students, vec![json!({"id": 1, "name": "Test"})]);
        assert!(store.records("staff").unwrap().is_empty());
    }

    #[test]
    fn test_export_import_reproduces_bytes() {
        let (store, temp) = create_test_store();
        store.insert("students", json!({"id": 1, "name": "Ada"})).unwrap();
        store.insert("staff", json!({"id": 7, "role": "teacher"})).unwrap();
        let exported = store.export_all().unwrap();

        let other = JsonDataStore::new(temp.path().join("other.json"));
        other.import_all(&exported).unwrap();

        assert_eq!(other.export_all().unwrap(), exported);
    }

    #[test]
    fn test_import_persists_to_disk() {
        let (store, temp) = create_test_store();
        store.insert("students", json!({"id": 1})).unwrap();
        let exported = store.export_all().unwrap();

        let path = temp.path().join("restored.json");
        JsonDataStore::new(path.clone()).import_all(&exported).unwrap();

        let reopened = JsonDataStore::open(path).unwrap();
        assert_eq!(reopened.records("students").unwrap().len(), 1);
    }

    #[test]
    fn test_invalid_import_leaves_store_unchanged() {
        let (store, _temp) = create_test_store();
        store.insert("students", json!({"id": 1})).unwrap();
        let before = store.export_all().unwrap();

        assert!(store.import_all(b"not json").is_err());
        assert_eq!(store.export_all().unwrap(), before);
    }
}
