//! In-memory backends
//!
//! Nothing survives the process. Useful for embedding and tests.

use parking_lot::RwLock;
use std::collections::HashMap;

use super::{BlobStore, MetadataIndex};
use crate::core::error::{ArchiveError, Result};
use crate::core::query::{self, ListOptions, ListResult};
use crate::core::record::{ArchiveId, ArchiveRecord};

#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    blobs: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.blobs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.read().is_empty()
    }
}

impl BlobStore for MemoryBlobStore {
    fn write(&self, key: &str, bytes: &[u8]) -> Result<()> {
        self.blobs.write().insert(key.to_string(), bytes.to_vec());
        Ok(())
    }

    fn read(&self, key: &str) -> Result<Vec<u8>> {
        self.blobs
            .read()
            .get(key)
            .cloned()
            .ok_or_else(|| ArchiveError::BlobNotFound(key.to_string()))
    }

    fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.blobs.read().contains_key(key))
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.blobs
            .write()
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| ArchiveError::BlobNotFound(key.to_string()))
    }

    fn list_keys(&self) -> Result<Vec<String>> {
        Ok(self.blobs.read().keys().cloned().collect())
    }
}

#[derive(Debug, Default)]
pub struct MemoryIndex {
    records: RwLock<HashMap<ArchiveId, ArchiveRecord>>,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MetadataIndex for MemoryIndex {
    fn put(&self, record: &ArchiveRecord) -> Result<()> {
        self.records.write().insert(record.id, record.clone());
        Ok(())
    }

    fn get(&self, id: &ArchiveId) -> Result<Option<ArchiveRecord>> {
        Ok(self.records.read().get(id).cloned())
    }

    fn delete(&self, id: &ArchiveId) -> Result<()> {
        self.records.write().remove(id);
        Ok(())
    }

    fn list(&self, options: &ListOptions) -> Result<ListResult> {
        let records = self.records.read();
        Ok(query::plan(records.values(), options))
    }

    fn all_ids(&self) -> Result<Vec<ArchiveId>> {
        Ok(self.records.read().keys().copied().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blob_store_basics() {
        let store = MemoryBlobStore::new();
        assert!(store.is_empty());

        store.write("k", b"v").unwrap();
        assert!(store.exists("k").unwrap());
        assert_eq!(store.read("k").unwrap(), b"v");
        assert_eq!(store.len(), 1);

        store.delete("k").unwrap();
        assert!(store.read("k").unwrap_err().is_not_found());
        assert!(store.delete("k").unwrap_err().is_not_found());
    }

    #[test]
    fn test_index_delete_is_noop_safe() {
        let index = MemoryIndex::new();
        index.delete(&ArchiveId::new()).unwrap();
        assert!(index.all_ids().unwrap().is_empty());
    }
}
