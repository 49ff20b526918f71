//! JSON file metadata index
//!
//! The whole index is one document:
//!
//! ```json
//! { "version": 1, "records": { "<id>": { ...ArchiveRecord... } } }
//! ```
//!
//! Records are held in an [`IndexCache`] owned by the index instance. The
//! cache is filled from disk on first access. Every mutation marks it dirty
//! and is flushed to disk before the mutating call returns, so the file and
//! the cache never disagree once a call has completed.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::MetadataIndex;
use crate::core::error::{ArchiveError, Result};
use crate::core::query::{self, ListOptions, ListResult};
use crate::core::record::{ArchiveId, ArchiveRecord};

pub const INDEX_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Deserialize)]
struct IndexDocument {
    version: u32,
    #[serde(default)]
    records: BTreeMap<ArchiveId, ArchiveRecord>,
}

/// In-memory copy of the index document
#[derive(Debug, Default)]
struct IndexCache {
    /// `None` until loaded from disk
    records: Option<BTreeMap<ArchiveId, ArchiveRecord>>,
    dirty: bool,
}

impl IndexCache {
    /// Loaded records, reading the file on first use
    fn records(&mut self, path: &Path) -> Result<&mut BTreeMap<ArchiveId, ArchiveRecord>> {
        if self.records.is_none() {
            self.records = Some(load_document(path)?);
            self.dirty = false;
        }
        Ok(self.records.get_or_insert_with(BTreeMap::new))
    }

    fn flush(&mut self, path: &Path) -> Result<()> {
        if !self.dirty {
            return Ok(());
        }
        if let Some(records) = &self.records {
            write_document(path, records)?;
        }
        self.dirty = false;
        Ok(())
    }

    /// Apply `f` to the records, then persist
    ///
    /// On a failed flush the cache is dropped and reloaded from disk on the
    /// next access, so a mutation that never reached the file is not served.
    fn mutate<T>(
        &mut self,
        path: &Path,
        f: impl FnOnce(&mut BTreeMap<ArchiveId, ArchiveRecord>) -> T,
    ) -> Result<T> {
        let out = f(self.records(path)?);
        self.dirty = true;
        if let Err(e) = self.flush(path) {
            self.records = None;
            self.dirty = false;
            return Err(e);
        }
        Ok(out)
    }
}

fn load_document(path: &Path) -> Result<BTreeMap<ArchiveId, ArchiveRecord>> {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!("No index at {:?}, starting empty", path);
            return Ok(BTreeMap::new());
        }
        Err(e) => return Err(e.into()),
    };

    let doc: IndexDocument = serde_json::from_str(&text)?;
    if doc.version != INDEX_FORMAT_VERSION {
        return Err(ArchiveError::UnsupportedIndexVersion(doc.version));
    }

    debug!("Loaded {} records from {:?}", doc.records.len(), path);
    Ok(doc.records)
}

fn write_document(path: &Path, records: &BTreeMap<ArchiveId, ArchiveRecord>) -> Result<()> {
    #[derive(Serialize)]
    struct DocumentRef<'a> {
        version: u32,
        records: &'a BTreeMap<ArchiveId, ArchiveRecord>,
    }

    let json = serde_json::to_vec_pretty(&DocumentRef {
        version: INDEX_FORMAT_VERSION,
        records,
    })?;

    let tmp = path.with_extension("json.tmp");
    {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(&json)?;
        file.sync_all()?;
    }
    fs::rename(&tmp, path)?;

    debug!("Flushed {} records to {:?}", records.len(), path);
    Ok(())
}

/// Metadata index persisted as a single JSON file
pub struct JsonIndex {
    path: PathBuf,
    cache: Mutex<IndexCache>,
}

impl JsonIndex {
    /// Open the index at `path`
    ///
    /// The parent directory is created if missing. The file itself is read
    /// lazily and created on the first write.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        info!("Opened JSON index at {:?}", path);
        Ok(JsonIndex {
            path,
            cache: Mutex::new(IndexCache::default()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write any pending changes to disk
    pub fn flush(&self) -> Result<()> {
        self.cache.lock().flush(&self.path)
    }

    /// Drop the cache so the next access rereads the file
    pub fn reload(&self) {
        let mut cache = self.cache.lock();
        cache.records = None;
        cache.dirty = false;
    }
}

impl MetadataIndex for JsonIndex {
    fn put(&self, record: &ArchiveRecord) -> Result<()> {
        let mut cache = self.cache.lock();
        cache.mutate(&self.path, |records| {
            records.insert(record.id, record.clone());
        })
    }

    fn get(&self, id: &ArchiveId) -> Result<Option<ArchiveRecord>> {
        let mut cache = self.cache.lock();
        Ok(cache.records(&self.path)?.get(id).cloned())
    }

    fn delete(&self, id: &ArchiveId) -> Result<()> {
        let mut cache = self.cache.lock();
        if !cache.records(&self.path)?.contains_key(id) {
            return Ok(());
        }
        cache.mutate(&self.path, |records| {
            records.remove(id);
        })
    }

    fn list(&self, options: &ListOptions) -> Result<ListResult> {
        let mut cache = self.cache.lock();
        let records = cache.records(&self.path)?;
        Ok(query::plan(records.values(), options))
    }

    fn all_ids(&self) -> Result<Vec<ArchiveId>> {
        let mut cache = self.cache.lock();
        Ok(cache.records(&self.path)?.keys().copied().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::integrity::{build_integrity_info, HashAlgorithm};
    use crate::core::record::{derive_storage_key, ArchiveMetadata, Properties};
    use chrono::Utc;
    use tempfile::tempdir;

    fn record(name: &str) -> ArchiveRecord {
        let id = ArchiveId::new();
        let integrity = build_integrity_info(name.as_bytes(), HashAlgorithm::Sha256);
        let mut properties = Properties::new();
        properties.insert("source".into(), serde_json::json!({"host": "alpha", "n": 3}));
        ArchiveRecord {
            id,
            storage_key: derive_storage_key(&integrity.digest_hex, &id, 16),
            integrity,
            metadata: ArchiveMetadata {
                filename: name.to_string(),
                mime_type: "text/plain".into(),
                size_bytes: name.len() as u64,
                archived_at: Utc::now(),
                last_accessed_at: Some(Utc::now()),
                tags: vec!["x".into(), "y".into()],
                properties,
            },
        }
    }

    #[test]
    fn test_missing_file_is_empty_index() {
        let dir = tempdir().unwrap();
        let index = JsonIndex::open(dir.path().join("index.json")).unwrap();
        assert!(index.all_ids().unwrap().is_empty());
        assert_eq!(index.list(&ListOptions::default()).unwrap().total, 0);
        assert!(!index.path().exists());
    }

    #[test]
    fn test_put_persists_immediately() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("index.json");
        let index = JsonIndex::open(&path).unwrap();

        let rec = record("a.txt");
        index.put(&rec).unwrap();
        assert!(path.exists());

        // A second instance sees the write with timestamps parsed back
        let other = JsonIndex::open(&path).unwrap();
        let loaded = other.get(&rec.id).unwrap().unwrap();
        assert_eq!(loaded, rec);
        assert_eq!(loaded.metadata.archived_at, rec.metadata.archived_at);
        assert_eq!(loaded.integrity.verified_at, rec.integrity.verified_at);
    }

    #[test]
    fn test_document_layout() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("index.json");
        let index = JsonIndex::open(&path).unwrap();
        let rec = record("b.txt");
        index.put(&rec).unwrap();

        let doc: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(doc["version"], serde_json::json!(1));
        let stored = &doc["records"][rec.id.to_string()];
        assert!(stored["metadata"]["archivedAt"].is_string());
        assert!(stored["metadata"]["lastAccessedAt"].is_string());
        assert!(stored["integrity"]["verifiedAt"].is_string());
        assert_eq!(stored["storageKey"], serde_json::json!(rec.storage_key));
    }

    #[test]
    fn test_delete_and_noop_delete() {
        let dir = tempdir().unwrap();
        let index = JsonIndex::open(dir.path().join("index.json")).unwrap();
        let rec = record("c.txt");
        index.put(&rec).unwrap();

        index.delete(&rec.id).unwrap();
        assert!(index.get(&rec.id).unwrap().is_none());
        index.delete(&rec.id).unwrap();
        index.delete(&ArchiveId::new()).unwrap();

        index.reload();
        assert!(index.all_ids().unwrap().is_empty());
    }

    #[test]
    fn test_put_is_upsert() {
        let dir = tempdir().unwrap();
        let index = JsonIndex::open(dir.path().join("index.json")).unwrap();
        let mut rec = record("d.txt");
        index.put(&rec).unwrap();

        rec.metadata.tags.push("z".into());
        index.put(&rec).unwrap();

        assert_eq!(index.all_ids().unwrap(), vec![rec.id]);
        index.reload();
        assert_eq!(
            index.get(&rec.id).unwrap().unwrap().metadata.tags,
            vec!["x", "y", "z"]
        );
    }

    #[test]
    fn test_rejects_unknown_version() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("index.json");
        std::fs::write(&path, r#"{"version": 99, "records": {}}"#).unwrap();

        let index = JsonIndex::open(&path).unwrap();
        let err = index.all_ids().unwrap_err();
        assert!(matches!(err, ArchiveError::UnsupportedIndexVersion(99)));
    }

    #[test]
    fn test_corrupt_document_is_backend_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("index.json");
        std::fs::write(&path, "{ not json").unwrap();

        let index = JsonIndex::open(&path).unwrap();
        let err = index.get(&ArchiveId::new()).unwrap_err();
        assert_eq!(err.kind(), crate::core::error::ErrorKind::BackendError);
    }
}
