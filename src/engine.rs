//! Archival engine
//!
//! Binds a [`BlobStore`] to a [`MetadataIndex`] and owns every ordering
//! decision between them:
//!
//! - `store` writes the blob, then the record
//! - `delete` removes the blob, then the record
//!
//! Either way a failure between the two steps can leave a blob with no
//! record (an orphan, inert and reported by [`ArchivalEngine::find_orphans`]),
//! but never a record whose blob is missing.
//!
//! Stores through one engine are serialized so each new record links to the
//! current chain head (see [`crate::core::chain`]).

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::backend::{BlobStore, FsBlobStore, JsonIndex, MetadataIndex};
use crate::core::chain::{self, ChainLink, ChainReport, GENESIS};
use crate::core::config::ArchiveConfig;
use crate::core::error::{ArchiveError, Result};
use crate::core::integrity::{self, HashAlgorithm, VerificationResult};
use crate::core::mime::{self, DEFAULT_MIME_TYPE, TEXT_MIME_TYPE};
use crate::core::query::{ListOptions, ListResult};
use crate::core::record::{
    derive_storage_key, ArchiveId, ArchiveMetadata, ArchiveRecord, Properties,
};

/// Options for [`ArchivalEngine::store`]
#[derive(Debug, Clone, Default)]
pub struct StoreOptions {
    pub filename: Option<String>,
    /// Overrides the type derived from `filename`
    pub mime_type: Option<String>,
    pub tags: Vec<String>,
    pub properties: Properties,
    /// Falls back to the engine's default algorithm
    pub hash_algorithm: Option<HashAlgorithm>,
}

impl StoreOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    pub fn mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    pub fn property(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.properties.insert(key.into(), value);
        self
    }

    pub fn hash_algorithm(mut self, algorithm: HashAlgorithm) -> Self {
        self.hash_algorithm = Some(algorithm);
        self
    }
}

/// Options for [`ArchivalEngine::retrieve`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetrieveOptions {
    /// Recompute the digest and fail on mismatch
    pub verify_integrity: bool,
    /// Stamp and persist `last_accessed_at`
    pub update_access_time: bool,
}

impl Default for RetrieveOptions {
    fn default() -> Self {
        RetrieveOptions {
            verify_integrity: true,
            update_access_time: false,
        }
    }
}

impl RetrieveOptions {
    /// Read the bytes as stored, without checking them
    pub fn unverified() -> Self {
        RetrieveOptions {
            verify_integrity: false,
            update_access_time: false,
        }
    }

    pub fn touch(mut self) -> Self {
        self.update_access_time = true;
        self
    }
}

/// Aggregate figures over the whole archive
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveStats {
    pub total_items: usize,
    pub total_size: u64,
    /// Earliest `archived_at`
    pub oldest_item: Option<DateTime<Utc>>,
    /// Latest `archived_at`
    pub newest_item: Option<DateTime<Utc>>,
}

/// Orchestrates blob storage, metadata indexing and integrity checks
///
/// Backends are injected and shared; the engine never assumes it is their
/// only user.
pub struct ArchivalEngine {
    blobs: Arc<dyn BlobStore>,
    index: Arc<dyn MetadataIndex>,
    config: ArchiveConfig,
    /// Held from chain head lookup until the new record is indexed
    append_lock: Mutex<()>,
}

impl ArchivalEngine {
    /// Create an engine over the given backends with default settings
    pub fn new(blobs: Arc<dyn BlobStore>, index: Arc<dyn MetadataIndex>) -> Self {
        ArchivalEngine {
            blobs,
            index,
            config: ArchiveConfig::default(),
            append_lock: Mutex::new(()),
        }
    }

    /// Create an engine over the given backends
    pub fn with_config(
        blobs: Arc<dyn BlobStore>,
        index: Arc<dyn MetadataIndex>,
        config: ArchiveConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(ArchivalEngine {
            blobs,
            index,
            config,
            append_lock: Mutex::new(()),
        })
    }

    /// Open a filesystem archive at `config.root`
    ///
    /// Blobs go under `{root}/blobs`, records into `{root}/index.json`.
    pub fn open(config: ArchiveConfig) -> Result<Self> {
        config.validate()?;
        info!("Opening archive at {:?}", config.root);
        let blobs = Arc::new(FsBlobStore::open(config.blob_dir())?);
        let index = Arc::new(JsonIndex::open(config.index_path())?);
        Self::with_config(blobs, index, config)
    }

    pub fn config(&self) -> &ArchiveConfig {
        &self.config
    }

    pub fn default_algorithm(&self) -> HashAlgorithm {
        self.config.default_algorithm
    }

    /// Retrieve options following `verify_on_read`
    pub fn default_retrieve_options(&self) -> RetrieveOptions {
        RetrieveOptions {
            verify_integrity: self.config.verify_on_read,
            update_access_time: false,
        }
    }

    /// Archive `payload` and return its new record
    ///
    /// If the blob write fails nothing is recorded. If the record write fails
    /// the error is returned and the blob is left orphaned.
    pub fn store(&self, payload: &[u8], options: StoreOptions) -> Result<ArchiveRecord> {
        let id = ArchiveId::new();
        let algorithm = options
            .hash_algorithm
            .unwrap_or(self.config.default_algorithm);
        let mut integrity = integrity::build_integrity_info(payload, algorithm);
        let storage_key =
            derive_storage_key(&integrity.digest_hex, &id, self.config.key_prefix_len);

        let _append = self.append_lock.lock();
        let (prev, head_at) = self.chain_head()?;
        let mut archived_at = Utc::now();
        if let Some(head_at) = head_at {
            // Keep archive order strictly increasing along the chain
            if archived_at <= head_at {
                archived_at = head_at + Duration::nanoseconds(1);
            }
        }
        integrity.chain = Some(ChainLink::new(&prev, &id, &integrity.digest_hex, &archived_at));

        let mime_type = mime::resolve(
            options.mime_type.as_deref(),
            options.filename.as_deref(),
            DEFAULT_MIME_TYPE,
        );
        let mut metadata = ArchiveMetadata {
            filename: options.filename.unwrap_or_else(|| id.to_string()),
            mime_type,
            size_bytes: payload.len() as u64,
            archived_at,
            last_accessed_at: None,
            tags: Vec::new(),
            properties: options.properties,
        };
        metadata.add_tags(options.tags);

        let record = ArchiveRecord {
            id,
            metadata,
            integrity,
            storage_key,
        };

        self.blobs.write(&record.storage_key, payload)?;
        if let Err(e) = self.index.put(&record) {
            warn!(
                "Index write failed for {}; blob {} is orphaned: {}",
                id, record.storage_key, e
            );
            return Err(e);
        }

        info!(
            "Archived {} ({} bytes, {}, {})",
            id, record.metadata.size_bytes, record.metadata.mime_type, algorithm
        );
        Ok(record)
    }

    /// Archive UTF-8 text; MIME type defaults to `text/plain`
    pub fn store_text(&self, text: &str, mut options: StoreOptions) -> Result<ArchiveRecord> {
        if options.mime_type.is_none() {
            options.mime_type = Some(TEXT_MIME_TYPE.to_string());
        }
        self.store(text.as_bytes(), options)
    }

    /// Read back the payload of `id`
    pub fn retrieve(&self, id: &ArchiveId, options: RetrieveOptions) -> Result<Vec<u8>> {
        let mut record = self.require(id)?;
        debug!("Retrieving {} from {}", id, record.storage_key);
        let bytes = self.blobs.read(&record.storage_key)?;

        if options.verify_integrity {
            let result = integrity::verify(&bytes, &record.integrity);
            if !result.valid {
                warn!(
                    "Integrity violation for {}: expected {} got {}",
                    id, result.expected, result.actual
                );
                return Err(ArchiveError::IntegrityViolation {
                    id: *id,
                    algorithm: result.algorithm,
                    expected: result.expected,
                    actual: result.actual,
                });
            }
        }

        if options.update_access_time {
            record.metadata.last_accessed_at = Some(Utc::now());
            self.index.put(&record)?;
        }

        Ok(bytes)
    }

    /// Read back the payload of `id` as UTF-8 text
    pub fn retrieve_text(&self, id: &ArchiveId, options: RetrieveOptions) -> Result<String> {
        let bytes = self.retrieve(id, options)?;
        Ok(String::from_utf8(bytes)?)
    }

    /// Look up a record without touching the blob store
    pub fn get_record(&self, id: &ArchiveId) -> Result<Option<ArchiveRecord>> {
        self.index.get(id)
    }

    /// Remove `id`'s blob and then its record
    pub fn delete(&self, id: &ArchiveId) -> Result<()> {
        let record = self.require(id)?;
        self.blobs.delete(&record.storage_key)?;
        self.index.delete(id)?;
        info!("Deleted {}", id);
        Ok(())
    }

    pub fn list(&self, options: &ListOptions) -> Result<ListResult> {
        self.index.list(options)
    }

    /// Check `id`'s stored bytes against its digest
    ///
    /// A passing check is recorded by refreshing `verified_at`. A failing one
    /// changes nothing.
    pub fn verify(&self, id: &ArchiveId) -> Result<VerificationResult> {
        let record = self.require(id)?;
        self.verify_record(record)
    }

    fn verify_record(&self, mut record: ArchiveRecord) -> Result<VerificationResult> {
        let bytes = self.blobs.read(&record.storage_key)?;
        let result = integrity::verify(&bytes, &record.integrity);

        if result.valid {
            record.integrity.verified_at = Utc::now();
            self.index.put(&record)?;
            debug!("Verified {}", record.id);
        } else {
            warn!(
                "Verification failed for {}: expected {} got {}",
                record.id, result.expected, result.actual
            );
        }

        Ok(result)
    }

    /// Verify every indexed item
    ///
    /// Per-item failures are reported as invalid results instead of aborting
    /// the scan. Only failing to enumerate the index is an error.
    pub fn verify_all(&self) -> Result<BTreeMap<ArchiveId, VerificationResult>> {
        let ids = self.index.all_ids()?;
        let mut results = BTreeMap::new();

        for id in ids {
            let result = match self.index.get(&id) {
                Ok(Some(record)) => {
                    let integrity = record.integrity.clone();
                    self.verify_record(record)
                        .unwrap_or_else(|e| VerificationResult::failed(&integrity, e))
                }
                // Deleted since the ids were listed
                Ok(None) => continue,
                Err(e) => VerificationResult::unavailable(self.config.default_algorithm, e),
            };
            results.insert(id, result);
        }

        let invalid = results.values().filter(|r| !r.valid).count();
        info!("Verified {} items, {} invalid", results.len(), invalid);
        Ok(results)
    }

    /// Check the digest chain across every record
    ///
    /// Reports rewritten links, links whose predecessor is gone and forks.
    /// Deleting a record from the middle of the chain shows up as a missing
    /// predecessor.
    pub fn verify_chain(&self) -> Result<ChainReport> {
        let all = self.index.list(&ListOptions::unbounded())?;
        let report = chain::check(&all.items);
        if report.valid {
            info!("Digest chain intact ({} links)", report.length);
        } else {
            warn!(
                "Digest chain has {} issues across {} links",
                report.issues.len(),
                report.length
            );
        }
        Ok(report)
    }

    /// Replace the tags of `id`
    pub fn update_tags<I, S>(&self, id: &ArchiveId, tags: I) -> Result<ArchiveRecord>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.modify(id, |meta| meta.set_tags(tags))
    }

    /// Add tags to `id`, skipping ones already present
    pub fn add_tags<I, S>(&self, id: &ArchiveId, tags: I) -> Result<ArchiveRecord>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.modify(id, |meta| meta.add_tags(tags))
    }

    /// Shallow-merge `patch` into the properties of `id`
    pub fn update_properties(&self, id: &ArchiveId, patch: Properties) -> Result<ArchiveRecord> {
        self.modify(id, |meta| meta.merge_properties(patch))
    }

    pub fn stats(&self) -> Result<ArchiveStats> {
        let all = self.index.list(&ListOptions::unbounded())?;
        let items = &all.items;

        Ok(ArchiveStats {
            total_items: items.len(),
            total_size: items.iter().map(|r| r.metadata.size_bytes).sum(),
            oldest_item: items.iter().map(|r| r.metadata.archived_at).min(),
            newest_item: items.iter().map(|r| r.metadata.archived_at).max(),
        })
    }

    /// Blob keys that no record points at, sorted
    ///
    /// Read-only; orphans are reported, never removed.
    pub fn find_orphans(&self) -> Result<Vec<String>> {
        let referenced: HashSet<String> = self
            .index
            .list(&ListOptions::unbounded())?
            .items
            .into_iter()
            .map(|r| r.storage_key)
            .collect();

        let mut orphans: Vec<String> = self
            .blobs
            .list_keys()?
            .into_iter()
            .filter(|k| !referenced.contains(k))
            .collect();
        orphans.sort();

        if !orphans.is_empty() {
            warn!("Found {} orphaned blobs", orphans.len());
        }
        Ok(orphans)
    }

    /// Link hash and archive time of the newest record
    fn chain_head(&self) -> Result<(String, Option<DateTime<Utc>>)> {
        let newest = self.index.list(&ListOptions::default().page(0, 1))?;
        Ok(match newest.items.into_iter().next() {
            Some(record) => (
                record
                    .integrity
                    .chain
                    .map(|link| link.hash)
                    .unwrap_or_else(|| GENESIS.to_string()),
                Some(record.metadata.archived_at),
            ),
            None => (GENESIS.to_string(), None),
        })
    }

    fn require(&self, id: &ArchiveId) -> Result<ArchiveRecord> {
        self.index
            .get(id)?
            .ok_or(ArchiveError::RecordNotFound(*id))
    }

    fn modify(
        &self,
        id: &ArchiveId,
        f: impl FnOnce(&mut ArchiveMetadata),
    ) -> Result<ArchiveRecord> {
        let mut record = self.require(id)?;
        f(&mut record.metadata);
        self.index.put(&record)?;
        debug!("Updated metadata of {}", id);
        Ok(record)
    }
}
