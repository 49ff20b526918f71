//! Storage backends
//!
//! The engine talks to storage only through two capabilities:
//!
//! - [`BlobStore`]: durable key → bytes
//! - [`MetadataIndex`]: durable id → [`ArchiveRecord`] with listing
//!
//! Implementations serialize their own operations internally and are shared
//! behind `Arc`, so every method takes `&self`. Nothing here orders writes
//! across the two; that is the engine's job.

pub mod fs_blob;
pub mod json_index;
pub mod memory;

pub use fs_blob::FsBlobStore;
pub use json_index::JsonIndex;
pub use memory::{MemoryBlobStore, MemoryIndex};

use crate::core::error::Result;
use crate::core::query::{ListOptions, ListResult};
use crate::core::record::{ArchiveId, ArchiveRecord};

/// Key-addressed durable byte storage
pub trait BlobStore: Send + Sync {
    /// Store `bytes` under `key`, replacing any previous value
    fn write(&self, key: &str, bytes: &[u8]) -> Result<()>;

    /// Read the bytes under `key`; `BlobNotFound` if absent
    fn read(&self, key: &str) -> Result<Vec<u8>>;

    fn exists(&self, key: &str) -> Result<bool>;

    /// Remove `key`; `BlobNotFound` if absent
    fn delete(&self, key: &str) -> Result<()>;

    /// All stored keys, in no particular order
    fn list_keys(&self) -> Result<Vec<String>>;
}

/// Id-addressed durable record storage with filtered listing
pub trait MetadataIndex: Send + Sync {
    /// Insert or replace the record with `record.id`
    fn put(&self, record: &ArchiveRecord) -> Result<()>;

    fn get(&self, id: &ArchiveId) -> Result<Option<ArchiveRecord>>;

    /// Remove a record; absent ids are ignored
    fn delete(&self, id: &ArchiveId) -> Result<()>;

    /// Filter, sort and paginate (see [`crate::core::query::plan`])
    fn list(&self, options: &ListOptions) -> Result<ListResult>;

    fn all_ids(&self) -> Result<Vec<ArchiveId>>;
}
