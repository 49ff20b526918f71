//! # Archivist - Content-Addressed Archival Engine
//!
//! `archivist` stores arbitrary byte payloads for the long term with
//! verifiable integrity and searchable metadata:
//!
//! - **Pluggable storage**: any [`BlobStore`] paired with any [`MetadataIndex`]
//! - **Integrity**: SHA-256 (default), SHA-512 or MD5 digests, checked on read
//! - **Tamper evidence**: every stored record links into an append-only
//!   digest chain checked by [`ArchivalEngine::verify_chain`]
//! - **Metadata**: filename, MIME type, tags and free-form properties
//! - **Queries**: tag / MIME / time filters, newest-first, paginated
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use archivist::{ArchivalEngine, ArchiveConfig, RetrieveOptions, StoreOptions, Result};
//!
//! # fn main() -> Result<()> {
//! // Blobs under ./vault/blobs, records in ./vault/index.json
//! let engine = ArchivalEngine::open(ArchiveConfig::new("vault"))?;
//!
//! let record = engine.store(
//!     b"Hello, World!",
//!     StoreOptions::new().filename("test.txt").tag("greeting"),
//! )?;
//!
//! // Digest is re-checked before the bytes are returned
//! let bytes = engine.retrieve(&record.id, RetrieveOptions::default())?;
//! assert_eq!(bytes, b"Hello, World!");
//! # Ok(())
//! # }
//! ```
//!
//! ## Custom Backends
//!
//! ```rust,no_run
//! use archivist::{ArchivalEngine, MemoryBlobStore, MemoryIndex, StoreOptions};
//! use std::sync::Arc;
//!
//! # fn main() -> archivist::Result<()> {
//! let engine = ArchivalEngine::new(
//!     Arc::new(MemoryBlobStore::new()),
//!     Arc::new(MemoryIndex::new()),
//! );
//! engine.store_text("scratch", StoreOptions::new())?;
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod core;
pub mod engine;

pub use crate::backend::{
    BlobStore, FsBlobStore, JsonIndex, MemoryBlobStore, MemoryIndex, MetadataIndex,
};
pub use crate::core::{
    chain::{ChainIssue, ChainLink, ChainReport},
    config::ArchiveConfig,
    error::{ArchiveError, ErrorKind, Result},
    integrity::{
        build_integrity_info, compute_digest, verify, HashAlgorithm, IntegrityInfo,
        VerificationResult,
    },
    query::{ListOptions, ListResult},
    record::{ArchiveId, ArchiveMetadata, ArchiveRecord, Properties},
};
pub use crate::engine::{ArchivalEngine, ArchiveStats, RetrieveOptions, StoreOptions};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_filesystem_archive() -> Result<()> {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let config = ArchiveConfig::new(temp_dir.path().join("vault"));

        let engine = ArchivalEngine::open(config.clone())?;
        let record = engine.store(b"persisted", StoreOptions::new().filename("p.txt"))?;

        assert!(config.index_path().is_file());
        assert!(config.blob_dir().is_dir());

        // A fresh engine over the same directory sees the record and blob
        let reopened = ArchivalEngine::open(config)?;
        let bytes = reopened.retrieve(&record.id, RetrieveOptions::default())?;
        assert_eq!(bytes, b"persisted");

        Ok(())
    }

    #[test]
    fn test_open_rejects_invalid_config() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let config = ArchiveConfig::new(temp_dir.path()).with_key_prefix_len(0);
        assert!(ArchivalEngine::open(config).is_err());
    }

    #[test]
    fn test_verify_on_read_setting() -> Result<()> {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let engine =
            ArchivalEngine::open(ArchiveConfig::new(temp_dir.path()).with_verify_on_read(false))?;

        assert!(!engine.default_retrieve_options().verify_integrity);
        Ok(())
    }
}
