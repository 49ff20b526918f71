//! Filesystem blob store
//!
//! Blobs live at `{root}/{first two chars of key}/{key}`. Storage keys start
//! with a digest prefix, so the shard directories fan out evenly.
//!
//! Writes go to a hidden temp file in the shard directory and are renamed
//! into place, so a reader never observes a half-written blob.

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use uuid::Uuid;

use super::BlobStore;
use crate::core::error::{ArchiveError, Result};

const SHARD_LEN: usize = 2;
const MAX_KEY_LEN: usize = 255;

#[derive(Debug, Clone)]
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    /// Open (creating if needed) a blob store rooted at `root`
    pub fn open<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        info!("Opened blob store at {:?}", root);
        Ok(FsBlobStore { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn shard_dir(&self, key: &str) -> PathBuf {
        let end = key
            .char_indices()
            .nth(SHARD_LEN)
            .map(|(i, _)| i)
            .unwrap_or(key.len());
        self.root.join(&key[..end])
    }

    /// Filesystem path of the blob for `key`
    pub fn blob_path(&self, key: &str) -> Result<PathBuf> {
        validate_key(key)?;
        Ok(self.shard_dir(key).join(key))
    }
}

/// Reject keys that could escape the store directory
fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(ArchiveError::InvalidStorageKey(
            "key cannot be empty".to_string(),
        ));
    }
    if key.len() > MAX_KEY_LEN {
        return Err(ArchiveError::InvalidStorageKey(format!(
            "key too long: {} bytes (max {})",
            key.len(),
            MAX_KEY_LEN
        )));
    }
    if key.starts_with('.') || key.contains("..") {
        return Err(ArchiveError::InvalidStorageKey(format!(
            "key cannot start with '.' or contain '..': {}",
            key
        )));
    }
    if !key
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
    {
        return Err(ArchiveError::InvalidStorageKey(format!(
            "key may only contain letters, digits, '-', '_' and '.': {}",
            key
        )));
    }
    Ok(())
}

fn not_found_or(err: std::io::Error, key: &str) -> ArchiveError {
    if err.kind() == ErrorKind::NotFound {
        ArchiveError::BlobNotFound(key.to_string())
    } else {
        ArchiveError::Io(err)
    }
}

impl BlobStore for FsBlobStore {
    fn write(&self, key: &str, bytes: &[u8]) -> Result<()> {
        let path = self.blob_path(key)?;
        let dir = self.shard_dir(key);
        fs::create_dir_all(&dir)?;

        let tmp = dir.join(format!(".{}.{}.tmp", key, Uuid::new_v4().simple()));
        let result = (|| -> std::io::Result<()> {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(bytes)?;
            file.sync_all()?;
            fs::rename(&tmp, &path)
        })();

        if let Err(e) = result {
            let _ = fs::remove_file(&tmp);
            return Err(ArchiveError::Io(e));
        }

        debug!("Wrote {} bytes to blob {}", bytes.len(), key);
        Ok(())
    }

    fn read(&self, key: &str) -> Result<Vec<u8>> {
        let path = self.blob_path(key)?;
        debug!("Reading blob {}", key);
        fs::read(&path).map_err(|e| not_found_or(e, key))
    }

    fn exists(&self, key: &str) -> Result<bool> {
        let path = self.blob_path(key)?;
        Ok(path.is_file())
    }

    fn delete(&self, key: &str) -> Result<()> {
        let path = self.blob_path(key)?;
        fs::remove_file(&path).map_err(|e| not_found_or(e, key))?;
        debug!("Deleted blob {}", key);
        Ok(())
    }

    fn list_keys(&self) -> Result<Vec<String>> {
        let mut keys = Vec::new();

        for shard in fs::read_dir(&self.root)? {
            let shard = shard?;
            if !shard.file_type()?.is_dir() {
                continue;
            }
            for entry in fs::read_dir(shard.path())? {
                let entry = entry?;
                if !entry.file_type()?.is_file() {
                    continue;
                }
                if let Some(name) = entry.file_name().to_str() {
                    if !name.starts_with('.') {
                        keys.push(name.to_string());
                    }
                }
            }
        }

        Ok(keys)
    }
}
