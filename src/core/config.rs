//! Archive configuration
//!
//! Loaded from TOML, e.g.
//!
//! ```toml
//! root = "/var/lib/archivist"
//! default_algorithm = "sha256"
//! key_prefix_len = 16
//! verify_on_read = true
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::core::error::{ArchiveError, Result};
use crate::core::integrity::HashAlgorithm;

pub const DEFAULT_KEY_PREFIX_LEN: usize = 16;
pub const BLOB_DIR: &str = "blobs";
pub const INDEX_FILE: &str = "index.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiveConfig {
    /// Directory holding `blobs/` and `index.json`
    pub root: PathBuf,

    /// Algorithm used when a store call does not name one
    pub default_algorithm: HashAlgorithm,

    /// Number of digest hex chars leading each storage key
    pub key_prefix_len: usize,

    /// Default for `RetrieveOptions::verify_integrity`
    pub verify_on_read: bool,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        ArchiveConfig {
            root: PathBuf::from("archive"),
            default_algorithm: HashAlgorithm::Sha256,
            key_prefix_len: DEFAULT_KEY_PREFIX_LEN,
            verify_on_read: true,
        }
    }
}

impl ArchiveConfig {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        ArchiveConfig {
            root: root.as_ref().to_path_buf(),
            ..Default::default()
        }
    }

    /// Parse and validate a TOML document
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: ArchiveConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and validate a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            ArchiveError::Config(format!("cannot read {}: {}", path.as_ref().display(), e))
        })?;
        Self::from_toml_str(&text)
    }

    pub fn with_root<P: AsRef<Path>>(mut self, root: P) -> Self {
        self.root = root.as_ref().to_path_buf();
        self
    }

    pub fn with_default_algorithm(mut self, algorithm: HashAlgorithm) -> Self {
        self.default_algorithm = algorithm;
        self
    }

    pub fn with_key_prefix_len(mut self, len: usize) -> Self {
        self.key_prefix_len = len;
        self
    }

    pub fn with_verify_on_read(mut self, verify: bool) -> Self {
        self.verify_on_read = verify;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.root.as_os_str().is_empty() {
            return Err(ArchiveError::Config("root cannot be empty".to_string()));
        }

        let max = HashAlgorithm::ALL
            .iter()
            .map(|a| a.hex_len())
            .min()
            .unwrap_or(DEFAULT_KEY_PREFIX_LEN);
        if self.key_prefix_len == 0 || self.key_prefix_len > max {
            return Err(ArchiveError::Config(format!(
                "key_prefix_len must be between 1 and {}, got {}",
                max, self.key_prefix_len
            )));
        }

        Ok(())
    }

    pub fn blob_dir(&self) -> PathBuf {
        self.root.join(BLOB_DIR)
    }

    pub fn index_path(&self) -> PathBuf {
        self.root.join(INDEX_FILE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ArchiveConfig::default();
        assert_eq!(config.default_algorithm, HashAlgorithm::Sha256);
        assert_eq!(config.key_prefix_len, 16);
        assert!(config.verify_on_read);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_toml() {
        let config = ArchiveConfig::from_toml_str(
            r#"
            root = "/tmp/vault"
            default_algorithm = "sha512"
            key_prefix_len = 8
            "#,
        )
        .unwrap();
        assert_eq!(config.root, PathBuf::from("/tmp/vault"));
        assert_eq!(config.default_algorithm, HashAlgorithm::Sha512);
        assert_eq!(config.key_prefix_len, 8);
        assert!(config.verify_on_read);
        assert_eq!(config.index_path(), PathBuf::from("/tmp/vault/index.json"));
    }

    #[test]
    fn test_rejects_bad_prefix_len() {
        let err = ArchiveConfig::default().with_key_prefix_len(0).validate();
        assert!(err.is_err());
        let err = ArchiveConfig::default().with_key_prefix_len(33).validate();
        assert!(err.is_err());
        assert!(ArchiveConfig::default().with_key_prefix_len(32).validate().is_ok());
    }

    #[test]
    fn test_algorithm_spellings_match_cli() {
        let config = ArchiveConfig::from_toml_str(r#"default_algorithm = "SHA-256""#).unwrap();
        assert_eq!(config.default_algorithm, HashAlgorithm::Sha256);
        let config = ArchiveConfig::from_toml_str(r#"default_algorithm = "sha_512""#).unwrap();
        assert_eq!(config.default_algorithm, HashAlgorithm::Sha512);
    }

    #[test]
    fn test_rejects_unknown_algorithm() {
        let err = ArchiveConfig::from_toml_str(r#"default_algorithm = "crc32""#).unwrap_err();
        assert_eq!(err.kind(), crate::core::error::ErrorKind::InvalidInput);
    }
}
