use crate::core::integrity::HashAlgorithm;
use crate::core::record::ArchiveId;
use thiserror::Error;

/// Coarse classification of an [`ArchiveError`]
///
/// Callers branch on this instead of matching individual variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// An id or storage key is absent
    NotFound,
    /// A digest recomputed from stored bytes did not match the record
    IntegrityViolation,
    /// The underlying storage failed
    BackendError,
    /// The caller supplied something unusable
    InvalidInput,
}

#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("Archive record not found: {0}")]
    RecordNotFound(ArchiveId),

    #[error("Blob not found for storage key: {0}")]
    BlobNotFound(String),

    #[error("Integrity violation for {id}: expected {algorithm} {expected}, got {actual}")]
    IntegrityViolation {
        id: ArchiveId,
        algorithm: HashAlgorithm,
        expected: String,
        actual: String,
    },

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Unsupported index format version: {0}")]
    UnsupportedIndexVersion(u32),

    #[error("Invalid storage key: {0}")]
    InvalidStorageKey(String),

    #[error("Unknown hash algorithm: {0}")]
    UnknownAlgorithm(String),

    #[error("Payload is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Configuration parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl ArchiveError {
    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            ArchiveError::RecordNotFound(_) | ArchiveError::BlobNotFound(_) => ErrorKind::NotFound,
            ArchiveError::IntegrityViolation { .. } => ErrorKind::IntegrityViolation,
            ArchiveError::Backend(_)
            | ArchiveError::Io(_)
            | ArchiveError::Serialization(_)
            | ArchiveError::UnsupportedIndexVersion(_) => ErrorKind::BackendError,
            ArchiveError::InvalidStorageKey(_)
            | ArchiveError::UnknownAlgorithm(_)
            | ArchiveError::InvalidUtf8(_)
            | ArchiveError::Config(_)
            | ArchiveError::ConfigParse(_)
            | ArchiveError::InvalidInput(_) => ErrorKind::InvalidInput,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }
}

pub type Result<T> = std::result::Result<T, ArchiveError>;
