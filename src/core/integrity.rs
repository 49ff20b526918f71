//! Content digests and integrity verification
//!
//! Pure functions over bytes. Digests are rendered as lowercase hex and
//! compared as strings, so a stored digest written in upper case by some
//! other tool still verifies.
//!
//! MD5 is supported for legacy, non-security checksums only and is never
//! the default.

use chrono::{DateTime, Utc};
use md5::Md5;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256, Sha512};
use std::fmt;
use std::str::FromStr;

use crate::core::chain::ChainLink;
use crate::core::error::ArchiveError;

/// Digest algorithm used for an archived payload
///
/// Deserializes through [`FromStr`], so config files accept the same
/// spellings as the command line (`sha256`, `SHA-256`, `sha_256`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum HashAlgorithm {
    #[default]
    Sha256,
    Sha512,
    Md5,
}

impl HashAlgorithm {
    pub const ALL: [HashAlgorithm; 3] = [
        HashAlgorithm::Sha256,
        HashAlgorithm::Sha512,
        HashAlgorithm::Md5,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            HashAlgorithm::Sha256 => "sha256",
            HashAlgorithm::Sha512 => "sha512",
            HashAlgorithm::Md5 => "md5",
        }
    }

    /// Length of the hex-encoded digest
    pub fn hex_len(&self) -> usize {
        match self {
            HashAlgorithm::Sha256 => 64,
            HashAlgorithm::Sha512 => 128,
            HashAlgorithm::Md5 => 32,
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HashAlgorithm {
    type Err = ArchiveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace(['-', '_'], "").as_str() {
            "sha256" => Ok(HashAlgorithm::Sha256),
            "sha512" => Ok(HashAlgorithm::Sha512),
            "md5" => Ok(HashAlgorithm::Md5),
            _ => Err(ArchiveError::UnknownAlgorithm(s.to_string())),
        }
    }
}

impl TryFrom<String> for HashAlgorithm {
    type Error = ArchiveError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

/// Integrity metadata recorded for every archived payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrityInfo {
    pub algorithm: HashAlgorithm,

    /// Lowercase hex digest of the payload
    pub digest_hex: String,

    /// Last time the digest was computed or confirmed against stored bytes
    pub verified_at: DateTime<Utc>,

    /// Set by the engine when the record joins the archive's digest chain
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chain: Option<ChainLink>,
}

/// Outcome of checking bytes against an [`IntegrityInfo`]
///
/// A mismatch is a normal result, not an error. `error` is only set when
/// the check could not run at all (e.g. the blob is gone), in which case
/// `valid` is false and `actual` is empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationResult {
    pub valid: bool,
    pub algorithm: HashAlgorithm,
    pub expected: String,
    pub actual: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl VerificationResult {
    /// Result for an item whose bytes could not be checked
    pub fn failed(expected: &IntegrityInfo, error: impl fmt::Display) -> Self {
        VerificationResult {
            valid: false,
            algorithm: expected.algorithm,
            expected: expected.digest_hex.to_ascii_lowercase(),
            actual: String::new(),
            error: Some(error.to_string()),
        }
    }

    /// Result for an item whose record could not even be read
    pub fn unavailable(algorithm: HashAlgorithm, error: impl fmt::Display) -> Self {
        VerificationResult {
            valid: false,
            algorithm,
            expected: String::new(),
            actual: String::new(),
            error: Some(error.to_string()),
        }
    }
}

/// Compute the lowercase hex digest of `bytes`
pub fn compute_digest(bytes: &[u8], algorithm: HashAlgorithm) -> String {
    match algorithm {
        HashAlgorithm::Sha256 => hex::encode(Sha256::digest(bytes)),
        HashAlgorithm::Sha512 => hex::encode(Sha512::digest(bytes)),
        HashAlgorithm::Md5 => hex::encode(Md5::digest(bytes)),
    }
}

/// Compute integrity metadata for a payload, stamped now
pub fn build_integrity_info(bytes: &[u8], algorithm: HashAlgorithm) -> IntegrityInfo {
    IntegrityInfo {
        algorithm,
        digest_hex: compute_digest(bytes, algorithm),
        verified_at: Utc::now(),
        chain: None,
    }
}

/// Recompute the digest of `bytes` with `expected.algorithm` and compare
pub fn verify(bytes: &[u8], expected: &IntegrityInfo) -> VerificationResult {
    let expected_hex = expected.digest_hex.to_ascii_lowercase();
    let actual = compute_digest(bytes, expected.algorithm);

    VerificationResult {
        valid: expected_hex == actual,
        algorithm: expected.algorithm,
        expected: expected_hex,
        actual,
        error: None,
    }
}
