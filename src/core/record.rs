//! Archive record structures
//!
//! An [`ArchiveRecord`] is the unit of persistence in a metadata index. It
//! ties an [`ArchiveId`] to descriptive metadata, integrity information and
//! the storage key of exactly one immutable blob.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::core::error::ArchiveError;
use crate::core::integrity::IntegrityInfo;

/// Free-form properties attached to a record
pub type Properties = BTreeMap<String, serde_json::Value>;

/// Opaque identifier of one archived item
///
/// Backed by a random (v4) UUID and rendered as 32 lowercase hex characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ArchiveId(Uuid);

impl ArchiveId {
    /// Generate a fresh id
    pub fn new() -> Self {
        ArchiveId(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ArchiveId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ArchiveId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

impl FromStr for ArchiveId {
    type Err = ArchiveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim())
            .map(ArchiveId)
            .map_err(|_| ArchiveError::InvalidInput(format!("not an archive id: {}", s)))
    }
}

impl Serialize for ArchiveId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ArchiveId {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Descriptive metadata of an archived item
///
/// `filename`, `mime_type`, `size_bytes` and `archived_at` are fixed at
/// store time. Tags, properties and `last_accessed_at` may change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveMetadata {
    pub filename: String,

    pub mime_type: String,

    pub size_bytes: u64,

    pub archived_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_accessed_at: Option<DateTime<Utc>>,

    /// Insertion ordered, no duplicates
    #[serde(default)]
    pub tags: Vec<String>,

    #[serde(default)]
    pub properties: Properties,
}

impl ArchiveMetadata {
    /// Append tags not already present, preserving first-seen order
    ///
    /// Matching is exact and case-sensitive.
    pub fn add_tags<I, S>(&mut self, tags: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for tag in tags {
            let tag = tag.into();
            if !self.tags.contains(&tag) {
                self.tags.push(tag);
            }
        }
    }

    /// Replace all tags, collapsing duplicates
    pub fn set_tags<I, S>(&mut self, tags: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.clear();
        self.add_tags(tags);
    }

    /// Shallow merge: keys in `patch` overwrite, others are untouched
    pub fn merge_properties(&mut self, patch: Properties) {
        self.properties.extend(patch);
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }
}

/// A persisted archive entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveRecord {
    pub id: ArchiveId,
    pub metadata: ArchiveMetadata,
    pub integrity: IntegrityInfo,

    /// Key of the backing blob; never changes for the life of the record
    pub storage_key: String,
}

/// Derive the blob storage key for a payload
///
/// `{first prefix_len hex chars of digest}-{id}`. Keys of payloads with the
/// same digest prefix group together while the id keeps them unique.
pub fn derive_storage_key(digest_hex: &str, id: &ArchiveId, prefix_len: usize) -> String {
    let end = prefix_len.min(digest_hex.len());
    format!("{}-{}", &digest_hex[..end], id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::integrity::{build_integrity_info, HashAlgorithm};

    fn sample_metadata() -> ArchiveMetadata {
        ArchiveMetadata {
            filename: "notes.txt".into(),
            mime_type: "text/plain".into(),
            size_bytes: 5,
            archived_at: Utc::now(),
            last_accessed_at: None,
            tags: Vec::new(),
            properties: Properties::new(),
        }
    }

    #[test]
    fn test_id_roundtrip_text() {
        let id = ArchiveId::new();
        let text = id.to_string();
        assert_eq!(text.len(), 32);
        assert!(text.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        assert_eq!(text.parse::<ArchiveId>().unwrap(), id);
    }

    #[test]
    fn test_ids_are_unique() {
        let ids: std::collections::HashSet<_> = (0..1000).map(|_| ArchiveId::new()).collect();
        assert_eq!(ids.len(), 1000);
    }

    #[test]
    fn test_invalid_id_rejected() {
        assert!("not-an-id".parse::<ArchiveId>().is_err());
    }

    #[test]
    fn test_storage_key_layout() {
        let id = ArchiveId::new();
        let digest = "dffd6021bb2bd5b0af676290809ec3a53191dd81c7f70a4b28688a362182986f";
        let key = derive_storage_key(digest, &id, 16);
        assert_eq!(key, format!("dffd6021bb2bd5b0-{}", id));

        // Prefix longer than the digest is clamped
        let short = derive_storage_key("abcd", &id, 16);
        assert_eq!(short, format!("abcd-{}", id));
    }

    #[test]
    fn test_add_tags_dedups_in_order() {
        let mut meta = sample_metadata();
        meta.add_tags(["b", "a", "b"]);
        meta.add_tags(["a", "c", "A"]);
        assert_eq!(meta.tags, vec!["b", "a", "c", "A"]);
    }

    #[test]
    fn test_set_tags_replaces() {
        let mut meta = sample_metadata();
        meta.add_tags(["old"]);
        meta.set_tags(["new", "new", "other"]);
        assert_eq!(meta.tags, vec!["new", "other"]);
    }

    #[test]
    fn test_merge_properties_is_shallow() {
        let mut meta = sample_metadata();
        meta.properties.insert("keep".into(), serde_json::json!(1));
        meta.properties
            .insert("nested".into(), serde_json::json!({"a": 1, "b": 2}));

        let mut patch = Properties::new();
        patch.insert("nested".into(), serde_json::json!({"c": 3}));
        patch.insert("added".into(), serde_json::json!("x"));
        meta.merge_properties(patch);

        assert_eq!(meta.properties["keep"], serde_json::json!(1));
        assert_eq!(meta.properties["nested"], serde_json::json!({"c": 3}));
        assert_eq!(meta.properties["added"], serde_json::json!("x"));
    }

    #[test]
    fn test_record_json_uses_camel_case_and_iso_timestamps() {
        let id = ArchiveId::new();
        let integrity = build_integrity_info(b"hello", HashAlgorithm::Sha256);
        let record = ArchiveRecord {
            id,
            storage_key: derive_storage_key(&integrity.digest_hex, &id, 16),
            metadata: sample_metadata(),
            integrity,
        };

        let json = serde_json::to_value(&record).unwrap();
        assert!(json.get("storageKey").is_some());
        assert!(json["metadata"].get("archivedAt").unwrap().is_string());
        assert!(json["integrity"].get("digestHex").is_some());
        assert_eq!(json["id"], serde_json::json!(id.to_string()));

        let back: ArchiveRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, record);
    }
}
