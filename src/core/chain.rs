//! Append-only digest chain
//!
//! Every record stored through the engine carries a [`ChainLink`] naming the
//! link hash of the record archived just before it. The link hash covers the
//! predecessor's hash, the record id, the payload digest and `archived_at`:
//!
//! ```text
//! hash = sha256("{prev}:{id}:{digest_hex}:{archived_at, RFC 3339 nanos}")
//! ```
//!
//! The first record links to [`GENESIS`]. Rewriting a record's digest or
//! timestamp breaks its own link; removing a record from the middle leaves
//! its successor pointing at a hash nothing carries.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashSet};

use crate::core::record::{ArchiveId, ArchiveRecord};

/// Predecessor of the first link in a chain
pub const GENESIS: &str = "GENESIS";

/// Position of a record in the archive's digest chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainLink {
    /// Link hash of the previous record, or [`GENESIS`]
    pub prev: String,
    pub hash: String,
}

impl ChainLink {
    pub fn new(
        prev: &str,
        id: &ArchiveId,
        digest_hex: &str,
        archived_at: &DateTime<Utc>,
    ) -> Self {
        ChainLink {
            prev: prev.to_string(),
            hash: link_hash(prev, id, digest_hex, archived_at),
        }
    }

    pub fn is_genesis(&self) -> bool {
        self.prev == GENESIS
    }
}

/// Compute the link hash for one record
pub fn link_hash(
    prev: &str,
    id: &ArchiveId,
    digest_hex: &str,
    archived_at: &DateTime<Utc>,
) -> String {
    let payload = format!(
        "{}:{}:{}:{}",
        prev,
        id,
        digest_hex,
        archived_at.to_rfc3339_opts(SecondsFormat::Nanos, true)
    );
    hex::encode(Sha256::digest(payload.as_bytes()))
}

/// A defect found while walking the chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ChainIssue {
    /// Stored link hash does not match the record's contents
    #[serde(rename_all = "camelCase")]
    Tampered {
        id: ArchiveId,
        expected: String,
        actual: String,
    },
    /// No record carries the hash this record links to
    #[serde(rename_all = "camelCase")]
    MissingPredecessor { id: ArchiveId, prev: String },
    /// Several records link to the same predecessor
    #[serde(rename_all = "camelCase")]
    Fork { prev: String, ids: Vec<ArchiveId> },
}

/// Outcome of [`check`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainReport {
    pub valid: bool,
    /// Records carrying a link
    pub length: usize,
    /// Records without a link, not part of the chain
    pub unchained: usize,
    /// Link hash of the newest chained record
    pub head: Option<String>,
    pub issues: Vec<ChainIssue>,
}

/// Walk every chained record, oldest first, and collect defects
pub fn check<'a, I>(records: I) -> ChainReport
where
    I: IntoIterator<Item = &'a ArchiveRecord>,
{
    let mut unchained = 0;
    let mut chained: Vec<(&ArchiveRecord, &ChainLink)> = Vec::new();
    for record in records {
        match &record.integrity.chain {
            Some(link) => chained.push((record, link)),
            None => unchained += 1,
        }
    }
    chained.sort_by(|(a, _), (b, _)| {
        a.metadata
            .archived_at
            .cmp(&b.metadata.archived_at)
            .then_with(|| a.id.cmp(&b.id))
    });

    let known: HashSet<&str> = chained.iter().map(|(_, link)| link.hash.as_str()).collect();
    let mut successors: BTreeMap<&str, Vec<ArchiveId>> = BTreeMap::new();
    let mut issues = Vec::new();

    for (record, link) in &chained {
        let expected = link_hash(
            &link.prev,
            &record.id,
            &record.integrity.digest_hex,
            &record.metadata.archived_at,
        );
        if expected != link.hash {
            issues.push(ChainIssue::Tampered {
                id: record.id,
                expected,
                actual: link.hash.clone(),
            });
        }
        if !link.is_genesis() && !known.contains(link.prev.as_str()) {
            issues.push(ChainIssue::MissingPredecessor {
                id: record.id,
                prev: link.prev.clone(),
            });
        }
        successors.entry(link.prev.as_str()).or_default().push(record.id);
    }

    for (prev, ids) in successors {
        if ids.len() > 1 {
            issues.push(ChainIssue::Fork {
                prev: prev.to_string(),
                ids,
            });
        }
    }

    ChainReport {
        valid: issues.is_empty(),
        length: chained.len(),
        unchained,
        head: chained.last().map(|(_, link)| link.hash.clone()),
        issues,
    }
}
