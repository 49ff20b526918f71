//! Record filtering, ordering and pagination
//!
//! Every metadata index answers `list` through [`plan`], so the semantics are
//! identical across backends:
//!
//! 1. Filters apply conjunctively (all tags, MIME prefix, inclusive time bounds)
//! 2. Matches are sorted by `archived_at`, newest first, ties broken by id
//! 3. `offset`/`limit` slice the sorted matches
//!
//! `total` counts matches before pagination.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::core::record::ArchiveRecord;

pub const DEFAULT_LIST_LIMIT: usize = 100;

/// Filter and pagination options for listing records
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ListOptions {
    /// Records must carry every one of these tags
    pub tags: Vec<String>,
    pub mime_type_prefix: Option<String>,
    pub archived_after: Option<DateTime<Utc>>,
    pub archived_before: Option<DateTime<Utc>>,
    pub offset: usize,
    pub limit: usize,
}

impl Default for ListOptions {
    fn default() -> Self {
        ListOptions {
            tags: Vec::new(),
            mime_type_prefix: None,
            archived_after: None,
            archived_before: None,
            offset: 0,
            limit: DEFAULT_LIST_LIMIT,
        }
    }
}

impl ListOptions {
    /// Options matching every record with no page limit
    pub fn unbounded() -> Self {
        ListOptions {
            limit: usize::MAX,
            ..Default::default()
        }
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn with_mime_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.mime_type_prefix = Some(prefix.into());
        self
    }

    pub fn archived_between(
        mut self,
        after: Option<DateTime<Utc>>,
        before: Option<DateTime<Utc>>,
    ) -> Self {
        self.archived_after = after;
        self.archived_before = before;
        self
    }

    pub fn page(mut self, offset: usize, limit: usize) -> Self {
        self.offset = offset;
        self.limit = limit;
        self
    }

    /// Whether `record` passes every filter
    pub fn matches(&self, record: &ArchiveRecord) -> bool {
        let meta = &record.metadata;

        if !self.tags.iter().all(|t| meta.has_tag(t)) {
            return false;
        }
        if let Some(prefix) = &self.mime_type_prefix {
            if !meta.mime_type.starts_with(prefix.as_str()) {
                return false;
            }
        }
        if let Some(after) = self.archived_after {
            if meta.archived_at < after {
                return false;
            }
        }
        if let Some(before) = self.archived_before {
            if meta.archived_at > before {
                return false;
            }
        }
        true
    }
}

/// One page of listed records
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListResult {
    pub items: Vec<ArchiveRecord>,
    pub total: usize,
    pub has_more: bool,
}

impl ListResult {
    pub fn empty() -> Self {
        ListResult {
            items: Vec::new(),
            total: 0,
            has_more: false,
        }
    }
}

fn newest_first(a: &ArchiveRecord, b: &ArchiveRecord) -> Ordering {
    b.metadata
        .archived_at
        .cmp(&a.metadata.archived_at)
        .then_with(|| a.id.cmp(&b.id))
}

/// Filter, sort and paginate a record set
pub fn plan<'a, I>(records: I, options: &ListOptions) -> ListResult
where
    I: IntoIterator<Item = &'a ArchiveRecord>,
{
    let mut matched: Vec<&ArchiveRecord> =
        records.into_iter().filter(|r| options.matches(r)).collect();
    matched.sort_by(|a, b| newest_first(a, b));

    let total = matched.len();
    let items: Vec<ArchiveRecord> = matched
        .into_iter()
        .skip(options.offset)
        .take(options.limit)
        .cloned()
        .collect();
    let has_more = options.offset.saturating_add(items.len()) < total;

    ListResult {
        items,
        total,
        has_more,
    }
}
