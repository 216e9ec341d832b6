//! Match classification and result ordering
//!
//! Hits are ordered by:
//! 1. match kind (exact, then prefix, then substring)
//! 2. shorter normalized token
//! 3. display label, lexicographically
//!
//! Scope description and anchor URL break any remaining ties so that the
//! order is total and stable across runs.

use crate::query::engine::SearchHit;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// How a normalized token matched a normalized query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchKind {
    Exact,
    Prefix,
    Substring,
}

impl MatchKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchKind::Exact => "exact",
            MatchKind::Prefix => "prefix",
            MatchKind::Substring => "substring",
        }
    }
}

impl fmt::Display for MatchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classify a normalized token against a normalized, non-empty query
#[inline]
pub fn classify(token: &str, query: &str) -> Option<MatchKind> {
    if token.len() < query.len() {
        return None;
    }
    if token == query {
        Some(MatchKind::Exact)
    } else if token.starts_with(query) {
        Some(MatchKind::Prefix)
    } else if token.contains(query) {
        Some(MatchKind::Substring)
    } else {
        None
    }
}

/// Total order over hits
pub fn compare_hits(a: &SearchHit, b: &SearchHit) -> Ordering {
    a.match_kind
        .cmp(&b.match_kind)
        .then_with(|| a.token_len.cmp(&b.token_len))
        .then_with(|| a.display_label.cmp(&b.display_label))
        .then_with(|| a.scope_description.cmp(&b.scope_description))
        .then_with(|| a.anchor_url.cmp(&b.anchor_url))
        .then_with(|| a.token.cmp(&b.token))
}

/// Sort hits and fold duplicates of the same reference under the same token
/// (the same symbol listed by several shards) into one hit.
pub fn rank(hits: &mut Vec<SearchHit>) {
    hits.sort_by(compare_hits);
    hits.dedup_by(|later, kept| {
        let same = later.token == kept.token
            && later.display_label == kept.display_label
            && later.anchor_url == kept.anchor_url
            && later.scope_description == kept.scope_description;
        if same {
            kept.sections.union(later.sections);
        }
        same
    });
}
