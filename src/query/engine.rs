use crate::index::store::TokenEntry;
use crate::index::types::{Section, SectionSet};
use crate::query::normalize::normalize;
use crate::query::rank::{classify, rank, MatchKind};
use serde::{Deserialize, Serialize};

/// Options narrowing a search
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SearchOptions {
    /// Only references that came from shards of this section
    #[serde(default)]
    pub section: Option<Section>,
    /// Only references whose scope description contains this text
    #[serde(default)]
    pub scope: Option<String>,
    /// Maximum number of hits after ranking (None = unlimited)
    #[serde(default)]
    pub limit: Option<usize>,
}

impl SearchOptions {
    pub fn with_limit(limit: usize) -> Self {
        Self {
            limit: Some(limit),
            ..Default::default()
        }
    }

    /// Same options without the limit (cache key for full result lists)
    pub fn unlimited(&self) -> Self {
        Self {
            limit: None,
            ..self.clone()
        }
    }
}

/// One ranked search result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHit {
    pub display_label: String,
    pub anchor_url: String,
    pub scope_description: String,
    /// Normalized token that matched
    pub token: String,
    /// Length of `token` in characters
    pub token_len: usize,
    pub match_kind: MatchKind,
    /// Sections the reference was listed in
    pub sections: SectionSet,
}

/// Prepared per-reference filters
#[derive(Debug, Clone, Default)]
pub struct ScanFilter {
    pub section: Option<Section>,
    scope: Option<String>,
}

impl ScanFilter {
    pub fn new(options: &SearchOptions) -> Self {
        Self {
            section: options.section,
            scope: options
                .scope
                .as_deref()
                .map(normalize)
                .filter(|s| !s.is_empty()),
        }
    }

    fn accepts(&self, sections: SectionSet, scope_description: &str) -> bool {
        if let Some(section) = self.section
            && !sections.contains(section)
        {
            return false;
        }
        match &self.scope {
            Some(scope) => normalize(scope_description).contains(scope.as_str()),
            None => true,
        }
    }

    /// Sections reported on a hit: with a section filter only that section,
    /// so the result does not depend on which other shards happen to be loaded
    fn reported(&self, sections: SectionSet) -> SectionSet {
        match self.section {
            Some(section) => SectionSet::single(section),
            None => sections,
        }
    }
}

/// A searchable token table. Implementations only collect raw hits; ranking,
/// de-duplication and truncation belong to [`QueryEngine`].
pub trait TokenTable: Send + Sync {
    /// Push a hit for every reference whose token matches `query`
    /// (already normalized and non-empty) and passes `filter`.
    fn scan(&self, query: &str, filter: &ScanFilter, out: &mut Vec<SearchHit>);

    /// Distinct tokens currently resident
    fn token_count(&self) -> usize;

    /// Shards known to the table
    fn shard_count(&self) -> usize;
}

/// Scan merged entries, pushing matching hits
pub fn scan_entries<'a, I>(entries: I, query: &str, filter: &ScanFilter, out: &mut Vec<SearchHit>)
where
    I: IntoIterator<Item = &'a TokenEntry>,
{
    for entry in entries {
        let Some(kind) = classify(&entry.normalized, query) else {
            continue;
        };

        for r in &entry.references {
            if !filter.accepts(r.sections, &r.reference.scope_description) {
                continue;
            }
            out.push(SearchHit {
                display_label: r.reference.display_label.clone(),
                anchor_url: r.reference.anchor_url.clone(),
                scope_description: r.reference.scope_description.clone(),
                token: entry.normalized.clone(),
                token_len: entry.normalized_len,
                match_kind: kind,
                sections: filter.reported(r.sections),
            });
        }
    }
}

/// Runs queries against a token table
pub struct QueryEngine<'a> {
    table: &'a dyn TokenTable,
}

impl<'a> QueryEngine<'a> {
    pub fn new(table: &'a dyn TokenTable) -> Self {
        Self { table }
    }

    /// Case-insensitive search with default options
    pub fn search(&self, query: &str) -> Vec<SearchHit> {
        self.search_with(query, &SearchOptions::default())
    }

    /// Search, rank, and truncate. An empty query yields no hits.
    pub fn search_with(&self, query: &str, options: &SearchOptions) -> Vec<SearchHit> {
        let normalized = normalize(query);
        if normalized.is_empty() {
            return Vec::new();
        }

        let filter = ScanFilter::new(options);
        let mut hits = Vec::new();
        self.table.scan(&normalized, &filter, &mut hits);

        rank(&mut hits);
        if let Some(limit) = options.limit {
            hits.truncate(limit);
        }

        tracing::trace!(query = %normalized, hits = hits.len(), "search complete");
        hits
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::store::SymbolIndex;
    use crate::index::types::{IndexEntry, IndexShard, Reference, ShardName};

    fn entry(token: &str, label: &str, url: &str, scope: &str) -> IndexEntry {
        IndexEntry {
            token: token.to_string(),
            name: label.to_string(),
            ordinal: None,
            occurrences: vec![Reference {
                display_label: label.to_string(),
                anchor_url: url.to_string(),
                scope_description: scope.to_string(),
                parent_target: true,
            }],
        }
    }

    fn sample_index() -> SymbolIndex {
        let all = IndexShard {
            name: ShardName::parse("all_b"),
            entries: vec![
                entry("key", "ripple::TaggedCache::key_type", "../classripple_1_1TaggedCache.html#a1", "ripple::TaggedCache"),
                entry("key_", "key_", "../classripple_1_1Key.html#a2", "ripple::Key"),
                entry("keep_alive", "keep_alive", "../structripple_1_1Handoff.html#a3", "ripple::Handoff"),
                entry("monkey", "monkey", "../monkey.html", "zoo"),
            ],
        };
        let classes = IndexShard {
            name: ShardName::parse("classes_13"),
            entries: vec![entry("TaggedCache", "TaggedCache", "../classripple_1_1TaggedCache.html", "ripple")],
        };
        SymbolIndex::build(vec![(all, None), (classes, None)])
    }

    #[test]
    fn test_empty_query() {
        let index = sample_index();
        let engine = QueryEngine::new(&index);
        assert!(engine.search("").is_empty());
        assert!(engine.search("   ").is_empty());
        assert!(engine.search("<b></b>").is_empty());
    }

    #[test]
    fn test_exact_before_prefix() {
        let index = sample_index();
        let hits = QueryEngine::new(&index).search("key");

        assert_eq!(hits[0].token, "key");
        assert_eq!(hits[0].match_kind, MatchKind::Exact);
        assert_eq!(hits[1].token, "key_");
        assert_eq!(hits[1].match_kind, MatchKind::Prefix);
        assert_eq!(hits.last().unwrap().token, "monkey");
        assert_eq!(hits.last().unwrap().match_kind, MatchKind::Substring);
    }

    #[test]
    fn test_case_insensitive() {
        let index = sample_index();
        let engine = QueryEngine::new(&index);
        assert_eq!(engine.search("TaggedCache"), engine.search("taggedcache"));
        assert_eq!(engine.search("TaggedCache").len(), 1);
    }

    #[test]
    fn test_no_match_is_empty() {
        let index = sample_index();
        assert!(QueryEngine::new(&index).search("ledgermaster").is_empty());
    }

    #[test]
    fn test_section_filter() {
        let index = sample_index();
        let engine = QueryEngine::new(&index);
        let options = SearchOptions {
            section: Some(Section::Classes),
            ..Default::default()
        };
        let hits = engine.search_with("a", &options);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].display_label, "TaggedCache");
    }

    #[test]
    fn test_section_filter_reports_only_that_section() {
        let tagged = || entry("TaggedCache", "TaggedCache", "../classripple_1_1TaggedCache.html", "ripple");
        let all = IndexShard {
            name: ShardName::parse("all_13"),
            entries: vec![tagged()],
        };
        let classes = IndexShard {
            name: ShardName::parse("classes_13"),
            entries: vec![tagged()],
        };
        let index = SymbolIndex::build(vec![(all, None), (classes, None)]);
        let engine = QueryEngine::new(&index);

        let unfiltered = engine.search("taggedcache");
        assert!(unfiltered[0].sections.contains(Section::All));
        assert!(unfiltered[0].sections.contains(Section::Classes));

        let options = SearchOptions {
            section: Some(Section::Classes),
            ..Default::default()
        };
        let hits = engine.search_with("taggedcache", &options);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].sections, SectionSet::single(Section::Classes));
    }

    #[test]
    fn test_scope_filter() {
        let index = sample_index();
        let options = SearchOptions {
            scope: Some("HANDOFF".to_string()),
            ..Default::default()
        };
        let hits = QueryEngine::new(&index).search_with("e", &options);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].display_label, "keep_alive");
    }

    #[test]
    fn test_limit() {
        let index = sample_index();
        let hits = QueryEngine::new(&index).search_with("k", &SearchOptions::with_limit(2));
        assert_eq!(hits.len(), 2);
    }

    #[test]
    fn test_unlimited_drops_limit_only() {
        let options = SearchOptions {
            section: Some(Section::Functions),
            scope: Some("ripple".to_string()),
            limit: Some(3),
        };
        let unlimited = options.unlimited();
        assert_eq!(unlimited.limit, None);
        assert_eq!(unlimited.section, Some(Section::Functions));
        assert_eq!(unlimited.scope.as_deref(), Some("ripple"));
    }
}
