use crate::index::types::{IndexShard, Reference, Section, SectionSet, ShardName};
use crate::query::engine::{scan_entries, ScanFilter, TokenTable};
use crate::query::normalize::normalize;
use crate::query::SearchHit;
use ahash::AHashMap;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// A reference together with every section it was seen in
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexedReference {
    pub reference: Reference,
    pub sections: SectionSet,
}

/// All references merged under one normalized token
#[derive(Debug, Clone)]
pub struct TokenEntry {
    /// Token as first seen
    pub token: String,
    /// Comparison form (see [`normalize`])
    pub normalized: String,
    /// Length of `normalized` in characters, used for ranking
    pub normalized_len: usize,
    pub references: Vec<IndexedReference>,
}

impl TokenEntry {
    fn new(token: &str, normalized: String) -> Self {
        Self {
            token: token.to_string(),
            normalized_len: normalized.chars().count(),
            normalized,
            references: Vec::new(),
        }
    }

    fn add_reference(&mut self, reference: &Reference, section: Section) {
        match self
            .references
            .iter_mut()
            .find(|r| r.reference.key() == reference.key())
        {
            Some(existing) => existing.sections.insert(section),
            None => self.references.push(IndexedReference {
                reference: reference.clone(),
                sections: SectionSet::single(section),
            }),
        }
    }
}

/// Summary of a shard that went into an index
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardInfo {
    pub name: ShardName,
    pub entries: usize,
    pub references: usize,
    /// File the shard was read from (None for in-memory payloads)
    pub source: Option<PathBuf>,
}

/// Immutable merged token table built from a set of shards.
///
/// Shards are unioned: entries with the same normalized token share one
/// [`TokenEntry`], and identical references are stored once with the union
/// of their sections.
#[derive(Debug, Default)]
pub struct SymbolIndex {
    shards: BTreeMap<String, ShardInfo>,
    entries: Vec<TokenEntry>,
    by_token: AHashMap<String, usize>,
    reference_count: usize,
}

impl SymbolIndex {
    /// Build an index from shards. Shard names are expected to be unique;
    /// a repeated name replaces the earlier summary but both shards'
    /// entries are merged, so callers apply their own replacement policy first.
    pub fn build<I>(shards: I) -> Self
    where
        I: IntoIterator<Item = (IndexShard, Option<PathBuf>)>,
    {
        let mut index = SymbolIndex::default();
        for (shard, source) in shards {
            index.add_shard(&shard, source);
        }
        index.reference_count = index.entries.iter().map(|e| e.references.len()).sum();
        index
    }

    fn add_shard(&mut self, shard: &IndexShard, source: Option<PathBuf>) {
        let section = shard.section();

        for entry in &shard.entries {
            let normalized = normalize(&entry.token);
            if normalized.is_empty() {
                tracing::debug!(
                    shard = %shard.name,
                    token = %entry.token,
                    "skipping entry whose token normalizes to nothing"
                );
                continue;
            }

            let slot = match self.by_token.get(&normalized) {
                Some(&slot) => slot,
                None => {
                    let slot = self.entries.len();
                    self.entries.push(TokenEntry::new(&entry.token, normalized.clone()));
                    self.by_token.insert(normalized, slot);
                    slot
                }
            };

            let merged = &mut self.entries[slot];
            for reference in &entry.occurrences {
                merged.add_reference(reference, section);
            }
        }

        self.shards.insert(
            shard.name.raw.clone(),
            ShardInfo {
                name: shard.name.clone(),
                entries: shard.entries.len(),
                references: shard.reference_count(),
                source,
            },
        );
    }

    /// Look up the merged entry for a token (any case / markup)
    pub fn lookup(&self, token: &str) -> Option<&TokenEntry> {
        self.by_token
            .get(&normalize(token))
            .and_then(|&slot| self.entries.get(slot))
    }

    /// All merged entries in first-seen order
    pub fn entries(&self) -> &[TokenEntry] {
        &self.entries
    }

    /// Shards that went into this index, by name
    pub fn shards(&self) -> impl Iterator<Item = &ShardInfo> {
        self.shards.values()
    }

    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    /// Number of distinct normalized tokens
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of distinct references across all tokens
    pub fn reference_count(&self) -> usize {
        self.reference_count
    }

    /// Distinct references per section
    pub fn section_counts(&self) -> BTreeMap<Section, usize> {
        let mut counts = BTreeMap::new();
        for entry in &self.entries {
            for r in &entry.references {
                for section in r.sections.iter() {
                    *counts.entry(section).or_insert(0) += 1;
                }
            }
        }
        counts
    }
}

impl TokenTable for SymbolIndex {
    fn scan(&self, query: &str, filter: &ScanFilter, out: &mut Vec<SearchHit>) {
        scan_entries(self.entries.iter(), query, filter, out);
    }

    fn token_count(&self) -> usize {
        self.len()
    }

    fn shard_count(&self) -> usize {
        self.shards.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::types::IndexEntry;

    fn reference(label: &str, url: &str, scope: &str) -> Reference {
        Reference {
            display_label: label.to_string(),
            anchor_url: url.to_string(),
            scope_description: scope.to_string(),
            parent_target: true,
        }
    }

    fn shard(name: &str, entries: Vec<(&str, Vec<Reference>)>) -> IndexShard {
        IndexShard {
            name: ShardName::parse(name),
            entries: entries
                .into_iter()
                .map(|(token, occurrences)| IndexEntry {
                    token: token.to_string(),
                    name: token.to_string(),
                    ordinal: None,
                    occurrences,
                })
                .collect(),
        }
    }

    #[test]
    fn test_union_across_shards() {
        let uhash = reference("uhash<>", "../structbeast_1_1uhash.html", "beast");
        let all = shard("all_14", vec![("uhash<>", vec![uhash.clone()])]);
        let classes = shard(
            "classes_15",
            vec![
                ("uhash<>", vec![uhash.clone()]),
                ("UptimeClock", vec![reference("UptimeClock", "../classripple_1_1UptimeClock.html", "ripple")]),
            ],
        );

        let index = SymbolIndex::build(vec![(all, None), (classes, None)]);
        assert_eq!(index.shard_count(), 2);
        assert_eq!(index.len(), 2);
        assert_eq!(index.reference_count(), 2);

        let entry = index.lookup("UHASH<>").unwrap();
        assert_eq!(entry.references.len(), 1);
        assert!(entry.references[0].sections.contains(Section::All));
        assert!(entry.references[0].sections.contains(Section::Classes));
    }

    #[test]
    fn test_same_token_different_references_are_kept() {
        let a = shard("all_b", vec![("k", vec![reference("k", "a.html", "std::a::k()")])]);
        let b = shard("functions_b", vec![("k", vec![reference("k", "b.html", "ripple::b::k()")])]);
        let index = SymbolIndex::build(vec![(a, None), (b, None)]);

        let entry = index.lookup("k").unwrap();
        assert_eq!(entry.references.len(), 2);
        assert_eq!(index.section_counts().get(&Section::Functions), Some(&1));
    }

    #[test]
    fn test_tokens_that_normalize_to_nothing_are_skipped() {
        let s = shard("all_0", vec![("<b></b>", vec![reference("x", "x.html", "")])]);
        let index = SymbolIndex::build(vec![(s, None)]);
        assert!(index.is_empty());
        assert_eq!(index.shard_count(), 1);
    }

    #[test]
    fn test_shard_info() {
        let s = shard("classes_7", vec![("a", vec![reference("a", "a.html", ""), reference("a", "b.html", "")])]);
        let index = SymbolIndex::build(vec![(s, Some(PathBuf::from("search/classes_7.js")))]);
        let info = index.shards().next().unwrap();
        assert_eq!(info.entries, 1);
        assert_eq!(info.references, 2);
        assert_eq!(info.source.as_deref(), Some(std::path::Path::new("search/classes_7.js")));
    }
}
