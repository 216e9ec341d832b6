//! On-demand shard loading.
//!
//! [`LazyIndex`] discovers shard files up front but parses a shard only the
//! first time a query needs it. A section-filtered query touches only the
//! shards of that section. Each shard is parsed at most once, even when
//! several threads query concurrently.

use crate::error::{IndexError, Result};
use crate::index::loader::{build_globset, discover_shards, DuplicateShard};
use crate::index::shard::parse_shard;
use crate::index::store::SymbolIndex;
use crate::index::types::{Section, ShardName};
use crate::query::engine::{ScanFilter, SearchHit, TokenTable};
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::sync::atomic::{AtomicUsize, Ordering};

struct ShardSlot {
    index: Option<SymbolIndex>,
    failures: Vec<IndexError>,
}

struct LazyShard {
    name: ShardName,
    /// Files carrying this shard name, in load order; the last one that
    /// parses is authoritative
    candidates: Vec<PathBuf>,
    slot: OnceLock<ShardSlot>,
}

impl LazyShard {
    fn force(&self, parses: &AtomicUsize) -> &ShardSlot {
        self.slot.get_or_init(|| {
            let mut failures = Vec::new();
            for path in self.candidates.iter().rev() {
                parses.fetch_add(1, Ordering::Relaxed);
                match load_file(&self.name, path) {
                    Ok(index) => {
                        tracing::debug!(shard = %self.name, path = %path.display(), "loaded shard on demand");
                        return ShardSlot {
                            index: Some(index),
                            failures,
                        };
                    }
                    Err(e) => {
                        tracing::warn!("{}", e);
                        failures.push(e);
                    }
                }
            }
            ShardSlot {
                index: None,
                failures,
            }
        })
    }
}

fn load_file(name: &ShardName, path: &Path) -> Result<SymbolIndex> {
    let payload = fs::read_to_string(path).map_err(|source| IndexError::ReadShard {
        shard: name.raw.clone(),
        path: path.to_path_buf(),
        source,
    })?;
    let shard = parse_shard(name.clone(), &payload)?;
    Ok(SymbolIndex::build([(shard, Some(path.to_path_buf()))]))
}

/// Token table whose shards are parsed on first use
pub struct LazyIndex {
    shards: Vec<LazyShard>,
    duplicates: Vec<DuplicateShard>,
    parses: AtomicUsize,
}

impl LazyIndex {
    /// Discover shard files in `dirs` (later directories override earlier
    /// ones per shard name) without parsing any of them
    pub fn discover(dirs: &[PathBuf], patterns: &[String]) -> Result<Self> {
        let globs = build_globset(patterns)?;
        let mut by_name: BTreeMap<String, (ShardName, Vec<PathBuf>)> = BTreeMap::new();
        let mut duplicates = Vec::new();

        for dir in dirs {
            for path in discover_shards(dir, &globs)? {
                let Some(name) = ShardName::from_path(&path) else {
                    continue;
                };
                let (_, candidates) = by_name
                    .entry(name.raw.clone())
                    .or_insert_with(|| (name.clone(), Vec::new()));
                if let Some(previous) = candidates.last() {
                    duplicates.push(DuplicateShard {
                        name: name.raw.clone(),
                        replaced: previous.display().to_string(),
                        replacement: path.display().to_string(),
                        identical: None,
                    });
                }
                candidates.push(path);
            }
        }

        tracing::debug!(shards = by_name.len(), "discovered shards for lazy loading");

        Ok(Self {
            shards: by_name
                .into_values()
                .map(|(name, candidates)| LazyShard {
                    name,
                    candidates,
                    slot: OnceLock::new(),
                })
                .collect(),
            duplicates,
            parses: AtomicUsize::new(0),
        })
    }

    fn needed(&self, section: Option<Section>) -> impl ParallelIterator<Item = &LazyShard> {
        self.shards
            .par_iter()
            .filter(move |s| section.is_none_or(|section| s.name.section == section))
    }

    /// Parse every shard now
    pub fn load_all(&self) {
        self.needed(None).for_each(|s| {
            s.force(&self.parses);
        });
    }

    /// Shards parsed successfully so far
    pub fn loaded_count(&self) -> usize {
        self.shards
            .iter()
            .filter(|s| s.slot.get().is_some_and(|slot| slot.index.is_some()))
            .count()
    }

    /// Shard files read so far (each file at most once)
    pub fn parse_count(&self) -> usize {
        self.parses.load(Ordering::Relaxed)
    }

    /// Failures among the shards loaded so far
    pub fn failures(&self) -> Vec<&IndexError> {
        self.shards
            .iter()
            .filter_map(|s| s.slot.get())
            .flat_map(|slot| slot.failures.iter())
            .collect()
    }

    /// Shard names found in more than one file
    pub fn duplicates(&self) -> &[DuplicateShard] {
        &self.duplicates
    }
}

impl TokenTable for LazyIndex {
    fn scan(&self, query: &str, filter: &ScanFilter, out: &mut Vec<SearchHit>) {
        let parts: Vec<Vec<SearchHit>> = self
            .needed(filter.section)
            .map(|shard| {
                let mut hits = Vec::new();
                if let Some(index) = &shard.force(&self.parses).index {
                    index.scan(query, filter, &mut hits);
                }
                hits
            })
            .collect();
        out.extend(parts.into_iter().flatten());
    }

    fn token_count(&self) -> usize {
        self.shards
            .iter()
            .filter_map(|s| s.slot.get())
            .filter_map(|slot| slot.index.as_ref())
            .map(SymbolIndex::len)
            .sum()
    }

    fn shard_count(&self) -> usize {
        self.shards.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::loader::{IndexLoader, DEFAULT_SHARD_PATTERNS};
    use crate::query::{QueryEngine, SearchOptions};
    use std::sync::Arc;
    use tempfile::TempDir;

    const ALL_K: &str = "var searchData=[\n  ['key_5f_2',['key_',['../classripple_1_1Key.html',1,'ripple::Key']]],\n  ['key_5ftype_3',['key_type',['../classripple_1_1TaggedCache.html#a1',1,'ripple::TaggedCache']]]\n];\n";
    const CLASSES_K: &str = "var searchData=[\n  ['key_1',['Key',['../classripple_1_1Key.html',1,'ripple']]]\n];\n";
    const FUNCTIONS_K: &str = "var searchData=[\n  ['keep_5falive_4',['keep_alive',['../structripple_1_1Handoff.html#a3',1,'ripple::Handoff']]]\n];\n";

    fn patterns() -> Vec<String> {
        DEFAULT_SHARD_PATTERNS.iter().map(|p| p.to_string()).collect()
    }

    fn search_dir() -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("all_b.js"), ALL_K).unwrap();
        fs::write(dir.path().join("classes_a.js"), CLASSES_K).unwrap();
        fs::write(dir.path().join("functions_a.js"), FUNCTIONS_K).unwrap();
        dir
    }

    #[test]
    fn test_discover_parses_nothing() {
        let dir = search_dir();
        let lazy = LazyIndex::discover(&[dir.path().to_path_buf()], &patterns()).unwrap();
        assert_eq!(lazy.shard_count(), 3);
        assert_eq!(lazy.loaded_count(), 0);
        assert_eq!(lazy.parse_count(), 0);
    }

    #[test]
    fn test_section_query_loads_only_that_section() {
        let dir = search_dir();
        let lazy = LazyIndex::discover(&[dir.path().to_path_buf()], &patterns()).unwrap();
        let options = SearchOptions {
            section: Some(Section::Classes),
            ..Default::default()
        };

        let hits = QueryEngine::new(&lazy).search_with("key", &options);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].display_label, "Key");
        assert_eq!(lazy.loaded_count(), 1);
    }

    #[test]
    fn test_matches_eager_results() {
        let dir = search_dir();
        let lazy = LazyIndex::discover(&[dir.path().to_path_buf()], &patterns()).unwrap();

        let mut loader = IndexLoader::new();
        loader.add_dir(dir.path());
        let eager = loader.load().unwrap().index;

        for query in ["key", "k", "alive", "KEY_", "zzz"] {
            assert_eq!(
                QueryEngine::new(&lazy).search(query),
                QueryEngine::new(&eager).search(query),
                "query {query}"
            );
        }
    }

    #[test]
    fn test_section_filter_matches_eager_results() {
        let record = "var searchData=[['taggedcache_7',['TaggedCache',['../classripple_1_1TaggedCache.html',1,'ripple']]]];";
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("all_13.js"), record).unwrap();
        fs::write(dir.path().join("classes_13.js"), record).unwrap();

        let lazy = LazyIndex::discover(&[dir.path().to_path_buf()], &patterns()).unwrap();
        let mut loader = IndexLoader::new();
        loader.add_dir(dir.path());
        let eager = loader.load().unwrap().index;

        for section in [None, Some(Section::Classes), Some(Section::All)] {
            let options = SearchOptions {
                section,
                ..Default::default()
            };
            let lazy_hits = QueryEngine::new(&lazy).search_with("taggedcache", &options);
            assert_eq!(lazy_hits.len(), 1);
            assert_eq!(
                lazy_hits,
                QueryEngine::new(&eager).search_with("taggedcache", &options),
                "section {:?}",
                section
            );
        }
    }

    #[test]
    fn test_each_shard_loads_once_under_concurrency() {
        let dir = search_dir();
        let lazy = Arc::new(LazyIndex::discover(&[dir.path().to_path_buf()], &patterns()).unwrap());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let lazy = Arc::clone(&lazy);
                std::thread::spawn(move || QueryEngine::new(lazy.as_ref()).search("key").len())
            })
            .collect();
        let counts: Vec<usize> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert!(counts.windows(2).all(|w| w[0] == w[1]));
        assert_eq!(lazy.loaded_count(), 3);
        assert_eq!(lazy.parse_count(), 3);
    }

    #[test]
    fn test_later_directory_wins() {
        let old = search_dir();
        let new = TempDir::new().unwrap();
        fs::write(new.path().join("classes_a.js"), "var searchData=[['lock_1',['Lock',['../classLock.html',1,'']]]];").unwrap();

        let lazy = LazyIndex::discover(&[old.path().to_path_buf(), new.path().to_path_buf()], &patterns()).unwrap();
        assert_eq!(lazy.duplicates().len(), 1);
        assert_eq!(lazy.duplicates()[0].identical, None);

        let engine = QueryEngine::new(&lazy);
        assert_eq!(engine.search("lock").len(), 1);
        let classes_only = SearchOptions {
            section: Some(Section::Classes),
            ..Default::default()
        };
        assert!(engine.search_with("key", &classes_only).is_empty());
    }

    #[test]
    fn test_malformed_later_copy_falls_back() {
        let old = search_dir();
        let new = TempDir::new().unwrap();
        fs::write(new.path().join("classes_a.js"), "var searchData=[['broken_1',").unwrap();

        let lazy = LazyIndex::discover(&[old.path().to_path_buf(), new.path().to_path_buf()], &patterns()).unwrap();
        lazy.load_all();

        assert_eq!(lazy.loaded_count(), 3);
        assert_eq!(lazy.failures().len(), 1);
        assert_eq!(lazy.failures()[0].shard(), Some("classes_a"));
        assert_eq!(QueryEngine::new(&lazy).search("key").len(), 3);
    }
}
