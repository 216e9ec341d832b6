//! Shard discovery and loading.
//!
//! Sources are applied in the order they were added. The merge policy is
//! last-loaded-wins per shard name and union across distinct names; every
//! replacement is recorded as a [`DuplicateShard`].

use crate::error::{IndexError, Result};
use crate::index::shard::parse_shard;
use crate::index::lazy::LazyIndex;
use crate::index::store::SymbolIndex;
use crate::index::types::{IndexShard, ShardName};
use crate::query::TokenTable;
use globset::{Glob, GlobSet, GlobSetBuilder};
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// File patterns that identify shard files when none are configured
pub const DEFAULT_SHARD_PATTERNS: &[&str] = &["*.js", "*.json"];

/// Where a shard comes from
#[derive(Debug, Clone)]
enum ShardOrigin {
    File(PathBuf),
    Inline(String),
}

impl ShardOrigin {
    fn describe(&self) -> String {
        match self {
            ShardOrigin::File(path) => path.display().to_string(),
            ShardOrigin::Inline(_) => "<inline>".to_string(),
        }
    }

    fn path(&self) -> Option<PathBuf> {
        match self {
            ShardOrigin::File(path) => Some(path.clone()),
            ShardOrigin::Inline(_) => None,
        }
    }
}

#[derive(Debug, Clone)]
enum Source {
    Dir(PathBuf),
    File(PathBuf),
    Payload { name: String, payload: String },
}

/// A shard name that was loaded more than once
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateShard {
    pub name: String,
    /// Where the replaced copy came from
    pub replaced: String,
    /// Where the authoritative (later) copy came from
    pub replacement: String,
    /// Whether both copies had the same content (None when not compared)
    pub identical: Option<bool>,
}

/// What happened during a load besides the index itself
#[derive(Debug, Default)]
pub struct LoadReport {
    /// Shards that made it into the index
    pub loaded: usize,
    /// Shards that failed and were not applied
    pub failures: Vec<IndexError>,
    /// Replacements under the last-loaded-wins policy
    pub duplicates: Vec<DuplicateShard>,
}

impl LoadReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Result of [`IndexLoader::load`]
#[derive(Debug)]
pub struct LoadOutcome {
    pub index: SymbolIndex,
    pub report: LoadReport,
}

/// Collects shard sources and loads them into a [`SymbolIndex`]
#[derive(Debug, Clone)]
pub struct IndexLoader {
    patterns: GlobSet,
    sources: Vec<Source>,
}

impl IndexLoader {
    /// Loader using [`DEFAULT_SHARD_PATTERNS`]
    pub fn new() -> Self {
        let patterns: Vec<String> = DEFAULT_SHARD_PATTERNS.iter().map(|p| p.to_string()).collect();
        Self {
            patterns: build_globset(&patterns).unwrap_or_else(|_| GlobSet::empty()),
            sources: Vec::new(),
        }
    }

    /// Loader with custom file-name patterns (e.g. `classes_*.js`)
    pub fn with_patterns(patterns: &[String]) -> Result<Self> {
        Ok(Self {
            patterns: build_globset(patterns)?,
            sources: Vec::new(),
        })
    }

    /// Add every matching file in a directory (in file-name order)
    pub fn add_dir(&mut self, dir: impl Into<PathBuf>) -> &mut Self {
        self.sources.push(Source::Dir(dir.into()));
        self
    }

    /// Add a single shard file; its stem is the shard name
    pub fn add_file(&mut self, path: impl Into<PathBuf>) -> &mut Self {
        self.sources.push(Source::File(path.into()));
        self
    }

    /// Add an in-memory shard payload
    pub fn add_payload(&mut self, name: impl Into<String>, payload: impl Into<String>) -> &mut Self {
        self.sources.push(Source::Payload {
            name: name.into(),
            payload: payload.into(),
        });
        self
    }

    /// Parse all shards (in parallel) and merge them.
    ///
    /// Malformed or unreadable shards are reported and skipped. Fails only
    /// when a source directory cannot be listed or holds no shards.
    pub fn load(&self) -> Result<LoadOutcome> {
        let candidates = self.candidates()?;
        tracing::debug!(shards = candidates.len(), "parsing index shards");

        let parsed: Vec<Result<IndexShard>> = candidates
            .par_iter()
            .map(|(name, origin)| read_and_parse(name, origin))
            .collect();

        let mut report = LoadReport::default();
        let mut applied: BTreeMap<String, (IndexShard, ShardOrigin)> = BTreeMap::new();

        for ((name, origin), result) in candidates.into_iter().zip(parsed) {
            let shard = match result {
                Ok(shard) => shard,
                Err(e) => {
                    tracing::warn!("{}", e);
                    report.failures.push(e);
                    continue;
                }
            };

            if let Some((previous, previous_origin)) = applied.remove(&name.raw) {
                let identical = previous == shard;
                if identical {
                    tracing::debug!(shard = %name, "identical shard loaded again from {}", origin.describe());
                } else {
                    tracing::warn!(
                        shard = %name,
                        "shard from {} replaces different content from {}",
                        origin.describe(),
                        previous_origin.describe()
                    );
                }
                report.duplicates.push(DuplicateShard {
                    name: name.raw.clone(),
                    replaced: previous_origin.describe(),
                    replacement: origin.describe(),
                    identical: Some(identical),
                });
            }

            applied.insert(name.raw, (shard, origin));
        }

        report.loaded = applied.len();
        let index = SymbolIndex::build(
            applied
                .into_values()
                .map(|(shard, origin)| (shard, origin.path())),
        );

        tracing::info!(
            shards = report.loaded,
            tokens = index.len(),
            references = index.reference_count(),
            failures = report.failures.len(),
            "index loaded"
        );

        Ok(LoadOutcome { index, report })
    }

    /// Expand sources into (name, origin) pairs in application order
    fn candidates(&self) -> Result<Vec<(ShardName, ShardOrigin)>> {
        let mut out = Vec::new();
        for source in &self.sources {
            match source {
                Source::Dir(dir) => {
                    for path in discover_shards(dir, &self.patterns)? {
                        if let Some(name) = ShardName::from_path(&path) {
                            out.push((name, ShardOrigin::File(path)));
                        }
                    }
                }
                Source::File(path) => {
                    let name = ShardName::from_path(path).ok_or_else(|| IndexError::ReadShard {
                        shard: path.display().to_string(),
                        path: path.clone(),
                        source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "no file name"),
                    })?;
                    out.push((name, ShardOrigin::File(path.clone())));
                }
                Source::Payload { name, payload } => {
                    out.push((ShardName::parse(name), ShardOrigin::Inline(payload.clone())));
                }
            }
        }
        Ok(out)
    }
}

impl Default for IndexLoader {
    fn default() -> Self {
        Self::new()
    }
}

/// A loaded token table, eager or lazy, ready to share across threads
pub struct OpenedTable {
    pub table: Arc<dyn TokenTable>,
    /// Shards that failed (eager loading only; lazy shards fail on first use)
    pub failures: usize,
    pub duplicates: usize,
}

/// Open the shards under `dirs` (later directories win per shard name)
pub fn open_table(dirs: &[PathBuf], patterns: &[String], lazy: bool) -> Result<OpenedTable> {
    if lazy {
        let index = LazyIndex::discover(dirs, patterns)?;
        let duplicates = index.duplicates().len();
        return Ok(OpenedTable {
            table: Arc::new(index),
            failures: 0,
            duplicates,
        });
    }

    let mut loader = IndexLoader::with_patterns(patterns)?;
    for dir in dirs {
        loader.add_dir(dir);
    }
    let LoadOutcome { index, report } = loader.load()?;
    Ok(OpenedTable {
        table: Arc::new(index),
        failures: report.failures.len(),
        duplicates: report.duplicates.len(),
    })
}

fn read_and_parse(name: &ShardName, origin: &ShardOrigin) -> Result<IndexShard> {
    let shard = match origin {
        ShardOrigin::File(path) => {
            let payload = fs::read_to_string(path).map_err(|source| IndexError::ReadShard {
                shard: name.raw.clone(),
                path: path.clone(),
                source,
            })?;
            parse_shard(name.clone(), &payload)?
        }
        ShardOrigin::Inline(payload) => parse_shard(name.clone(), payload)?,
    };
    tracing::debug!(shard = %name, entries = shard.entries.len(), "parsed shard");
    Ok(shard)
}

/// Compile file-name patterns into a glob set
pub fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern).map_err(|e| IndexError::Pattern {
            pattern: pattern.clone(),
            reason: e.to_string(),
        })?;
        builder.add(glob);
    }
    builder.build().map_err(|e| IndexError::Pattern {
        pattern: patterns.join(","),
        reason: e.to_string(),
    })
}

/// List shard files in a directory whose file name matches `patterns`,
/// sorted by file name
pub fn discover_shards(dir: &Path, patterns: &GlobSet) -> Result<Vec<PathBuf>> {
    let read_err = |source: std::io::Error| IndexError::ReadSource {
        path: dir.to_path_buf(),
        source,
    };

    let mut paths = Vec::new();
    for entry in fs::read_dir(dir).map_err(read_err)? {
        let entry = entry.map_err(read_err)?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let matches = path
            .file_name()
            .map(|name| patterns.is_match(Path::new(name)))
            .unwrap_or(false);
        if matches {
            paths.push(path);
        }
    }

    if paths.is_empty() {
        return Err(IndexError::NoShards {
            path: dir.to_path_buf(),
        });
    }

    paths.sort();
    Ok(paths)
}
