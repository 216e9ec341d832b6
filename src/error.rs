//! Error types for index loading.
//!
//! Library code returns these typed errors; the binary, daemon and TUI wrap
//! them in `anyhow` with context.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// A shard payload that does not have the expected token/reference shape.
///
/// Fatal to the named shard only. The loader never applies part of a
/// malformed shard.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("malformed index shard '{shard}': {reason}")]
pub struct MalformedIndexError {
    /// Name of the offending shard (file stem, e.g. `classes_13`)
    pub shard: String,
    /// What was wrong, including the record position when known
    pub reason: String,
}

impl MalformedIndexError {
    pub fn new(shard: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            shard: shard.into(),
            reason: reason.into(),
        }
    }
}

/// Errors raised while loading shards into an index.
#[derive(Error, Debug)]
pub enum IndexError {
    #[error(transparent)]
    Malformed(#[from] MalformedIndexError),

    #[error("failed to read shard '{shard}' from {}: {source}", path.display())]
    ReadShard {
        shard: String,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to read index source {}: {source}", path.display())]
    ReadSource {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("no index shards found in {}", path.display())]
    NoShards { path: PathBuf },

    #[error("invalid shard pattern '{pattern}': {reason}")]
    Pattern { pattern: String, reason: String },
}

impl IndexError {
    /// Name of the shard this error is about, if it concerns a single shard
    pub fn shard(&self) -> Option<&str> {
        match self {
            IndexError::Malformed(e) => Some(&e.shard),
            IndexError::ReadShard { shard, .. } => Some(shard),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, IndexError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_malformed_message_names_shard() {
        let err = MalformedIndexError::new("classes_7", "record 3: missing reference");
        let msg = err.to_string();
        assert!(msg.contains("classes_7"));
        assert!(msg.contains("record 3"));
    }

    #[test]
    fn test_shard_accessor() {
        let err: IndexError = MalformedIndexError::new("all_b", "bad").into();
        assert_eq!(err.shard(), Some("all_b"));

        let err = IndexError::NoShards {
            path: PathBuf::from("/tmp/nowhere"),
        };
        assert_eq!(err.shard(), None);
    }
}
