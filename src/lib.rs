//! # DXI - Documentation Symbol Search
//!
//! DXI searches the symbol indexes that documentation generators emit next to
//! their HTML output (the `search/*.js` shards), from the terminal, without a
//! browser.
//!
//! ## Architecture
//!
//! The crate is organized into these main modules:
//!
//! - [`index`] - Shard parsing, loading, and the merged token table
//! - [`query`] - Normalization, matching, and ranking
//! - [`server`] - Persistent daemon keeping shard sets warm (Unix)
//! - [`tui`] - Interactive incremental search
//! - [`output`] - Result formatting (plain, colored, JSON)
//! - [`utils`] - Configuration and progress helpers
//!
//! ## Quick Start
//!
//! ```no_run
//! use dxi::index::IndexLoader;
//! use dxi::query::QueryEngine;
//!
//! let mut loader = IndexLoader::new();
//! loader.add_dir("html/search");
//! let outcome = loader.load().unwrap();
//!
//! for hit in QueryEngine::new(&outcome.index).search("TaggedCache") {
//!     println!("{} {} {}", hit.display_label, hit.scope_description, hit.anchor_url);
//! }
//! ```
//!
//! ## Loading
//!
//! Shards are parsed in parallel and merged in source order. A shard name
//! loaded twice keeps the later copy; distinct names are unioned. A malformed
//! shard is skipped whole and reported without blocking the rest.
//! [`index::LazyIndex`] defers parsing until a query needs a shard.

pub mod error;
pub mod index;
pub mod output;
pub mod query;
#[cfg(all(unix, feature = "daemon"))]
pub mod server;
#[cfg(feature = "interactive")]
pub mod tui;
pub mod utils;
