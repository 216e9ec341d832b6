pub mod lazy;
pub mod loader;
pub mod shard;
pub mod stats;
pub mod store;
pub mod types;

pub use lazy::LazyIndex;
pub use loader::{DuplicateShard, IndexLoader, LoadOutcome, LoadReport};
pub use shard::parse_shard;
pub use store::SymbolIndex;
pub use types::*;
