pub mod engine;
pub mod normalize;
pub mod rank;

pub use engine::{QueryEngine, ScanFilter, SearchHit, SearchOptions, TokenTable};
pub use normalize::normalize;
pub use rank::MatchKind;
