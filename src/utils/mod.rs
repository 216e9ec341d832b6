//! Shared utilities.
//!
//! - [`app_data`] - Configuration file and search directory resolution
//! - [`progress`] - Load spinner (no-op without the `progress` feature)

pub mod app_data;
pub mod progress;

pub use app_data::*;
