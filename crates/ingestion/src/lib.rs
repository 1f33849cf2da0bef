//! Series ingestion and monthly alignment for the panel pipeline.
//!
//! This crate handles:
//! - Loosely-typed collector rows to typed raw series
//! - Cadence-specific normalization onto the monthly grid
//! - Concurrent normalization of independent sources
//! - Inner-join merge into a single dated panel

pub mod records;
pub mod normalizer;
pub mod merger;

pub use records::parse_rows;
pub use normalizer::{normalize, normalize_all};
pub use merger::PanelMerger;
