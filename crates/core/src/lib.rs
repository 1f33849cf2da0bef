//! Core types and configuration for the multi-frequency panel pipeline.
//!
//! This crate provides shared types used across all other crates:
//! - Series and panel data model (raw, monthly, panel, forecast records)
//! - Configuration structures
//! - Common error types
//! - Validator checks

pub mod config;
pub mod error;
pub mod types;
pub mod validate;

pub use config::{Config, FeatureConfig, ForecastConfig, IntervalGrowth, PanelConfig, SourceConfig};
pub use error::{Error, Result};
pub use types::*;
