//! Feature derivation for the panel pipeline.
//!
//! This crate handles:
//! - Rolling-mean and lag column kernels
//! - Low-value column removal
//! - Ordered, declarative feature derivation with warm-up trimming

pub mod rolling;
pub mod engine;

pub use rolling::{apply_op, lag, rolling_mean, RollingMean};
pub use engine::{derive, derive_columns, effective_warmup, FeatureEngine};
