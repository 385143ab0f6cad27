//! # Tidemark Domain
//!
//! Business domain types and models for the Tidemark metrics pipeline.
//!
//! This crate contains:
//! - The metric event model and bucket/dimension-key derivation
//! - Hourly/daily aggregate types and null-safe merge math
//! - Dashboard DTOs and the fixed metric-name vocabulary
//! - Configuration structures
//! - Domain error types and Result definitions
//!
//! ## Architecture
//! - No dependencies on other Tidemark crates
//! - Only external dependencies allowed
//! - Pure domain models and data structures

pub mod buckets;
pub mod config;
pub mod constants;
pub mod errors;
pub mod types;

// Re-export commonly used items
pub use buckets::{day_bucket, dimension_key, hour_bucket, month_bucket, DEFAULT_DIMENSION_KEY};
pub use config::*;
pub use errors::*;
pub use types::*;
