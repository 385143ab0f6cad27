//! # Tidemark Core
//!
//! Business logic of the metrics pipeline - no infrastructure dependencies.
//!
//! This crate contains:
//! - The emitter (non-blocking ingestion + background batch worker)
//! - The collector (durable write fan-out for a batch)
//! - The daily rollup service
//! - The read-side query service
//! - Port/adapter interfaces (traits) for the store, cache and system probe
//!
//! ## Architecture Principles
//! - Only depends on `tidemark-domain`
//! - No database, HTTP, or platform code
//! - All external dependencies via traits
//! - Pure, testable business logic

pub mod collector;
pub mod emitter;
pub mod query;
pub mod rollup;

// Infrastructure ports
pub mod cache_ports;
pub mod probe_ports;
pub mod store_ports;

// Re-export specific items to avoid ambiguity
pub use cache_ports::CounterCache;
pub use collector::{BatchOutcome, MetricsCollector};
pub use emitter::MetricsEmitter;
pub use probe_ports::SystemProbe;
pub use query::QueryService;
pub use rollup::{RollupOutcome, RollupService};
pub use store_ports::{
    CounterStore, DailyAggregateStore, HourlyAggregateStore, RawEventStore, StoreHealth,
};
