//! Counter cache implementations.

pub mod memory;

pub use memory::MemoryCounterCache;
