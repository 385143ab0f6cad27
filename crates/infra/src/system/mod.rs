//! System resource probing.

pub mod probe;

pub use probe::SysinfoProbe;
