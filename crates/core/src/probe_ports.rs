//! Port interface for the system resource probe.

use tidemark_domain::SystemSnapshot;

/// Synchronous CPU/memory/disk snapshot used by the health report.
pub trait SystemProbe: Send + Sync {
    fn snapshot(&self) -> SystemSnapshot;
}
