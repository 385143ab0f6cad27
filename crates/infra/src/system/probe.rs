//! sysinfo-backed system resource probe.

use std::sync::Mutex;

use sysinfo::{Disks, ProcessesToUpdate, System};
use tidemark_core::SystemProbe;
use tidemark_domain::SystemSnapshot;

/// CPU/memory/disk/process snapshot provider.
///
/// Refreshing mutates the underlying `System`, so it sits behind a mutex;
/// the probe is only consulted by health checks, never on a hot path.
pub struct SysinfoProbe {
    system: Mutex<System>,
}

impl SysinfoProbe {
    pub fn new() -> Self {
        Self { system: Mutex::new(System::new()) }
    }
}

impl Default for SysinfoProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemProbe for SysinfoProbe {
    fn snapshot(&self) -> SystemSnapshot {
        let mut system = match self.system.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        system.refresh_cpu_usage();
        system.refresh_memory();
        system.refresh_processes(ProcessesToUpdate::All, true);

        let disks = Disks::new_with_refreshed_list();
        let disk_total: u64 = disks.iter().map(|disk| disk.total_space()).sum();
        let disk_available: u64 = disks.iter().map(|disk| disk.available_space()).sum();

        SystemSnapshot {
            cpu_percent: system.global_cpu_usage(),
            memory_used_bytes: system.used_memory(),
            memory_total_bytes: system.total_memory(),
            disk_used_bytes: disk_total.saturating_sub(disk_available),
            disk_total_bytes: disk_total,
            process_count: system.processes().len(),
        }
    }
}
