use serde::{Deserialize, Serialize};
use sysinfo::{Disks, System};

/// A single entry in `top_processes`, sorted by `cpu_percent` descending.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessMetric {
    pub pid: u32,
    pub name: String,
    pub cpu_percent: f32,
    pub memory_bytes: u64,
}

/// System metrics merged into the next state report (§4.5 metrics report task).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemMetrics {
    pub cpu_percent: f32,
    pub memory_used_bytes: u64,
    pub memory_total_bytes: u64,
    pub storage_used_bytes: u64,
    pub storage_total_bytes: u64,
    pub top_processes: Vec<ProcessMetric>,
}

const TOP_PROCESS_COUNT: usize = 5;

impl SystemMetrics {
    /// Takes two samples ~200ms apart, the minimum sysinfo needs to compute
    /// a meaningful CPU percentage on the first call.
    pub fn collect() -> Self {
        let mut sys = System::new_all();
        sys.refresh_cpu_usage();
        std::thread::sleep(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL);
        sys.refresh_all();

        let disks = Disks::new_with_refreshed_list();
        let (storage_used, storage_total) = disks.iter().fold((0u64, 0u64), |(used, total), disk| {
            let disk_total = disk.total_space();
            let disk_used = disk_total.saturating_sub(disk.available_space());
            (used + disk_used, total + disk_total)
        });

        let mut processes: Vec<ProcessMetric> = sys
            .processes()
            .values()
            .map(|p| ProcessMetric {
                pid: p.pid().as_u32(),
                name: p.name().to_string_lossy().into_owned(),
                cpu_percent: p.cpu_usage(),
                memory_bytes: p.memory(),
            })
            .collect();
        processes.sort_by(|a, b| b.cpu_percent.partial_cmp(&a.cpu_percent).unwrap_or(std::cmp::Ordering::Equal));
        processes.truncate(TOP_PROCESS_COUNT);

        SystemMetrics {
            cpu_percent: sys.global_cpu_usage(),
            memory_used_bytes: sys.used_memory(),
            memory_total_bytes: sys.total_memory(),
            storage_used_bytes: storage_used,
            storage_total_bytes: storage_total,
            top_processes: processes,
        }
    }
}
