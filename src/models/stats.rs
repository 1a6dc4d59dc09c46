use serde::Serialize;

/// Host-level hypervisor information (virsh nodeinfo)
#[derive(Debug, Clone, Default, Serialize)]
pub struct HostInfo {
    pub model: String,
    pub total_memory_mb: u64,
    pub total_cpus: u32,
    pub cpu_mhz: u32,
    pub numa_nodes: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct VmCounts {
    pub total: usize,
    pub running: usize,
    pub stopped: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResourceUsage {
    pub memory_used_mb: u64,
    pub memory_total_mb: u64,
    pub memory_available_mb: u64,
}

/// Disk usage of the VM image directory
#[derive(Debug, Clone, Serialize)]
pub struct DiskUsage {
    pub path: String,
    pub total_gb: f64,
    pub used_gb: f64,
    pub available_gb: f64,
    pub used_percent: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SystemStats {
    pub host: HostInfo,
    pub vms: VmCounts,
    pub resources: ResourceUsage,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disk: Option<DiskUsage>,
}

/// Live statistics for one running domain
#[derive(Debug, Clone, Serialize)]
pub struct RouterStats {
    pub name: String,
    pub state: String,
    pub memory_mb: u64,
    pub vcpus: u32,
    pub cpu_time_ns: u64,
    pub cpu_time_seconds: f64,
}
