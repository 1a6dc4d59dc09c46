use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};

use crate::engine::{LifecycleError, LifecycleResult};
use crate::hypervisor::Hypervisor;
use crate::models::*;

/// Host and per-router resource statistics
pub struct StatsService {
    hypervisor: Arc<dyn Hypervisor>,
    images_dir: PathBuf,
}

impl StatsService {
    pub fn new(hypervisor: Arc<dyn Hypervisor>, images_dir: impl Into<PathBuf>) -> Self {
        Self {
            hypervisor,
            images_dir: images_dir.into(),
        }
    }

    pub async fn system(&self) -> Result<SystemStats> {
        let host = self.hypervisor.host_info().await.context("Failed to read host info")?;
        let names = self.hypervisor.list_domains().await?;

        let mut running = 0;
        let mut used_kib = 0u64;
        for name in &names {
            match self.hypervisor.lookup(name).await {
                Ok(Some(info)) if info.is_active() => {
                    running += 1;
                    used_kib += info.memory_kib;
                }
                Ok(_) => {}
                Err(e) => tracing::debug!("Skipping {} in stats: {}", name, e),
            }
        }

        let memory_used_mb = used_kib / 1024;
        let disk = match disk_usage(&self.images_dir) {
            Ok(disk) => Some(disk),
            Err(e) => {
                tracing::debug!("No disk usage for {}: {:#}", self.images_dir.display(), e);
                None
            }
        };

        Ok(SystemStats {
            vms: VmCounts {
                total: names.len(),
                running,
                stopped: names.len() - running,
            },
            resources: ResourceUsage {
                memory_used_mb,
                memory_total_mb: host.total_memory_mb,
                memory_available_mb: host.total_memory_mb.saturating_sub(memory_used_mb),
            },
            host,
            disk,
        })
    }

    /// Live statistics of one running domain
    pub async fn router(&self, name: &str) -> LifecycleResult<RouterStats> {
        let info = self
            .hypervisor
            .lookup(name)
            .await
            .map_err(|e| LifecycleError::gateway(name, e))?
            .ok_or_else(|| LifecycleError::not_found(name))?;

        if !info.is_active() {
            return Err(LifecycleError::NotRunning {
                name: name.to_string(),
                detail: "statistics are only available for running routers".to_string(),
            });
        }

        Ok(RouterStats {
            name: info.name.clone(),
            state: "running".to_string(),
            memory_mb: info.memory_mb(),
            vcpus: info.vcpus,
            cpu_time_ns: info.cpu_time_ns,
            cpu_time_seconds: info.cpu_time_ns as f64 / 1_000_000_000.0,
        })
    }
}

fn disk_usage(path: &Path) -> Result<DiskUsage> {
    let stat = nix::sys::statvfs::statvfs(path).with_context(|| format!("statvfs {}", path.display()))?;

    let gib = 1024.0 * 1024.0 * 1024.0;
    let frsize = stat.fragment_size() as f64;
    let total_gb = stat.blocks() as f64 * frsize / gib;
    let available_gb = stat.blocks_available() as f64 * frsize / gib;
    let used_gb = total_gb - available_gb;
    let used_percent = if total_gb > 0.0 { used_gb / total_gb * 100.0 } else { 0.0 };

    Ok(DiskUsage {
        path: path.display().to_string(),
        total_gb: round2(total_gb),
        used_gb: round2(used_gb),
        available_gb: round2(available_gb),
        used_percent: round2(used_percent),
    })
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}
