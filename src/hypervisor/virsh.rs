use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use tokio::process::Command;

use super::{DomainInfo, Hypervisor};
use crate::models::{HostInfo, VmState};

/// Hypervisor backed by the `virsh` command line client.
///
/// Each call spawns `virsh -c <uri> ...` asynchronously, so a slow libvirt daemon
/// only stalls the request that issued the call.
pub struct VirshHypervisor {
    binary: String,
    uri: String,
}

impl VirshHypervisor {
    pub fn new(binary: impl Into<String>, uri: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            uri: uri.into(),
        }
    }

    async fn run(&self, args: &[&str]) -> Result<String> {
        let output = Command::new(&self.binary)
            .arg("-c")
            .arg(&self.uri)
            .args(args)
            .output()
            .await
            .with_context(|| format!("Failed to run {} {}", self.binary, args.join(" ")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            bail!("virsh {} failed: {}", args.join(" "), stderr);
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl Hypervisor for VirshHypervisor {
    async fn list_domains(&self) -> Result<Vec<String>> {
        let out = self.run(&["list", "--all", "--name"]).await?;
        Ok(parse_domain_list(&out))
    }

    async fn lookup(&self, name: &str) -> Result<Option<DomainInfo>> {
        match self.run(&["dominfo", name]).await {
            Ok(out) => Ok(Some(parse_dominfo(name, &out))),
            Err(e) if is_not_found(&e) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn start(&self, name: &str) -> Result<()> {
        self.run(&["start", name]).await.map(|_| ())
    }

    async fn shutdown(&self, name: &str) -> Result<()> {
        self.run(&["shutdown", name]).await.map(|_| ())
    }

    async fn force_stop(&self, name: &str) -> Result<()> {
        self.run(&["destroy", name]).await.map(|_| ())
    }

    async fn reboot(&self, name: &str) -> Result<()> {
        self.run(&["reboot", name]).await.map(|_| ())
    }

    async fn undefine(&self, name: &str) -> Result<()> {
        self.run(&["undefine", name]).await.map(|_| ())
    }

    async fn definition(&self, name: &str) -> Result<String> {
        self.run(&["dumpxml", name]).await
    }

    async fn host_info(&self) -> Result<HostInfo> {
        let out = self.run(&["nodeinfo"]).await?;
        Ok(parse_nodeinfo(&out))
    }
}

fn is_not_found(err: &anyhow::Error) -> bool {
    let msg = err.to_string();
    msg.contains("failed to get domain") || msg.contains("Domain not found")
}

fn parse_domain_list(out: &str) -> Vec<String> {
    out.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(String::from)
        .collect()
}

/// Iterate "Key:   value" pairs of virsh's tabular output
fn fields(out: &str) -> impl Iterator<Item = (&str, &str)> {
    out.lines()
        .filter_map(|line| line.split_once(':'))
        .map(|(k, v)| (k.trim(), v.trim()))
}

/// Leading integer of a value such as "4194304 KiB" or "2400 MHz"
fn leading_number(value: &str) -> u64 {
    value
        .split_whitespace()
        .next()
        .and_then(|n| n.parse().ok())
        .unwrap_or(0)
}

fn parse_dominfo(name: &str, out: &str) -> DomainInfo {
    let mut info = DomainInfo {
        name: name.to_string(),
        state: VmState::Unknown,
        max_memory_kib: 0,
        memory_kib: 0,
        vcpus: 0,
        cpu_time_ns: 0,
        domain_id: None,
        uuid: None,
        autostart: false,
    };

    for (key, value) in fields(out) {
        match key {
            "Id" => info.domain_id = value.parse().ok(),
            "UUID" => info.uuid = Some(value.to_string()),
            "State" => info.state = VmState::from_virsh(value),
            "CPU(s)" => info.vcpus = leading_number(value) as u32,
            // "CPU time:       12.3s"
            "CPU time" => {
                let secs: f64 = value.trim_end_matches('s').parse().unwrap_or(0.0);
                info.cpu_time_ns = (secs * 1_000_000_000.0) as u64;
            }
            "Max memory" => info.max_memory_kib = leading_number(value),
            "Used memory" => info.memory_kib = leading_number(value),
            "Autostart" => info.autostart = value == "enable",
            _ => {}
        }
    }
    info
}

fn parse_nodeinfo(out: &str) -> HostInfo {
    let mut host = HostInfo::default();
    for (key, value) in fields(out) {
        match key {
            "CPU model" => host.model = value.to_string(),
            "CPU(s)" => host.total_cpus = leading_number(value) as u32,
            "CPU frequency" => host.cpu_mhz = leading_number(value) as u32,
            "NUMA cell(s)" => host.numa_nodes = leading_number(value) as u32,
            "Memory size" => host.total_memory_mb = leading_number(value) / 1024,
            _ => {}
        }
    }
    host
}
