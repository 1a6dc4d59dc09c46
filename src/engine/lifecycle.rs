use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::OwnedMutexGuard;

use crate::db::Store;
use crate::hypervisor::Hypervisor;
use crate::models::*;
use crate::provision::{Invocation, Provisioner};
use crate::utils::{composite_base, is_valid_ipv4, is_valid_name};

use super::directory::DeviceDirectory;
use super::error::{LifecycleError, LifecycleResult};
use super::locks::DeviceLocks;

/// Default wait between starting a forwarding unit and its control unit
pub const DEFAULT_SETTLE: Duration = Duration::from_secs(5);

/// Drives device state transitions. Operations on one device name are serialized;
/// composite devices are always started forwarding-first and stopped control-first.
pub struct LifecycleController {
    hypervisor: Arc<dyn Hypervisor>,
    provisioner: Arc<dyn Provisioner>,
    directory: Arc<DeviceDirectory>,
    store: Store,
    locks: DeviceLocks,
    settle: Duration,
    images_dir: PathBuf,
}

impl LifecycleController {
    pub fn new(directory: Arc<DeviceDirectory>, provisioner: Arc<dyn Provisioner>, store: Store) -> Self {
        Self {
            hypervisor: directory.hypervisor().clone(),
            provisioner,
            directory,
            store,
            locks: DeviceLocks::new(),
            settle: DEFAULT_SETTLE,
            images_dir: PathBuf::from("/var/lib/libvirt/images"),
        }
    }

    pub fn with_settle(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }

    pub fn with_images_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.images_dir = dir.into();
        self
    }

    pub fn directory(&self) -> &Arc<DeviceDirectory> {
        &self.directory
    }

    /// Take the operation lock for `name`. Start and stop run under a guard the
    /// caller holds, so follow-up work such as link propagation finishes before
    /// the next operation on the device begins.
    pub async fn lock(&self, name: &str) -> OwnedMutexGuard<()> {
        self.locks.acquire(name).await
    }

    pub async fn start(&self, name: &str, _held: &OwnedMutexGuard<()>) -> LifecycleResult<ActionReport> {
        let device = self.directory.get(name).await?;

        match device.backing {
            Backing::Simple { unit } => {
                if unit.active {
                    return Err(already(name, DeviceState::Running));
                }
                self.call(&unit.id, self.hypervisor.start(&unit.id)).await?;
                tracing::info!("Started {}", name);
                Ok(ActionReport::new(format!("Device {} started", name)))
            }
            Backing::Composite { control, forwarding } => {
                let control = control.ok_or_else(|| missing(name, "control"))?;
                let forwarding = forwarding.ok_or_else(|| missing(name, "forwarding"))?;
                if control.active && forwarding.active {
                    return Err(already(name, DeviceState::Running));
                }

                // The control plane needs the forwarding plane's interfaces first
                if !forwarding.active {
                    self.call(&forwarding.id, self.hypervisor.start(&forwarding.id)).await?;
                    tracing::info!("Started forwarding unit {}, settling for {:?}", forwarding.id, self.settle);
                    tokio::time::sleep(self.settle).await;
                }
                if !control.active {
                    self.call(&control.id, self.hypervisor.start(&control.id)).await?;
                    tracing::info!("Started control unit {}", control.id);
                }
                Ok(ActionReport::new(format!("Device {} started", name)))
            }
        }
    }

    pub async fn stop(&self, name: &str, force: bool, _held: &OwnedMutexGuard<()>) -> LifecycleResult<ActionReport> {
        let device = self.directory.get(name).await?;

        match device.backing {
            Backing::Simple { unit } => {
                if !unit.active {
                    return Err(already(name, DeviceState::Stopped));
                }
                self.halt(&unit.id, force).await?;
            }
            Backing::Composite { control, forwarding } => {
                let units: Vec<UnitRef> = [control, forwarding].into_iter().flatten().collect();
                if units.iter().all(|u| !u.active) {
                    return Err(already(name, DeviceState::Stopped));
                }
                // Control first, reverse of start order; inactive units are skipped
                for unit in units.iter().filter(|u| u.active) {
                    self.halt(&unit.id, force).await?;
                }
            }
        }

        tracing::info!("Stopped {} (force: {})", name, force);
        Ok(ActionReport::new(format!("Device {} stopped", name)))
    }

    /// Send a reboot signal to every unit of a fully running device
    pub async fn restart(&self, name: &str) -> LifecycleResult<ActionReport> {
        let _guard = self.locks.acquire(name).await;
        let device = self.directory.get(name).await?;

        if device.state != DeviceState::Running {
            return Err(LifecycleError::NotRunning {
                name: name.to_string(),
                detail: format!("state is {}", device.state),
            });
        }

        match device.backing {
            Backing::Simple { unit } => {
                self.call(&unit.id, self.hypervisor.reboot(&unit.id)).await?;
            }
            Backing::Composite { control, forwarding } => {
                for unit in [forwarding, control].into_iter().flatten() {
                    self.call(&unit.id, self.hypervisor.reboot(&unit.id)).await?;
                }
            }
        }

        tracing::info!("Restarting {}", name);
        Ok(ActionReport::new(format!("Device {} restarting", name)))
    }

    /// Delete a device and every link touching it. Links go first so a
    /// concurrent propagation can never bring one back.
    pub async fn delete(&self, name: &str) -> LifecycleResult<ActionReport> {
        let _guard = self.locks.acquire(name).await;

        let device = match self.directory.get(name).await {
            Ok(device) => Some(device),
            Err(LifecycleError::NotFound { .. }) => None,
            Err(e) => return Err(e),
        };

        let links_removed = self.store.delete_links_by_device(name).await?;

        let mut report = match device {
            None => {
                self.remove_disk_image(name).await;
                ActionReport::new(format!("Device {} does not exist; nothing to delete", name))
            }
            Some(device) if device.is_composite() => {
                let teardown = device
                    .router_type
                    .teardown_command()
                    .unwrap_or("rmvqfx");
                let output = self
                    .provisioner
                    .run(&Invocation::new(teardown).arg(name))
                    .await
                    .map_err(LifecycleError::from_provision)?;

                let mut report = ActionReport::new(format!("Device {} deleted successfully", name));
                report.router_type = Some(device.router_type);
                report.output = Some(output.stdout);
                report
            }
            Some(device) => {
                if let Backing::Simple { unit } = &device.backing {
                    if unit.active {
                        self.call(&unit.id, self.hypervisor.force_stop(&unit.id)).await?;
                    }
                    self.call(&unit.id, self.hypervisor.undefine(&unit.id)).await?;
                }
                self.remove_disk_image(name).await;

                let mut report = ActionReport::new(format!("Device {} deleted successfully", name));
                report.router_type = Some(device.router_type);
                report
            }
        };

        if links_removed > 0 {
            tracing::info!("Removed {} links of deleted device {}", links_removed, name);
        }
        report.links_removed = Some(links_removed);
        Ok(report)
    }

    /// Provision a new device. Validation and type resolution happen before the
    /// provisioning backend is invoked.
    pub async fn create(&self, req: &CreateRouterRequest) -> LifecycleResult<ActionReport> {
        let name = req.name.trim();
        if !is_valid_name(name) {
            return Err(LifecycleError::InvalidRequest(format!("Invalid device name: {:?}", req.name)));
        }
        if composite_base(name).is_some() {
            return Err(LifecycleError::InvalidRequest(format!(
                "Device names ending in {} or {} are reserved for composite units",
                CONTROL_SUFFIX, FORWARDING_SUFFIX
            )));
        }
        if !req.ip.is_empty() && !is_valid_ipv4(&req.ip) {
            return Err(LifecycleError::InvalidRequest(format!("Invalid IPv4 address: {}", req.ip)));
        }
        if req.ram_gb == 0 || req.vcpus == 0 {
            return Err(LifecycleError::InvalidRequest(
                "ram_gb and vcpus must be greater than zero".to_string(),
            ));
        }
        let router_type = DeviceType::parse(&req.router_type).ok_or_else(|| LifecycleError::UnsupportedType {
            router_type: req.router_type.clone(),
        })?;

        let _guard = self.locks.acquire(name).await;
        match self.directory.get(name).await {
            Ok(_) => {
                return Err(LifecycleError::AlreadyExists {
                    name: name.to_string(),
                })
            }
            Err(LifecycleError::NotFound { .. }) => {}
            Err(e) => return Err(e),
        }

        let invocation = Invocation::new(router_type.create_command())
            .arg(name)
            .env("VRHOST_IP", &req.ip)
            .env("VRHOST_RAM_GB", req.ram_gb.to_string())
            .env("VRHOST_VCPUS", req.vcpus.to_string());

        let output = self
            .provisioner
            .run(&invocation)
            .await
            .map_err(LifecycleError::from_provision)?;

        tracing::info!("Created {} device {}", router_type, name);
        let mut report = ActionReport::new(format!("Device {} created successfully", name));
        report.router_type = Some(router_type);
        report.output = Some(output.stdout);
        Ok(report)
    }

    async fn halt(&self, vm: &str, force: bool) -> LifecycleResult<()> {
        if force {
            self.call(vm, self.hypervisor.force_stop(vm)).await
        } else {
            self.call(vm, self.hypervisor.shutdown(vm)).await
        }
    }

    async fn call<F>(&self, vm: &str, op: F) -> LifecycleResult<()>
    where
        F: std::future::Future<Output = anyhow::Result<()>>,
    {
        op.await.map_err(|e| {
            tracing::warn!("Hypervisor call on {} failed: {:#}", vm, e);
            LifecycleError::gateway(vm, e)
        })
    }

    async fn remove_disk_image(&self, name: &str) {
        let path = self.images_dir.join(format!("{}.qcow2", name));
        match tokio::fs::remove_file(&path).await {
            Ok(()) => tracing::info!("Removed disk image {}", path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!("Could not remove disk image {}: {}", path.display(), e),
        }
    }
}

fn already(name: &str, state: DeviceState) -> LifecycleError {
    LifecycleError::AlreadyInState {
        name: name.to_string(),
        state,
    }
}

fn missing(name: &str, unit: &'static str) -> LifecycleError {
    LifecycleError::MissingConstituent {
        name: name.to_string(),
        unit,
    }
}
