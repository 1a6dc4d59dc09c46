use std::collections::HashSet;
use std::sync::Arc;

use crate::hypervisor::{DomainInfo, Hypervisor};
use crate::models::*;
use crate::utils::{composite_base, control_unit_id, forwarding_unit_id, in_lab};

use super::error::{LifecycleError, LifecycleResult};

/// Presents hypervisor domains as logical devices, folding each control/forwarding
/// pair into one composite device.
///
/// Nothing is cached: every call reads the hypervisor, which stays the source of
/// truth even when VMs are started or stopped outside this service.
pub struct DeviceDirectory {
    hypervisor: Arc<dyn Hypervisor>,
}

impl DeviceDirectory {
    pub fn new(hypervisor: Arc<dyn Hypervisor>) -> Self {
        Self { hypervisor }
    }

    pub fn hypervisor(&self) -> &Arc<dyn Hypervisor> {
        &self.hypervisor
    }

    /// Every device known to the hypervisor, one entry per composite base name
    pub async fn list(&self) -> LifecycleResult<Vec<Device>> {
        let names = self
            .hypervisor
            .list_domains()
            .await
            .map_err(LifecycleError::Fault)?;

        let mut seen = HashSet::new();
        let mut devices = Vec::new();

        for vm in &names {
            if let Some(base) = composite_base(vm) {
                if !seen.insert(base.to_string()) {
                    continue;
                }
                match self.resolve_composite(base).await {
                    Ok(Some(device)) => devices.push(device),
                    Ok(None) => {}
                    Err(e) => {
                        tracing::warn!("Could not read composite device {}: {}", base, e);
                        devices.push(unresolved(base, DeviceType::JuniperSwitch));
                    }
                }
                continue;
            }

            if !seen.insert(vm.clone()) {
                continue;
            }
            match self.hypervisor.lookup(vm).await {
                Ok(Some(info)) => devices.push(self.simple_device(info).await),
                // Undefined between enumeration and lookup
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!("Could not read domain {}: {}", vm, e);
                    devices.push(unresolved(vm, DeviceType::Juniper));
                }
            }
        }

        Ok(devices)
    }

    /// Devices whose name carries the "<lab>-" prefix
    pub async fn list_lab(&self, lab: &str) -> LifecycleResult<Vec<Device>> {
        Ok(self
            .list()
            .await?
            .into_iter()
            .filter(|d| in_lab(&d.name, lab))
            .collect())
    }

    /// Resolve one device. Composite resolution is tried first because a
    /// composite device has no domain of its own under its base name.
    pub async fn get(&self, name: &str) -> LifecycleResult<Device> {
        if let Some(device) = self.resolve_composite(name).await? {
            return Ok(device);
        }

        let info = self
            .hypervisor
            .lookup(name)
            .await
            .map_err(|e| LifecycleError::gateway(name, e))?
            .ok_or_else(|| LifecycleError::not_found(name))?;

        if let Some(base) = composite_base(name) {
            return Err(LifecycleError::ConstituentAddressed {
                name: name.to_string(),
                base: base.to_string(),
            });
        }

        Ok(self.simple_device(info).await)
    }

    /// Current state of a device; absent devices are `NotCreated`, unreadable ones `Unknown`
    pub async fn state_of(&self, name: &str) -> DeviceState {
        match self.get(name).await {
            Ok(device) => device.state,
            Err(LifecycleError::NotFound { .. }) => DeviceState::NotCreated,
            Err(_) => DeviceState::Unknown,
        }
    }

    async fn resolve_composite(&self, base: &str) -> LifecycleResult<Option<Device>> {
        let control_id = control_unit_id(base);
        let forwarding_id = forwarding_unit_id(base);

        let control = self
            .hypervisor
            .lookup(&control_id)
            .await
            .map_err(|e| LifecycleError::gateway(&control_id, e))?;
        let forwarding = self
            .hypervisor
            .lookup(&forwarding_id)
            .await
            .map_err(|e| LifecycleError::gateway(&forwarding_id, e))?;

        if control.is_none() && forwarding.is_none() {
            return Ok(None);
        }

        let backing = Backing::Composite {
            control: control.map(unit_ref),
            forwarding: forwarding.map(unit_ref),
        };
        Ok(Some(Device::new(base, backing, DeviceType::JuniperSwitch)))
    }

    async fn simple_device(&self, info: DomainInfo) -> Device {
        let xml = match self.hypervisor.definition(&info.name).await {
            Ok(xml) => xml,
            Err(e) => {
                tracing::debug!("No definition for {}: {}", info.name, e);
                String::new()
            }
        };
        let router_type = DeviceType::classify(&info.name, &xml);
        let name = info.name.clone();
        Device::new(name, Backing::Simple { unit: unit_ref(info) }, router_type)
    }
}

fn unit_ref(info: DomainInfo) -> UnitRef {
    UnitRef {
        active: info.is_active(),
        vm_state: info.state,
        memory_mb: info.max_memory_mb(),
        vcpus: info.vcpus,
        domain_id: info.domain_id,
        id: info.name,
    }
}

/// Placeholder for a device whose domain could not be read
fn unresolved(name: &str, router_type: DeviceType) -> Device {
    let unit = UnitRef {
        id: name.to_string(),
        active: false,
        vm_state: VmState::Unknown,
        memory_mb: 0,
        vcpus: 0,
        domain_id: None,
    };
    let mut device = Device::new(name, Backing::Simple { unit }, router_type);
    device.state = DeviceState::Unknown;
    device
}
