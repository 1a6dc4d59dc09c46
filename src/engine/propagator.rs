use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use tokio::sync::Mutex;

use crate::db::Store;
use crate::models::*;
use crate::ws::Hub;

use super::directory::DeviceDirectory;

/// Keeps every link's status equal to "both endpoints running".
///
/// Passes run one at a time. A pass reads peer state and writes link status in
/// the same critical section, so a pass triggered by a later transition always
/// writes after any pass that read the state before it.
pub struct LinkPropagator {
    store: Store,
    directory: Arc<DeviceDirectory>,
    hub: Option<Arc<Hub>>,
    serial: Mutex<()>,
}

impl LinkPropagator {
    pub fn new(store: Store, directory: Arc<DeviceDirectory>) -> Self {
        Self {
            store,
            directory,
            hub: None,
            serial: Mutex::new(()),
        }
    }

    pub fn with_hub(mut self, hub: Arc<Hub>) -> Self {
        self.hub = Some(hub);
        self
    }

    /// Recompute the links touching `device`, which has just reached `new_state`.
    /// Peers are read fresh from the directory. Returns how many links changed.
    pub async fn propagate(&self, device: &str, new_state: DeviceState) -> Result<usize> {
        let _pass = self.serial.lock().await;
        let links = self.store.list_links_by_device(device).await?;
        let mut updated = 0;

        for link in links {
            let peer = link.peer_of(device);
            let (status, forced) = if peer == device {
                (LinkStatus::from_endpoints(new_state, new_state), false)
            } else {
                match self.directory.get(peer).await {
                    Ok(peer_device) => (LinkStatus::from_endpoints(new_state, peer_device.state), false),
                    Err(e) => {
                        tracing::warn!("Link {}: peer {} unresolved ({}), forcing down", link.id, peer, e);
                        (LinkStatus::Down, true)
                    }
                }
            };

            if status == link.status && !forced {
                continue;
            }
            if self.apply(&link, status).await? {
                updated += 1;
            }
        }

        if updated > 0 {
            tracing::info!("Propagated {} ({}): {} links updated", device, new_state, updated);
        }
        Ok(updated)
    }

    /// Recompute every link from the live state of both endpoints. Each device
    /// is read once per pass.
    pub async fn reconcile_all(&self) -> Result<usize> {
        let _pass = self.serial.lock().await;
        let links = self.store.list_links(None).await?;
        let mut states: HashMap<String, DeviceState> = HashMap::new();
        let mut updated = 0;

        for link in links {
            let source = self.cached_state(&mut states, &link.source_router).await;
            let target = self.cached_state(&mut states, &link.target_router).await;
            let status = LinkStatus::from_endpoints(source, target);

            if status != link.status && self.apply(&link, status).await? {
                updated += 1;
            }
        }

        if updated > 0 {
            tracing::info!("Link reconciliation updated {} links", updated);
        }
        Ok(updated)
    }

    async fn cached_state(&self, states: &mut HashMap<String, DeviceState>, name: &str) -> DeviceState {
        if let Some(state) = states.get(name) {
            return *state;
        }
        let state = self.directory.state_of(name).await;
        states.insert(name.to_string(), state);
        state
    }

    /// Persist one status change. A link deleted in the meantime stays deleted.
    async fn apply(&self, link: &Link, status: LinkStatus) -> Result<bool> {
        if !self.store.set_link_status(&link.id, status).await? {
            tracing::debug!("Link {} vanished before its status could be updated", link.id);
            return Ok(false);
        }
        if let Some(hub) = &self.hub {
            hub.broadcast_link_status(&link.id, &link.source_router, &link.target_router, status)
                .await;
        }
        Ok(true)
    }
}
