use std::sync::Arc;

use crate::models::*;
use crate::ws::{EventType, Hub};

use super::error::{LifecycleError, LifecycleResult};
use super::lifecycle::LifecycleController;
use super::propagator::LinkPropagator;

#[derive(Debug, Clone, Copy)]
enum Transition {
    Start,
    Stop { force: bool },
}

impl Transition {
    fn target(self) -> DeviceState {
        match self {
            Transition::Start => DeviceState::Running,
            Transition::Stop { .. } => DeviceState::Stopped,
        }
    }
}

/// Start/stop entry points that keep links consistent. Each transition is
/// followed by link propagation for that device while its operation lock is
/// still held; bulk runs continue past individual failures.
pub struct BulkOrchestrator {
    controller: Arc<LifecycleController>,
    propagator: Arc<LinkPropagator>,
    hub: Option<Arc<Hub>>,
}

impl BulkOrchestrator {
    pub fn new(controller: Arc<LifecycleController>, propagator: Arc<LinkPropagator>) -> Self {
        Self {
            controller,
            propagator,
            hub: None,
        }
    }

    pub fn with_hub(mut self, hub: Arc<Hub>) -> Self {
        self.hub = Some(hub);
        self
    }

    pub async fn start(&self, name: &str) -> LifecycleResult<ActionReport> {
        self.transition(name, Transition::Start).await
    }

    pub async fn stop(&self, name: &str, force: bool) -> LifecycleResult<ActionReport> {
        self.transition(name, Transition::Stop { force }).await
    }

    pub async fn start_all(&self) -> LifecycleResult<BulkReport> {
        let devices = self.controller.directory().list().await?;
        Ok(self.run(devices, Transition::Start).await)
    }

    pub async fn stop_all(&self, force: bool) -> LifecycleResult<BulkReport> {
        let devices = self.controller.directory().list().await?;
        Ok(self.run(devices, Transition::Stop { force }).await)
    }

    pub async fn start_lab(&self, lab: &str) -> LifecycleResult<BulkReport> {
        let devices = self.controller.directory().list_lab(lab).await?;
        Ok(self.run(devices, Transition::Start).await)
    }

    pub async fn stop_lab(&self, lab: &str, force: bool) -> LifecycleResult<BulkReport> {
        let devices = self.controller.directory().list_lab(lab).await?;
        Ok(self.run(devices, Transition::Stop { force }).await)
    }

    async fn transition(&self, name: &str, transition: Transition) -> LifecycleResult<ActionReport> {
        let (result, links_updated) = self.apply(name, transition).await;
        let mut report = result?;
        report.links_updated = Some(links_updated);
        Ok(report)
    }

    /// Run one transition and its propagation under the device's lock, so the
    /// propagation of a later operation on the same device always lands last.
    async fn apply(&self, name: &str, transition: Transition) -> (LifecycleResult<ActionReport>, usize) {
        let held = self.controller.lock(name).await;
        let result = match transition {
            Transition::Start => self.controller.start(name, &held).await,
            Transition::Stop { force } => self.controller.stop(name, force, &held).await,
        };

        let links_updated = match &result {
            Ok(_) => self.settled(name, transition.target()).await,
            // A composite may have changed one unit before the failing call
            Err(LifecycleError::Gateway { .. }) => {
                let state = self.controller.directory().state_of(name).await;
                self.settled(name, state).await
            }
            Err(_) => 0,
        };
        (result, links_updated)
    }

    async fn run(&self, devices: Vec<Device>, transition: Transition) -> BulkReport {
        let target = transition.target();
        let mut report = BulkReport::default();

        for device in devices {
            if device.state == target {
                report.skipped.push(device.name);
                continue;
            }

            let (result, links_updated) = self.apply(&device.name, transition).await;
            report.links_updated += links_updated;

            match result {
                Ok(_) => report.succeeded.push(device.name),
                // Reached the target state since the snapshot was taken
                Err(LifecycleError::AlreadyInState { .. }) => report.skipped.push(device.name),
                Err(e) => {
                    tracing::warn!("Bulk {:?} failed for {}: {}", transition, device.name, e);
                    report.failed.push(BulkFailure {
                        name: device.name,
                        error: e.to_string(),
                    });
                }
            }
        }

        tracing::info!(
            "Bulk {:?}: {} succeeded, {} failed, {} skipped, {} links updated",
            transition,
            report.succeeded.len(),
            report.failed.len(),
            report.skipped.len(),
            report.links_updated
        );
        report
    }

    /// Announce the new state and bring the device's links in line. Failures
    /// here never undo the transition that already happened.
    async fn settled(&self, name: &str, state: DeviceState) -> usize {
        if let Some(hub) = &self.hub {
            hub.broadcast_device_state(EventType::DeviceStateChanged, name, state)
                .await;
        }
        match self.propagator.propagate(name, state).await {
            Ok(updated) => updated,
            Err(e) => {
                tracing::warn!("Link propagation for {} failed: {:#}", name, e);
                0
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    use anyhow::Result;
    use async_trait::async_trait;

    use crate::db::Store;
    use crate::engine::DeviceDirectory;
    use crate::hypervisor::mock::MockHypervisor;
    use crate::hypervisor::{DomainInfo, Hypervisor};
    use crate::provision::mock::MockProvisioner;

    async fn orchestrator(hv: MockHypervisor) -> (Arc<MockHypervisor>, Store, BulkOrchestrator) {
        let hv = Arc::new(hv);
        let (store, bulk) = orchestrator_over(hv.clone()).await;
        (hv, store, bulk)
    }

    async fn orchestrator_over(hv: Arc<dyn Hypervisor>) -> (Store, BulkOrchestrator) {
        let store = Store::in_memory().await.unwrap();
        let dir = Arc::new(DeviceDirectory::new(hv));
        let controller = Arc::new(
            LifecycleController::new(dir.clone(), Arc::new(MockProvisioner::succeeding()), store.clone())
                .with_settle(Duration::from_millis(10)),
        );
        let propagator = Arc::new(LinkPropagator::new(store.clone(), dir));
        (store, BulkOrchestrator::new(controller, propagator))
    }

    /// Answers the first lookup of one domain with the state it had when asked,
    /// but only after a delay. Every other call goes straight to the mock.
    struct SlowFirstLookup {
        inner: Arc<MockHypervisor>,
        name: &'static str,
        delay: Duration,
        delayed: AtomicBool,
    }

    impl SlowFirstLookup {
        fn new(inner: Arc<MockHypervisor>, name: &'static str, delay: Duration) -> Self {
            Self {
                inner,
                name,
                delay,
                delayed: AtomicBool::new(false),
            }
        }
    }

    #[async_trait]
    impl Hypervisor for SlowFirstLookup {
        async fn list_domains(&self) -> Result<Vec<String>> {
            self.inner.list_domains().await
        }

        async fn lookup(&self, name: &str) -> Result<Option<DomainInfo>> {
            let info = self.inner.lookup(name).await;
            if name == self.name && !self.delayed.swap(true, Ordering::SeqCst) {
                tokio::time::sleep(self.delay).await;
            }
            info
        }

        async fn start(&self, name: &str) -> Result<()> {
            self.inner.start(name).await
        }

        async fn shutdown(&self, name: &str) -> Result<()> {
            self.inner.shutdown(name).await
        }

        async fn force_stop(&self, name: &str) -> Result<()> {
            self.inner.force_stop(name).await
        }

        async fn reboot(&self, name: &str) -> Result<()> {
            self.inner.reboot(name).await
        }

        async fn undefine(&self, name: &str) -> Result<()> {
            self.inner.undefine(name).await
        }

        async fn definition(&self, name: &str) -> Result<String> {
            self.inner.definition(name).await
        }

        async fn host_info(&self) -> Result<HostInfo> {
            self.inner.host_info().await
        }
    }

    fn link(a: &str, b: &str) -> CreateLinkRequest {
        CreateLinkRequest {
            source_router: a.to_string(),
            source_interface: "ge0".to_string(),
            target_router: b.to_string(),
            target_interface: "ge0".to_string(),
            lab: None,
        }
    }

    #[tokio::test]
    async fn test_start_all_continues_past_failure() {
        let (hv, _store, bulk) = orchestrator(
            MockHypervisor::new()
                .with_domain("r1", false)
                .with_domain("r2", false)
                .with_domain("r3", false),
        )
        .await;
        hv.fail_on("start", "r2");

        let report = bulk.start_all().await.unwrap();
        assert_eq!(report.succeeded, vec!["r1", "r3"]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].name, "r2");
        assert!(report.failed[0].error.contains("injected start failure"));
        assert_eq!(report.count(), 2);
    }

    #[tokio::test]
    async fn test_devices_already_in_target_state_are_skipped() {
        let (hv, _store, bulk) = orchestrator(
            MockHypervisor::new()
                .with_domain("r1", true)
                .with_domain("r2", false),
        )
        .await;
        let report = bulk.stop_all(true).await.unwrap();
        assert_eq!(report.succeeded, vec!["r1"]);
        assert_eq!(report.skipped, vec!["r2"]);
        assert_eq!(hv.calls(), vec!["destroy:r1"]);
    }

    #[tokio::test]
    async fn test_lab_scope_and_composite_ordering() {
        let (hv, _store, bulk) = orchestrator(
            MockHypervisor::new()
                .with_domain("lab1-r1", false)
                .with_domain("lab1-sw1-re", false)
                .with_domain("lab1-sw1-pfe", false)
                .with_domain("lab2-r1", false),
        )
        .await;
        let report = bulk.start_lab("lab1").await.unwrap();
        assert_eq!(report.succeeded, vec!["lab1-r1", "lab1-sw1"]);
        assert_eq!(
            hv.calls(),
            vec!["start:lab1-r1", "start:lab1-sw1-pfe", "start:lab1-sw1-re"]
        );
        assert!(!hv.active("lab2-r1"));

        hv.clear_calls();
        bulk.stop_lab("lab1", false).await.unwrap();
        assert_eq!(
            hv.calls(),
            vec!["shutdown:lab1-r1", "shutdown:lab1-sw1-re", "shutdown:lab1-sw1-pfe"]
        );
    }

    #[tokio::test]
    async fn test_lab_start_propagates_after_each_device() {
        let (_hv, store, bulk) = orchestrator(
            MockHypervisor::new()
                .with_domain("lab1-a", false)
                .with_domain("lab1-b", false),
        )
        .await;
        store.create_link(&link("lab1-a", "lab1-b"), LinkStatus::Down).await.unwrap();

        let report = bulk.start_lab("lab1").await.unwrap();
        assert_eq!(report.links_updated, 1);
        let l = store.list_links(None).await.unwrap();
        assert_eq!(l[0].status, LinkStatus::Up);

        let report = bulk.stop_lab("lab1", true).await.unwrap();
        assert_eq!(report.links_updated, 1);
        assert_eq!(store.list_links(None).await.unwrap()[0].status, LinkStatus::Down);
    }

    #[tokio::test]
    async fn test_link_follows_endpoints_end_to_end() {
        let (_hv, store, bulk) = orchestrator(
            MockHypervisor::new()
                .with_domain("A", false)
                .with_domain("B", false),
        )
        .await;
        let created = store.create_link(&link("A", "B"), LinkStatus::Down).await.unwrap();
        assert_eq!(created.id, "A-ge0-B-ge0");

        let status = |store: Store| async move { store.get_link("A-ge0-B-ge0").await.unwrap().unwrap().status };

        bulk.start("A").await.unwrap();
        assert_eq!(status(store.clone()).await, LinkStatus::Down);

        let report = bulk.start("B").await.unwrap();
        assert_eq!(report.links_updated, Some(1));
        assert_eq!(status(store.clone()).await, LinkStatus::Up);

        bulk.stop("A", false).await.unwrap();
        assert_eq!(status(store.clone()).await, LinkStatus::Down);
    }

    #[tokio::test]
    async fn test_failed_start_does_not_touch_links() {
        let (hv, store, bulk) = orchestrator(
            MockHypervisor::new()
                .with_domain("A", true)
                .with_domain("B", false),
        )
        .await;
        store.create_link(&link("A", "B"), LinkStatus::Down).await.unwrap();
        hv.fail_on("start", "B");

        assert!(bulk.start("B").await.is_err());
        assert_eq!(store.list_links(None).await.unwrap()[0].status, LinkStatus::Down);
    }

    #[tokio::test]
    async fn test_stop_during_slow_start_propagation_wins() {
        let mock = Arc::new(
            MockHypervisor::new()
                .with_domain("A", false)
                .with_domain("B", true),
        );
        let hv = Arc::new(SlowFirstLookup::new(mock.clone(), "B", Duration::from_millis(300)));
        let (store, bulk) = orchestrator_over(hv).await;
        let bulk = Arc::new(bulk);
        store.create_link(&link("A", "B"), LinkStatus::Down).await.unwrap();

        let starting = {
            let bulk = bulk.clone();
            tokio::spawn(async move { bulk.start("A").await })
        };
        tokio::time::sleep(Duration::from_millis(100)).await;
        bulk.stop("A", true).await.unwrap();
        starting.await.unwrap().unwrap();

        assert!(!mock.active("A"));
        assert_eq!(mock.calls(), vec!["start:A", "destroy:A"]);
        assert_eq!(store.get_link("A-ge0-B-ge0").await.unwrap().unwrap().status, LinkStatus::Down);
    }

    #[tokio::test]
    async fn test_peer_stop_during_slow_propagation_wins() {
        let mock = Arc::new(
            MockHypervisor::new()
                .with_domain("A", true)
                .with_domain("B", false),
        );
        // B's propagation reads A as running, then A is stopped before that read returns
        let hv = Arc::new(SlowFirstLookup::new(mock.clone(), "A", Duration::from_millis(300)));
        let (store, bulk) = orchestrator_over(hv).await;
        let bulk = Arc::new(bulk);
        store.create_link(&link("A", "B"), LinkStatus::Down).await.unwrap();

        let starting = {
            let bulk = bulk.clone();
            tokio::spawn(async move { bulk.start("B").await })
        };
        tokio::time::sleep(Duration::from_millis(100)).await;
        bulk.stop("A", true).await.unwrap();
        starting.await.unwrap().unwrap();

        assert!(!mock.active("A"));
        assert_eq!(store.get_link("A-ge0-B-ge0").await.unwrap().unwrap().status, LinkStatus::Down);
    }

    #[tokio::test]
    async fn test_partially_failed_composite_stop_takes_links_down() {
        let (hv, store, bulk) = orchestrator(
            MockHypervisor::new()
                .with_domain("A", true)
                .with_domain("sw1-re", true)
                .with_domain("sw1-pfe", true),
        )
        .await;
        store.create_link(&link("A", "sw1"), LinkStatus::Up).await.unwrap();
        hv.fail_on("shutdown", "sw1-pfe");

        let err = bulk.stop("sw1", false).await.unwrap_err();
        assert_eq!(err.kind(), "gateway");
        assert!(!hv.active("sw1-re"));
        assert!(hv.active("sw1-pfe"));
        assert_eq!(store.get_link("A-ge0-sw1-ge0").await.unwrap().unwrap().status, LinkStatus::Down);
    }

    #[tokio::test]
    async fn test_bulk_failure_still_propagates_partial_state() {
        let (hv, store, bulk) = orchestrator(
            MockHypervisor::new()
                .with_domain("lab1-a", true)
                .with_domain("lab1-sw1-re", true)
                .with_domain("lab1-sw1-pfe", true),
        )
        .await;
        store.create_link(&link("lab1-a", "lab1-sw1"), LinkStatus::Up).await.unwrap();
        hv.fail_on("destroy", "lab1-sw1-pfe");
        hv.fail_on("destroy", "lab1-a");

        let report = bulk.stop_lab("lab1", true).await.unwrap();
        assert_eq!(report.failed.len(), 2);
        assert_eq!(report.links_updated, 1);
        assert_eq!(store.list_links(None).await.unwrap()[0].status, LinkStatus::Down);
    }
}
