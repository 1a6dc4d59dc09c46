use std::sync::Arc;

use tokio::time::{interval, Duration, MissedTickBehavior};

use crate::engine::LinkPropagator;

/// Periodically recomputes every link from the live state of its endpoints,
/// catching VM starts and stops made outside this service.
pub struct LinkReconciler {
    propagator: Arc<LinkPropagator>,
    interval_secs: u64,
    stop_tx: Option<tokio::sync::oneshot::Sender<()>>,
}

impl LinkReconciler {
    pub fn new(propagator: Arc<LinkPropagator>, interval_secs: u64) -> Self {
        Self {
            propagator,
            interval_secs,
            stop_tx: None,
        }
    }

    /// Start the reconciler
    pub fn start(&mut self) {
        let (stop_tx, mut stop_rx) = tokio::sync::oneshot::channel();
        self.stop_tx = Some(stop_tx);

        let propagator = self.propagator.clone();
        let interval_secs = self.interval_secs.max(1);

        tokio::spawn(async move {
            let mut ticker = interval(Duration::from_secs(interval_secs));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = propagator.reconcile_all().await {
                            tracing::warn!("Error reconciling link status: {}", e);
                        }
                    }
                    _ = &mut stop_rx => {
                        tracing::info!("Link reconciler stopped");
                        break;
                    }
                }
            }
        });
    }

    /// Stop the reconciler
    pub fn stop(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
    }
}
