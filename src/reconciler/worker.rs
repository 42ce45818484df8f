//! Background drivers for the reconciler.
//!
//! Two cooperating drivers share the [`ReconcilerService`]:
//! - the channel worker processes submissions as they arrive, and beats a
//!   heartbeat so the poller knows it is alive;
//! - the fallback poller sweeps the table on an interval, catching rows the
//!   channel path dropped (crash, full channel, restart) and escalating its
//!   logging when the heartbeat goes stale.
//!
//! The claim CAS in the database keeps the two from double-processing.

use super::service::ReconcilerService;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Unix-timestamp heartbeat shared between the drivers.
#[derive(Debug, Default)]
pub struct Heartbeat(AtomicI64);

impl Heartbeat {
    pub fn beat(&self) {
        self.0.store(chrono::Utc::now().timestamp(), Ordering::Relaxed);
    }

    pub fn is_stale(&self, timeout_secs: i64) -> bool {
        let last = self.0.load(Ordering::Relaxed);
        last == 0 || chrono::Utc::now().timestamp() - last > timeout_secs
    }
}

/// Handle given to submitters: enqueues a pending id for prompt processing.
///
/// A full or closed channel is not an error; the fallback poller will pick
/// the row up on its next sweep.
#[derive(Clone)]
pub struct ReconcilerHandle {
    tx: mpsc::Sender<i64>,
}

impl ReconcilerHandle {
    pub fn enqueue(&self, pending_id: i64) {
        if let Err(e) = self.tx.try_send(pending_id) {
            warn!(pending_id, error = %e, "Reconciler channel full, deferring to poller");
        }
    }
}

/// Channel-driven worker: the primary, low-latency path.
pub struct ReconcilerWorker {
    service: Arc<ReconcilerService>,
    heartbeat: Arc<Heartbeat>,
    rx: mpsc::Receiver<i64>,
}

impl ReconcilerWorker {
    pub fn new(
        service: Arc<ReconcilerService>,
        heartbeat: Arc<Heartbeat>,
        channel_capacity: usize,
    ) -> (Self, ReconcilerHandle) {
        let (tx, rx) = mpsc::channel(channel_capacity);
        (
            Self {
                service,
                heartbeat,
                rx,
            },
            ReconcilerHandle { tx },
        )
    }

    /// Consume pending ids until every sender is dropped.
    pub async fn run(mut self) {
        info!("Starting reconciler channel worker");
        self.heartbeat.beat();

        while let Some(pending_id) = self.rx.recv().await {
            self.heartbeat.beat();
            match self.service.process(pending_id).await {
                Ok(outcome) => debug!(pending_id, ?outcome, "Processed pending transaction"),
                Err(e) => error!(pending_id, error = %e, "Processing failed"),
            }
        }

        info!("Reconciler channel worker stopped");
    }
}

/// Interval-driven fallback sweeping the pending table.
pub struct FallbackPoller {
    service: Arc<ReconcilerService>,
    heartbeat: Arc<Heartbeat>,
}

impl FallbackPoller {
    pub fn new(service: Arc<ReconcilerService>, heartbeat: Arc<Heartbeat>) -> Self {
        Self { service, heartbeat }
    }

    /// Run the sweep loop forever.
    pub async fn run(self) -> ! {
        let cfg = self.service.config().clone();
        info!(
            poll_interval_secs = cfg.poll_interval_secs,
            "Starting reconciler fallback poller"
        );

        let mut ticker = tokio::time::interval(Duration::from_secs(cfg.poll_interval_secs));
        loop {
            ticker.tick().await;

            if self.heartbeat.is_stale(cfg.liveness_timeout_secs) {
                warn!("Reconciler channel worker heartbeat is stale, poller taking over");
            }

            match self.service.sweep().await {
                Ok(0) => debug!("No retryable pending transactions"),
                Ok(n) => info!(completed = n, "Fallback sweep completed transactions"),
                Err(e) => error!(error = %e, "Fallback sweep failed"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_heartbeat_staleness() {
        let hb = Heartbeat::default();
        // Never beaten: stale.
        assert!(hb.is_stale(90));

        hb.beat();
        assert!(!hb.is_stale(90));
        assert!(hb.is_stale(-1));
    }
}
