//! Background sweep loop for expired artifacts

use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::ArtifactStore;
use crate::observability::Metrics;

/// Single-slot wake-up signal for the [`Sweeper`]
///
/// Firing while a sweep is already pending is a no-op: sweeps are
/// idempotent, so a dropped trigger only delays cleanup.
#[derive(Debug, Clone)]
pub struct SweepTrigger {
    tx: mpsc::Sender<()>,
}

impl SweepTrigger {
    /// Create a trigger and the receiving end consumed by [`Sweeper::spawn`]
    pub fn channel() -> (Self, mpsc::Receiver<()>) {
        let (tx, rx) = mpsc::channel(1);
        (Self { tx }, rx)
    }

    /// Request a sweep; returns `false` if one was already pending
    pub fn fire(&self) -> bool {
        self.tx.try_send(()).is_ok()
    }
}

/// Background task that sweeps a store on demand and on a fixed interval
///
/// The sweeper holds only a weak reference to the store. It exits once the
/// store is dropped, because that also drops the last [`SweepTrigger`].
pub struct Sweeper {
    handle: JoinHandle<()>,
}

impl Sweeper {
    /// Spawn the sweep loop on the current tokio runtime
    pub fn spawn<S>(
        store: Arc<S>,
        signals: mpsc::Receiver<()>,
        interval: Duration,
        metrics: Arc<Metrics>,
    ) -> Self
    where
        S: ArtifactStore + ?Sized + 'static,
    {
        let store = Arc::downgrade(&store);
        let handle = tokio::spawn(run(store, signals, interval, metrics));
        info!(interval_secs = interval.as_secs(), "Sweeper started");
        Self { handle }
    }

    /// Stop the loop without waiting for the store to be dropped
    pub fn abort(&self) {
        self.handle.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

async fn run<S>(
    store: Weak<S>,
    mut signals: mpsc::Receiver<()>,
    interval: Duration,
    metrics: Arc<Metrics>,
) where
    S: ArtifactStore + ?Sized + 'static,
{
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately; skip it so startup does not sweep twice
    ticker.tick().await;

    loop {
        tokio::select! {
            signal = signals.recv() => {
                if signal.is_none() {
                    debug!("Sweep trigger closed");
                    break;
                }
                debug!("Sweep triggered by write");
            }
            _ = ticker.tick() => {
                debug!("Periodic sweep");
            }
        }

        let Some(live) = store.upgrade() else {
            break;
        };

        match live.sweep().await {
            Ok(stats) => metrics.artifacts_swept(stats.removed()),
            Err(e) => warn!(error = %e, "Sweep failed"),
        }
    }

    info!("Sweeper stopped");
}
