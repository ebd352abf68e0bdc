//! Queue drainer
//!
//! Promotes queued trigger requests once capacity frees up. Runs on a fixed
//! interval and whenever it is nudged (run completion, config change, queue
//! cancellation).

use crate::admission::AdmissionController;
use crate::config::DrainerConfig;
use crate::error::DispatchResult;
use crate::orchestrator::{TriggerOrchestrator, TriggerOutcome};
use crate::storage::Records;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::time::{interval, Duration};

/// What one drain pass did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// Positions dispatched successfully, in order
    pub dispatched: Vec<i64>,
    /// Positions whose trigger call failed (entry consumed)
    pub failed: Vec<i64>,
    /// Positions left in place because their app is already running
    pub skipped: Vec<i64>,
    /// Positions dropped because the stored payload was unreadable
    pub dropped: Vec<i64>,
}

impl DrainReport {
    pub fn is_empty(&self) -> bool {
        self.dispatched.is_empty()
            && self.failed.is_empty()
            && self.skipped.is_empty()
            && self.dropped.is_empty()
    }
}

pub struct QueueDrainer {
    config: DrainerConfig,
    records: Records,
    admission: AdmissionController,
    orchestrator: Arc<TriggerOrchestrator>,
    nudge_tx: mpsc::Sender<()>,
    running: Arc<RwLock<bool>>,
    pass: Mutex<()>,
}

impl QueueDrainer {
    pub fn new(
        config: DrainerConfig,
        records: Records,
        admission: AdmissionController,
        orchestrator: Arc<TriggerOrchestrator>,
    ) -> (Arc<Self>, mpsc::Receiver<()>) {
        let (nudge_tx, nudge_rx) = mpsc::channel(1);

        let drainer = Arc::new(Self {
            config,
            records,
            admission,
            orchestrator,
            nudge_tx,
            running: Arc::new(RwLock::new(false)),
            pass: Mutex::new(()),
        });

        (drainer, nudge_rx)
    }

    /// Request an immediate pass. Nudges coalesce while one is pending.
    pub fn nudge(&self) {
        let _ = self.nudge_tx.try_send(());
    }

    /// Run one drain pass
    pub async fn drain_once(&self) -> DispatchResult<DrainReport> {
        let _pass = self.pass.lock().await;
        let mut report = DrainReport::default();

        let queued = self.records.queued().await?;
        if queued.is_empty() {
            return Ok(report);
        }

        let limit = self.admission.max_concurrent().await;
        let mut active = self.records.count_active_runs().await?;
        let mut busy = self.records.active_apps().await?;

        for entry in queued {
            if active as i64 >= limit {
                break;
            }
            if busy.contains(&entry.app_name) {
                report.skipped.push(entry.position);
                continue;
            }
            if !self.records.claim_queued(entry.position).await? {
                tracing::debug!(position = entry.position, "Queue entry already claimed");
                continue;
            }

            match self.orchestrator.dispatch_queued(&entry).await {
                Ok(TriggerOutcome::Succeeded { workflow_id, .. }) => {
                    tracing::info!(
                        app_name = %entry.app_name,
                        position = entry.position,
                        workflow_id = %workflow_id,
                        "Dispatched queued workflow"
                    );
                    active += 1;
                    busy.insert(entry.app_name.clone());
                    report.dispatched.push(entry.position);
                }
                Ok(TriggerOutcome::Failed(failure)) => {
                    tracing::warn!(
                        app_name = %entry.app_name,
                        position = entry.position,
                        details = %failure.details,
                        "Queued workflow failed to trigger"
                    );
                    report.failed.push(entry.position);
                }
                Err(e) => {
                    tracing::error!(
                        app_name = %entry.app_name,
                        position = entry.position,
                        error = %e,
                        "Dropping queued workflow"
                    );
                    report.dropped.push(entry.position);
                }
            }
        }

        Ok(report)
    }

    /// Run the drain loop until [`QueueDrainer::stop`] is called
    pub async fn start(self: Arc<Self>, mut nudge_rx: mpsc::Receiver<()>) {
        {
            let mut running = self.running.write().await;
            *running = true;
        }

        tracing::info!(interval_secs = self.config.interval_secs, "Queue drainer started");

        let mut ticker = interval(Duration::from_secs(self.config.interval_secs.max(1)));
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.drain_once().await {
                        tracing::error!(error = %e, "Queue drain failed");
                    }
                }
                Some(_) = nudge_rx.recv() => {
                    if let Err(e) = self.drain_once().await {
                        tracing::error!(error = %e, "Triggered queue drain failed");
                    }
                }
                else => break,
            }

            let running = self.running.read().await;
            if !*running {
                break;
            }
        }

        tracing::info!("Queue drainer stopped");
    }

    pub async fn stop(&self) {
        let mut running = self.running.write().await;
        *running = false;
    }
}
