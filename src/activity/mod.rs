//! Reconciliation of running backup activity from three sources.
//!
//! - **Relational snapshot** ([`JobStore`]): durable jobs with `complete = false`.
//! - **Live progress** (gateway `progress` action): fresh per-process state.
//! - **Log tail** ([`LogSource`]): the most recent per-file transfer line.
//!
//! ## Merge rules
//!
//! - Entries are keyed by `(client_id, kind)`. The live `process_id` and the
//!   durable job id are unrelated numbers and never used as keys.
//! - A live item overlays the job with the same key; live fields win.
//! - A live item without a job (indexing and other pre-job phases) becomes a
//!   synthesized entry of its own.
//! - Only when live progress is unavailable is the log tail consulted, and
//!   its snapshot is attached to one running job at most.
//!
//! Live progress and the log tail are best-effort: failures are logged and
//! the result degrades to the durable view. Only a job store failure
//! propagates.

pub mod logparse;
pub mod models;

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::actions::BackupKind;
use crate::error::ApiError;
use crate::gateway::ApiGateway;
use crate::logtail::LogSource;
use crate::store::JobStore;

use models::{JobRecord, LiveProgress, TransferSnapshot, UnifiedActivity};

/// Produces the unified "what is running now" list.
pub struct ActivityReconciler {
    gateway: Arc<ApiGateway>,
    store: Arc<dyn JobStore>,
    logs: Arc<dyn LogSource>,
}

impl ActivityReconciler {
    pub fn new(
        gateway: Arc<ApiGateway>,
        store: Arc<dyn JobStore>,
        logs: Arc<dyn LogSource>,
    ) -> Self {
        Self {
            gateway,
            store,
            logs,
        }
    }

    /// Current activities. Order is not significant.
    pub async fn current_activities(&self) -> Result<Vec<UnifiedActivity>, ApiError> {
        let jobs = self.store.incomplete_jobs().await?;
        let live = self.live_progress().await;
        let live_available = live.is_some();

        let mut activities = merge_activities(&jobs, live.as_deref().unwrap_or_default());

        if !live_available {
            if let Some(snapshot) = self.transfer_snapshot().await {
                attach_transfer(&mut activities, snapshot);
            }
        }
        Ok(activities)
    }

    /// Live progress, or `None` when the feed cannot be fetched.
    async fn live_progress(&self) -> Option<Vec<LiveProgress>> {
        match self.gateway.progress().await {
            Ok(items) => Some(items),
            Err(e) => {
                warn!("Activity: live progress unavailable, using job snapshot only: {e}");
                None
            }
        }
    }

    /// Latest transfer line from the log tail, or `None`.
    async fn transfer_snapshot(&self) -> Option<TransferSnapshot> {
        match self.logs.recent_lines().await {
            Ok(lines) => logparse::latest_transfer(&lines),
            Err(e) => {
                debug!("Activity: log tail unavailable: {e}");
                None
            }
        }
    }
}

/// Merge durable jobs with live items, keyed by `(client_id, kind)`.
///
/// Duplicate incomplete jobs for one key collapse to the most recently
/// started one.
pub fn merge_activities(jobs: &[JobRecord], live: &[LiveProgress]) -> Vec<UnifiedActivity> {
    let mut activities: Vec<UnifiedActivity> = Vec::with_capacity(jobs.len() + live.len());
    let mut index: HashMap<(i64, BackupKind), usize> = HashMap::new();

    for job in jobs {
        let key = (job.client_id, job.kind);
        match index.get(&key) {
            Some(&i) => {
                debug!(
                    "Activity: client {} has several incomplete {} jobs, keeping newest",
                    job.client_id, job.kind
                );
                if activities[i].started_at < Some(job.started_at) {
                    activities[i] = UnifiedActivity::from_job(job);
                }
            }
            None => {
                index.insert(key, activities.len());
                activities.push(UnifiedActivity::from_job(job));
            }
        }
    }

    for item in live {
        let key = (item.client_id, item.kind());
        match index.get(&key) {
            Some(&i) => activities[i].apply_live(item),
            None => {
                index.insert(key, activities.len());
                activities.push(UnifiedActivity::from_live(item));
            }
        }
    }

    activities
}

/// Attach a log-derived snapshot to the running job.
///
/// The log line does not name a client. With several jobs running the
/// snapshot goes to the most recently started one, which may be wrong.
pub fn attach_transfer(activities: &mut [UnifiedActivity], snapshot: TransferSnapshot) {
    let running: Vec<usize> = activities
        .iter()
        .enumerate()
        .filter(|(_, a)| a.job_id.is_some())
        .map(|(i, _)| i)
        .collect();

    if running.len() > 1 {
        debug!(
            "Activity: {} jobs running, attributing log transfer to the newest",
            running.len()
        );
    }

    if let Some(&i) = running.iter().max_by_key(|&&i| activities[i].started_at) {
        activities[i].transfer = Some(snapshot);
    }
}
