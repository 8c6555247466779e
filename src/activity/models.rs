//! Records consumed and produced by the activity reconciler.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::actions::{action_label, is_incremental, BackupKind};

/// A backup job as known to the relational snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: i64,
    pub client_id: i64,
    pub client_name: String,
    pub kind: BackupKind,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub incremental: bool,
    #[serde(default)]
    pub size_bytes: i64,
    /// Data transfer finished; post-processing may still run.
    #[serde(default)]
    pub done: bool,
    /// Terminal once set.
    #[serde(default)]
    pub complete: bool,
}

/// One entry of the remote `progress` feed, as sent on the wire.
///
/// Only valid for the poll that produced it; `process_id` is not stable
/// across polls and is unrelated to [`JobRecord::id`].
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LiveProgress {
    #[serde(rename = "id", default)]
    pub process_id: i64,
    #[serde(rename = "clientid")]
    pub client_id: i64,
    #[serde(rename = "name", default)]
    pub client_name: Option<String>,
    #[serde(rename = "action", default)]
    pub action_code: i64,
    #[serde(rename = "pcdone", default)]
    pub percent_done: f64,
    #[serde(default)]
    pub done_bytes: i64,
    #[serde(default)]
    pub total_bytes: i64,
    #[serde(rename = "speed_bpms", default)]
    pub speed_bits_per_ms: f64,
    #[serde(default)]
    pub paused: bool,
    #[serde(rename = "details", default)]
    pub detail_text: String,
    /// Negative when the server has no estimate.
    #[serde(default = "unknown_eta")]
    pub eta_ms: i64,
}

fn unknown_eta() -> i64 {
    -1
}

impl LiveProgress {
    pub fn kind(&self) -> BackupKind {
        BackupKind::from_action(self.action_code)
    }
}

/// Per-file transfer detail parsed from the system log.
///
/// Describes the most recently logged transfer system-wide, not a client.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransferSnapshot {
    pub file_name: Option<String>,
    pub percent: f64,
    pub done_bytes: u64,
    pub total_bytes: u64,
    pub speed_bytes_per_ms: f64,
    /// Unknown when the logged speed is zero.
    pub eta_seconds: Option<f64>,
}

/// Which sources contributed to a [`UnifiedActivity`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivitySource {
    Database,
    Live,
    Merged,
}

/// Reconciled view of one running `(client_id, kind)` operation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnifiedActivity {
    pub client_id: i64,
    pub client_name: String,
    pub kind: BackupKind,
    pub source: ActivitySource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub process_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action_code: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub incremental: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub percent_done: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub done_bytes: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_bytes: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speed_bytes_per_ms: Option<f64>,
    pub paused: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eta_ms: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transfer: Option<TransferSnapshot>,
}

impl UnifiedActivity {
    /// Entry backed only by the relational snapshot.
    pub fn from_job(job: &JobRecord) -> Self {
        Self {
            client_id: job.client_id,
            client_name: job.client_name.clone(),
            kind: job.kind,
            source: ActivitySource::Database,
            job_id: Some(job.id),
            process_id: None,
            action: None,
            action_code: None,
            started_at: Some(job.started_at),
            incremental: Some(job.incremental),
            size_bytes: Some(job.size_bytes),
            percent_done: None,
            done_bytes: None,
            total_bytes: None,
            speed_bytes_per_ms: None,
            paused: false,
            eta_ms: None,
            details: None,
            transfer: None,
        }
    }

    /// Entry synthesized from a live item with no durable job (e.g. indexing).
    pub fn from_live(live: &LiveProgress) -> Self {
        let mut entry = Self {
            client_id: live.client_id,
            client_name: live.client_name.clone().unwrap_or_default(),
            kind: live.kind(),
            source: ActivitySource::Live,
            job_id: None,
            process_id: None,
            action: None,
            action_code: None,
            started_at: None,
            incremental: Some(is_incremental(live.action_code)),
            size_bytes: None,
            percent_done: None,
            done_bytes: None,
            total_bytes: None,
            speed_bytes_per_ms: None,
            paused: false,
            eta_ms: None,
            details: None,
            transfer: None,
        };
        entry.apply_live(live);
        entry
    }

    /// Overlay live fields. Live values win wherever both sources have one.
    /// Only entries backed by a job become [`ActivitySource::Merged`].
    pub fn apply_live(&mut self, live: &LiveProgress) {
        if self.job_id.is_some() {
            self.source = ActivitySource::Merged;
        }
        self.process_id = Some(live.process_id);
        self.action = Some(action_label(live.action_code).into_owned());
        self.action_code = Some(live.action_code);
        self.percent_done = Some(live.percent_done);
        self.done_bytes = Some(live.done_bytes);
        self.total_bytes = Some(live.total_bytes);
        self.speed_bytes_per_ms = Some(live.speed_bits_per_ms / 8.0);
        self.paused = live.paused;
        self.eta_ms = (live.eta_ms >= 0).then_some(live.eta_ms);
        if !live.detail_text.is_empty() {
            self.details = Some(live.detail_text.clone());
        }
        if self.client_name.is_empty() {
            if let Some(name) = &live.client_name {
                self.client_name.clone_from(name);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_live_progress_wire_names() {
        let live: LiveProgress = serde_json::from_value(json!({
            "id": 17,
            "clientid": 5,
            "name": "laptop",
            "action": 2,
            "pcdone": 42,
            "done_bytes": 1024,
            "total_bytes": 4096,
            "speed_bpms": 800.0,
            "paused": false,
            "details": "C:\\Users",
            "eta_ms": 5000
        }))
        .unwrap();
        assert_eq!(live.process_id, 17);
        assert_eq!(live.client_id, 5);
        assert_eq!(live.kind(), BackupKind::File);
        assert!((live.percent_done - 42.0).abs() < f64::EPSILON);
        assert_eq!(live.detail_text, "C:\\Users");
    }

    #[test]
    fn test_live_progress_defaults() {
        let live: LiveProgress =
            serde_json::from_value(json!({"clientid": 7, "action": 13})).unwrap();
        assert_eq!(live.eta_ms, -1);
        assert!(live.client_name.is_none());
    }

    #[test]
    fn test_apply_live_converts_speed_and_eta() {
        let job = JobRecord {
            id: 1,
            client_id: 5,
            client_name: "laptop".into(),
            kind: BackupKind::File,
            started_at: Utc::now(),
            incremental: true,
            size_bytes: 10,
            done: false,
            complete: false,
        };
        let live: LiveProgress = serde_json::from_value(
            json!({"clientid": 5, "action": 1, "speed_bpms": 80.0, "eta_ms": -1}),
        )
        .unwrap();
        let mut entry = UnifiedActivity::from_job(&job);
        entry.apply_live(&live);
        assert_eq!(entry.source, ActivitySource::Merged);
        assert_eq!(entry.speed_bytes_per_ms, Some(10.0));
        assert_eq!(entry.eta_ms, None);
        assert_eq!(entry.job_id, Some(1));
        assert_eq!(entry.action.as_deref(), Some("Incremental file backup"));
    }

    #[test]
    fn test_second_live_item_keeps_live_source() {
        let first: LiveProgress = serde_json::from_value(
            json!({"id": 1, "clientid": 9, "action": 13, "pcdone": 10}),
        )
        .unwrap();
        let second: LiveProgress = serde_json::from_value(
            json!({"id": 2, "clientid": 9, "action": 14, "pcdone": 55}),
        )
        .unwrap();
        let mut entry = UnifiedActivity::from_live(&first);
        entry.apply_live(&second);
        assert_eq!(entry.source, ActivitySource::Live);
        assert_eq!(entry.job_id, None);
        assert_eq!(entry.process_id, Some(2));
    }
}
