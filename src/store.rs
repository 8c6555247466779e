//! Read-only access to the relational job snapshot.
//!
//! The storage engine is an external collaborator; the reconciler and the
//! binary only need the four query shapes of [`JobStore`]. [`SnapshotStore`]
//! serves them from an in-memory snapshot, optionally loaded from a JSON file
//! exported by the dashboard's data-access layer:
//!
//! ```json
//! {
//!   "clients": [{ "id": 5, "name": "laptop", "last_seen": "2024-05-02T10:41:07Z",
//!                 "file_ok": true, "image_ok": false }],
//!   "jobs": [{ "id": 31, "client_id": 5, "client_name": "laptop", "kind": "file",
//!              "started_at": "2024-05-02T10:00:00Z", "incremental": true,
//!              "size_bytes": 0, "done": false, "complete": false }]
//! }
//! ```

use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::activity::models::JobRecord;
use crate::actions::BackupKind;
use crate::clients::ClientRecord;

/// Failure to read the relational snapshot.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("failed to read job snapshot {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse job snapshot {path}: {source}")]
    Parse {
        path: String,
        source: serde_json::Error,
    },
    #[error("job store query failed: {0}")]
    Query(String),
}

/// Aggregate counts shown on the dashboard overview.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct JobCounts {
    pub clients: usize,
    pub running_file: usize,
    pub running_image: usize,
    pub completed_file: usize,
    pub completed_image: usize,
}

/// Query shapes the integration layer needs from durable storage.
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn list_clients(&self) -> Result<Vec<ClientRecord>, StoreError>;

    /// Jobs of both kinds with `complete = false`.
    async fn incomplete_jobs(&self) -> Result<Vec<JobRecord>, StoreError>;

    /// Completed jobs, newest first.
    async fn recent_completed_jobs(&self, limit: usize) -> Result<Vec<JobRecord>, StoreError>;

    async fn counts(&self) -> Result<JobCounts, StoreError>;
}

/// In-memory snapshot of the client and job tables.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SnapshotStore {
    #[serde(default)]
    clients: Vec<ClientRecord>,
    #[serde(default)]
    jobs: Vec<JobRecord>,
}

impl SnapshotStore {
    pub fn new(clients: Vec<ClientRecord>, jobs: Vec<JobRecord>) -> Self {
        Self { clients, jobs }
    }

    /// Load a JSON export.
    pub fn from_file(path: &Path) -> Result<Self, StoreError> {
        let content = std::fs::read_to_string(path).map_err(|source| StoreError::Read {
            path: path.display().to_string(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| StoreError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    fn count(&self, kind: BackupKind, complete: bool) -> usize {
        self.jobs
            .iter()
            .filter(|j| j.kind == kind && j.complete == complete)
            .count()
    }
}

#[async_trait]
impl JobStore for SnapshotStore {
    async fn list_clients(&self) -> Result<Vec<ClientRecord>, StoreError> {
        Ok(self.clients.clone())
    }

    async fn incomplete_jobs(&self) -> Result<Vec<JobRecord>, StoreError> {
        Ok(self.jobs.iter().filter(|j| !j.complete).cloned().collect())
    }

    async fn recent_completed_jobs(&self, limit: usize) -> Result<Vec<JobRecord>, StoreError> {
        let mut done: Vec<JobRecord> = self.jobs.iter().filter(|j| j.complete).cloned().collect();
        done.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        done.truncate(limit);
        Ok(done)
    }

    async fn counts(&self) -> Result<JobCounts, StoreError> {
        Ok(JobCounts {
            clients: self.clients.len(),
            running_file: self.count(BackupKind::File, false),
            running_image: self.count(BackupKind::Image, false),
            completed_file: self.count(BackupKind::File, true),
            completed_image: self.count(BackupKind::Image, true),
        })
    }
}
