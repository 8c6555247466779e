#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]

//! bsctl library — integration layer for a backup server's control API.
//!
//! The dashboard's request handlers depend on four operations:
//! - [`SessionManager::ensure_session`] — cached salted challenge-response login
//! - [`ApiGateway::call`] — remote commands with one-shot auth escalation
//! - [`ActivityReconciler::current_activities`] — jobs + live progress + log tail
//! - [`clients::classify`] — online/offline and backup-health status
//!
//! ## Architecture
//!
//! ```text
//! digest.rs      — legacy and PBKDF2 login digests (pure)
//! transport.rs   — Transport trait, reqwest implementation, response parsing
//! session.rs     — SessionManager: single-flight cached session, salt/login
//! gateway.rs     — ApiGateway: call(), allow-list, typed action helpers
//! actions.rs     — action code table, BackupKind
//! activity/
//!   models.rs    — JobRecord, LiveProgress, TransferSnapshot, UnifiedActivity
//!   logparse.rs  — "N% finished" line parser, unit conversion
//!   mod.rs       — ActivityReconciler and the merge
//! clients.rs     — client status classifier
//! store.rs       — JobStore trait, SnapshotStore
//! logtail.rs     — LogSource trait, bounded `tail` reader
//! state.rs       — AppState wiring
//! config.rs      — TOML + env-var configuration
//! error.rs       — ApiError taxonomy
//! ```

pub mod actions;
pub mod activity;
pub mod clients;
pub mod config;
pub mod digest;
pub mod error;
pub mod gateway;
pub mod logtail;
pub mod session;
pub mod state;
pub mod store;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

// Re-export key types at crate root for convenience.
pub use activity::ActivityReconciler;
pub use config::Config;
pub use error::ApiError;
pub use gateway::ApiGateway;
pub use session::SessionManager;
pub use state::AppState;
