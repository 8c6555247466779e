//! Error taxonomy shared by the session manager, gateway and reconciler.

use crate::store::StoreError;
use crate::transport::TransportError;

/// Errors surfaced by the backup-server integration layer.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The salt endpoint never produced a usable challenge. Retry later.
    #[error("backup server authentication unavailable after {attempts} attempt(s): {reason}")]
    AuthUnavailable { attempts: u32, reason: String },

    /// The server rejected the computed digest (wrong user or secret).
    #[error("backup server rejected login: {0}")]
    AuthRejected(String),

    /// The body could not be interpreted and the status was not a success code.
    #[error("unreadable response from backup server (HTTP {status}): {body}")]
    Protocol { status: u16, body: String },

    /// The server answered with an `error` field, even after escalation.
    #[error("backup server returned error {code} for action '{action}'")]
    RemoteApi { action: String, code: String },

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ApiError {
    /// `true` when retrying the whole operation later may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, ApiError::AuthUnavailable { .. } | ApiError::Transport(_))
    }
}
