//! Shared handles wired together from a [`Config`].

use std::sync::Arc;

use crate::activity::ActivityReconciler;
use crate::config::Config;
use crate::gateway::ApiGateway;
use crate::logtail::{LogSource, TailLogSource};
use crate::session::SessionManager;
use crate::store::JobStore;
use crate::transport::{HttpTransport, Transport, TransportError};

/// Everything a request handler needs to talk to one backup server.
#[derive(Clone)]
pub struct AppState {
    /// Immutable configuration loaded at startup.
    pub config: Arc<Config>,
    /// Owner of the cached session. One per process.
    pub sessions: Arc<SessionManager>,
    pub gateway: Arc<ApiGateway>,
    pub reconciler: Arc<ActivityReconciler>,
}

impl AppState {
    /// Wire the production transport and log tail around `store`.
    pub fn new(config: Config, store: Arc<dyn JobStore>) -> Result<Self, TransportError> {
        let transport: Arc<dyn Transport> = Arc::new(HttpTransport::new(&config.server)?);
        let logs: Arc<dyn LogSource> = Arc::new(TailLogSource::new(&config.logs));
        Ok(Self::with_parts(config, transport, store, logs))
    }

    /// Wire explicit collaborators (used by tests and embedders).
    pub fn with_parts(
        config: Config,
        transport: Arc<dyn Transport>,
        store: Arc<dyn JobStore>,
        logs: Arc<dyn LogSource>,
    ) -> Self {
        let sessions = Arc::new(SessionManager::new(
            transport.clone(),
            config.server.username.clone(),
            config.server.password.clone(),
            config.auth.clone(),
        ));
        let gateway = Arc::new(ApiGateway::new(transport, sessions.clone()));
        let reconciler = Arc::new(ActivityReconciler::new(gateway.clone(), store, logs));
        Self {
            config: Arc::new(config),
            sessions,
            gateway,
            reconciler,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SnapshotStore;
    use crate::testing::ScriptedTransport;

    #[tokio::test]
    async fn test_gateway_and_reconciler_share_session() {
        let transport = Arc::new(ScriptedTransport::new());
        transport
            .push_handshake("hint-1")
            .push(200, r#"{"progress":[]}"#)
            .push(200, r#"{"status":[]}"#);
        let state = AppState::with_parts(
            Config::default(),
            transport.clone(),
            Arc::new(SnapshotStore::default()),
            Arc::new(TailLogSource::new(&crate::config::LogsConfig::default())),
        );

        assert!(state.reconciler.current_activities().await.unwrap().is_empty());
        assert!(state.gateway.status().await.unwrap().is_empty());
        assert_eq!(
            transport.actions(),
            vec!["salt", "login", "progress", "status"]
        );
        assert_eq!(transport.field_of(0, "username").as_deref(), Some("admin"));
    }
}
