//! Single entry point for remote control-API commands.
//!
//! [`ApiGateway::call`] decides up front whether a session is attached:
//! actions in [`ALWAYS_AUTHENTICATED`] get one before the first attempt, all
//! others go out bare first. A bare attempt answered with an `error` field is
//! escalated exactly once: a session is acquired and the identical request is
//! resent with it attached.
//!
//! Result normalization:
//! - `ImplicitSuccess` (empty 200/204 body) and `{}` with HTTP 200 become
//!   `{"success": true}`.
//! - `Malformed` surfaces as [`ApiError::Protocol`].
//! - An `error` field left after escalation surfaces as [`ApiError::RemoteApi`].

use std::sync::Arc;

use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::actions::BackupKind;
use crate::activity::models::LiveProgress;
use crate::clients::StatusEntry;
use crate::error::ApiError;
use crate::session::{code_string, Session, SessionManager};
use crate::transport::{
    parse_response, ParsedResponse, RawResponse, Transport, ACTION_FIELD, SESSION_FIELD,
};

/// Actions that always need a session, so the bare first attempt is skipped.
/// Hand-maintained against the server's documented behavior.
pub const ALWAYS_AUTHENTICATED: &[&str] = &["start_backup", "stop_backup", "progress", "status"];

/// Whether `action` gets a session before its first attempt.
pub fn requires_session(action: &str) -> bool {
    ALWAYS_AUTHENTICATED.contains(&action)
}

/// Issues commands against the remote control API.
pub struct ApiGateway {
    transport: Arc<dyn Transport>,
    sessions: Arc<SessionManager>,
}

impl ApiGateway {
    pub fn new(transport: Arc<dyn Transport>, sessions: Arc<SessionManager>) -> Self {
        Self {
            transport,
            sessions,
        }
    }

    /// The session manager this gateway escalates through.
    pub fn sessions(&self) -> &Arc<SessionManager> {
        &self.sessions
    }

    /// Run `action` with `params`, escalating to an authenticated retry at most once.
    pub async fn call(&self, action: &str, params: &[(&str, &str)]) -> Result<Value, ApiError> {
        let authenticated = requires_session(action);
        let session = if authenticated {
            Some(self.sessions.ensure_session().await?)
        } else {
            None
        };

        let resp = self.send(action, params, session.as_ref()).await?;
        let (mut value, mut status) = (interpret(&resp)?, resp.status);

        if !authenticated && error_field(&value).is_some() {
            debug!("Gateway: {action} failed without session, escalating");
            let session = self.sessions.ensure_session().await?;
            let retry = self.send(action, params, Some(&session)).await?;
            value = interpret(&retry)?;
            status = retry.status;
        }

        if let Some(code) = error_field(&value) {
            let code = code_string(code);
            warn!("Gateway: {action} returned error {code}");
            // The server may no longer know this session.
            self.sessions.invalidate().await;
            return Err(ApiError::RemoteApi {
                action: action.to_string(),
                code,
            });
        }

        if status == 200 && value.as_object().is_some_and(serde_json::Map::is_empty) {
            return Ok(json!({ "success": true }));
        }
        Ok(value)
    }

    async fn send(
        &self,
        action: &str,
        params: &[(&str, &str)],
        session: Option<&Session>,
    ) -> Result<RawResponse, ApiError> {
        let mut form = Vec::with_capacity(params.len() + 2);
        form.push((ACTION_FIELD.to_string(), action.to_string()));
        form.extend(
            params
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string())),
        );
        if let Some(s) = session {
            form.push((SESSION_FIELD.to_string(), s.token.clone()));
        }
        Ok(self.transport.post_form(&form).await?)
    }

    // --- Typed helpers ---

    /// `progress` — in-flight operations on the server.
    pub async fn progress(&self) -> Result<Vec<LiveProgress>, ApiError> {
        let value = self.call("progress", &[]).await?;
        list_field(value, "progress", "progress")
    }

    /// `status` — per-client status entries.
    pub async fn status(&self) -> Result<Vec<StatusEntry>, ApiError> {
        let value = self.call("status", &[]).await?;
        list_field(value, "status", "status")
    }

    /// `start_backup` — queue a backup of `kind` for one client.
    pub async fn start_backup(
        &self,
        client_id: i64,
        kind: BackupKind,
        full: bool,
    ) -> Result<Value, ApiError> {
        let id = client_id.to_string();
        self.call(
            "start_backup",
            &[("start_client", id.as_str()), ("start_type", kind.start_type(full))],
        )
        .await
    }

    /// `stop_backup` — stop a running process by its live process id.
    pub async fn stop_backup(&self, client_id: i64, process_id: i64) -> Result<Value, ApiError> {
        let client = client_id.to_string();
        let process = process_id.to_string();
        self.call(
            "stop_backup",
            &[("stop_clientid", client.as_str()), ("stop_id", process.as_str())],
        )
        .await
    }

    /// `settings` / `sa=general`.
    pub async fn general_settings(&self) -> Result<Value, ApiError> {
        self.call("settings", &[("sa", "general")]).await
    }

    /// `settings` / `sa=general_save` with the given setting fields.
    pub async fn save_general_settings(&self, fields: &[(&str, &str)]) -> Result<Value, ApiError> {
        let mut params = vec![("sa", "general_save")];
        params.extend_from_slice(fields);
        self.call("settings", &params).await
    }

    /// `settings` / `sa=clientsettings` for one client.
    pub async fn client_settings(&self, client_id: i64) -> Result<Value, ApiError> {
        let id = client_id.to_string();
        self.call("settings", &[("sa", "clientsettings"), ("t_clientid", id.as_str())])
            .await
    }

    /// `settings` / `sa=clientsettings_save` for one client.
    pub async fn save_client_settings(
        &self,
        client_id: i64,
        fields: &[(&str, &str)],
    ) -> Result<Value, ApiError> {
        let id = client_id.to_string();
        let mut params = vec![("sa", "clientsettings_save"), ("t_clientid", id.as_str())];
        params.extend_from_slice(fields);
        self.call("settings", &params).await
    }

    /// `remove_client` — mark a client for removal.
    pub async fn remove_client(&self, client_id: i64) -> Result<Value, ApiError> {
        let id = client_id.to_string();
        self.call("remove_client", &[("remove_client", id.as_str())]).await
    }

    /// `logs` — server log entries, optionally for one client, at or above `min_level`.
    pub async fn logs(&self, client_id: Option<i64>, min_level: u8) -> Result<Value, ApiError> {
        let level = min_level.to_string();
        let filter = client_id.map(|id| id.to_string());
        let mut params = vec![("ll", level.as_str())];
        if let Some(f) = filter.as_deref() {
            params.push(("filter", f));
        }
        self.call("logs", &params).await
    }
}

/// Apply the parsing rule, mapping `ImplicitSuccess` to `{"success": true}`.
fn interpret(resp: &RawResponse) -> Result<Value, ApiError> {
    match parse_response(resp) {
        ParsedResponse::Success(value) => Ok(value),
        ParsedResponse::ImplicitSuccess => Ok(json!({ "success": true })),
        ParsedResponse::Malformed(body) => Err(ApiError::Protocol {
            status: resp.status,
            body,
        }),
    }
}

fn error_field(value: &Value) -> Option<&Value> {
    value.get("error").filter(|v| !v.is_null())
}

/// Deserialize the array under `key`; a missing key is an empty list.
fn list_field<T: serde::de::DeserializeOwned>(
    mut value: Value,
    key: &str,
    action: &str,
) -> Result<Vec<T>, ApiError> {
    match value.get_mut(key).map(Value::take) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(list) => serde_json::from_value(list).map_err(|e| ApiError::Protocol {
            status: 200,
            body: format!("unexpected '{action}' payload: {e}"),
        }),
    }
}
