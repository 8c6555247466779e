//! Authenticated session cache and salt/login handshake.
//!
//! ```text
//! NoSession ──ensure──▶ Acquiring ──ok──▶ Active ──ttl──▶ Expired ──ensure──▶ Acquiring …
//! ```
//!
//! The cached [`Session`] sits behind an async mutex that is held for the
//! whole handshake. Concurrent callers that find no usable session queue on
//! the lock and pick up the freshly acquired one, so at most one handshake is
//! in flight per [`SessionManager`].
//!
//! ## Handshake
//!
//! 1. `a=salt` with `username` → `{ses, salt, rnd, pbkdf2_rounds?}`. A reply
//!    lacking `ses`/`salt` (typically `{"error": 3}`) is transient and retried
//!    after a fixed delay, up to `salt_attempts` times.
//! 2. The digest is computed by [`crate::digest`] (iterated when
//!    `pbkdf2_rounds` is present and non-zero).
//! 3. `a=login` with `username`, `password=<digest>`, `ses`. Only an explicit
//!    `success` flag counts; an `error` field is a hard rejection.
//!
//! The session token is the `ses` hint from step 1. Time is measured with
//! `tokio::time::Instant` so expiry follows tokio's (pausable) clock.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::AuthConfig;
use crate::digest;
use crate::error::ApiError;
use crate::transport::{
    parse_response, ParsedResponse, Transport, ACTION_FIELD, SESSION_FIELD,
};

/// Error code the salt endpoint uses for "try again".
pub const SALT_RETRY_CODE: i64 = 3;

/// A server-tied session token with its validity window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub token: String,
    pub acquired_at: Instant,
    pub expires_at: Instant,
}

impl Session {
    /// Usable only strictly before `expires_at`.
    pub fn is_valid_at(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// One salt challenge. Never cached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaltChallenge {
    pub session_hint: String,
    pub salt: String,
    pub random_nonce: String,
    pub pbkdf2_rounds: Option<u32>,
}

impl SaltChallenge {
    /// Extract a challenge; `None` unless both `ses` and `salt` are present.
    pub fn from_value(value: &Value) -> Option<Self> {
        let session_hint = non_empty_str(value, "ses")?;
        let salt = non_empty_str(value, "salt")?;
        let random_nonce = value["rnd"].as_str().unwrap_or_default().to_string();
        let pbkdf2_rounds = value
            .get("pbkdf2_rounds")
            .and_then(Value::as_u64)
            .and_then(|r| u32::try_from(r).ok())
            .filter(|r| *r > 0);
        Some(Self {
            session_hint,
            salt,
            random_nonce,
            pbkdf2_rounds,
        })
    }

    /// Login digest for `secret`, picking the variant the server asked for.
    pub fn response_for(&self, secret: &str) -> String {
        match self.pbkdf2_rounds {
            Some(rounds) => {
                digest::compute_iterated_response(&self.salt, secret, &self.random_nonce, rounds)
            }
            None => digest::compute_legacy_response(&self.salt, secret, &self.random_nonce),
        }
    }
}

fn non_empty_str(value: &Value, key: &str) -> Option<String> {
    value[key]
        .as_str()
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
}

/// Owns the cached session for one backup server.
pub struct SessionManager {
    transport: Arc<dyn Transport>,
    username: String,
    secret: String,
    config: AuthConfig,
    cached: Mutex<Option<Session>>,
}

impl SessionManager {
    pub fn new(
        transport: Arc<dyn Transport>,
        username: String,
        secret: String,
        config: AuthConfig,
    ) -> Self {
        Self {
            transport,
            username,
            secret,
            config,
            cached: Mutex::new(None),
        }
    }

    /// Return a valid session, performing the handshake only when needed.
    pub async fn ensure_session(&self) -> Result<Session, ApiError> {
        let mut cached = self.cached.lock().await;
        if let Some(session) = cached.as_ref() {
            if session.is_valid_at(Instant::now()) {
                return Ok(session.clone());
            }
            debug!("Session: cached session expired, discarding");
            *cached = None;
        }

        let session = self.acquire().await?;
        *cached = Some(session.clone());
        Ok(session)
    }

    /// The cached session if it is still valid. Never touches the network.
    pub async fn current(&self) -> Option<Session> {
        self.cached
            .lock()
            .await
            .as_ref()
            .filter(|s| s.is_valid_at(Instant::now()))
            .cloned()
    }

    /// Drop the cached session; the next `ensure_session` re-authenticates.
    pub async fn invalidate(&self) {
        if self.cached.lock().await.take().is_some() {
            info!("Session: invalidated");
        }
    }

    async fn acquire(&self) -> Result<Session, ApiError> {
        let challenge = self.request_challenge().await?;
        let password = challenge.response_for(&self.secret);

        let form = vec![
            (ACTION_FIELD.to_string(), "login".to_string()),
            ("username".to_string(), self.username.clone()),
            ("password".to_string(), password),
            (SESSION_FIELD.to_string(), challenge.session_hint.clone()),
        ];
        let resp = self.transport.post_form(&form).await?;

        match parse_response(&resp) {
            ParsedResponse::Success(value) if is_truthy(&value["success"]) => {}
            ParsedResponse::Success(value) => {
                let reason = match value.get("error") {
                    Some(code) => format!("login error {}", code_string(code)),
                    None => "login response did not confirm success".to_string(),
                };
                warn!("Session: login for '{}' rejected: {reason}", self.username);
                return Err(ApiError::AuthRejected(reason));
            }
            ParsedResponse::ImplicitSuccess => {
                return Err(ApiError::AuthRejected(
                    "login response did not confirm success".to_string(),
                ));
            }
            ParsedResponse::Malformed(body) => {
                return Err(ApiError::Protocol {
                    status: resp.status,
                    body,
                });
            }
        }

        let acquired_at = Instant::now();
        let ttl = Duration::from_secs(self.config.session_ttl_secs);
        info!(
            "Session: acquired for '{}' (ttl {}s, iterated={})",
            self.username,
            ttl.as_secs(),
            challenge.pbkdf2_rounds.is_some()
        );
        Ok(Session {
            token: challenge.session_hint,
            acquired_at,
            expires_at: acquired_at + ttl,
        })
    }

    /// Ask for a salt until a usable challenge arrives or attempts run out.
    async fn request_challenge(&self) -> Result<SaltChallenge, ApiError> {
        let attempts = self.config.salt_attempts.max(1);
        let delay = Duration::from_millis(self.config.salt_retry_delay_ms);
        let form = vec![
            (ACTION_FIELD.to_string(), "salt".to_string()),
            ("username".to_string(), self.username.clone()),
        ];

        let mut last_reason = String::new();
        for attempt in 1..=attempts {
            if attempt > 1 {
                tokio::time::sleep(delay).await;
            }
            let reason = match self.transport.post_form(&form).await {
                Ok(resp) => match parse_response(&resp) {
                    ParsedResponse::Success(value) => {
                        if let Some(challenge) = SaltChallenge::from_value(&value) {
                            return Ok(challenge);
                        }
                        match value.get("error") {
                            Some(code) if code.as_i64() == Some(SALT_RETRY_CODE) => {
                                format!("server asked to retry (error {SALT_RETRY_CODE})")
                            }
                            Some(code) => format!("salt error {}", code_string(code)),
                            None => "challenge carried neither ses nor salt".to_string(),
                        }
                    }
                    ParsedResponse::ImplicitSuccess => "empty salt response".to_string(),
                    ParsedResponse::Malformed(_) => {
                        format!("unreadable salt response (HTTP {})", resp.status)
                    }
                },
                Err(e) => e.to_string(),
            };
            warn!("Session: salt attempt {attempt}/{attempts} failed: {reason}");
            last_reason = reason;
        }

        Err(ApiError::AuthUnavailable {
            attempts,
            reason: last_reason,
        })
    }
}

/// `true`, `1` or `"1"`/`"true"` all count as set.
pub(crate) fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_i64().is_some_and(|n| n != 0),
        Value::String(s) => s == "1" || s.eq_ignore_ascii_case("true"),
        _ => false,
    }
}

/// Render an `error` field value as a plain code string.
pub(crate) fn code_string(code: &Value) -> String {
    match code {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
