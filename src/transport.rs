//! HTTP transport for the backup server control API.
//!
//! Every remote command is a form-encoded `POST` to a single endpoint
//! (`<url>/<endpoint>`), selected by the `a` field. [`Transport`] is the seam
//! the session manager and gateway talk through; [`HttpTransport`] is the
//! `reqwest` implementation used in production.
//!
//! ## Response interpretation
//!
//! The body is always read to completion as text before any JSON parsing,
//! because an empty body with a success status is a valid answer.
//! [`parse_response`] turns a [`RawResponse`] into a [`ParsedResponse`]:
//!
//! | status    | body          | result            |
//! |-----------|---------------|-------------------|
//! | any       | valid JSON    | `Success(value)`  |
//! | 200 / 204 | anything else | `ImplicitSuccess` |
//! | other     | anything else | `Malformed(body)` |

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::config::ServerConfig;

/// Form field carrying the action name.
pub const ACTION_FIELD: &str = "a";
/// Form field carrying the session token.
pub const SESSION_FIELD: &str = "ses";

/// Status code and full body text of one HTTP exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    pub body: String,
}

/// Interpretation of a [`RawResponse`].
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedResponse {
    /// The body was valid JSON.
    Success(Value),
    /// Success status with an empty or non-JSON body.
    ImplicitSuccess,
    /// Non-success status with a body that is not JSON.
    Malformed(String),
}

/// Interpret a raw response. This is the only place the empty-body rule lives.
pub fn parse_response(resp: &RawResponse) -> ParsedResponse {
    match serde_json::from_str::<Value>(&resp.body) {
        Ok(value) => ParsedResponse::Success(value),
        Err(_) if resp.status == 200 || resp.status == 204 => ParsedResponse::ImplicitSuccess,
        Err(_) => ParsedResponse::Malformed(resp.body.clone()),
    }
}

/// Errors from the transport layer itself (nothing was interpreted yet).
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The request exceeded its connect or overall timeout.
    #[error("request to backup server timed out: {0}")]
    Timeout(String),
    /// Connection refused, DNS failure, TLS error, body read failure, etc.
    #[error("request to backup server failed: {0}")]
    Request(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            TransportError::Timeout(e.to_string())
        } else {
            TransportError::Request(e.to_string())
        }
    }
}

/// Sends one form-encoded request and returns the raw answer.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn post_form(&self, form: &[(String, String)]) -> Result<RawResponse, TransportError>;
}

/// `reqwest`-backed [`Transport`].
pub struct HttpTransport {
    http: reqwest::Client,
    endpoint_url: String,
}

impl HttpTransport {
    /// Build a client for the configured server. Both timeouts always apply.
    pub fn new(config: &ServerConfig) -> Result<Self, TransportError> {
        let mut default_headers = reqwest::header::HeaderMap::new();
        default_headers.insert(
            reqwest::header::HeaderName::from_static("x-bsctl-client"),
            reqwest::header::HeaderValue::from_static(env!("CARGO_PKG_VERSION")),
        );
        let http = reqwest::Client::builder()
            .default_headers(default_headers)
            .connect_timeout(Duration::from_millis(config.connect_timeout_ms))
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()?;
        // Strip slashes for consistent URL construction
        let endpoint_url = format!(
            "{}/{}",
            config.url.trim_end_matches('/'),
            config.endpoint.trim_start_matches('/')
        );
        Ok(Self { http, endpoint_url })
    }

    /// Full URL every request is posted to.
    pub fn endpoint_url(&self) -> &str {
        &self.endpoint_url
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn post_form(&self, form: &[(String, String)]) -> Result<RawResponse, TransportError> {
        let action = form
            .iter()
            .find(|(k, _)| k == ACTION_FIELD)
            .map_or("", |(_, v)| v.as_str());
        let resp = self
            .http
            .post(self.endpoint_url.as_str())
            .form(form)
            .send()
            .await?;
        let status = resp.status().as_u16();
        let body = resp.text().await?;
        debug!(
            "Transport: action={action} status={status} body_len={}",
            body.len()
        );
        Ok(RawResponse { status, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(status: u16, body: &str) -> RawResponse {
        RawResponse {
            status,
            body: body.to_string(),
        }
    }

    #[test]
    fn test_parse_json_body() {
        assert_eq!(
            parse_response(&raw(200, r#"{"ses":"abc"}"#)),
            ParsedResponse::Success(json!({"ses": "abc"}))
        );
    }

    #[test]
    fn test_parse_empty_body_is_implicit_success() {
        assert_eq!(parse_response(&raw(200, "")), ParsedResponse::ImplicitSuccess);
        assert_eq!(parse_response(&raw(204, "")), ParsedResponse::ImplicitSuccess);
    }

    #[test]
    fn test_parse_error_status_with_garbage() {
        assert_eq!(
            parse_response(&raw(502, "<html>Bad Gateway</html>")),
            ParsedResponse::Malformed("<html>Bad Gateway</html>".into())
        );
    }

    #[test]
    fn test_parse_error_status_with_json_is_still_json() {
        assert_eq!(
            parse_response(&raw(500, r#"{"error":1}"#)),
            ParsedResponse::Success(json!({"error": 1}))
        );
    }

    #[test]
    fn test_endpoint_url_normalization() {
        let config = ServerConfig {
            url: "http://backup.local:55414/".into(),
            endpoint: "/x".into(),
            ..ServerConfig::default()
        };
        let transport = HttpTransport::new(&config).unwrap();
        assert_eq!(transport.endpoint_url(), "http://backup.local:55414/x");
    }
}
