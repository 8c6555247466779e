//! Scripted fake transport shared by unit tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::transport::{RawResponse, Transport, TransportError, ACTION_FIELD, SESSION_FIELD};

/// Replays queued responses in order and records every request form.
#[derive(Default)]
pub struct ScriptedTransport {
    responses: Mutex<VecDeque<Result<RawResponse, TransportError>>>,
    requests: Mutex<Vec<Vec<(String, String)>>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a JSON (or any text) body with the given status.
    pub fn push(&self, status: u16, body: &str) -> &Self {
        self.responses.lock().unwrap().push_back(Ok(RawResponse {
            status,
            body: body.to_string(),
        }));
        self
    }

    pub fn push_err(&self, err: TransportError) -> &Self {
        self.responses.lock().unwrap().push_back(Err(err));
        self
    }

    /// Queue a successful salt + login exchange yielding session `ses`.
    pub fn push_handshake(&self, ses: &str) -> &Self {
        self.push(
            200,
            &format!(r#"{{"ses":"{ses}","salt":"abc123","rnd":"xyz789"}}"#),
        );
        self.push(200, r#"{"success":true}"#)
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    /// Action names of all requests so far, in order.
    pub fn actions(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|form| field(form, ACTION_FIELD).unwrap_or_default())
            .collect()
    }

    /// Session token attached to request `idx`, if any.
    pub fn session_of(&self, idx: usize) -> Option<String> {
        field(&self.requests.lock().unwrap()[idx], SESSION_FIELD)
    }

    pub fn field_of(&self, idx: usize, name: &str) -> Option<String> {
        field(&self.requests.lock().unwrap()[idx], name)
    }
}

fn field(form: &[(String, String)], name: &str) -> Option<String> {
    form.iter().find(|(k, _)| k == name).map(|(_, v)| v.clone())
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn post_form(&self, form: &[(String, String)]) -> Result<RawResponse, TransportError> {
        self.requests.lock().unwrap().push(form.to_vec());
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(TransportError::Request("no scripted response left".into())))
    }
}
