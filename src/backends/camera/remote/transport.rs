// SPDX-License-Identifier: GPL-3.0-only

//! Request/response transport for the network control API

use crate::backends::camera::types::{BackendError, BackendResult};
use crate::constants::remote::{CONTROL_API_PORT, CONTROL_API_PREFIX};
use reqwest::blocking::{Client, RequestBuilder};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

/// JSON request/response exchange with a network camera
///
/// Paths without a leading `/` are relative to the control API root
/// (`shooting/settings/iso`); paths starting with `/` are absolute on the
/// camera's host, as returned for new files in `addedcontents`.
pub trait RemoteTransport: Send {
    fn get_json(&mut self, path: &str) -> BackendResult<Value>;
    fn put_json(&mut self, path: &str, body: &Value) -> BackendResult<Value>;
    fn post_json(&mut self, path: &str, body: &Value) -> BackendResult<Value>;
    fn get_bytes(&mut self, path: &str) -> BackendResult<Vec<u8>>;
}

/// HTTP transport on a blocking reqwest client
pub struct HttpTransport {
    client: Client,
    host_url: String,
}

impl HttpTransport {
    pub fn new(host: &str, timeout: Duration) -> BackendResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BackendError::Transport(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            host_url: format!("http://{}:{}", host, CONTROL_API_PORT),
        })
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.host_url, path)
        } else {
            format!("{}/{}/{}", self.host_url, CONTROL_API_PREFIX, path)
        }
    }

    fn send(&self, path: &str, request: RequestBuilder) -> BackendResult<reqwest::blocking::Response> {
        let response = request
            .send()
            .map_err(|e| BackendError::Transport(format!("{path}: request failed: {e}")))?;

        let status = response.status();
        debug!(path, status = status.as_u16(), "Control API response");
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(BackendError::Transport(format!(
                "{path}: HTTP {status}: {}",
                body.trim()
            )));
        }
        Ok(response)
    }

    fn send_json(&self, path: &str, request: RequestBuilder) -> BackendResult<Value> {
        let text = self
            .send(path, request)?
            .text()
            .map_err(|e| BackendError::Transport(format!("{path}: failed to read body: {e}")))?;
        parse_body(path, &text)
    }
}

/// Parse a JSON response body; an empty body is `null`
fn parse_body(path: &str, text: &str) -> BackendResult<Value> {
    if text.trim().is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(text)
        .map_err(|e| BackendError::Transport(format!("{path}: invalid JSON: {e}")))
}

impl RemoteTransport for HttpTransport {
    fn get_json(&mut self, path: &str) -> BackendResult<Value> {
        self.send_json(path, self.client.get(self.url(path)))
    }

    fn put_json(&mut self, path: &str, body: &Value) -> BackendResult<Value> {
        self.send_json(path, self.client.put(self.url(path)).json(body))
    }

    fn post_json(&mut self, path: &str, body: &Value) -> BackendResult<Value> {
        self.send_json(path, self.client.post(self.url(path)).json(body))
    }

    fn get_bytes(&mut self, path: &str) -> BackendResult<Vec<u8>> {
        let bytes = self
            .send(path, self.client.get(self.url(path)))?
            .bytes()
            .map_err(|e| BackendError::Transport(format!("{path}: failed to read body: {e}")))?;
        Ok(bytes.to_vec())
    }
}
