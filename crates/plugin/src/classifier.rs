//! Maps a raw transport response into an [`ActionExecutionResult`].

use std::collections::BTreeMap;

use conduit_core::{ActionExecutionRequest, ActionExecutionResult, PluginError, StatusCode};
use serde_json::Value;
use tracing::debug;

use crate::command::BodyFormat;

/// A response exactly as it came off the wire.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    /// Lower-cased header names; repeated headers are joined with `, `.
    pub headers: BTreeMap<String, String>,
    pub body: Vec<u8>,
}

impl RawResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers: BTreeMap::new(),
            body: body.into(),
        }
    }

    #[must_use]
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    pub fn content_type(&self) -> Option<&str> {
        self.headers.get("content-type").map(String::as_str)
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    fn body_text(&self) -> Option<Value> {
        if self.body.is_empty() {
            return None;
        }
        Some(Value::String(String::from_utf8_lossy(&self.body).into_owned()))
    }
}

/// Classify a response. The first matching rule wins:
///
/// 1. `401` is an authentication failure carrying the body text verbatim.
/// 2. Any other `4xx` is a datasource error carrying the body text verbatim.
/// 3. A non-empty body that does not parse as `format` is a parse error.
/// 4. Any other non-`2xx` status is a generic plugin error.
/// 5. Everything else succeeds; an empty body becomes `null`.
pub fn classify(
    raw: RawResponse,
    format: BodyFormat,
    request: Option<ActionExecutionRequest>,
) -> ActionExecutionResult {
    let status = raw.status;

    if status == 401 {
        let mut error = PluginError::authentication(format!(
            "datasource rejected the credentials (status {status})"
        ));
        if let Some(text) = raw.body_text() {
            error = error.with_detail(text);
        }
        return failed(status, error, raw.headers, request);
    }

    if (400..500).contains(&status) {
        let mut error =
            PluginError::datasource(format!("datasource rejected the request (status {status})"));
        if let Some(text) = raw.body_text() {
            error = error.with_detail(text);
        }
        return failed(status, error, raw.headers, request);
    }

    let parsed = if raw.body.is_empty() {
        Value::Null
    } else {
        match parse_body(&raw, format) {
            Ok(value) => value,
            Err(error) => return failed(status, error, raw.headers, request),
        }
    };

    if !raw.is_success() {
        let mut error =
            PluginError::plugin(format!("datasource returned unexpected status {status}"));
        if !parsed.is_null() {
            error = error.with_detail(parsed);
        }
        return failed(status, error, raw.headers, request);
    }

    debug!(status, "response classified as success");
    ActionExecutionResult::success(status, parsed, raw.headers, request)
}

fn failed(
    status: u16,
    error: PluginError,
    headers: BTreeMap<String, String>,
    request: Option<ActionExecutionRequest>,
) -> ActionExecutionResult {
    debug!(status, kind = %error.kind(), "response classified as failure");
    ActionExecutionResult::failure(StatusCode::Http(status), error, headers, request)
}

/// Parse a non-empty body according to `format`.
pub fn parse_body(raw: &RawResponse, format: BodyFormat) -> Result<Value, PluginError> {
    match format {
        BodyFormat::Json => parse_json(&raw.body),
        BodyFormat::ContentTypeSniffed => {
            if raw.content_type().is_some_and(is_json_content_type) {
                parse_json(&raw.body)
            } else {
                String::from_utf8(raw.body.clone())
                    .map(Value::String)
                    .map_err(|e| PluginError::parse("body", e))
            }
        }
    }
}

fn parse_json(body: &[u8]) -> Result<Value, PluginError> {
    serde_json::from_slice(body).map_err(|e| PluginError::parse("body", e))
}

fn is_json_content_type(content_type: &str) -> bool {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    essence == "application/json" || essence.ends_with("+json") || essence == "text/json"
}
