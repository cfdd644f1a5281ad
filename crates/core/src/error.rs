use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The category of a plugin failure.
///
/// Kinds are deliberately kept apart: each one drives a different remediation
/// hint in the UI, so a failure must never be reported under a broader kind
/// than the one that actually occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// A binding referenced by the configuration has no computed value.
    MissingBindingValue,
    /// The plugin does not support the requested command or request type.
    UnsupportedOperation,
    /// The action or datasource configuration is malformed for this plugin.
    InvalidConfiguration,
    /// The credential is missing or the remote rejected it (HTTP 401).
    AuthenticationError,
    /// The remote rejected the request (HTTP 4xx other than 401).
    DatasourceError,
    /// The response body could not be parsed as the declared content type.
    ParseError,
    /// Transport failure or any other unexpected error.
    PluginError,
    /// A discovery response did not have the expected shape.
    StructureError,
    /// The call did not complete before the configured deadline.
    Timeout,
}

impl ErrorKind {
    /// Stable code used as the synthetic status code when no HTTP status
    /// exists.
    pub fn code(self) -> &'static str {
        match self {
            Self::MissingBindingValue => "PE-BND-4000",
            Self::UnsupportedOperation => "PE-OPR-4001",
            Self::InvalidConfiguration => "PE-CFG-4002",
            Self::AuthenticationError => "PE-AUT-4010",
            Self::DatasourceError => "PE-DSE-4004",
            Self::ParseError => "PE-JSN-4005",
            Self::PluginError => "PE-PLG-5000",
            Self::StructureError => "PE-STR-5002",
            Self::Timeout => "PE-TMO-5040",
        }
    }

    /// Short human-readable title shown above the error message.
    pub fn title(self) -> &'static str {
        match self {
            Self::MissingBindingValue => "Missing binding value",
            Self::UnsupportedOperation => "Unsupported operation",
            Self::InvalidConfiguration => "Invalid configuration",
            Self::AuthenticationError => "Datasource authentication error",
            Self::DatasourceError => "Datasource request error",
            Self::ParseError => "Response parse error",
            Self::PluginError => "Query execution error",
            Self::StructureError => "Unexpected response structure",
            Self::Timeout => "Request timed out",
        }
    }

    /// Returns `true` for kinds that are detected before any network I/O.
    pub fn is_pre_flight(self) -> bool {
        matches!(
            self,
            Self::MissingBindingValue | Self::UnsupportedOperation | Self::InvalidConfiguration
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.title())
    }
}

/// A typed plugin failure.
///
/// Every failure surfaced by the framework is a `PluginError`; anything else
/// raised along the way is wrapped into the [`ErrorKind::PluginError`] kind
/// with its original message preserved.
#[derive(Debug, Clone, Error)]
#[error("{kind}: {message}")]
pub struct PluginError {
    kind: ErrorKind,
    message: String,
    detail: Option<serde_json::Value>,
}

impl PluginError {
    /// Create an error of the given kind.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            detail: None,
        }
    }

    /// Attach structured detail (for example the parsed remote body).
    #[must_use]
    pub fn with_detail(mut self, detail: serde_json::Value) -> Self {
        self.detail = Some(detail);
        self
    }

    pub fn missing_binding(expression: &str) -> Self {
        Self::new(
            ErrorKind::MissingBindingValue,
            format!("no value was supplied for binding `{expression}`"),
        )
    }

    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::UnsupportedOperation, message)
    }

    pub fn invalid_configuration(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidConfiguration, message)
    }

    pub fn authentication(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::AuthenticationError, message)
    }

    pub fn datasource(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::DatasourceError, message)
    }

    /// A parse failure naming the field that could not be parsed.
    pub fn parse(field: &str, reason: impl fmt::Display) -> Self {
        Self::new(
            ErrorKind::ParseError,
            format!("failed to parse `{field}`: {reason}"),
        )
        .with_detail(serde_json::json!({ "field": field }))
    }

    pub fn plugin(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::PluginError, message)
    }

    pub fn structure(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::StructureError, message)
    }

    pub fn timeout(after: Duration) -> Self {
        Self::new(
            ErrorKind::Timeout,
            format!("request did not complete within {}ms", after.as_millis()),
        )
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn detail(&self) -> Option<&serde_json::Value> {
        self.detail.as_ref()
    }
}

/// Serializable projection of a [`PluginError`] carried inside a failed
/// execution result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorInfo {
    pub kind: ErrorKind,
    pub code: String,
    pub title: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<serde_json::Value>,
}

impl From<&PluginError> for ErrorInfo {
    fn from(err: &PluginError) -> Self {
        Self {
            kind: err.kind,
            code: err.kind.code().to_owned(),
            title: err.kind.title().to_owned(),
            message: err.message.clone(),
            detail: err.detail.clone(),
        }
    }
}

impl From<PluginError> for ErrorInfo {
    fn from(err: PluginError) -> Self {
        Self {
            kind: err.kind,
            code: err.kind.code().to_owned(),
            title: err.kind.title().to_owned(),
            message: err.message,
            detail: err.detail,
        }
    }
}
