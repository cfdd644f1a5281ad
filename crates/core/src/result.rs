use std::collections::BTreeMap;
use std::fmt;

use serde::{Serialize, Serializer};

use crate::datasource::Authentication;
use crate::error::{ErrorInfo, ErrorKind, PluginError};
use crate::request::ActionExecutionRequest;

/// Status attached to a result: the transport status when a response exists,
/// otherwise the synthetic code of the error kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCode {
    Http(u16),
    Internal(&'static str),
}

impl StatusCode {
    pub fn http(&self) -> Option<u16> {
        match self {
            Self::Http(code) => Some(*code),
            Self::Internal(_) => None,
        }
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Http(code) => write!(f, "{code}"),
            Self::Internal(code) => f.write_str(code),
        }
    }
}

impl Serialize for StatusCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// The single normalized outcome of an action execution.
///
/// Built only through [`success`](Self::success) or
/// [`failure`](Self::failure): a successful result always carries a body and
/// never an error, a failed one always carries an error.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionExecutionResult {
    is_execution_success: bool,
    status_code: StatusCode,
    #[serde(skip_serializing_if = "Option::is_none")]
    body: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_info: Option<ErrorInfo>,
    headers: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    request: Option<ActionExecutionRequest>,
    #[serde(skip)]
    refreshed_authentication: Option<Authentication>,
}

impl ActionExecutionResult {
    /// A successful execution. `body` may be `Null` for an empty response.
    pub fn success(
        status: u16,
        body: serde_json::Value,
        headers: BTreeMap<String, String>,
        request: Option<ActionExecutionRequest>,
    ) -> Self {
        Self {
            is_execution_success: true,
            status_code: StatusCode::Http(status),
            body: Some(body),
            error_info: None,
            headers,
            request,
            refreshed_authentication: None,
        }
    }

    /// A failed execution with an explicit status.
    pub fn failure(
        status: StatusCode,
        error: PluginError,
        headers: BTreeMap<String, String>,
        request: Option<ActionExecutionRequest>,
    ) -> Self {
        Self {
            is_execution_success: false,
            status_code: status,
            body: None,
            error_info: Some(error.into()),
            headers,
            request,
            refreshed_authentication: None,
        }
    }

    /// A failure with no transport response; the status is the kind's code.
    pub fn from_error(error: PluginError, request: Option<ActionExecutionRequest>) -> Self {
        let status = StatusCode::Internal(error.kind().code());
        Self::failure(status, error, BTreeMap::new(), request)
    }

    /// Attach OAuth2 state refreshed during this execution so the caller can
    /// persist it.
    #[must_use]
    pub fn with_refreshed_authentication(mut self, authentication: Option<Authentication>) -> Self {
        self.refreshed_authentication = authentication;
        self
    }

    pub fn is_execution_success(&self) -> bool {
        self.is_execution_success
    }

    pub fn status_code(&self) -> StatusCode {
        self.status_code
    }

    pub fn body(&self) -> Option<&serde_json::Value> {
        self.body.as_ref()
    }

    pub fn error_info(&self) -> Option<&ErrorInfo> {
        self.error_info.as_ref()
    }

    /// Kind of the failure, if the execution failed.
    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error_info.as_ref().map(|e| e.kind)
    }

    pub fn headers(&self) -> &BTreeMap<String, String> {
        &self.headers
    }

    pub fn request(&self) -> Option<&ActionExecutionRequest> {
        self.request.as_ref()
    }

    pub fn refreshed_authentication(&self) -> Option<&Authentication> {
        self.refreshed_authentication.as_ref()
    }

    pub fn take_refreshed_authentication(&mut self) -> Option<Authentication> {
        self.refreshed_authentication.take()
    }
}
