use std::time::Duration;

use conduit_core::PluginError;
use thiserror::Error;

/// Errors raised while sending a request and reading its response.
///
/// These are internal errors that get converted into [`PluginError`] before
/// they reach a result.
#[derive(Debug, Error)]
pub enum TransportError {
    /// An HTTP-level transport error occurred.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The call did not complete before its deadline.
    #[error("timeout after {0:?}")]
    Timeout(Duration),

    /// The response body exceeded the configured limit.
    #[error("response body exceeds {limit} bytes")]
    ResponseTooLarge { limit: usize },
}

impl TransportError {
    pub fn is_timeout(&self) -> bool {
        match self {
            Self::Timeout(_) => true,
            Self::Http(e) => e.is_timeout(),
            Self::ResponseTooLarge { .. } => false,
        }
    }
}

impl From<TransportError> for PluginError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Timeout(after) => PluginError::timeout(after),
            TransportError::Http(e) if e.is_timeout() => {
                PluginError::new(conduit_core::ErrorKind::Timeout, e.to_string())
            }
            TransportError::Http(e) => PluginError::plugin(e.to_string()),
            err @ TransportError::ResponseTooLarge { .. } => PluginError::plugin(err.to_string()),
        }
    }
}
