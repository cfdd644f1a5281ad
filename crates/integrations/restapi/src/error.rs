use conduit_core::{PaginationField, PluginError};
use thiserror::Error;

/// Errors specific to the REST API plugin.
///
/// These are internal errors that get converted into [`PluginError`] before a
/// request is sent.
#[derive(Debug, Error)]
pub enum RestApiError {
    /// The pagination field was requested but no URL is configured for it.
    #[error("no {0:?} page URL is configured")]
    MissingPageUrl(PaginationField),

    /// The configured body cannot be sent with the chosen content type.
    #[error("invalid body: {0}")]
    InvalidBody(String),
}

impl From<RestApiError> for PluginError {
    fn from(err: RestApiError) -> Self {
        PluginError::invalid_configuration(err.to_string())
    }
}
