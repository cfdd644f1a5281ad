use conduit_core::PluginError;
use thiserror::Error;

/// Errors raised while building OpenAI requests.
///
/// All of them are detected before any network I/O and surface as
/// `InvalidConfiguration`.
#[derive(Debug, Error)]
pub enum OpenAiError {
    /// The command section of the form is absent.
    #[error("`{0}` settings are missing")]
    MissingSection(&'static str),

    /// No model was chosen.
    #[error("model is required")]
    MissingModel,

    /// `messages` is not a list of `{role, content}` objects.
    #[error("invalid messages: {0}")]
    InvalidMessages(String),

    /// Embedding input is absent or empty.
    #[error("embedding input is required")]
    MissingInput,

    /// A numeric setting could not be read.
    #[error("`{field}` must be a number, got `{value}`")]
    InvalidNumber { field: &'static str, value: String },
}

impl From<OpenAiError> for PluginError {
    fn from(err: OpenAiError) -> Self {
        PluginError::invalid_configuration(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use conduit_core::ErrorKind;

    use super::*;

    #[test]
    fn converts_to_configuration_error() {
        let err: PluginError = OpenAiError::MissingModel.into();
        assert_eq!(err.kind(), ErrorKind::InvalidConfiguration);
        assert_eq!(err.message(), "model is required");
    }

    #[test]
    fn error_display() {
        assert_eq!(
            OpenAiError::InvalidNumber {
                field: "temperature",
                value: "warm".into()
            }
            .to_string(),
            "`temperature` must be a number, got `warm`"
        );
        assert_eq!(
            OpenAiError::MissingSection("chat").to_string(),
            "`chat` settings are missing"
        );
    }
}
