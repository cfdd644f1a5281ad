//! Discovery of remote metadata for UI selectors.
//!
//! A trigger walks `Idle -> RequestBuilt -> Sent` and ends in exactly one of
//! `Success`, `AuthError` or `StructureError`. A failed walk never yields a
//! partial list.

use std::fmt;

use conduit_core::{PluginError, TriggerResult};
use serde_json::Value;
use tracing::debug;

use crate::classifier::RawResponse;
use crate::command::CommandStrategy;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerState {
    Idle,
    RequestBuilt,
    Sent,
    Success,
    AuthError,
    StructureError,
}

impl TriggerState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::AuthError | Self::StructureError)
    }

    /// Terminal state matching a trigger outcome.
    pub fn from_outcome(outcome: &Result<TriggerResult, PluginError>) -> Self {
        match outcome {
            Ok(_) => Self::Success,
            Err(e) if e.kind() == conduit_core::ErrorKind::AuthenticationError => Self::AuthError,
            Err(_) => Self::StructureError,
        }
    }
}

impl fmt::Display for TriggerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::RequestBuilt => "request_built",
            Self::Sent => "sent",
            Self::Success => "success",
            Self::AuthError => "auth_error",
            Self::StructureError => "structure_error",
        };
        f.write_str(name)
    }
}

/// Turn a discovery response into the list of entries.
///
/// `401`/`403` are authentication failures. Any other non-`2xx` status, a body
/// that is not JSON, or a missing discovery array is a structure error.
/// Incompatible items are dropped first, items without an identifier are
/// skipped, and the rest are ordered by label.
pub fn collect_items(
    command: &dyn CommandStrategy,
    raw: &RawResponse,
) -> Result<TriggerResult, PluginError> {
    if raw.status == 401 || raw.status == 403 {
        return Err(PluginError::authentication(format!(
            "datasource rejected the credentials (status {})",
            raw.status
        )));
    }
    if !raw.is_success() {
        return Err(PluginError::structure(format!(
            "discovery request failed with status {}",
            raw.status
        )));
    }

    let body: Value = serde_json::from_slice(&raw.body)
        .map_err(|e| PluginError::structure(format!("discovery response is not JSON: {e}")))?;

    let field = command.discovery_field();
    let Some(items) = body.get(field).and_then(Value::as_array) else {
        return Err(PluginError::structure(format!(
            "discovery response has no `{field}` array"
        )));
    };

    let mut entries = Vec::with_capacity(items.len());
    for item in items.iter().filter(|item| command.is_compatible(item)) {
        match command.discovery_item(item) {
            Some(entry) => entries.push(entry),
            None => debug!(command = command.name(), "skipping item without identifier"),
        }
    }
    entries.sort_by(|a, b| a.get("label").cmp(&b.get("label")));

    Ok(TriggerResult::new(entries))
}

#[cfg(test)]
mod tests {
    use conduit_core::{
        DatasourceConfiguration, ErrorKind, ExecuteActionDto, ResolvedActionConfiguration,
    };

    use super::*;
    use crate::command::HttpRequestSpec;

    /// Keeps only ids starting with `keep-`.
    #[derive(Debug)]
    struct KeepPrefixed;

    impl CommandStrategy for KeepPrefixed {
        fn name(&self) -> &'static str {
            "keep"
        }

        fn build_execute_request(
            &self,
            _action: &ResolvedActionConfiguration,
            _datasource: &DatasourceConfiguration,
            _dto: &ExecuteActionDto,
        ) -> Result<HttpRequestSpec, PluginError> {
            Err(PluginError::unsupported("discovery only"))
        }

        fn is_compatible(&self, item: &Value) -> bool {
            item.get("id")
                .and_then(Value::as_str)
                .is_none_or(|id| id.starts_with("keep-"))
        }
    }

    fn response(status: u16, body: &str) -> RawResponse {
        RawResponse::new(status, body)
    }

    #[test]
    fn filters_skips_and_sorts() {
        let raw = response(
            200,
            r#"{"data":[{"id":"keep-b"},{"name":"no id"},{"id":"drop-a"},{"id":"keep-a"}]}"#,
        );
        let result = collect_items(&KeepPrefixed, &raw).unwrap();
        let labels: Vec<&str> = result.trigger.iter().map(|e| e["label"].as_str()).collect();
        assert_eq!(labels, vec!["keep-a", "keep-b"]);
    }

    #[test]
    fn item_without_id_does_not_stall() {
        let raw = response(200, r#"{"data":[{"object":"model"},{"object":"model"}]}"#);
        let result = collect_items(&KeepPrefixed, &raw).unwrap();
        assert!(result.is_empty());
    }

    #[test]
    fn missing_data_field_is_structure_error() {
        let outcome = collect_items(&KeepPrefixed, &response(200, r#"{"models":[]}"#));
        let err = outcome.as_ref().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::StructureError);
        assert_eq!(TriggerState::from_outcome(&outcome), TriggerState::StructureError);

        let err = collect_items(&KeepPrefixed, &response(200, r#"{"data":{"id":"x"}}"#))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::StructureError);
    }

    #[test]
    fn non_success_is_structure_error() {
        let err = collect_items(
            &KeepPrefixed,
            &response(500, r#"{"data":[{"id":"keep-a"}]}"#),
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::StructureError);

        let err = collect_items(&KeepPrefixed, &response(200, "not json")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::StructureError);
    }

    #[test]
    fn rejected_credentials_are_auth_error() {
        for status in [401, 403] {
            let outcome = collect_items(&KeepPrefixed, &response(status, "{}"));
            assert_eq!(outcome.as_ref().unwrap_err().kind(), ErrorKind::AuthenticationError);
            assert_eq!(TriggerState::from_outcome(&outcome), TriggerState::AuthError);
        }
    }

    #[test]
    fn terminal_states() {
        assert!(!TriggerState::Idle.is_terminal());
        assert!(!TriggerState::Sent.is_terminal());
        assert!(TriggerState::Success.is_terminal());
        assert_eq!(TriggerState::RequestBuilt.to_string(), "request_built");
    }
}
