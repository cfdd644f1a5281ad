use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::datasource::Authentication;

/// A request to discover remote metadata (e.g. selectable models).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TriggerRequest {
    /// Plugin-defined discovery type, e.g. `CHAT_MODELS`.
    pub request_type: String,
    pub parameters: serde_json::Map<String, serde_json::Value>,
}

impl TriggerRequest {
    pub fn new(request_type: impl Into<String>) -> Self {
        Self {
            request_type: request_type.into(),
            parameters: serde_json::Map::new(),
        }
    }
}

/// Discovered entries, each a flat key/value map (typically `label`/`value`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TriggerResult {
    pub trigger: Vec<BTreeMap<String, String>>,
    #[serde(skip)]
    refreshed_authentication: Option<Authentication>,
}

impl TriggerResult {
    pub fn new(trigger: Vec<BTreeMap<String, String>>) -> Self {
        Self {
            trigger,
            refreshed_authentication: None,
        }
    }

    /// Attach OAuth2 state refreshed while connecting for this discovery.
    #[must_use]
    pub fn with_refreshed_authentication(mut self, authentication: Option<Authentication>) -> Self {
        self.refreshed_authentication = authentication;
        self
    }

    pub fn refreshed_authentication(&self) -> Option<&Authentication> {
        self.refreshed_authentication.as_ref()
    }

    /// Hand the refreshed credential to the caller for persistence.
    pub fn take_refreshed_authentication(&mut self) -> Option<Authentication> {
        self.refreshed_authentication.take()
    }

    pub fn len(&self) -> usize {
        self.trigger.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trigger.is_empty()
    }
}

/// Outcome of validating or testing a datasource. No invalids means success.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasourceTestResult {
    pub invalids: BTreeSet<String>,
}

impl DatasourceTestResult {
    pub fn success() -> Self {
        Self::default()
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            invalids: BTreeSet::from([message.into()]),
        }
    }

    pub fn from_invalids(invalids: BTreeSet<String>) -> Self {
        Self { invalids }
    }

    pub fn is_success(&self) -> bool {
        self.invalids.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_success_and_failure() {
        assert!(DatasourceTestResult::success().is_success());
        let failed = DatasourceTestResult::failure("bearer token is missing");
        assert!(!failed.is_success());
        assert!(failed.invalids.contains("bearer token is missing"));
    }

    #[test]
    fn trigger_request_deserializes() {
        let request: TriggerRequest =
            serde_json::from_str(r#"{"requestType": "CHAT_MODELS"}"#).unwrap();
        assert_eq!(request.request_type, "CHAT_MODELS");
        assert!(request.parameters.is_empty());
    }

    #[test]
    fn trigger_result_serializes() {
        let result = TriggerResult::new(vec![BTreeMap::from([
            ("label".to_owned(), "gpt-4o".to_owned()),
            ("value".to_owned(), "gpt-4o".to_owned()),
        ])]);
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["trigger"][0]["value"], "gpt-4o");
        assert_eq!(result.len(), 1);
    }

    #[test]
    fn refreshed_credential_is_kept_out_of_the_payload() {
        let mut result = TriggerResult::new(Vec::new())
            .with_refreshed_authentication(Some(Authentication::bearer("fresh-token")));
        let json = serde_json::to_string(&result).unwrap();
        assert!(!json.contains("fresh-token"));
        assert!(result.take_refreshed_authentication().is_some());
        assert!(result.refreshed_authentication().is_none());
    }
}
