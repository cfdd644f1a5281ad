use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::action::{HttpMethod, Property};
use crate::binding::InsertedBinding;
use crate::datasource::{ApiKeyLocation, Authentication};

/// Replacement text for redacted values.
pub const REDACTED: &str = "****";

const DEFAULT_SENSITIVE_HEADERS: [&str; 5] = [
    "authorization",
    "proxy-authorization",
    "cookie",
    "set-cookie",
    "x-api-key",
];

/// Decides which header and query values are hidden in the audit snapshot.
///
/// Redaction only ever applies to [`ActionExecutionRequest`]; the outbound
/// request is sent exactly as built.
#[derive(Debug, Clone)]
pub struct RedactionPolicy {
    headers: BTreeSet<String>,
    query_parameters: BTreeSet<String>,
}

impl Default for RedactionPolicy {
    fn default() -> Self {
        Self {
            headers: DEFAULT_SENSITIVE_HEADERS
                .iter()
                .map(|h| (*h).to_owned())
                .collect(),
            query_parameters: BTreeSet::new(),
        }
    }
}

impl RedactionPolicy {
    /// Default policy extended with wherever the datasource's API key lives.
    pub fn for_authentication(authentication: Option<&Authentication>) -> Self {
        let policy = Self::default();
        match authentication {
            Some(Authentication::ApiKey { key, add_to, .. }) => match add_to {
                ApiKeyLocation::Header => policy.with_header(key),
                ApiKeyLocation::QueryParams => policy.with_query_parameter(key),
            },
            _ => policy,
        }
    }

    #[must_use]
    pub fn with_header(mut self, name: &str) -> Self {
        self.headers.insert(name.trim().to_ascii_lowercase());
        self
    }

    #[must_use]
    pub fn with_query_parameter(mut self, name: &str) -> Self {
        self.query_parameters.insert(name.trim().to_ascii_lowercase());
        self
    }

    pub fn is_sensitive_header(&self, name: &str) -> bool {
        self.headers.contains(&name.trim().to_ascii_lowercase())
    }

    pub fn is_sensitive_query_parameter(&self, name: &str) -> bool {
        self.query_parameters
            .contains(&name.trim().to_ascii_lowercase())
    }

    /// Replace the values of sensitive query parameters inside a URL.
    pub fn redact_url(&self, url: &str) -> String {
        if self.query_parameters.is_empty() {
            return url.to_owned();
        }
        let Some((base, rest)) = url.split_once('?') else {
            return url.to_owned();
        };
        let (query, fragment) = match rest.split_once('#') {
            Some((q, f)) => (q, Some(f)),
            None => (rest, None),
        };

        let redacted: Vec<String> = query
            .split('&')
            .map(|pair| match pair.split_once('=') {
                Some((name, _)) if self.is_sensitive_query_parameter(name) => {
                    format!("{name}={REDACTED}")
                }
                _ => pair.to_owned(),
            })
            .collect();

        let mut out = format!("{base}?{}", redacted.join("&"));
        if let Some(fragment) = fragment {
            out.push('#');
            out.push_str(fragment);
        }
        out
    }
}

/// Immutable audit snapshot of what one attempt actually sent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionExecutionRequest {
    pub url: String,
    pub http_method: HttpMethod,
    pub headers: Vec<Property>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<serde_json::Value>,
    /// Binding values substituted into the configuration for this attempt.
    #[serde(default)]
    pub execution_parameters: Vec<InsertedBinding>,
}

impl ActionExecutionRequest {
    /// Capture a snapshot, redacting sensitive values per `policy`.
    pub fn capture(
        policy: &RedactionPolicy,
        http_method: HttpMethod,
        url: &str,
        headers: &[Property],
        body: Option<serde_json::Value>,
        execution_parameters: &[InsertedBinding],
    ) -> Self {
        let headers = headers
            .iter()
            .map(|h| {
                if policy.is_sensitive_header(&h.key) {
                    Property::new(h.key.clone(), REDACTED)
                } else {
                    h.clone()
                }
            })
            .collect();

        Self {
            url: policy.redact_url(url),
            http_method,
            headers,
            body,
            execution_parameters: execution_parameters.to_vec(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_redacts_authorization() {
        let policy = RedactionPolicy::default();
        let request = ActionExecutionRequest::capture(
            &policy,
            HttpMethod::Post,
            "https://api.example.com/v1/chat",
            &[
                Property::new("Authorization", "Bearer sk-secret"),
                Property::new("Content-Type", "application/json"),
            ],
            None,
            &[],
        );
        assert_eq!(request.headers[0].value, REDACTED);
        assert_eq!(request.headers[1].value, "application/json");
        assert!(!serde_json::to_string(&request).unwrap().contains("sk-secret"));
    }

    #[test]
    fn api_key_header_is_redacted() {
        let auth = Authentication::api_key("X-Custom-Key", "abc", ApiKeyLocation::Header);
        let policy = RedactionPolicy::for_authentication(Some(&auth));
        assert!(policy.is_sensitive_header("x-custom-key"));
        assert!(!policy.is_sensitive_header("x-request-id"));
    }

    #[test]
    fn api_key_query_parameter_is_redacted_in_url() {
        let auth = Authentication::api_key("api_key", "abc", ApiKeyLocation::QueryParams);
        let policy = RedactionPolicy::for_authentication(Some(&auth));
        let url = policy.redact_url("https://x.test/items?page=2&api_key=abc#frag");
        assert_eq!(url, "https://x.test/items?page=2&api_key=****#frag");
    }

    #[test]
    fn url_without_query_is_unchanged() {
        let policy = RedactionPolicy::default().with_query_parameter("token");
        assert_eq!(policy.redact_url("https://x.test/a"), "https://x.test/a");
    }
}
