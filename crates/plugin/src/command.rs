//! The command-strategy contract: turning a resolved action into a
//! transport-ready request.

use std::collections::BTreeMap;
use std::fmt;

use conduit_core::{
    DatasourceConfiguration, ExecuteActionDto, HttpMethod, PluginError, Property,
    ResolvedActionConfiguration, TriggerRequest,
};
use reqwest::Url;

/// Body of an outbound request.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    Empty,
    Json(serde_json::Value),
    Text(String),
    FormUrlEncoded(Vec<Property>),
    Multipart(Vec<Property>),
}

impl RequestBody {
    /// Representation recorded in the audit snapshot.
    pub fn audit_value(&self) -> Option<serde_json::Value> {
        match self {
            Self::Empty => None,
            Self::Json(value) => Some(value.clone()),
            Self::Text(text) => Some(serde_json::Value::String(text.clone())),
            Self::FormUrlEncoded(fields) | Self::Multipart(fields) => {
                Some(serde_json::Value::Object(
                    fields
                        .iter()
                        .map(|p| (p.key.clone(), serde_json::Value::String(p.value.clone())))
                        .collect(),
                ))
            }
        }
    }
}

/// Everything needed to issue one HTTP call.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequestSpec {
    pub method: HttpMethod,
    pub url: Url,
    pub headers: Vec<Property>,
    pub body: RequestBody,
}

impl HttpRequestSpec {
    pub fn new(method: HttpMethod, url: Url) -> Self {
        Self {
            method,
            url,
            headers: Vec::new(),
            body: RequestBody::Empty,
        }
    }

    #[must_use]
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push(Property::new(key, value));
        self
    }

    #[must_use]
    pub fn with_body(mut self, body: RequestBody) -> Self {
        self.body = body;
        self
    }
}

/// How a response body is interpreted by the classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyFormat {
    /// The body must be JSON.
    Json,
    /// JSON for `application/json` and `+json` content types, UTF-8 text
    /// otherwise.
    ContentTypeSniffed,
}

/// One request-building strategy of a plugin family.
///
/// Implementations are pure: the same inputs always build the same request.
pub trait CommandStrategy: Send + Sync + fmt::Debug {
    /// Stable command name used in logs.
    fn name(&self) -> &'static str;

    /// Build the request for a user action.
    fn build_execute_request(
        &self,
        action: &ResolvedActionConfiguration,
        datasource: &DatasourceConfiguration,
        dto: &ExecuteActionDto,
    ) -> Result<HttpRequestSpec, PluginError>;

    /// Build the request for a discovery call.
    fn build_trigger_request(
        &self,
        _datasource: &DatasourceConfiguration,
        request: &TriggerRequest,
    ) -> Result<HttpRequestSpec, PluginError> {
        Err(PluginError::unsupported(format!(
            "command `{}` does not support trigger request `{}`",
            self.name(),
            request.request_type
        )))
    }

    fn response_format(&self) -> BodyFormat {
        BodyFormat::Json
    }

    /// Field of a discovery response holding the item array.
    fn discovery_field(&self) -> &'static str {
        "data"
    }

    /// Whether a discovered item is usable for this command.
    fn is_compatible(&self, _item: &serde_json::Value) -> bool {
        true
    }

    /// Map a discovered item to its entry. Items without an identifier map to
    /// `None` and are skipped.
    fn discovery_item(&self, item: &serde_json::Value) -> Option<BTreeMap<String, String>> {
        let id = item.get("id")?.as_str()?;
        Some(BTreeMap::from([
            ("label".to_owned(), id.to_owned()),
            ("value".to_owned(), id.to_owned()),
        ]))
    }
}

/// Join a base URL and a path. A path that is itself an absolute http(s) URL
/// wins over the base.
pub fn join_url(base: Option<&str>, path: Option<&str>) -> Result<Url, PluginError> {
    let path = path.map(str::trim).unwrap_or_default();
    if path.starts_with("http://") || path.starts_with("https://") {
        return parse_url(path);
    }

    let base = base
        .map(str::trim)
        .filter(|b| !b.is_empty())
        .ok_or_else(|| PluginError::invalid_configuration("datasource URL is missing"))?;

    if path.is_empty() {
        return parse_url(base);
    }
    let joined = format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    );
    parse_url(&joined)
}

/// Append query parameters, skipping blank keys. With `encode = false` the
/// values are appended as written.
pub fn append_query(url: &mut Url, parameters: &[Property], encode: bool) {
    let parameters: Vec<&Property> = parameters.iter().filter(|p| !p.is_blank()).collect();
    if parameters.is_empty() {
        return;
    }

    if encode {
        let mut pairs = url.query_pairs_mut();
        for p in parameters {
            pairs.append_pair(p.key.trim(), &p.value);
        }
        return;
    }

    let mut query = url.query().map(str::to_owned).unwrap_or_default();
    for p in parameters {
        if !query.is_empty() {
            query.push('&');
        }
        query.push_str(p.key.trim());
        query.push('=');
        query.push_str(&p.value);
    }
    url.set_query(Some(&query));
}

fn parse_url(raw: &str) -> Result<Url, PluginError> {
    let url = Url::parse(raw)
        .map_err(|e| PluginError::invalid_configuration(format!("invalid URL `{raw}`: {e}")))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(PluginError::invalid_configuration(format!(
            "unsupported URL scheme `{other}`"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use conduit_core::ErrorKind;

    use super::*;

    #[test]
    fn joins_base_and_path() {
        let url = join_url(Some("https://api.example.com/"), Some("/v1/chat")).unwrap();
        assert_eq!(url.as_str(), "https://api.example.com/v1/chat");

        let url = join_url(Some("https://api.example.com/base"), Some("items")).unwrap();
        assert_eq!(url.as_str(), "https://api.example.com/base/items");

        let url = join_url(Some("https://api.example.com"), None).unwrap();
        assert_eq!(url.as_str(), "https://api.example.com/");
    }

    #[test]
    fn absolute_path_wins() {
        let url = join_url(Some("https://a.test"), Some("https://b.test/next?page=2")).unwrap();
        assert_eq!(url.as_str(), "https://b.test/next?page=2");
    }

    #[test]
    fn missing_base_is_invalid_configuration() {
        let err = join_url(None, Some("/v1")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidConfiguration);

        let err = join_url(Some("ftp://files.test"), None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidConfiguration);
    }

    #[test]
    fn appends_encoded_query() {
        let mut url = Url::parse("https://x.test/search?fixed=1").unwrap();
        append_query(
            &mut url,
            &[
                Property::new("q", "a b&c"),
                Property::new("  ", "ignored"),
                Property::new("page", "2"),
            ],
            true,
        );
        assert_eq!(url.as_str(), "https://x.test/search?fixed=1&q=a+b%26c&page=2");
    }

    #[test]
    fn appends_raw_query_when_encoding_disabled() {
        let mut url = Url::parse("https://x.test/search").unwrap();
        append_query(&mut url, &[Property::new("filter", "a,b:c")], false);
        assert_eq!(url.query(), Some("filter=a,b:c"));
    }

    #[test]
    fn building_is_deterministic() {
        let build = || {
            let mut url = join_url(Some("https://x.test"), Some("/items")).unwrap();
            append_query(&mut url, &[Property::new("page", "3")], true);
            HttpRequestSpec::new(HttpMethod::Get, url).with_header("Accept", "application/json")
        };
        assert_eq!(build(), build());
    }

    #[test]
    fn audit_value_of_bodies() {
        assert!(RequestBody::Empty.audit_value().is_none());
        assert_eq!(
            RequestBody::Text("hello".into()).audit_value().unwrap(),
            serde_json::json!("hello")
        );
        let form = RequestBody::FormUrlEncoded(vec![Property::new("a", "1")]);
        assert_eq!(form.audit_value().unwrap()["a"], "1");
    }

    #[derive(Debug)]
    struct Minimal;

    impl CommandStrategy for Minimal {
        fn name(&self) -> &'static str {
            "minimal"
        }

        fn build_execute_request(
            &self,
            _action: &ResolvedActionConfiguration,
            _datasource: &DatasourceConfiguration,
            _dto: &ExecuteActionDto,
        ) -> Result<HttpRequestSpec, PluginError> {
            Ok(HttpRequestSpec::new(
                HttpMethod::Get,
                Url::parse("https://x.test").unwrap(),
            ))
        }
    }

    #[test]
    fn default_trigger_is_unsupported() {
        let err = Minimal
            .build_trigger_request(&DatasourceConfiguration::default(), &TriggerRequest::new("X"))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedOperation);
    }

    #[test]
    fn default_discovery_item_uses_id() {
        let item = Minimal.discovery_item(&serde_json::json!({"id": "m-1"})).unwrap();
        assert_eq!(item["label"], "m-1");
        assert!(Minimal.discovery_item(&serde_json::json!({"name": "x"})).is_none());
        assert!(Minimal.is_compatible(&serde_json::json!({})));
        assert_eq!(Minimal.response_format(), BodyFormat::Json);
    }
}
