use std::collections::BTreeSet;
use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize};

/// Lower bound of the per-action timeout, in milliseconds.
pub const MIN_TIMEOUT_MS: i64 = 0;

/// Upper bound of the per-action timeout, in milliseconds.
pub const MAX_TIMEOUT_MS: i64 = 60_000;

/// HTTP method of an action.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    #[default]
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
    Options,
}

impl HttpMethod {
    /// Returns the method name as an uppercase string.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
            Self::Head => "HEAD",
            Self::Options => "OPTIONS",
        }
    }

    /// Whether a request body is sent for this method.
    pub fn allows_body(self) -> bool {
        !matches!(self, Self::Get | Self::Head)
    }
}

/// An ordered key/value entry. Lists of properties keep insertion order and
/// may contain duplicate keys.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Property {
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub value: String,
}

impl Property {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    /// A property is blank when its key is empty or whitespace.
    pub fn is_blank(&self) -> bool {
        self.key.trim().is_empty()
    }
}

/// How a listable resource is paginated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaginationType {
    #[default]
    None,
    PageNo,
    Url,
    Cursor,
}

/// Declarative description of one call to a datasource.
///
/// Any string-valued field may contain `{{ ... }}` placeholders that are
/// substituted at execution time. A field without placeholders is a constant
/// reused on every execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ActionConfiguration {
    pub http_method: HttpMethod,
    pub path: Option<String>,
    pub headers: Vec<Property>,
    pub auto_generated_headers: Vec<Property>,
    pub query_parameters: Vec<Property>,
    /// When `false`, query parameter values are appended verbatim.
    pub encode_params_toggle: bool,
    pub body: Option<String>,
    pub body_form_data: Vec<Property>,
    pub plugin_specified_templates: Vec<Property>,
    pub form_data: serde_json::Map<String, serde_json::Value>,
    #[serde(deserialize_with = "deserialize_timeout")]
    pub timeout_in_millisecond: Option<i64>,
    pub pagination_type: PaginationType,
    pub next: Option<String>,
    pub prev: Option<String>,
    /// Paths inside this configuration that are expected to bind to this
    /// action's own output. Consumed by the dependency graph builder; never
    /// persisted.
    #[serde(skip)]
    pub self_referencing_data_paths: BTreeSet<String>,
}

impl Default for ActionConfiguration {
    fn default() -> Self {
        Self {
            http_method: HttpMethod::Get,
            path: None,
            headers: Vec::new(),
            auto_generated_headers: Vec::new(),
            query_parameters: Vec::new(),
            encode_params_toggle: true,
            body: None,
            body_form_data: Vec::new(),
            plugin_specified_templates: Vec::new(),
            form_data: serde_json::Map::new(),
            timeout_in_millisecond: None,
            pagination_type: PaginationType::None,
            next: None,
            prev: None,
            self_referencing_data_paths: BTreeSet::new(),
        }
    }
}

impl ActionConfiguration {
    /// Create an empty configuration using the given method and path.
    pub fn new(http_method: HttpMethod, path: impl Into<String>) -> Self {
        Self {
            http_method,
            path: Some(path.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    #[must_use]
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push(Property::new(key, value));
        self
    }

    #[must_use]
    pub fn with_query_parameter(
        mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.query_parameters.push(Property::new(key, value));
        self
    }

    #[must_use]
    pub fn with_form_data(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.form_data.insert(key.into(), value);
        self
    }

    #[must_use]
    pub fn with_timeout_ms(mut self, timeout: i64) -> Self {
        self.timeout_in_millisecond = Some(timeout);
        self
    }

    /// Set the timeout from user-entered text. Text that is not an integer
    /// resolves to [`MAX_TIMEOUT_MS`].
    pub fn set_timeout_from_str(&mut self, raw: &str) {
        self.timeout_in_millisecond = Some(parse_timeout(raw));
    }

    /// Timeout to apply to this action's network call.
    ///
    /// A missing or non-positive value resolves to `default`; anything else is
    /// clamped into `[MIN_TIMEOUT_MS, MAX_TIMEOUT_MS]`.
    pub fn effective_timeout(&self, default: Duration) -> Duration {
        match self.timeout_in_millisecond {
            Some(ms) if ms > 0 => {
                let clamped = ms.clamp(MIN_TIMEOUT_MS, MAX_TIMEOUT_MS);
                Duration::from_millis(u64::try_from(clamped).unwrap_or_default())
            }
            _ => default,
        }
    }

    /// Value of the last `Content-Type` header, compared case-insensitively.
    pub fn content_type(&self) -> Option<&str> {
        self.headers
            .iter()
            .rev()
            .find(|h| h.key.trim().eq_ignore_ascii_case("content-type"))
            .map(|h| h.value.trim())
    }

    /// Declare a path that is expected to reference this action's own output.
    pub fn declare_self_reference(&mut self, path: impl Into<String>) {
        self.self_referencing_data_paths.insert(path.into());
    }

    pub fn is_self_referencing(&self, path: &str) -> bool {
        self.self_referencing_data_paths.contains(path)
    }
}

fn parse_timeout(raw: &str) -> i64 {
    raw.trim().parse::<i64>().unwrap_or(MAX_TIMEOUT_MS)
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TimeoutRepr {
    Number(i64),
    Text(String),
}

fn deserialize_timeout<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<TimeoutRepr>::deserialize(deserializer)?;
    Ok(raw.map(|repr| match repr {
        TimeoutRepr::Number(ms) => ms,
        TimeoutRepr::Text(text) => parse_timeout(&text),
    }))
}
