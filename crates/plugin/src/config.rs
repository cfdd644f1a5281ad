use std::time::Duration;

use serde::Deserialize;

/// Process-wide settings shared by every plugin execution.
///
/// # Examples
///
/// ```
/// use conduit_plugin::SharedConfig;
///
/// let config = SharedConfig::default();
/// assert_eq!(config.default_timeout_ms, 10_000);
/// assert_eq!(config.max_concurrent_executions, 64);
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct SharedConfig {
    /// Timeout applied when an action does not configure a positive one.
    #[serde(default = "default_timeout_ms")]
    pub default_timeout_ms: u64,
    /// Largest response body read from a datasource, in bytes.
    #[serde(default = "default_max_response_size")]
    pub max_response_size_bytes: usize,
    /// Maximum number of executions in flight at once.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_executions: usize,
    /// Whether redirects are followed by the shared HTTP client.
    #[serde(default = "default_follow_redirects")]
    pub follow_redirects: bool,
    /// OAuth2 tokens expiring within this many seconds are refreshed early.
    #[serde(default = "default_token_expiry_skew")]
    pub token_expiry_skew_seconds: i64,
}

fn default_timeout_ms() -> u64 {
    10_000
}

fn default_max_response_size() -> usize {
    5 * 1024 * 1024
}

fn default_max_concurrent() -> usize {
    64
}

fn default_follow_redirects() -> bool {
    true
}

fn default_token_expiry_skew() -> i64 {
    60
}

impl Default for SharedConfig {
    fn default() -> Self {
        Self {
            default_timeout_ms: default_timeout_ms(),
            max_response_size_bytes: default_max_response_size(),
            max_concurrent_executions: default_max_concurrent(),
            follow_redirects: default_follow_redirects(),
            token_expiry_skew_seconds: default_token_expiry_skew(),
        }
    }
}

impl SharedConfig {
    /// Parse settings from TOML; absent keys take their defaults.
    pub fn from_toml(contents: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }

    pub fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.default_timeout_ms)
    }

    pub fn token_expiry_skew(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.token_expiry_skew_seconds)
    }

    #[must_use]
    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    #[must_use]
    pub fn with_max_response_size(mut self, bytes: usize) -> Self {
        self.max_response_size_bytes = bytes;
        self
    }

    #[must_use]
    pub fn with_max_concurrent_executions(mut self, max: usize) -> Self {
        self.max_concurrent_executions = max;
        self
    }

    #[must_use]
    pub fn with_no_redirects(mut self) -> Self {
        self.follow_redirects = false;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_from_empty_toml() {
        let config = SharedConfig::from_toml("").unwrap();
        assert_eq!(config.default_timeout(), Duration::from_secs(10));
        assert_eq!(config.max_response_size_bytes, 5 * 1024 * 1024);
        assert_eq!(config.max_concurrent_executions, 64);
        assert!(config.follow_redirects);
        assert_eq!(config.token_expiry_skew(), chrono::Duration::seconds(60));
    }

    #[test]
    fn custom_toml() {
        let toml = r"
            default_timeout_ms = 2500
            max_response_size_bytes = 1024
            max_concurrent_executions = 4
            follow_redirects = false
        ";
        let config = SharedConfig::from_toml(toml).unwrap();
        assert_eq!(config.default_timeout(), Duration::from_millis(2_500));
        assert_eq!(config.max_response_size_bytes, 1_024);
        assert_eq!(config.max_concurrent_executions, 4);
        assert!(!config.follow_redirects);
        assert_eq!(config.token_expiry_skew_seconds, 60);
    }

    #[test]
    fn builder_methods() {
        let config = SharedConfig::default()
            .with_default_timeout(Duration::from_millis(300))
            .with_max_response_size(10)
            .with_max_concurrent_executions(2)
            .with_no_redirects();
        assert_eq!(config.default_timeout_ms, 300);
        assert_eq!(config.max_response_size_bytes, 10);
        assert_eq!(config.max_concurrent_executions, 2);
        assert!(!config.follow_redirects);
    }

    #[test]
    fn invalid_toml_is_rejected() {
        assert!(SharedConfig::from_toml("default_timeout_ms = \"soon\"").is_err());
    }
}
