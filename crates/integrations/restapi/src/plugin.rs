use std::collections::BTreeSet;

use conduit_core::{
    Authentication, DatasourceConfiguration, ExposeSecret, HttpMethod, PluginError,
    ResolvedActionConfiguration,
};
use conduit_plugin::{CommandStrategy, HttpRequestSpec, PluginExecutor, join_url};
use reqwest::Url;

use crate::command::RestApiCommand;

/// Registry name of the REST API plugin.
pub const PLUGIN_NAME: &str = "restapi-plugin";

/// Connector for arbitrary HTTP APIs.
///
/// Accepts every authentication kind. The datasource test issues a `HEAD` to
/// the base URL and passes unless the server rejects the credentials or fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct RestApiPlugin;

impl RestApiPlugin {
    pub fn new() -> Self {
        Self
    }
}

impl PluginExecutor for RestApiPlugin {
    fn name(&self) -> &str {
        PLUGIN_NAME
    }

    fn validate_datasource(&self, datasource: &DatasourceConfiguration) -> BTreeSet<String> {
        let mut invalids = BTreeSet::new();

        match datasource.url.as_deref().map(str::trim) {
            None | Some("") => {
                invalids.insert("Missing URL.".to_owned());
            }
            Some(url) => match Url::parse(url) {
                Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => {}
                Ok(parsed) => {
                    invalids.insert(format!("Unsupported URL scheme `{}`.", parsed.scheme()));
                }
                Err(e) => {
                    invalids.insert(format!("Invalid URL: {e}."));
                }
            },
        }

        if let Some(auth) = &datasource.authentication {
            invalids.extend(authentication_problems(auth));
        }
        invalids
    }

    fn select_command(
        &self,
        action: &ResolvedActionConfiguration,
    ) -> Result<Box<dyn CommandStrategy>, PluginError> {
        match action.form_data.get("command").and_then(|v| v.as_str()) {
            None => Ok(Box::new(RestApiCommand)),
            Some(other) => Err(PluginError::unsupported(format!(
                "REST API actions have no `{other}` command"
            ))),
        }
    }

    fn test_request(
        &self,
        datasource: &DatasourceConfiguration,
    ) -> Result<Option<HttpRequestSpec>, PluginError> {
        let url = join_url(datasource.url.as_deref(), None)?;
        Ok(Some(HttpRequestSpec::new(HttpMethod::Head, url)))
    }

    fn test_failure(&self, status: u16) -> Option<String> {
        match status {
            401 | 403 => Some(format!("Authentication failed with status {status}.")),
            500.. => Some(format!("Datasource is unavailable (status {status}).")),
            _ => None,
        }
    }
}

/// Field-level problems with a credential. Presence of the secret itself is
/// checked by the connection manager.
fn authentication_problems(authentication: &Authentication) -> Vec<String> {
    let mut problems = Vec::new();
    match authentication {
        Authentication::None | Authentication::BearerToken { .. } => {}
        Authentication::Basic { username, .. } => {
            if username.trim().is_empty() {
                problems.push("Missing username for basic authentication.".to_owned());
            }
        }
        Authentication::ApiKey { key, value, .. } => {
            if key.trim().is_empty() {
                problems.push("Missing API key name.".to_owned());
            }
            if value.expose_secret().trim().is_empty() {
                problems.push("Missing API key value.".to_owned());
            }
        }
        Authentication::OAuth2 {
            access_token_url, ..
        } => match Url::parse(access_token_url.trim()) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => {}
            _ => problems.push("Invalid access token URL.".to_owned()),
        },
    }
    problems
}

#[cfg(test)]
mod tests {
    use conduit_core::{ActionConfiguration, ApiKeyLocation, ErrorKind};
    use serde_json::json;

    use super::*;

    #[test]
    fn plugin_identity() {
        let plugin = RestApiPlugin::new();
        assert_eq!(PluginExecutor::name(&plugin), "restapi-plugin");
        assert!(PluginExecutor::auth_requirement(&plugin).is_empty());
    }

    #[test]
    fn url_is_required_and_must_be_http() {
        let plugin = RestApiPlugin;
        let invalids = plugin.validate_datasource(&DatasourceConfiguration::default());
        assert!(invalids.contains("Missing URL."));

        let invalids =
            plugin.validate_datasource(&DatasourceConfiguration::new("ftp://files.test"));
        assert!(invalids.contains("Unsupported URL scheme `ftp`."));

        let invalids = plugin.validate_datasource(&DatasourceConfiguration::new("not a url"));
        assert_eq!(invalids.len(), 1);

        assert!(
            plugin
                .validate_datasource(&DatasourceConfiguration::new("https://api.test"))
                .is_empty()
        );
    }

    #[test]
    fn credential_fields_are_checked() {
        let plugin = RestApiPlugin;
        let ds = DatasourceConfiguration::new("https://api.test")
            .with_authentication(Authentication::api_key(" ", "", ApiKeyLocation::Header));
        let invalids = plugin.validate_datasource(&ds);
        assert!(invalids.contains("Missing API key name."));
        assert!(invalids.contains("Missing API key value."));

        let ds = DatasourceConfiguration::new("https://api.test").with_authentication(
            Authentication::oauth2_client_credentials("id", "secret", "token-endpoint"),
        );
        assert!(plugin.validate_datasource(&ds).contains("Invalid access token URL."));
    }

    #[test]
    fn only_the_default_command_exists() {
        let plugin = RestApiPlugin;
        let action = ResolvedActionConfiguration::constant(ActionConfiguration::default());
        assert_eq!(plugin.select_command(&action).unwrap().name(), "rest-api");

        let action = ResolvedActionConfiguration::constant(
            ActionConfiguration::default().with_form_data("command", json!("GRAPHQL")),
        );
        let err = plugin.select_command(&action).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedOperation);
    }

    #[test]
    fn test_is_a_head_on_the_base_url() {
        let spec = RestApiPlugin
            .test_request(&DatasourceConfiguration::new("https://api.test/v1"))
            .unwrap()
            .unwrap();
        assert_eq!(spec.method, HttpMethod::Head);
        assert_eq!(spec.url.as_str(), "https://api.test/v1");
    }

    #[test]
    fn reachable_statuses_pass_the_test() {
        let plugin = RestApiPlugin;
        assert!(plugin.test_failure(200).is_none());
        assert!(plugin.test_failure(404).is_none());
        assert!(plugin.test_failure(405).is_none());
        assert!(plugin.test_failure(401).is_some());
        assert!(plugin.test_failure(503).is_some());
    }
}
