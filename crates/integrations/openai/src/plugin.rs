use std::collections::BTreeSet;

use conduit_core::{
    Authentication, AuthenticationType, DatasourceConfiguration, ExposeSecret, HttpMethod,
    PluginError, ResolvedActionConfiguration, TriggerRequest,
};
use conduit_plugin::{CommandStrategy, HttpRequestSpec, PluginExecutor, join_url};
use tracing::debug;

use crate::command::{OpenAiCommand, base_url};
use crate::constants::MODELS_PATH;

/// Registry name of the OpenAI plugin.
pub const PLUGIN_NAME: &str = "openai-plugin";

/// Connector for the OpenAI API, authenticated with a bearer API key.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenAiPlugin;

impl OpenAiPlugin {
    pub fn new() -> Self {
        Self
    }
}

impl PluginExecutor for OpenAiPlugin {
    fn name(&self) -> &str {
        PLUGIN_NAME
    }

    fn auth_requirement(&self) -> &[AuthenticationType] {
        &[AuthenticationType::BearerToken]
    }

    fn validate_datasource(&self, datasource: &DatasourceConfiguration) -> BTreeSet<String> {
        let mut invalids = BTreeSet::new();

        match &datasource.authentication {
            Some(Authentication::BearerToken { bearer_token })
                if !bearer_token.expose_secret().trim().is_empty() => {}
            Some(Authentication::BearerToken { .. }) | None => {
                invalids.insert("Missing API key.".to_owned());
            }
            Some(other) => {
                invalids.insert(format!(
                    "Unsupported authentication type `{}`.",
                    other.authentication_type()
                ));
            }
        }

        if let Err(e) = join_url(Some(base_url(datasource)), None) {
            invalids.insert(format!("Invalid URL: {}.", e.message()));
        }
        invalids
    }

    fn select_command(
        &self,
        action: &ResolvedActionConfiguration,
    ) -> Result<Box<dyn CommandStrategy>, PluginError> {
        let command = OpenAiCommand::for_action(&action.form_data)?;
        debug!(command = command.name(), "selected OpenAI command");
        Ok(Box::new(command))
    }

    fn select_trigger_command(
        &self,
        request: &TriggerRequest,
    ) -> Result<Box<dyn CommandStrategy>, PluginError> {
        Ok(Box::new(OpenAiCommand::for_trigger(request)?))
    }

    fn test_request(
        &self,
        datasource: &DatasourceConfiguration,
    ) -> Result<Option<HttpRequestSpec>, PluginError> {
        let url = join_url(Some(base_url(datasource)), Some(MODELS_PATH))?;
        Ok(Some(HttpRequestSpec::new(HttpMethod::Get, url)))
    }

    fn test_failure(&self, status: u16) -> Option<String> {
        (!(200..300).contains(&status))
            .then(|| format!("Authentication failed with status {status}. Check the API key."))
    }
}
