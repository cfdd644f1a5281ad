use conduit_core::{
    DatasourceConfiguration, ExecuteActionDto, HttpMethod, PluginError, Property,
    ResolvedActionConfiguration, TriggerRequest,
};
use conduit_plugin::headers::layered;
use conduit_plugin::{CommandStrategy, HttpRequestSpec, RequestBody, join_url};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::constants::{
    CHAT, CHAT_MODELS, CHAT_PATH, COMMAND, DATA, DEFAULT_BASE_URL, EMBEDDING_MODELS, EMBEDDINGS,
    EMBEDDINGS_PATH, MODELS_PATH,
};
use crate::error::OpenAiError;
use crate::models::{ChatRequest, EmbeddingsRequest};

/// The commands an OpenAI action can run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenAiCommand {
    Chat,
    Embeddings,
    ListModels,
}

impl OpenAiCommand {
    /// Pick the command named by `formData.command`, or infer it from which
    /// settings section is filled in.
    pub fn for_action(form: &Map<String, Value>) -> Result<Self, PluginError> {
        match form.get(COMMAND).and_then(Value::as_str).map(str::trim) {
            Some("CHAT") => Ok(Self::Chat),
            Some("EMBEDDINGS") => Ok(Self::Embeddings),
            Some("LIST_MODELS") => Ok(Self::ListModels),
            Some(other) if !other.is_empty() => Err(PluginError::unsupported(format!(
                "OpenAI has no `{other}` command"
            ))),
            _ if form.get(CHAT).is_some_and(Value::is_object) => Ok(Self::Chat),
            _ if form.get(EMBEDDINGS).is_some_and(Value::is_object) => Ok(Self::Embeddings),
            _ => Err(PluginError::unsupported("no OpenAI command selected")),
        }
    }

    /// The command whose models a discovery request lists.
    pub fn for_trigger(request: &TriggerRequest) -> Result<Self, PluginError> {
        match request.request_type.as_str() {
            CHAT_MODELS => Ok(Self::Chat),
            EMBEDDING_MODELS => Ok(Self::Embeddings),
            other => Err(PluginError::unsupported(format!(
                "OpenAI has no `{other}` trigger request"
            ))),
        }
    }
}

/// The datasource URL when one is set, the public API otherwise.
pub fn base_url(datasource: &DatasourceConfiguration) -> &str {
    datasource
        .url
        .as_deref()
        .map(str::trim)
        .filter(|u| !u.is_empty())
        .unwrap_or(DEFAULT_BASE_URL)
}

fn request(
    method: HttpMethod,
    datasource: &DatasourceConfiguration,
    path: &str,
) -> Result<HttpRequestSpec, PluginError> {
    let url = join_url(Some(base_url(datasource)), Some(path))?;
    Ok(HttpRequestSpec::new(method, url))
}

fn section<'a>(
    form: &'a Map<String, Value>,
    key: &'static str,
) -> Result<&'a Map<String, Value>, OpenAiError> {
    form.get(key)
        .and_then(Value::as_object)
        .ok_or(OpenAiError::MissingSection(key))
}

fn json_body(request: &impl Serialize) -> Result<RequestBody, PluginError> {
    serde_json::to_value(request)
        .map(RequestBody::Json)
        .map_err(|e| PluginError::plugin(format!("failed to encode request body: {e}")))
}

fn is_chat_model(id: &str) -> bool {
    const FAMILIES: [&str; 4] = ["gpt-", "o1", "o3", "chatgpt-"];
    const EXCLUDED: [&str; 5] = ["-instruct", "audio", "realtime", "tts", "transcribe"];
    FAMILIES.iter().any(|f| id.starts_with(f)) && !EXCLUDED.iter().any(|x| id.contains(x))
}

impl CommandStrategy for OpenAiCommand {
    fn name(&self) -> &'static str {
        match self {
            Self::Chat => "openai-chat",
            Self::Embeddings => "openai-embeddings",
            Self::ListModels => "openai-list-models",
        }
    }

    fn build_execute_request(
        &self,
        action: &ResolvedActionConfiguration,
        datasource: &DatasourceConfiguration,
        _dto: &ExecuteActionDto,
    ) -> Result<HttpRequestSpec, PluginError> {
        let mut headers = layered(&datasource.headers, &action.headers);

        let spec = match self {
            Self::Chat => {
                let body = ChatRequest::from_form(section(&action.form_data, CHAT)?)?;
                request(HttpMethod::Post, datasource, CHAT_PATH)?.with_body(json_body(&body)?)
            }
            Self::Embeddings => {
                let body = EmbeddingsRequest::from_form(section(&action.form_data, EMBEDDINGS)?)?;
                request(HttpMethod::Post, datasource, EMBEDDINGS_PATH)?.with_body(json_body(&body)?)
            }
            Self::ListModels => request(HttpMethod::Get, datasource, MODELS_PATH)?,
        };

        if matches!(self, Self::Chat | Self::Embeddings)
            && !headers
                .iter()
                .any(|h| h.key.trim().eq_ignore_ascii_case("content-type"))
        {
            headers.push(Property::new("Content-Type", "application/json"));
        }
        Ok(HttpRequestSpec { headers, ..spec })
    }

    fn build_trigger_request(
        &self,
        datasource: &DatasourceConfiguration,
        _request: &TriggerRequest,
    ) -> Result<HttpRequestSpec, PluginError> {
        let spec = request(HttpMethod::Get, datasource, MODELS_PATH)?;
        Ok(HttpRequestSpec {
            headers: layered(&datasource.headers, &[]),
            ..spec
        })
    }

    fn discovery_field(&self) -> &'static str {
        DATA
    }

    fn is_compatible(&self, item: &Value) -> bool {
        let Some(id) = item.get("id").and_then(Value::as_str) else {
            // Left for discovery_item to skip.
            return true;
        };
        match self {
            Self::Chat => is_chat_model(id),
            Self::Embeddings => id.contains("embedding"),
            Self::ListModels => true,
        }
    }
}
