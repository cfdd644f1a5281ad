//! Request bodies of the OpenAI endpoints, read from the action form.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

use crate::error::OpenAiError;

/// One chat turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: Value,
}

/// Body of `POST /v1/chat/completions`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u64>,
}

impl ChatRequest {
    /// Read the `chat` section of the form.
    ///
    /// `messages` may be an array or a string holding a JSON array, since a
    /// binding substitutes text.
    pub fn from_form(section: &Map<String, Value>) -> Result<Self, OpenAiError> {
        let model = model(section)?;

        let messages = match section.get("messages") {
            None | Some(Value::Null) => {
                return Err(OpenAiError::InvalidMessages("no messages".into()));
            }
            Some(Value::String(text)) => serde_json::from_str::<Vec<ChatMessage>>(text)
                .map_err(|e| OpenAiError::InvalidMessages(e.to_string()))?,
            Some(value) => Vec::<ChatMessage>::deserialize(value)
                .map_err(|e| OpenAiError::InvalidMessages(e.to_string()))?,
        };
        if messages.is_empty() {
            return Err(OpenAiError::InvalidMessages("no messages".into()));
        }
        if let Some(turn) = messages.iter().find(|m| m.role.trim().is_empty()) {
            return Err(OpenAiError::InvalidMessages(format!(
                "message without a role: {}",
                turn.content
            )));
        }

        Ok(Self {
            model,
            messages,
            temperature: number(section, "temperature", Number::as_f64)?,
            max_tokens: number(section, "maxTokens", Number::as_u64)?,
        })
    }
}

/// Body of `POST /v1/embeddings`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmbeddingsRequest {
    pub model: String,
    pub input: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encoding_format: Option<String>,
}

impl EmbeddingsRequest {
    /// Read the `embeddings` section of the form. `input` is a string or an
    /// array of strings.
    pub fn from_form(section: &Map<String, Value>) -> Result<Self, OpenAiError> {
        let model = model(section)?;

        let input = match section.get("input") {
            Some(Value::String(s)) if !s.trim().is_empty() => Value::String(s.clone()),
            Some(Value::Array(items)) if !items.is_empty() => Value::Array(items.clone()),
            _ => return Err(OpenAiError::MissingInput),
        };

        let encoding_format = section
            .get("encodingFormat")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_owned);

        Ok(Self {
            model,
            input,
            encoding_format,
        })
    }
}

fn model(section: &Map<String, Value>) -> Result<String, OpenAiError> {
    section
        .get("model")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .map(str::to_owned)
        .ok_or(OpenAiError::MissingModel)
}

/// Optional number given either as JSON or as bound text. Blank text counts
/// as absent.
fn number<T: FromStr>(
    section: &Map<String, Value>,
    field: &'static str,
    from_json: fn(&Number) -> Option<T>,
) -> Result<Option<T>, OpenAiError> {
    let invalid = |value: String| OpenAiError::InvalidNumber { field, value };
    match section.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => from_json(n).map(Some).ok_or_else(|| invalid(n.to_string())),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => s
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| invalid(s.clone())),
        Some(other) => Err(invalid(other.to_string())),
    }
}
