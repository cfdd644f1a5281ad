//! Endpoints and form keys of the OpenAI API.

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com";

pub const CHAT_PATH: &str = "/v1/chat/completions";
pub const EMBEDDINGS_PATH: &str = "/v1/embeddings";
pub const MODELS_PATH: &str = "/v1/models";

/// Discovery array of `GET /v1/models`.
pub const DATA: &str = "data";

// Action form data keys.
pub const COMMAND: &str = "command";
pub const CHAT: &str = "chat";
pub const EMBEDDINGS: &str = "embeddings";

// Trigger request types.
pub const CHAT_MODELS: &str = "CHAT_MODELS";
pub const EMBEDDING_MODELS: &str = "EMBEDDING_MODELS";
