//! OpenAI plugin for Conduit.
//!
//! Runs chat completions and embeddings, lists models, and answers the
//! `CHAT_MODELS` / `EMBEDDING_MODELS` discovery requests used to populate
//! model pickers. Requests go to `https://api.openai.com` unless the
//! datasource URL points elsewhere, such as a compatible proxy.

pub mod command;
pub mod constants;
pub mod error;
pub mod models;
pub mod plugin;

pub use command::OpenAiCommand;
pub use error::OpenAiError;
pub use models::{ChatMessage, ChatRequest, EmbeddingsRequest};
pub use plugin::{OpenAiPlugin, PLUGIN_NAME};
