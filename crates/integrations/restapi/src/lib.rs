//! Generic REST API plugin for Conduit.
//!
//! Sends an action to any HTTP endpoint with the configured method, headers,
//! query parameters and body. The body encoding follows the action's
//! `Content-Type`, and URL-based pagination follows the `next`/`prev` links.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use conduit_plugin::{ActionDispatcher, PluginRegistry, SharedConfig};
//! use conduit_restapi::RestApiPlugin;
//!
//! let mut registry = PluginRegistry::new();
//! registry
//!     .register(Arc::new(RestApiPlugin::new()))
//!     .expect("plugin name is free");
//! let dispatcher = ActionDispatcher::new(registry, SharedConfig::default())
//!     .expect("HTTP client builds");
//! ```

pub mod command;
pub mod error;
pub mod plugin;

pub use command::RestApiCommand;
pub use error::RestApiError;
pub use plugin::{PLUGIN_NAME, RestApiPlugin};
