//! The plugin execution framework: command strategies, the plugin contract and
//! registry, the connection manager, the response classifier, and the
//! dispatcher that ties them together.

pub mod classifier;
pub mod command;
pub mod config;
pub mod connection;
pub mod dispatcher;
pub mod error;
pub mod executor;
pub mod headers;
pub mod registry;
pub mod trigger;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use classifier::{RawResponse, classify};
pub use command::{
    BodyFormat, CommandStrategy, HttpRequestSpec, RequestBody, append_query, join_url,
};
pub use config::SharedConfig;
pub use connection::{
    ClientCredentialsFetcher, Connected, ConnectionManager, CredentialSnapshot, PluginConnection,
    TokenFetcher, check_credential,
};
pub use dispatcher::ActionDispatcher;
pub use error::TransportError;
pub use executor::{DynPluginExecutor, PluginExecutor, TestLimits};
pub use registry::PluginRegistry;
pub use trigger::TriggerState;
