//! Core types for the Conduit plugin execution framework: the action
//! configuration and binding model, datasource credentials, the audit
//! snapshot, the normalized execution result, and the error taxonomy.

pub mod action;
pub mod binding;
pub mod datasource;
pub mod dto;
pub mod error;
pub mod request;
pub mod result;
pub mod trigger;

pub use action::{ActionConfiguration, HttpMethod, MAX_TIMEOUT_MS, PaginationType, Property};
pub use binding::{
    BindingError, BindingValues, InsertedBinding, ResolvedActionConfiguration, binding_keys,
    resolve_bindings, stringify_value,
};
pub use datasource::{
    ApiKeyLocation, Authentication, AuthenticationResponse, AuthenticationType,
    DatasourceConfiguration,
};
pub use dto::{ExecuteActionDto, PaginationField};
pub use error::{ErrorInfo, ErrorKind, PluginError};
pub use request::{ActionExecutionRequest, REDACTED, RedactionPolicy};
pub use result::{ActionExecutionResult, StatusCode};
pub use trigger::{DatasourceTestResult, TriggerRequest, TriggerResult};

// Re-export for consumers so they don't need a direct `secrecy` dependency.
pub use secrecy::{ExposeSecret, SecretString};
