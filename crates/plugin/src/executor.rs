use std::collections::BTreeSet;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use conduit_core::{
    AuthenticationType, DatasourceConfiguration, DatasourceTestResult, PluginError,
    ResolvedActionConfiguration, TriggerRequest,
};
use tracing::debug;

use crate::command::{CommandStrategy, HttpRequestSpec};
use crate::connection::PluginConnection;

/// Limits applied to the lightweight call made by a datasource test.
#[derive(Debug, Clone, Copy)]
pub struct TestLimits {
    pub timeout: Duration,
    pub max_response_size: usize,
}

/// The contract every connector satisfies.
///
/// This trait is **not** object-safe because [`test_datasource`] returns an
/// opaque future. Use [`DynPluginExecutor`] for dynamic dispatch; every
/// `PluginExecutor` implements it through a blanket implementation.
///
/// [`test_datasource`]: Self::test_datasource
pub trait PluginExecutor: Send + Sync {
    /// Unique plugin identity used as the registry key.
    fn name(&self) -> &str;

    /// Authentication kinds this plugin accepts. Empty means any.
    fn auth_requirement(&self) -> &[AuthenticationType] {
        &[]
    }

    /// Offline validation. An empty set means the datasource is valid.
    fn validate_datasource(&self, datasource: &DatasourceConfiguration) -> BTreeSet<String>;

    /// Pick the command for a resolved action. Fails with
    /// `UnsupportedOperation` before any network I/O.
    fn select_command(
        &self,
        action: &ResolvedActionConfiguration,
    ) -> Result<Box<dyn CommandStrategy>, PluginError>;

    /// Pick the command serving a discovery request.
    fn select_trigger_command(
        &self,
        request: &TriggerRequest,
    ) -> Result<Box<dyn CommandStrategy>, PluginError> {
        Err(PluginError::unsupported(format!(
            "plugin `{}` does not support trigger request `{}`",
            self.name(),
            request.request_type
        )))
    }

    /// The lightweight reachability call. `None` means validation alone
    /// decides the test.
    fn test_request(
        &self,
        _datasource: &DatasourceConfiguration,
    ) -> Result<Option<HttpRequestSpec>, PluginError> {
        Ok(None)
    }

    /// Message reported when the test call answered with `status`, or `None`
    /// if the status means the datasource is reachable.
    fn test_failure(&self, status: u16) -> Option<String> {
        (!(200..300).contains(&status))
            .then(|| format!("datasource answered the test request with status {status}"))
    }

    /// Issue the test call through `connection`. Never retried.
    fn test_datasource(
        &self,
        datasource: &DatasourceConfiguration,
        connection: &PluginConnection,
        limits: TestLimits,
    ) -> impl Future<Output = DatasourceTestResult> + Send {
        async move {
            let spec = match self.test_request(datasource) {
                Ok(Some(spec)) => spec,
                Ok(None) => return DatasourceTestResult::success(),
                Err(e) => return DatasourceTestResult::failure(e.message()),
            };
            match connection
                .send(&spec, limits.timeout, limits.max_response_size)
                .await
            {
                Ok(raw) => match self.test_failure(raw.status) {
                    None => DatasourceTestResult::success(),
                    Some(message) => DatasourceTestResult::failure(message),
                },
                Err(e) => {
                    debug!(error = %e, "datasource test call failed");
                    DatasourceTestResult::failure(PluginError::from(e).message())
                }
            }
        }
    }
}

/// Object-safe plugin trait for use behind `Arc<dyn DynPluginExecutor>`.
///
/// Implement [`PluginExecutor`] instead and rely on the blanket
/// implementation.
#[async_trait]
pub trait DynPluginExecutor: Send + Sync {
    fn name(&self) -> &str;

    fn auth_requirement(&self) -> &[AuthenticationType];

    fn validate_datasource(&self, datasource: &DatasourceConfiguration) -> BTreeSet<String>;

    fn select_command(
        &self,
        action: &ResolvedActionConfiguration,
    ) -> Result<Box<dyn CommandStrategy>, PluginError>;

    fn select_trigger_command(
        &self,
        request: &TriggerRequest,
    ) -> Result<Box<dyn CommandStrategy>, PluginError>;

    fn test_request(
        &self,
        datasource: &DatasourceConfiguration,
    ) -> Result<Option<HttpRequestSpec>, PluginError>;

    async fn test_datasource(
        &self,
        datasource: &DatasourceConfiguration,
        connection: &PluginConnection,
        limits: TestLimits,
    ) -> DatasourceTestResult;
}

/// Blanket implementation bridging static and dynamic dispatch.
#[async_trait]
impl<T: PluginExecutor + Sync> DynPluginExecutor for T {
    fn name(&self) -> &str {
        PluginExecutor::name(self)
    }

    fn auth_requirement(&self) -> &[AuthenticationType] {
        PluginExecutor::auth_requirement(self)
    }

    fn validate_datasource(&self, datasource: &DatasourceConfiguration) -> BTreeSet<String> {
        PluginExecutor::validate_datasource(self, datasource)
    }

    fn select_command(
        &self,
        action: &ResolvedActionConfiguration,
    ) -> Result<Box<dyn CommandStrategy>, PluginError> {
        PluginExecutor::select_command(self, action)
    }

    fn select_trigger_command(
        &self,
        request: &TriggerRequest,
    ) -> Result<Box<dyn CommandStrategy>, PluginError> {
        PluginExecutor::select_trigger_command(self, request)
    }

    fn test_request(
        &self,
        datasource: &DatasourceConfiguration,
    ) -> Result<Option<HttpRequestSpec>, PluginError> {
        PluginExecutor::test_request(self, datasource)
    }

    async fn test_datasource(
        &self,
        datasource: &DatasourceConfiguration,
        connection: &PluginConnection,
        limits: TestLimits,
    ) -> DatasourceTestResult {
        PluginExecutor::test_datasource(self, datasource, connection, limits).await
    }
}
