use std::collections::BTreeSet;
use std::sync::Arc;

use conduit_core::{
    ActionConfiguration, ActionExecutionRequest, ActionExecutionResult, DatasourceConfiguration,
    DatasourceTestResult, ExecuteActionDto, PluginError, ResolvedActionConfiguration,
    TriggerRequest, TriggerResult, resolve_bindings,
};
use tokio::sync::{Semaphore, SemaphorePermit};
use tracing::{debug, instrument, warn};

use crate::classifier::classify;
use crate::command::{CommandStrategy, HttpRequestSpec};
use crate::config::SharedConfig;
use crate::connection::{ConnectionManager, PluginConnection, check_authentication};
use crate::error::TransportError;
use crate::executor::{DynPluginExecutor, TestLimits};
use crate::headers::sanitize_action;
use crate::registry::PluginRegistry;
use crate::trigger::{TriggerState, collect_items};

/// A resolved action, its command, and the request that command built.
struct Prepared {
    action: ResolvedActionConfiguration,
    command: Box<dyn CommandStrategy>,
    spec: HttpRequestSpec,
}

/// The single entry point for executing actions.
///
/// Every execution holds a concurrency permit for its whole lifetime, so at
/// most [`SharedConfig::max_concurrent_executions`] calls are in flight.
/// Permits are released on every exit path, including cancellation.
pub struct ActionDispatcher {
    registry: PluginRegistry,
    connections: ConnectionManager,
    config: SharedConfig,
    semaphore: Arc<Semaphore>,
}

impl ActionDispatcher {
    /// Create a dispatcher with its own connection manager.
    ///
    /// # Examples
    ///
    /// ```
    /// use conduit_plugin::{ActionDispatcher, PluginRegistry, SharedConfig};
    ///
    /// let dispatcher = ActionDispatcher::new(PluginRegistry::new(), SharedConfig::default())
    ///     .expect("client builds");
    /// assert_eq!(dispatcher.available_permits(), 64);
    /// ```
    pub fn new(registry: PluginRegistry, config: SharedConfig) -> Result<Self, TransportError> {
        let connections = ConnectionManager::new(&config)?;
        Ok(Self::with_connections(registry, connections, config))
    }

    pub fn with_connections(
        registry: PluginRegistry,
        connections: ConnectionManager,
        config: SharedConfig,
    ) -> Self {
        let semaphore = Arc::new(Semaphore::new(config.max_concurrent_executions));
        Self {
            registry,
            connections,
            config,
            semaphore,
        }
    }

    pub fn registry(&self) -> &PluginRegistry {
        &self.registry
    }

    pub fn connections(&self) -> &ConnectionManager {
        &self.connections
    }

    pub fn config(&self) -> &SharedConfig {
        &self.config
    }

    pub fn available_permits(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Execute one action against a datasource.
    ///
    /// Never fails outside the result: binding, command-selection and
    /// request-building failures return before any network I/O, including an
    /// OAuth2 token request. Everything after is classified.
    #[instrument(skip_all, fields(plugin, action.id = dto.action_id.as_deref()))]
    pub async fn execute(
        &self,
        plugin: &str,
        dto: &ExecuteActionDto,
        datasource: &DatasourceConfiguration,
        action: &ActionConfiguration,
    ) -> ActionExecutionResult {
        let executor = match self.plugin(plugin) {
            Ok(executor) => executor,
            Err(e) => return ActionExecutionResult::from_error(e, None),
        };
        let _permit = match self.permit().await {
            Ok(permit) => permit,
            Err(e) => return ActionExecutionResult::from_error(e, None),
        };

        let prepared = match prepare(executor.as_ref(), dto, datasource, action) {
            Ok(prepared) => prepared,
            Err(e) => return ActionExecutionResult::from_error(e, None),
        };

        let connected = match self.connections.connect(executor.as_ref(), datasource).await {
            Ok(connected) => connected,
            Err(e) => {
                warn!(error = %e, "could not connect to datasource");
                return ActionExecutionResult::from_error(e, None);
            }
        };

        self.run(&prepared, &connected.connection)
            .await
            .with_refreshed_authentication(connected.refreshed)
    }

    /// Execute through a connection the caller already holds.
    ///
    /// The connection's credential must satisfy the plugin's requirement,
    /// exactly as a datasource credential does in [`Self::execute`].
    #[instrument(skip_all, fields(plugin, action.id = dto.action_id.as_deref()))]
    pub async fn execute_with_connection(
        &self,
        plugin: &str,
        connection: &PluginConnection,
        dto: &ExecuteActionDto,
        datasource: &DatasourceConfiguration,
        action: &ActionConfiguration,
    ) -> ActionExecutionResult {
        let executor = match self.plugin(plugin) {
            Ok(executor) => executor,
            Err(e) => return ActionExecutionResult::from_error(e, None),
        };
        if let Err(e) = ConnectionManager::validate_connection(executor.as_ref(), connection) {
            warn!(error = %e, "caller connection rejected");
            return ActionExecutionResult::from_error(e, None);
        }
        let _permit = match self.permit().await {
            Ok(permit) => permit,
            Err(e) => return ActionExecutionResult::from_error(e, None),
        };

        let prepared = match prepare(executor.as_ref(), dto, datasource, action) {
            Ok(prepared) => prepared,
            Err(e) => return ActionExecutionResult::from_error(e, None),
        };
        self.run(&prepared, connection).await
    }

    /// Offline validation; an empty set means valid.
    pub fn validate_datasource(
        &self,
        plugin: &str,
        datasource: &DatasourceConfiguration,
    ) -> BTreeSet<String> {
        let executor = match self.plugin(plugin) {
            Ok(executor) => executor,
            Err(e) => return BTreeSet::from([e.message().to_owned()]),
        };
        let mut invalids = executor.validate_datasource(datasource);
        if let Err(e) = check_authentication(executor.auth_requirement(), datasource) {
            invalids.insert(e.message().to_owned());
        }
        invalids
    }

    /// Validate, then make one lightweight call. Nothing is cached and a
    /// failure is never retried.
    #[instrument(skip_all, fields(plugin))]
    pub async fn test_datasource(
        &self,
        plugin: &str,
        datasource: &DatasourceConfiguration,
    ) -> DatasourceTestResult {
        let executor = match self.plugin(plugin) {
            Ok(executor) => executor,
            Err(e) => return DatasourceTestResult::failure(e.message()),
        };
        let invalids = self.validate_datasource(plugin, datasource);
        if !invalids.is_empty() {
            return DatasourceTestResult::from_invalids(invalids);
        }
        let _permit = match self.permit().await {
            Ok(permit) => permit,
            Err(e) => return DatasourceTestResult::failure(e.message()),
        };

        let connected = match self
            .connections
            .connect_uncached(executor.as_ref(), datasource)
            .await
        {
            Ok(connected) => connected,
            Err(e) => return DatasourceTestResult::failure(e.message()),
        };
        let limits = TestLimits {
            timeout: self.config.default_timeout(),
            max_response_size: self.config.max_response_size_bytes,
        };
        let result = executor
            .test_datasource(datasource, &connected.connection, limits)
            .await;
        debug!(success = result.is_success(), "datasource test finished");
        result
    }

    /// Discover remote metadata for a UI selector.
    ///
    /// OAuth2 state refreshed while connecting is returned on the result for
    /// the caller to persist.
    #[instrument(skip_all, fields(plugin, request_type = %request.request_type))]
    pub async fn trigger(
        &self,
        plugin: &str,
        datasource: &DatasourceConfiguration,
        request: &TriggerRequest,
    ) -> Result<TriggerResult, PluginError> {
        let executor = self.plugin(plugin)?;
        let (command, spec) = plan_trigger(executor.as_ref(), datasource, request)?;
        let connected = self.connections.connect(executor.as_ref(), datasource).await?;
        let result = self
            .discover(command.as_ref(), &spec, &connected.connection)
            .await?;
        Ok(result.with_refreshed_authentication(connected.refreshed))
    }

    /// Discovery through a connection the caller already holds.
    #[instrument(skip_all, fields(plugin, request_type = %request.request_type))]
    pub async fn trigger_with_connection(
        &self,
        plugin: &str,
        connection: &PluginConnection,
        datasource: &DatasourceConfiguration,
        request: &TriggerRequest,
    ) -> Result<TriggerResult, PluginError> {
        let executor = self.plugin(plugin)?;
        ConnectionManager::validate_connection(executor.as_ref(), connection)?;
        let (command, spec) = plan_trigger(executor.as_ref(), datasource, request)?;
        self.discover(command.as_ref(), &spec, connection).await
    }

    /// Send a built discovery request and collect its entries, logging each
    /// state transition.
    async fn discover(
        &self,
        command: &dyn CommandStrategy,
        spec: &HttpRequestSpec,
        connection: &PluginConnection,
    ) -> Result<TriggerResult, PluginError> {
        let _permit = self.permit().await?;
        let mut state = TriggerState::RequestBuilt;
        debug!(%state, command = command.name(), url = %spec.url);

        let raw = connection
            .send(
                spec,
                self.config.default_timeout(),
                self.config.max_response_size_bytes,
            )
            .await
            .map_err(|e| {
                warn!(%state, error = %e, "trigger request failed");
                PluginError::from(e)
            })?;
        state = TriggerState::Sent;
        debug!(%state, status = raw.status);

        let outcome = collect_items(command, &raw);
        state = TriggerState::from_outcome(&outcome);
        match &outcome {
            Ok(result) => debug!(%state, items = result.len(), "trigger finished"),
            Err(e) => warn!(%state, error = %e, "trigger failed"),
        }
        outcome
    }

    /// Send and classify one attempt. Consumes no permit of its own.
    async fn run(
        &self,
        prepared: &Prepared,
        connection: &PluginConnection,
    ) -> ActionExecutionResult {
        let Prepared {
            action,
            command,
            spec,
        } = prepared;

        let audit = ActionExecutionRequest::capture(
            &connection.redaction_policy(),
            spec.method,
            connection.outbound_url(spec).as_str(),
            &connection.audit_headers(spec),
            spec.body.audit_value(),
            action.inserted(),
        );

        let timeout = action.effective_timeout(self.config.default_timeout());
        debug!(
            command = command.name(),
            method = spec.method.as_str(),
            url = %audit.url,
            timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            "sending request"
        );

        match connection
            .send(spec, timeout, self.config.max_response_size_bytes)
            .await
        {
            Ok(raw) => classify(raw, command.response_format(), Some(audit)),
            Err(e) => {
                warn!(error = %e, timeout = e.is_timeout(), "request failed");
                ActionExecutionResult::from_error(PluginError::from(e), Some(audit))
            }
        }
    }

    fn plugin(&self, name: &str) -> Result<Arc<dyn DynPluginExecutor>, PluginError> {
        tracing::Span::current().record("plugin", name);
        self.registry
            .get(name)
            .ok_or_else(|| PluginError::unsupported(format!("no plugin registered as `{name}`")))
    }

    async fn permit(&self) -> Result<SemaphorePermit<'_>, PluginError> {
        // Cancel-safe: a caller dropped while waiting never holds a permit.
        self.semaphore
            .acquire()
            .await
            .map_err(|_| PluginError::plugin("dispatcher is shut down"))
    }
}

/// Resolve bindings, drop blank fields, pick the command and build the
/// request. Nothing here touches the network.
fn prepare(
    executor: &dyn DynPluginExecutor,
    dto: &ExecuteActionDto,
    datasource: &DatasourceConfiguration,
    action: &ActionConfiguration,
) -> Result<Prepared, PluginError> {
    let mut resolved = resolve_bindings(action, &dto.params)?;
    sanitize_action(resolved.configuration_mut());
    let command = executor.select_command(&resolved)?;
    let spec = command
        .build_execute_request(&resolved, datasource, dto)
        .inspect_err(|e| debug!(command = command.name(), error = %e, "pre-flight failure"))?;
    Ok(Prepared {
        action: resolved,
        command,
        spec,
    })
}

/// Pick the discovery command and build its request, before any I/O.
fn plan_trigger(
    executor: &dyn DynPluginExecutor,
    datasource: &DatasourceConfiguration,
    request: &TriggerRequest,
) -> Result<(Box<dyn CommandStrategy>, HttpRequestSpec), PluginError> {
    debug!(state = %TriggerState::Idle, "trigger started");
    let command = executor.select_trigger_command(request)?;
    let spec = command.build_trigger_request(datasource, request)?;
    Ok((command, spec))
}
