use std::collections::BTreeMap;
use std::sync::Arc;

use conduit_core::{AuthenticationType, PluginError};
use tracing::debug;

use crate::executor::DynPluginExecutor;

/// Plugin identities mapped to their executors.
///
/// Filled once at startup, then shared read-only inside an
/// [`ActionDispatcher`](crate::ActionDispatcher). A name identifies exactly
/// one plugin family, so registering a second plugin under a taken name is
/// refused rather than silently rerouting its datasources.
#[derive(Default)]
pub struct PluginRegistry {
    plugins: BTreeMap<String, Arc<dyn DynPluginExecutor>>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a plugin under its own name.
    ///
    /// Fails with `InvalidConfiguration` when the name is blank or already
    /// registered.
    pub fn register(&mut self, plugin: Arc<dyn DynPluginExecutor>) -> Result<(), PluginError> {
        let name = plugin.name().trim().to_owned();
        if name.is_empty() {
            return Err(PluginError::invalid_configuration("plugin name is blank"));
        }
        if self.plugins.contains_key(&name) {
            return Err(PluginError::invalid_configuration(format!(
                "plugin `{name}` is already registered"
            )));
        }
        debug!(plugin = %name, auth = ?plugin.auth_requirement(), "plugin registered");
        self.plugins.insert(name, plugin);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn DynPluginExecutor>> {
        self.plugins.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.plugins.contains_key(name)
    }

    /// Credential kinds a registered plugin accepts; empty means any.
    pub fn auth_requirement(&self, name: &str) -> Option<&[AuthenticationType]> {
        self.plugins.get(name).map(|p| p.auth_requirement())
    }

    /// Registered plugin names in order.
    pub fn list(&self) -> Vec<&str> {
        self.plugins.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use conduit_core::{DatasourceConfiguration, ErrorKind, ResolvedActionConfiguration};

    use super::*;
    use crate::command::CommandStrategy;
    use crate::executor::PluginExecutor;

    struct NamedPlugin {
        name: &'static str,
        auth: &'static [AuthenticationType],
    }

    impl PluginExecutor for NamedPlugin {
        fn name(&self) -> &str {
            self.name
        }

        fn auth_requirement(&self) -> &[AuthenticationType] {
            self.auth
        }

        fn validate_datasource(&self, _datasource: &DatasourceConfiguration) -> BTreeSet<String> {
            BTreeSet::new()
        }

        fn select_command(
            &self,
            _action: &ResolvedActionConfiguration,
        ) -> Result<Box<dyn CommandStrategy>, PluginError> {
            Err(PluginError::unsupported("no commands"))
        }
    }

    fn plugin(name: &'static str) -> Arc<NamedPlugin> {
        Arc::new(NamedPlugin { name, auth: &[] })
    }

    #[test]
    fn lookups_by_name() {
        let mut registry = PluginRegistry::new();
        assert!(registry.is_empty());
        registry.register(plugin("restapi-plugin")).unwrap();
        registry
            .register(Arc::new(NamedPlugin {
                name: "openai-plugin",
                auth: &[AuthenticationType::BearerToken],
            }))
            .unwrap();

        assert_eq!(registry.len(), 2);
        assert!(registry.contains("openai-plugin"));
        assert_eq!(registry.get("openai-plugin").unwrap().name(), "openai-plugin");
        assert!(registry.get("postgres-plugin").is_none());
        assert_eq!(
            registry.auth_requirement("openai-plugin"),
            Some(&[AuthenticationType::BearerToken][..])
        );
        assert_eq!(registry.auth_requirement("restapi-plugin"), Some(&[][..]));
        assert!(registry.auth_requirement("postgres-plugin").is_none());
    }

    #[test]
    fn names_are_listed_in_order() {
        let mut registry = PluginRegistry::default();
        for name in ["restapi-plugin", "graphql-plugin", "openai-plugin"] {
            registry.register(plugin(name)).unwrap();
        }
        assert_eq!(
            registry.list(),
            ["graphql-plugin", "openai-plugin", "restapi-plugin"]
        );
    }

    #[test]
    fn taken_name_is_refused() {
        let mut registry = PluginRegistry::new();
        registry.register(plugin("restapi-plugin")).unwrap();

        let err = registry.register(plugin("restapi-plugin")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidConfiguration);
        assert_eq!(err.message(), "plugin `restapi-plugin` is already registered");
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn blank_name_is_refused() {
        let err = PluginRegistry::new().register(plugin("  ")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidConfiguration);
    }
}
