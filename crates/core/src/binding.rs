//! Binding resolution for action configurations.
//!
//! A binding is a `{{ expression }}` placeholder inside any string-valued
//! field of an [`ActionConfiguration`]. At execution time every placeholder is
//! replaced by the string form of the caller-computed value for its
//! expression. Resolution never leaves a placeholder behind: an expression
//! without a value fails the whole resolution.

use std::collections::{BTreeSet, HashMap};
use std::ops::Deref;
use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::action::ActionConfiguration;
use crate::error::PluginError;

/// Values computed by the caller, keyed by binding expression.
pub type BindingValues = HashMap<String, serde_json::Value>;

/// Matches `{{ ... }}` placeholders, including multi-line expressions.
static PLACEHOLDER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\{\{(.*?)\}\}").expect("placeholder regex is valid"));

/// Errors raised while resolving bindings.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BindingError {
    /// The configuration references an expression with no supplied value.
    #[error("missing value for binding `{0}`")]
    MissingValue(String),
}

impl From<BindingError> for PluginError {
    fn from(err: BindingError) -> Self {
        match err {
            BindingError::MissingValue(expression) => PluginError::missing_binding(&expression),
        }
    }
}

/// A binding value that was substituted into the configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsertedBinding {
    pub expression: String,
    pub value: serde_json::Value,
}

/// An action configuration with every placeholder substituted.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedActionConfiguration {
    configuration: ActionConfiguration,
    inserted: Vec<InsertedBinding>,
}

impl ResolvedActionConfiguration {
    /// Wrap a configuration that is known to contain no placeholders.
    pub fn constant(configuration: ActionConfiguration) -> Self {
        Self {
            configuration,
            inserted: Vec::new(),
        }
    }

    /// Bindings substituted during resolution, in first-occurrence order.
    pub fn inserted(&self) -> &[InsertedBinding] {
        &self.inserted
    }

    pub fn configuration(&self) -> &ActionConfiguration {
        &self.configuration
    }

    /// Mutable access for post-resolution normalization (e.g. dropping blank
    /// headers). Placeholders cannot be reintroduced through this handle
    /// without going through [`resolve_bindings`] again.
    pub fn configuration_mut(&mut self) -> &mut ActionConfiguration {
        &mut self.configuration
    }

    pub fn into_inner(self) -> ActionConfiguration {
        self.configuration
    }
}

impl Deref for ResolvedActionConfiguration {
    type Target = ActionConfiguration;

    fn deref(&self) -> &Self::Target {
        &self.configuration
    }
}

/// Returns `true` if the text contains at least one placeholder.
pub fn has_bindings(text: &str) -> bool {
    PLACEHOLDER_RE.is_match(text)
}

/// Collect every binding expression referenced by the configuration.
pub fn binding_keys(configuration: &ActionConfiguration) -> BTreeSet<String> {
    let mut keys = BTreeSet::new();
    let mut scratch = configuration.clone();
    let _ = visit_templates(&mut scratch, &mut |text: &mut String| {
        for caps in PLACEHOLDER_RE.captures_iter(text) {
            keys.insert(caps[1].trim().to_owned());
        }
        Ok(())
    });
    keys
}

/// Substitute every placeholder in the configuration.
///
/// The input is left untouched. Resolving the same configuration with the
/// same values always yields identical output.
pub fn resolve_bindings(
    configuration: &ActionConfiguration,
    values: &BindingValues,
) -> Result<ResolvedActionConfiguration, BindingError> {
    let mut resolved = configuration.clone();
    let mut inserted: Vec<InsertedBinding> = Vec::new();

    visit_templates(&mut resolved, &mut |text: &mut String| {
        if let Some(substituted) = substitute(text, values, &mut inserted)? {
            *text = substituted;
        }
        Ok(())
    })?;

    Ok(ResolvedActionConfiguration {
        configuration: resolved,
        inserted,
    })
}

/// String form of a binding value: strings are inserted verbatim, everything
/// else as compact JSON.
pub fn stringify_value(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn substitute(
    text: &str,
    values: &BindingValues,
    inserted: &mut Vec<InsertedBinding>,
) -> Result<Option<String>, BindingError> {
    if !PLACEHOLDER_RE.is_match(text) {
        return Ok(None);
    }

    // Fail on the first missing expression before building any output.
    for caps in PLACEHOLDER_RE.captures_iter(text) {
        let expression = caps[1].trim();
        let Some(value) = values.get(expression) else {
            return Err(BindingError::MissingValue(expression.to_owned()));
        };
        if !inserted.iter().any(|b| b.expression == expression) {
            inserted.push(InsertedBinding {
                expression: expression.to_owned(),
                value: value.clone(),
            });
        }
    }

    let replaced = PLACEHOLDER_RE.replace_all(text, |caps: &Captures<'_>| {
        values
            .get(caps[1].trim())
            .map(stringify_value)
            .unwrap_or_default()
    });
    Ok(Some(replaced.into_owned()))
}

fn visit_templates<F>(
    configuration: &mut ActionConfiguration,
    f: &mut F,
) -> Result<(), BindingError>
where
    F: FnMut(&mut String) -> Result<(), BindingError>,
{
    if let Some(path) = configuration.path.as_mut() {
        f(path)?;
    }
    if let Some(body) = configuration.body.as_mut() {
        f(body)?;
    }
    if let Some(next) = configuration.next.as_mut() {
        f(next)?;
    }
    if let Some(prev) = configuration.prev.as_mut() {
        f(prev)?;
    }

    for list in [
        &mut configuration.headers,
        &mut configuration.auto_generated_headers,
        &mut configuration.query_parameters,
        &mut configuration.body_form_data,
        &mut configuration.plugin_specified_templates,
    ] {
        for property in list.iter_mut() {
            f(&mut property.key)?;
            f(&mut property.value)?;
        }
    }

    for value in configuration.form_data.values_mut() {
        visit_json(value, f)?;
    }
    Ok(())
}

fn visit_json<F>(value: &mut serde_json::Value, f: &mut F) -> Result<(), BindingError>
where
    F: FnMut(&mut String) -> Result<(), BindingError>,
{
    match value {
        serde_json::Value::String(s) => f(s),
        serde_json::Value::Array(items) => items.iter_mut().try_for_each(|v| visit_json(v, f)),
        serde_json::Value::Object(map) => map.values_mut().try_for_each(|v| visit_json(v, f)),
        _ => Ok(()),
    }
}
