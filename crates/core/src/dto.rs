use serde::{Deserialize, Serialize};

use crate::binding::BindingValues;

/// Which pagination URL an execution should follow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PaginationField {
    Next,
    Prev,
}

/// Per-execution input supplied by the caller alongside the configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExecuteActionDto {
    pub action_id: Option<String>,
    /// Computed binding values keyed by expression.
    pub params: BindingValues,
    pub pagination_field: Option<PaginationField>,
}

impl ExecuteActionDto {
    pub fn new(action_id: impl Into<String>) -> Self {
        Self {
            action_id: Some(action_id.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_param(mut self, expression: impl Into<String>, value: serde_json::Value) -> Self {
        self.params.insert(expression.into(), value);
        self
    }

    #[must_use]
    pub fn with_pagination(mut self, field: PaginationField) -> Self {
        self.pagination_field = Some(field);
        self
    }
}
