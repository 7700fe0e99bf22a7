//! Node config template resolution
//!
//! String values inside a node's config may carry `{{...}}` placeholders.
//! Before each invocation the scheduler renders them against a context
//! exposing workflow variables, execution variables, the node's parent
//! output, and registered resources:
//!
//! ```text
//! {{workflow.region}}      workflow-scoped variable
//! {{variables.tier}}       execution-scoped variable (overrides workflow)
//! {{input.user.email}}     parent output field
//! {{resources.db.url}}     resource payload registered under alias "db"
//! ```
//!
//! In strict mode an unresolved placeholder is an error; otherwise it
//! renders empty and execution continues.

use crate::error::{Result, WorkflowError};
use handlebars::Handlebars;
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Data exposed to config templates
#[derive(Debug, Clone, Default)]
pub struct TemplateContext {
    pub workflow_variables: Map<String, Value>,
    pub variables: Map<String, Value>,
    pub input: Value,
    pub resources: HashMap<String, Value>,
}

impl TemplateContext {
    fn to_data(&self) -> Value {
        serde_json::json!({
            "workflow": self.workflow_variables,
            "variables": self.variables,
            "input": self.input,
            "resources": self.resources,
        })
    }
}

/// Renders config templates with optional strict mode
pub struct TemplateResolver {
    lenient: Handlebars<'static>,
    strict: Handlebars<'static>,
}

impl TemplateResolver {
    pub fn new() -> Self {
        let lenient = Handlebars::new();
        let mut strict = Handlebars::new();
        strict.set_strict_mode(true);
        Self { lenient, strict }
    }

    /// Resolve every templated string in a config record
    ///
    /// Walks nested objects and arrays; strings without `{{` pass through
    /// untouched.
    pub fn resolve_config(
        &self,
        node_id: &str,
        config: &Map<String, Value>,
        context: &TemplateContext,
        strict: bool,
    ) -> Result<Map<String, Value>> {
        let data = context.to_data();
        let mut resolved = Map::with_capacity(config.len());
        for (key, value) in config {
            resolved.insert(key.clone(), self.resolve_value(node_id, value, &data, strict)?);
        }
        Ok(resolved)
    }

    fn resolve_value(
        &self,
        node_id: &str,
        value: &Value,
        data: &Value,
        strict: bool,
    ) -> Result<Value> {
        match value {
            Value::String(text) if text.contains("{{") => {
                let registry = if strict { &self.strict } else { &self.lenient };
                let rendered = registry.render_template(text, data).map_err(|e| {
                    WorkflowError::Template {
                        node_id: node_id.to_string(),
                        message: e.to_string(),
                    }
                })?;
                Ok(Value::String(rendered))
            }
            Value::Object(map) => {
                let mut resolved = Map::with_capacity(map.len());
                for (key, inner) in map {
                    resolved.insert(key.clone(), self.resolve_value(node_id, inner, data, strict)?);
                }
                Ok(Value::Object(resolved))
            }
            Value::Array(items) => {
                let resolved: Result<Vec<Value>> = items
                    .iter()
                    .map(|item| self.resolve_value(node_id, item, data, strict))
                    .collect();
                Ok(Value::Array(resolved?))
            }
            other => Ok(other.clone()),
        }
    }
}

impl Default for TemplateResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TemplateResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TemplateResolver").finish()
    }
}
