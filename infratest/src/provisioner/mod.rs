//! Boundary to the infrastructure-as-code tool.

mod terraform;

pub use terraform::TerraformCli;

use async_trait::async_trait;
use infratest_common::{config::HarnessOptions, ToolError};
use serde_json::Value;
use std::collections::BTreeMap;

#[async_trait]
pub trait Provisioner: Send + Sync {
    async fn init(&self, options: &HarnessOptions) -> Result<(), ToolError>;

    /// Converges real infrastructure to the configuration in `options.target_dir`.
    async fn apply(&self, options: &HarnessOptions) -> Result<(), ToolError>;

    async fn output(&self, options: &HarnessOptions, name: &str) -> Result<String, ToolError>;

    async fn output_map(
        &self,
        options: &HarnessOptions,
        name: &str,
    ) -> Result<BTreeMap<String, String>, ToolError>;

    async fn destroy(&self, options: &HarnessOptions) -> Result<(), ToolError>;
}

/// Renders an input variable the way `-var name=value` expects it.
pub fn render_var(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_owned(),
        Value::Bool(_) | Value::Number(_) => value.to_string(),
        // JSON lists and objects are valid HCL expressions.
        Value::Array(_) | Value::Object(_) => value.to_string(),
    }
}

/// Parses `output -json` for a scalar output.
pub fn parse_scalar_output(name: &str, raw: &str) -> Result<String, ToolError> {
    match parse_json_output(name, raw)? {
        Value::Null => Err(ToolError::OutputNotFound(name.to_owned())),
        Value::String(s) => Ok(s),
        value @ (Value::Bool(_) | Value::Number(_)) => Ok(value.to_string()),
        other => Err(ToolError::MalformedOutput {
            name:   name.to_owned(),
            reason: format!("expected a scalar, got {other}"),
        }),
    }
}

/// Parses `output -json` for a map output; nested values are rendered as JSON.
pub fn parse_map_output(name: &str, raw: &str) -> Result<BTreeMap<String, String>, ToolError> {
    match parse_json_output(name, raw)? {
        Value::Null => Err(ToolError::OutputNotFound(name.to_owned())),
        Value::Object(map) => Ok(map
            .into_iter()
            .map(|(key, value)| {
                let value = match value {
                    Value::String(s) => s,
                    other => other.to_string(),
                };
                (key, value)
            })
            .collect()),
        other => Err(ToolError::MalformedOutput {
            name:   name.to_owned(),
            reason: format!("expected a map, got {other}"),
        }),
    }
}

fn parse_json_output(name: &str, raw: &str) -> Result<Value, ToolError> {
    serde_json::from_str(raw.trim()).map_err(|e| ToolError::MalformedOutput {
        name:   name.to_owned(),
        reason: e.to_string(),
    })
}
