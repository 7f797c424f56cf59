//! Raw variable bindings from the command line and vars files
//!
//! Everything here stays stringly typed; coercion happens in
//! [`crate::schema::validate`].

use anyhow::{Context, Result};
use serde_yaml::Value;
use std::collections::HashMap;
use std::path::Path;

/// Parse one `KEY=VALUE` assignment; the value may be empty or contain `=`
pub fn parse_assignment(input: &str) -> Result<(String, String), String> {
    let (key, value) = input
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{}'", input))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("missing variable name in '{}'", input));
    }
    Ok((key.to_string(), value.to_string()))
}

/// Read a YAML mapping of variable names to scalar (or list) values
pub async fn load_vars_file(path: &Path) -> Result<HashMap<String, String>> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read vars file: {}", path.display()))?;
    parse_vars(&content).with_context(|| format!("Invalid vars file: {}", path.display()))
}

/// Parse vars file content
pub fn parse_vars(content: &str) -> Result<HashMap<String, String>> {
    let value: Value = serde_yaml::from_str(content)?;
    let mapping = match value {
        Value::Mapping(mapping) => mapping,
        Value::Null => return Ok(HashMap::new()),
        _ => anyhow::bail!("expected a mapping of variable names to values"),
    };

    let mut vars = HashMap::new();
    for (key, value) in mapping {
        let key = scalar(&key).context("variable names must be scalars")?;
        let value = match &value {
            Value::Sequence(items) => items
                .iter()
                .map(scalar)
                .collect::<Option<Vec<_>>>()
                .map(|items| items.join(","))
                .with_context(|| format!("'{}' must be a scalar or a list of scalars", key))?,
            other => scalar(other).with_context(|| format!("'{}' must be a scalar or a list of scalars", key))?,
        };
        vars.insert(key, value);
    }
    Ok(vars)
}

fn scalar(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Null => Some(String::new()),
        _ => None,
    }
}

/// Layer command-line assignments over file bindings; later ones win
pub fn merge(
    file: HashMap<String, String>,
    cli: impl IntoIterator<Item = (String, String)>,
) -> HashMap<String, String> {
    let mut merged = file;
    merged.extend(cli);
    merged
}
