//! Resolve raw user input against a variable schema

use super::variable::{Configuration, Value, Variable, VariableKind};
use crate::error::ConfigurationError;
use std::collections::{BTreeMap, HashMap};

/// Validate raw `KEY=VALUE` bindings and produce an immutable [`Configuration`]
///
/// Unknown keys are rejected first so typos surface before anything else.
/// Optional variables fall back to their default, then to the kind's zero
/// value.
pub fn validate(
    schema: &[Variable],
    raw: &HashMap<String, String>,
) -> Result<Configuration, ConfigurationError> {
    let mut unknown: Vec<&String> = raw
        .keys()
        .filter(|key| !schema.iter().any(|v| &v.name == *key))
        .collect();
    unknown.sort();
    if let Some(name) = unknown.first() {
        return Err(ConfigurationError::UnknownVariable {
            name: (*name).clone(),
            suggestion: suggest(name, schema),
        });
    }

    let mut bindings = BTreeMap::new();
    for variable in schema {
        let value = match raw.get(&variable.name) {
            Some(input) => coerce(variable, input)?,
            None if variable.required => {
                return Err(ConfigurationError::MissingVariable {
                    name: variable.name.clone(),
                })
            }
            None => match &variable.default {
                Some(default) => coerce(variable, default)?,
                None => variable.zero_value(),
            },
        };
        bindings.insert(variable.name.clone(), value);
    }

    Ok(Configuration::from_bindings(bindings))
}

/// Convert one raw string into a typed value for `variable`
pub fn coerce(variable: &Variable, input: &str) -> Result<Value, ConfigurationError> {
    let invalid = |expected: String| ConfigurationError::InvalidType {
        name: variable.name.clone(),
        expected,
        value: input.to_string(),
    };

    match variable.kind {
        VariableKind::String => Ok(Value::Str(input.to_string())),
        VariableKind::Bool => {
            if input.eq_ignore_ascii_case("true") {
                Ok(Value::Bool(true))
            } else if input.eq_ignore_ascii_case("false") {
                Ok(Value::Bool(false))
            } else {
                Err(invalid(variable.kind.display_name().to_string()))
            }
        }
        VariableKind::Int => {
            let n: i64 = input
                .trim()
                .parse()
                .map_err(|_| invalid(variable.kind.display_name().to_string()))?;
            let below = variable.min.is_some_and(|min| n < min);
            let above = variable.max.is_some_and(|max| n > max);
            if below || above {
                return Err(invalid(describe_bounds(variable.min, variable.max)));
            }
            Ok(Value::Int(n))
        }
        VariableKind::Enum => {
            if variable.allowed_values.iter().any(|a| a == input) {
                Ok(Value::Str(input.to_string()))
            } else {
                Err(ConfigurationError::InvalidEnumValue {
                    name: variable.name.clone(),
                    value: input.to_string(),
                    allowed: variable.allowed_values.clone(),
                })
            }
        }
        VariableKind::List => Ok(Value::List(
            input
                .split(',')
                .map(str::trim)
                .filter(|item| !item.is_empty())
                .map(str::to_string)
                .collect(),
        )),
    }
}

fn describe_bounds(min: Option<i64>, max: Option<i64>) -> String {
    match (min, max) {
        (Some(lo), Some(hi)) => format!("an integer between {} and {}", lo, hi),
        (Some(lo), None) => format!("an integer >= {}", lo),
        (None, Some(hi)) => format!("an integer <= {}", hi),
        (None, None) => "an integer".to_string(),
    }
}

/// Closest declared name, if any is within a small edit distance
fn suggest(name: &str, schema: &[Variable]) -> Option<String> {
    let name = name.to_lowercase();
    schema
        .iter()
        .map(|v| (strsim::levenshtein(&name, &v.name.to_lowercase()), v))
        .filter(|(distance, _)| *distance <= 2)
        .min_by_key(|(distance, _)| *distance)
        .map(|(_, v)| v.name.clone())
}
