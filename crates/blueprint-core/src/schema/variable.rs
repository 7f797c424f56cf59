//! Variable declarations and bound values

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Declared type of a blueprint variable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VariableKind {
    #[default]
    String,
    Bool,
    Int,
    Enum,
    /// Comma-separated sequence, iterated with `range`
    List,
}

impl VariableKind {
    pub fn display_name(&self) -> &'static str {
        match self {
            VariableKind::String => "a string",
            VariableKind::Bool => "a boolean (true/false)",
            VariableKind::Int => "an integer",
            VariableKind::Enum => "one of the allowed values",
            VariableKind::List => "a comma-separated list",
        }
    }
}

impl fmt::Display for VariableKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            VariableKind::String => "string",
            VariableKind::Bool => "bool",
            VariableKind::Int => "int",
            VariableKind::Enum => "enum",
            VariableKind::List => "list",
        };
        f.write_str(name)
    }
}

/// One entry of a blueprint's variable schema
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variable {
    pub name: String,

    #[serde(default)]
    pub kind: VariableKind,

    #[serde(default)]
    pub required: bool,

    /// Raw default, coerced the same way user input is
    #[serde(default, deserialize_with = "scalar_string")]
    pub default: Option<String>,

    #[serde(default, alias = "allowedValues")]
    pub allowed_values: Vec<String>,

    /// Inclusive bounds for `int` variables
    #[serde(default)]
    pub min: Option<i64>,

    #[serde(default)]
    pub max: Option<i64>,

    #[serde(default)]
    pub description: Option<String>,
}

impl Variable {
    pub fn new(name: impl Into<String>, kind: VariableKind) -> Self {
        Self {
            name: name.into(),
            kind,
            required: false,
            default: None,
            allowed_values: Vec::new(),
            min: None,
            max: None,
            description: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_default(mut self, default: impl Into<String>) -> Self {
        self.default = Some(default.into());
        self
    }

    pub fn with_allowed<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_values = values.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_bounds(mut self, min: Option<i64>, max: Option<i64>) -> Self {
        self.min = min;
        self.max = max;
        self
    }

    /// Value used when an optional variable has no declared default
    pub fn zero_value(&self) -> Value {
        match self.kind {
            VariableKind::String | VariableKind::Enum => Value::Str(String::new()),
            VariableKind::Bool => Value::Bool(false),
            VariableKind::Int => Value::Int(0),
            VariableKind::List => Value::List(Vec::new()),
        }
    }
}

/// Accept any YAML scalar (or a sequence of scalars for list defaults) as a string
fn scalar_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    fn scalar(value: &serde_yaml::Value) -> Option<String> {
        match value {
            serde_yaml::Value::String(s) => Some(s.clone()),
            serde_yaml::Value::Bool(b) => Some(b.to_string()),
            serde_yaml::Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    let value = Option::<serde_yaml::Value>::deserialize(deserializer)?;
    match value {
        None | Some(serde_yaml::Value::Null) => Ok(None),
        Some(serde_yaml::Value::Sequence(items)) => {
            let parts = items
                .iter()
                .map(|item| {
                    scalar(item).ok_or_else(|| D::Error::custom("list defaults must be scalars"))
                })
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Some(parts.join(",")))
        }
        Some(other) => scalar(&other)
            .map(Some)
            .ok_or_else(|| D::Error::custom("expected a scalar default value")),
    }
}

/// A typed, validated variable value
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Value {
    Str(String),
    Bool(bool),
    Int(i64),
    List(Vec<String>),
}

impl Value {
    /// Truthiness of a bare variable reference in a condition
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Str(s) => !s.is_empty(),
            Value::Bool(b) => *b,
            Value::Int(n) => *n != 0,
            Value::List(items) => !items.is_empty(),
        }
    }

    pub fn as_list(&self) -> Option<&[String]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Str(s) => f.write_str(s),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(n) => write!(f, "{}", n),
            Value::List(items) => f.write_str(&items.join(",")),
        }
    }
}

/// Validated, fully-bound variable environment of one generation run
///
/// Only [`crate::schema::validate`] produces a `Configuration`; there are no
/// mutating accessors.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Configuration {
    bindings: BTreeMap<String, Value>,
}

impl Configuration {
    pub(crate) fn from_bindings(bindings: BTreeMap<String, Value>) -> Self {
        Self { bindings }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.bindings.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.bindings.contains_key(name)
    }

    /// Bindings in name order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.bindings.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_variable_with_scalar_defaults() {
        let yaml = r#"
- name: EnableWorker
  kind: bool
  default: true
- name: Port
  kind: int
  default: 8080
  min: 1
  max: 65535
- name: Framework
  kind: enum
  allowedValues: [stdlib, gin]
  default: stdlib
- name: Features
  kind: list
  default: [auth, metrics]
- name: ProjectName
  required: true
"#;
        let vars: Vec<Variable> = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(vars[0].default.as_deref(), Some("true"));
        assert_eq!(vars[1].default.as_deref(), Some("8080"));
        assert_eq!(vars[1].max, Some(65535));
        assert_eq!(vars[2].allowed_values, vec!["stdlib", "gin"]);
        assert_eq!(vars[3].default.as_deref(), Some("auth,metrics"));
        assert_eq!(vars[4].kind, VariableKind::String);
        assert!(vars[4].required);
    }

    #[test]
    fn test_truthiness() {
        assert!(Value::Bool(true).is_truthy());
        assert!(!Value::Bool(false).is_truthy());
        assert!(!Value::Str(String::new()).is_truthy());
        assert!(Value::Str("jwt".to_string()).is_truthy());
        assert!(!Value::Int(0).is_truthy());
        assert!(!Value::List(vec![]).is_truthy());
    }

    #[test]
    fn test_value_display() {
        assert_eq!(Value::Int(42).to_string(), "42");
        assert_eq!(
            Value::List(vec!["a".to_string(), "b".to_string()]).to_string(),
            "a,b"
        );
    }
}
