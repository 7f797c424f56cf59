//! Condition AST and its interpreter

use crate::error::RenderError;
use crate::schema::{Configuration, Value, Variable, VariableKind};
use std::collections::BTreeSet;
use std::fmt;

/// Literal operand of `eq` / `ne`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Literal {
    Str(String),
    Bool(bool),
    Int(i64),
}

impl Literal {
    fn matches(&self, value: &Value) -> bool {
        match (self, value) {
            (Literal::Str(l), Value::Str(v)) => l == v,
            (Literal::Bool(l), Value::Bool(v)) => l == v,
            (Literal::Int(l), Value::Int(v)) => l == v,
            // Membership: a list equals a literal when it contains it
            (Literal::Str(l), Value::List(items)) => items.iter().any(|item| item == l),
            _ => false,
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Str(s) => write!(f, "{:?}", s),
            Literal::Bool(b) => write!(f, "{}", b),
            Literal::Int(n) => write!(f, "{}", n),
        }
    }
}

/// Boolean inclusion predicate over a [`Configuration`]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Expression {
    /// True if the variable equals any of the literals
    Eq(String, Vec<Literal>),
    Ne(String, Literal),
    And(Vec<Expression>),
    Or(Vec<Expression>),
    Not(Box<Expression>),
    /// Bare variable truthiness
    Var(String),
}

impl Expression {
    /// Evaluate against a validated configuration
    ///
    /// Undeclared names are rejected when the blueprint loads; the lookup here
    /// still fails cleanly with [`RenderError::UndefinedReference`].
    pub fn evaluate(&self, cfg: &Configuration) -> Result<bool, RenderError> {
        evaluate(self, cfg)
    }

    /// Every variable name the expression reads
    pub fn variables(&self) -> BTreeSet<&str> {
        let mut names = BTreeSet::new();
        self.collect_variables(&mut names);
        names
    }

    fn collect_variables<'a>(&'a self, names: &mut BTreeSet<&'a str>) {
        match self {
            Expression::Eq(var, _) | Expression::Ne(var, _) | Expression::Var(var) => {
                names.insert(var.as_str());
            }
            Expression::And(items) | Expression::Or(items) => {
                for item in items {
                    item.collect_variables(names);
                }
            }
            Expression::Not(inner) => inner.collect_variables(names),
        }
    }

    /// Check variable names and literal kinds against a schema
    pub fn check_schema(&self, schema: &[Variable]) -> Result<(), SchemaMismatch> {
        let lookup = |name: &str| {
            schema
                .iter()
                .find(|v| v.name == name)
                .ok_or_else(|| SchemaMismatch::Undeclared(name.to_string()))
        };

        match self {
            Expression::Var(var) => lookup(var).map(|_| ()),
            Expression::Eq(var, literals) => {
                let variable = lookup(var)?;
                literals
                    .iter()
                    .try_for_each(|literal| check_literal(variable, literal))
            }
            Expression::Ne(var, literal) => check_literal(lookup(var)?, literal),
            Expression::And(items) | Expression::Or(items) => {
                items.iter().try_for_each(|item| item.check_schema(schema))
            }
            Expression::Not(inner) => inner.check_schema(schema),
        }
    }
}

/// Why an expression does not fit the schema it will be evaluated against
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaMismatch {
    Undeclared(String),
    Literal { name: String, message: String },
}

fn check_literal(variable: &Variable, literal: &Literal) -> Result<(), SchemaMismatch> {
    let mismatch = |message: String| SchemaMismatch::Literal {
        name: variable.name.clone(),
        message,
    };

    match (variable.kind, literal) {
        (VariableKind::Enum, Literal::Str(s)) => {
            if variable.allowed_values.iter().any(|a| a == s) {
                Ok(())
            } else {
                Err(mismatch(format!(
                    "{} is not an allowed value of '{}' ([{}])",
                    literal,
                    variable.name,
                    variable.allowed_values.join(", ")
                )))
            }
        }
        (VariableKind::String | VariableKind::List, Literal::Str(_))
        | (VariableKind::Bool, Literal::Bool(_))
        | (VariableKind::Int, Literal::Int(_)) => Ok(()),
        (kind, _) => Err(mismatch(format!(
            "'{}' is {} and cannot be compared with {}",
            variable.name, kind, literal
        ))),
    }
}

/// Evaluate a condition; pure and deterministic
pub fn evaluate(expr: &Expression, cfg: &Configuration) -> Result<bool, RenderError> {
    let lookup = |name: &str| {
        cfg.get(name).ok_or_else(|| RenderError::UndefinedReference {
            name: name.to_string(),
            line: 0,
        })
    };

    match expr {
        Expression::Var(var) => Ok(lookup(var)?.is_truthy()),
        Expression::Eq(var, literals) => {
            let value = lookup(var)?;
            Ok(literals.iter().any(|literal| literal.matches(value)))
        }
        Expression::Ne(var, literal) => Ok(!literal.matches(lookup(var)?)),
        Expression::And(items) => {
            for item in items {
                if !evaluate(item, cfg)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        Expression::Or(items) => {
            for item in items {
                if evaluate(item, cfg)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        Expression::Not(inner) => Ok(!evaluate(inner, cfg)?),
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn nested(f: &mut fmt::Formatter<'_>, expr: &Expression) -> fmt::Result {
            match expr {
                Expression::Var(var) => write!(f, ".{}", var),
                other => write!(f, "({})", other),
            }
        }

        match self {
            Expression::Var(var) => write!(f, ".{}", var),
            Expression::Eq(var, literals) => {
                write!(f, "eq .{}", var)?;
                for literal in literals {
                    write!(f, " {}", literal)?;
                }
                Ok(())
            }
            Expression::Ne(var, literal) => write!(f, "ne .{} {}", var, literal),
            Expression::And(items) | Expression::Or(items) => {
                let name = if matches!(self, Expression::And(_)) {
                    "and"
                } else {
                    "or"
                };
                f.write_str(name)?;
                for item in items {
                    f.write_str(" ")?;
                    nested(f, item)?;
                }
                Ok(())
            }
            Expression::Not(inner) => {
                f.write_str("not ")?;
                nested(f, inner)
            }
        }
    }
}

impl std::str::FromStr for Expression {
    type Err = super::parser::ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        super::parser::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::validate;
    use std::collections::HashMap;

    fn schema() -> Vec<Variable> {
        vec![
            Variable::new("Framework", VariableKind::Enum)
                .with_allowed(["stdlib", "gin", "echo"])
                .with_default("stdlib"),
            Variable::new("AuthType", VariableKind::String),
            Variable::new("EnableWorker", VariableKind::Bool).with_default("true"),
            Variable::new("EnableCLI", VariableKind::Bool),
            Variable::new("Replicas", VariableKind::Int).with_default("3"),
            Variable::new("Features", VariableKind::List).with_default("auth,metrics"),
        ]
    }

    fn config(pairs: &[(&str, &str)]) -> Configuration {
        let raw: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        validate(&schema(), &raw).unwrap()
    }

    fn eval(source: &str, cfg: &Configuration) -> bool {
        source.parse::<Expression>().unwrap().evaluate(cfg).unwrap()
    }

    #[test]
    fn test_eq_and_ne() {
        let cfg = config(&[("Framework", "gin")]);
        assert!(eval(r#"eq .Framework "gin""#, &cfg));
        assert!(eval(r#"eq .Framework "echo" "gin""#, &cfg));
        assert!(!eval(r#"eq .Framework "stdlib""#, &cfg));
        assert!(eval(r#"ne .Framework "stdlib""#, &cfg));
        assert!(eval("eq .Replicas 3", &cfg));
    }

    #[test]
    fn test_boolean_combinators() {
        let cfg = config(&[("EnableWorker", "true"), ("EnableCLI", "false")]);
        assert!(eval("and .EnableWorker (not .EnableCLI)", &cfg));
        assert!(!eval("and .EnableWorker .EnableCLI", &cfg));
        assert!(eval("or .EnableCLI .EnableWorker", &cfg));
        assert!(!eval("not .EnableWorker", &cfg));
    }

    #[test]
    fn test_string_truthiness_and_list_membership() {
        let cfg = config(&[]);
        assert!(!eval(".AuthType", &cfg));
        assert!(!eval(r#"ne .AuthType """#, &cfg));
        assert!(eval(r#"eq .Features "metrics""#, &cfg));
        assert!(!eval(r#"eq .Features "tracing""#, &cfg));
    }

    #[test]
    fn test_undefined_reference_at_runtime() {
        let cfg = config(&[]);
        let expr: Expression = ".Missing".parse().unwrap();
        assert!(matches!(
            expr.evaluate(&cfg),
            Err(RenderError::UndefinedReference { .. })
        ));
    }

    #[test]
    fn test_check_schema() {
        let schema = schema();
        let ok: Expression = r#"and (eq .Framework "gin") .EnableCLI"#.parse().unwrap();
        assert!(ok.check_schema(&schema).is_ok());

        let undeclared: Expression = "not .Framwork".parse().unwrap();
        assert_eq!(
            undeclared.check_schema(&schema),
            Err(SchemaMismatch::Undeclared("Framwork".to_string()))
        );

        let bad_enum: Expression = r#"eq .Framework "fiber""#.parse().unwrap();
        assert!(matches!(
            bad_enum.check_schema(&schema),
            Err(SchemaMismatch::Literal { .. })
        ));

        let bad_kind: Expression = r#"eq .EnableCLI "yes""#.parse().unwrap();
        assert!(matches!(
            bad_kind.check_schema(&schema),
            Err(SchemaMismatch::Literal { .. })
        ));
    }

    #[test]
    fn test_display_round_trips_through_parser() {
        let source = r#"and .EnableWorker (not .EnableCLI) (eq .Framework "gin" "echo")"#;
        let expr: Expression = source.parse().unwrap();
        assert_eq!(expr.to_string(), source);
        assert_eq!(expr.variables().len(), 3);
    }
}
