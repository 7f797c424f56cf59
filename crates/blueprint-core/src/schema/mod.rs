//! Variable schema and configuration validation

pub mod validator;
pub mod variable;

pub use validator::{coerce, validate};
pub use variable::{Configuration, Value, Variable, VariableKind};
