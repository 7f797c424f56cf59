//! Condition expressions gating file inclusion and template blocks

pub mod expr;
pub mod parser;

pub use expr::{evaluate, Expression, Literal, SchemaMismatch};
pub use parser::{parse, ParseError};
