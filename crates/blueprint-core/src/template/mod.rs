//! Template rendering for destination paths and file contents
//!
//! Supported actions:
//! - `{{.Var}}` interpolation, `{{.}}` inside `range`
//! - `{{if EXPR}}` / `{{else if EXPR}}` / `{{else}}` / `{{end}}`, nested freely
//! - `{{range .List}} ... {{else}} ... {{end}}`
//! - `{{define "name"}} ... {{end}}` and `{{template "name"}}` for fragments
//! - `{{require "package/path" "version"}}` to declare a dependency
//! - `{{/* comment */}}`
//!
//! `{{-` and `-}}` trim surrounding whitespace. A block action alone on its
//! line takes the whole line with it.

mod lexer;
pub mod parser;
pub mod renderer;

pub use parser::Template;
pub use renderer::{
    normalize_destination, render, render_inline, render_path, render_template, FragmentSet,
    RenderOutcome, Rendered, Requirement,
};
