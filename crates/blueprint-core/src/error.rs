//! Error taxonomy for a generation run
//!
//! Each component owns its error enum; [`GenerateError`] wraps them with the
//! blueprint id (and file entry where relevant) so the caller can pinpoint the
//! cause and map it to a distinct exit code.

use std::path::PathBuf;
use thiserror::Error;

/// Raw user input does not satisfy the blueprint's variable schema
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    #[error("missing required variable '{name}'")]
    MissingVariable { name: String },

    #[error("variable '{name}' expects {expected}, got '{value}'")]
    InvalidType {
        name: String,
        expected: String,
        value: String,
    },

    #[error("variable '{name}' must be one of [{}], got '{value}'", .allowed.join(", "))]
    InvalidEnumValue {
        name: String,
        value: String,
        allowed: Vec<String>,
    },

    #[error("unknown variable '{name}'{}", did_you_mean(.suggestion))]
    UnknownVariable {
        name: String,
        suggestion: Option<String>,
    },
}

fn did_you_mean(suggestion: &Option<String>) -> String {
    match suggestion {
        Some(s) => format!(" (did you mean '{}'?)", s),
        None => String::new(),
    }
}

/// The blueprint itself is inconsistent; detected before any rendering
#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("failed to read {}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {}: {message}", .path.display())]
    Parse { path: PathBuf, message: String },

    #[error("blueprint '{id}' not found. Available blueprints: {}", .available.join(", "))]
    BlueprintNotFound { id: String, available: Vec<String> },

    #[error("variable '{name}' is declared more than once")]
    DuplicateVariable { name: String },

    #[error("variable '{name}' has an invalid default: {message}")]
    InvalidDefault { name: String, message: String },

    #[error("entry '{entry}': invalid condition: {message}")]
    InvalidCondition { entry: String, message: String },

    #[error("entry '{entry}': condition references undeclared variable '{name}'")]
    UndeclaredVariable { entry: String, name: String },

    #[error("entry '{entry}': {message}")]
    LiteralMismatch { entry: String, message: String },

    #[error("entry '{entry}': invalid file mode '{mode}'")]
    InvalidMode { entry: String, mode: String },

    #[error("entry '{entry}': source template {} does not exist", .path.display())]
    MissingSource { entry: String, path: PathBuf },

    #[error("module path '{path}' is invalid: {message}")]
    InvalidModule { path: String, message: String },

    #[error("destination '{path}' is produced by both '{first}' and '{second}'")]
    DuplicateDestination {
        path: String,
        first: String,
        second: String,
    },
}

/// A template could not be rendered; aborts the whole session
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RenderError {
    #[error("line {line}: undefined reference '{name}'")]
    UndefinedReference { name: String, line: usize },

    #[error("line {line}: malformed template: {message}")]
    MalformedTemplate { line: usize, message: String },

    #[error("line {line}: '{name}' is not a list and cannot be ranged over")]
    NotIterable { name: String, line: usize },

    #[error("line {line}: unknown fragment '{name}'")]
    UnknownFragment { name: String, line: usize },

    #[error("fragment '{name}' includes itself")]
    FragmentRecursion { name: String },

    #[error("destination template rendered to an empty path")]
    EmptyDestination,

    #[error("destination '{path}' escapes the project root")]
    PathEscape { path: String },

    #[error("'{package}' is required by a file outside every declared module ({path})")]
    DependencyOutsideModule { package: String, path: String },
}

/// Two facts for the same package disagree and cannot be ordered
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("conflicting versions for '{package}' in module '{module}': {left} vs {right}")]
pub struct DependencyConflict {
    pub module: String,
    pub package: String,
    pub left: String,
    pub right: String,
}

/// Writing the staged output failed; the destination was rolled back
#[derive(Debug, Error)]
pub enum MaterializationError {
    #[error("destination already exists: {}", .path.display())]
    DestinationExists { path: PathBuf },

    #[error("refusing to write through symlink {}", .path.display())]
    SymlinkInPath { path: PathBuf },

    #[error("failed to write {}{}", .path.display(), leftover_note(.leftovers))]
    PartialWriteFailure {
        path: PathBuf,
        #[source]
        source: std::io::Error,
        leftovers: Vec<PathBuf>,
    },

    #[error("commit cancelled{}", leftover_note(.leftovers))]
    Cancelled { leftovers: Vec<PathBuf> },

    #[error("failed to inspect {}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

fn leftover_note(leftovers: &[PathBuf]) -> String {
    if leftovers.is_empty() {
        String::new()
    } else {
        format!(" ({} path(s) could not be rolled back)", leftovers.len())
    }
}

/// Machine-distinguishable error class, one per exit code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Configuration,
    Manifest,
    Render,
    Dependency,
    Materialization,
    Cancelled,
    Internal,
}

impl ErrorClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorClass::Configuration => "configuration",
            ErrorClass::Manifest => "manifest",
            ErrorClass::Render => "render",
            ErrorClass::Dependency => "dependency",
            ErrorClass::Materialization => "materialization",
            ErrorClass::Cancelled => "cancelled",
            ErrorClass::Internal => "internal",
        }
    }

    pub fn exit_code(&self) -> u8 {
        match self {
            ErrorClass::Configuration => 2,
            ErrorClass::Manifest => 3,
            ErrorClass::Render => 4,
            ErrorClass::Dependency => 5,
            ErrorClass::Materialization => 6,
            ErrorClass::Cancelled => 130,
            ErrorClass::Internal => 1,
        }
    }
}

/// Any failure of a generation run, with enough context to locate it
#[derive(Debug, Error)]
pub enum GenerateError {
    #[error("blueprint '{blueprint}': {source}")]
    Configuration {
        blueprint: String,
        #[source]
        source: ConfigurationError,
    },

    #[error("blueprint '{blueprint}': {source}")]
    Manifest {
        blueprint: String,
        #[source]
        source: ManifestError,
    },

    #[error("blueprint '{blueprint}', entry '{entry}': {source}")]
    Render {
        blueprint: String,
        entry: String,
        #[source]
        source: RenderError,
    },

    #[error("blueprint '{blueprint}': {source}")]
    Dependency {
        blueprint: String,
        #[source]
        source: DependencyConflict,
    },

    #[error("blueprint '{blueprint}': {source}")]
    Materialization {
        blueprint: String,
        #[source]
        source: MaterializationError,
    },

    #[error("blueprint '{blueprint}': generation cancelled before commit")]
    Cancelled { blueprint: String },

    #[error("blueprint '{blueprint}': {message}")]
    Internal { blueprint: String, message: String },
}

impl GenerateError {
    pub fn class(&self) -> ErrorClass {
        match self {
            GenerateError::Configuration { .. } => ErrorClass::Configuration,
            GenerateError::Manifest { .. } => ErrorClass::Manifest,
            GenerateError::Render { .. } => ErrorClass::Render,
            GenerateError::Dependency { .. } => ErrorClass::Dependency,
            GenerateError::Materialization {
                source: MaterializationError::Cancelled { .. },
                ..
            } => ErrorClass::Cancelled,
            GenerateError::Materialization { .. } => ErrorClass::Materialization,
            GenerateError::Cancelled { .. } => ErrorClass::Cancelled,
            GenerateError::Internal { .. } => ErrorClass::Internal,
        }
    }

    pub fn exit_code(&self) -> u8 {
        self.class().exit_code()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_variable_suggestion_in_message() {
        let err = ConfigurationError::UnknownVariable {
            name: "Loger".to_string(),
            suggestion: Some("Logger".to_string()),
        };
        assert_eq!(
            err.to_string(),
            "unknown variable 'Loger' (did you mean 'Logger'?)"
        );
    }

    #[test]
    fn test_exit_codes_are_distinct() {
        let classes = [
            ErrorClass::Configuration,
            ErrorClass::Manifest,
            ErrorClass::Render,
            ErrorClass::Dependency,
            ErrorClass::Materialization,
            ErrorClass::Cancelled,
            ErrorClass::Internal,
        ];
        let codes: std::collections::HashSet<u8> =
            classes.iter().map(|c| c.exit_code()).collect();
        assert_eq!(codes.len(), classes.len());
        assert!(!codes.contains(&0));
    }

    #[test]
    fn test_render_error_carries_entry_context() {
        let err = GenerateError::Render {
            blueprint: "lambda-proxy".to_string(),
            entry: "handler.go.tmpl".to_string(),
            source: RenderError::UndefinedReference {
                name: "Framwork".to_string(),
                line: 3,
            },
        };
        let message = err.to_string();
        assert!(message.contains("lambda-proxy"));
        assert!(message.contains("handler.go.tmpl"));
        assert!(message.contains("Framwork"));
        assert_eq!(err.class(), ErrorClass::Render);
    }
}
