//! Blueprint manifest types and parsing

use crate::schema::Variable;
use serde::{Deserialize, Serialize};

/// Target ecosystem of the generated dependency manifests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Ecosystem {
    /// `go.mod` per module, `go.work` for multi-module output
    Go,
    /// `Cargo.toml` per module, a root `Cargo.toml` workspace for multi-module output
    Cargo,
    /// No dependency manifests are generated
    #[default]
    None,
}

/// Catalog manifest (blueprints/blueprints.yaml)
/// Lists available blueprints and fragment files shared by all of them
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogManifest {
    /// List of blueprint directory names (which are also their ids)
    pub blueprints: Vec<String>,

    /// Fragment sources relative to the catalog root, bundled into every blueprint
    #[serde(default)]
    pub shared_fragments: Vec<String>,
}

/// A module root declared by a blueprint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleSpec {
    /// Directory of the module relative to the project root ("." for the root)
    pub path: String,

    /// Module name/path template, e.g. `{{.ModulePath}}/cmd/worker`
    pub name: String,

    /// Toolchain version template, e.g. `{{.GoVersion}}`
    #[serde(default)]
    pub toolchain: Option<String>,
}

/// One file of a blueprint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSpec {
    /// Source template path relative to the blueprint directory
    pub source: String,

    /// Destination path template (defaults to source without a `.tmpl` suffix)
    #[serde(default)]
    pub destination: Option<String>,

    /// Inclusion condition, e.g. `ne .AuthType ""`
    #[serde(default)]
    pub condition: Option<String>,

    /// Octal file mode such as "0755"
    #[serde(default)]
    pub mode: Option<String>,
}

impl FileSpec {
    /// Get the destination template (falls back to source minus `.tmpl`)
    pub fn destination(&self) -> &str {
        self.destination
            .as_deref()
            .unwrap_or_else(|| self.source.strip_suffix(".tmpl").unwrap_or(&self.source))
    }
}

/// Per-blueprint manifest (blueprints/<id>/blueprint.yaml)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlueprintManifest {
    /// Identifier used on the command line
    pub id: String,

    /// Description of what the blueprint generates
    #[serde(default)]
    pub description: String,

    /// Semver version for engine compatibility checking
    #[serde(default = "default_version")]
    pub version: String,

    #[serde(default)]
    pub ecosystem: Ecosystem,

    #[serde(default)]
    pub variables: Vec<Variable>,

    #[serde(default)]
    pub modules: Vec<ModuleSpec>,

    /// Fragment sources relative to the blueprint directory
    #[serde(default)]
    pub fragments: Vec<String>,

    pub files: Vec<FileSpec>,
}

fn default_version() -> String {
    "0.1.0".to_string()
}
