//! Blueprint loading from a local blueprint library
//!
//! A library is a directory with a `blueprints.yaml` catalog and one
//! subdirectory per blueprint, each holding a `blueprint.yaml` manifest and
//! its template sources. Everything a blueprint needs is read into memory and
//! cross-checked here, before any rendering starts.

use super::manifest::{BlueprintManifest, CatalogManifest, Ecosystem, FileSpec, ModuleSpec};
use crate::condition::{self, Expression, SchemaMismatch};
use crate::error::ManifestError;
use crate::product::ProductConfig;
use crate::schema::{coerce, Variable, VariableKind};
use crate::template::{normalize_destination, FragmentSet, Template};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};
use walkdir::WalkDir;

pub const CATALOG_FILE: &str = "blueprints.yaml";
pub const MANIFEST_FILE: &str = "blueprint.yaml";

const DEFAULT_MODE: u32 = 0o644;

/// A module root inside the generated tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Module {
    /// Normalized directory ("." for the project root)
    pub path: String,
    pub name: String,
    pub toolchain: Option<String>,
}

impl Module {
    /// True if `destination` lies inside this module's directory
    pub fn contains(&self, destination: &str) -> bool {
        self.path == "."
            || destination
                .strip_prefix(self.path.as_str())
                .is_some_and(|rest| rest.starts_with('/'))
    }
}

/// One file of a loaded blueprint, with its template source in memory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    pub source: String,
    pub destination: String,
    pub condition: Option<Expression>,
    pub mode: u32,
    pub content: String,
}

/// A loaded, cross-checked blueprint; immutable from here on
#[derive(Debug, Clone)]
pub struct Blueprint {
    pub id: String,
    pub description: String,
    pub version: String,
    pub ecosystem: Ecosystem,
    pub variables: Vec<Variable>,
    pub modules: Vec<Module>,
    pub fragments: FragmentSet,
    pub files: Vec<FileEntry>,
}

impl Blueprint {
    /// Assemble a blueprint from its manifest and in-memory sources
    ///
    /// `sources` maps each file's `source` path to its template text;
    /// `fragment_sources` are `(origin, text)` pairs registered in order.
    pub fn build(
        manifest: BlueprintManifest,
        sources: &BTreeMap<String, String>,
        fragment_sources: &[(String, String)],
    ) -> Result<Self, ManifestError> {
        check_variables(&manifest.variables)?;
        let modules = check_modules(&manifest.modules, manifest.ecosystem)?;

        let mut fragments = FragmentSet::new();
        for (origin, source) in fragment_sources {
            let names = fragments
                .add_source(source)
                .map_err(|e| ManifestError::Parse {
                    path: PathBuf::from(origin),
                    message: e.to_string(),
                })?;
            debug!(origin = %origin, fragments = ?names, "registered fragments");
        }

        let files = manifest
            .files
            .iter()
            .map(|spec| build_entry(spec, &manifest.variables, sources))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            id: manifest.id,
            description: manifest.description,
            version: manifest.version,
            ecosystem: manifest.ecosystem,
            variables: manifest.variables,
            modules,
            fragments,
            files,
        })
    }

    pub fn variable(&self, name: &str) -> Option<&Variable> {
        self.variables.iter().find(|v| v.name == name)
    }

    /// True if the blueprint declares more than one module
    pub fn is_multi_module(&self) -> bool {
        self.modules.len() > 1
    }

    /// Innermost declared module containing `destination`
    pub fn module_for(&self, destination: &str) -> Option<&Module> {
        self.modules
            .iter()
            .filter(|m| m.contains(destination))
            .max_by_key(|m| if m.path == "." { 0 } else { m.path.len() })
    }
}

fn check_variables(variables: &[Variable]) -> Result<(), ManifestError> {
    let mut seen = HashSet::new();
    for variable in variables {
        if !seen.insert(variable.name.as_str()) {
            return Err(ManifestError::DuplicateVariable {
                name: variable.name.clone(),
            });
        }

        let invalid = |message: String| ManifestError::InvalidDefault {
            name: variable.name.clone(),
            message,
        };

        if variable.kind == VariableKind::Enum {
            if variable.allowed_values.is_empty() {
                return Err(invalid("enum declares no allowed values".to_string()));
            }
            let zero_allowed = variable.allowed_values.iter().any(String::is_empty);
            if !variable.required && variable.default.is_none() && !zero_allowed {
                return Err(invalid("optional enum needs a default".to_string()));
            }
        }
        if let Some(default) = &variable.default {
            coerce(variable, default).map_err(|e| invalid(e.to_string()))?;
        }
    }
    Ok(())
}

fn check_modules(specs: &[ModuleSpec], ecosystem: Ecosystem) -> Result<Vec<Module>, ManifestError> {
    let mut modules: Vec<Module> = Vec::with_capacity(specs.len());
    for spec in specs {
        let path = match spec.path.trim() {
            "" | "." | "./" => ".".to_string(),
            raw => normalize_destination(raw).map_err(|e| ManifestError::InvalidModule {
                path: spec.path.clone(),
                message: e.to_string(),
            })?,
        };
        if modules.iter().any(|m| m.path == path) {
            return Err(ManifestError::InvalidModule {
                path,
                message: "declared more than once".to_string(),
            });
        }
        modules.push(Module {
            path,
            name: spec.name.clone(),
            toolchain: spec.toolchain.clone(),
        });
    }

    if ecosystem != Ecosystem::None && modules.is_empty() {
        return Err(ManifestError::InvalidModule {
            path: ".".to_string(),
            message: "an ecosystem is set but no module is declared".to_string(),
        });
    }
    if ecosystem == Ecosystem::Cargo && modules.len() > 1 && modules.iter().any(|m| m.path == ".") {
        return Err(ManifestError::InvalidModule {
            path: ".".to_string(),
            message: "a cargo workspace root cannot also be a member module".to_string(),
        });
    }
    Ok(modules)
}

fn build_entry(
    spec: &FileSpec,
    schema: &[Variable],
    sources: &BTreeMap<String, String>,
) -> Result<FileEntry, ManifestError> {
    let entry = spec.source.clone();

    let condition = match &spec.condition {
        Some(raw) => {
            let expr = condition::parse(raw).map_err(|e| ManifestError::InvalidCondition {
                entry: entry.clone(),
                message: e.to_string(),
            })?;
            expr.check_schema(schema).map_err(|mismatch| match mismatch {
                SchemaMismatch::Undeclared(name) => ManifestError::UndeclaredVariable {
                    entry: entry.clone(),
                    name,
                },
                SchemaMismatch::Literal { message, .. } => ManifestError::LiteralMismatch {
                    entry: entry.clone(),
                    message,
                },
            })?;
            Some(expr)
        }
        None => None,
    };

    let mode = match &spec.mode {
        Some(raw) => parse_mode(raw).ok_or_else(|| ManifestError::InvalidMode {
            entry: entry.clone(),
            mode: raw.clone(),
        })?,
        None => DEFAULT_MODE,
    };

    let content = sources
        .get(&spec.source)
        .cloned()
        .ok_or_else(|| ManifestError::MissingSource {
            entry: entry.clone(),
            path: PathBuf::from(&spec.source),
        })?;

    // Malformed templates are reported at render time, with their line
    let declared = |name: &String| schema.iter().any(|v| &v.name == name);
    for template in [content.as_str(), spec.destination()] {
        if let Ok(parsed) = Template::parse(template) {
            if let Some(name) = parsed.referenced_variables().into_iter().find(|n| !declared(n)) {
                return Err(ManifestError::UndeclaredVariable { entry, name });
            }
        }
    }

    Ok(FileEntry {
        source: spec.source.clone(),
        destination: spec.destination().to_string(),
        condition,
        mode,
        content,
    })
}

/// Parse an octal permission string such as "0755" or "644"
fn parse_mode(raw: &str) -> Option<u32> {
    let digits = raw.trim().trim_start_matches("0o");
    u32::from_str_radix(digits, 8).ok().filter(|mode| *mode <= 0o7777)
}

/// Local blueprint library rooted at a directory
#[derive(Debug, Clone)]
pub struct BlueprintLibrary {
    root: PathBuf,
}

impl BlueprintLibrary {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolve the library root: explicit path, then the product's env var,
    /// then its default directory
    pub fn from_config<C: ProductConfig>(config: &C, explicit: Option<PathBuf>) -> Self {
        let root = explicit
            .or_else(|| std::env::var_os(config.blueprint_dir_env()).map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(config.default_blueprint_dir()));
        Self::new(root)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Read the catalog listing available blueprints
    pub async fn catalog(&self) -> Result<CatalogManifest, ManifestError> {
        let path = self.root.join(CATALOG_FILE);
        let content = read_text(&path).await?;
        serde_yaml::from_str(&content).map_err(|e| ManifestError::Parse {
            path,
            message: e.to_string(),
        })
    }

    /// Load one blueprint by id, including the catalog's shared fragments
    pub async fn load(&self, id: &str) -> Result<Blueprint, ManifestError> {
        let catalog = self.catalog().await?;
        if !catalog.blueprints.iter().any(|b| b == id) {
            return Err(ManifestError::BlueprintNotFound {
                id: id.to_string(),
                available: catalog.blueprints.clone(),
            });
        }

        let mut shared = Vec::new();
        for source in &catalog.shared_fragments {
            shared.extend(read_fragment_sources(&self.root, source).await?);
        }

        let blueprint = Self::load_dir(&self.root.join(id), &shared).await?;
        if blueprint.id != id {
            warn!(directory = id, manifest_id = %blueprint.id, "blueprint id differs from its directory name");
        }
        Ok(blueprint)
    }

    /// Load a blueprint directory that is not necessarily part of a catalog
    pub async fn load_dir(dir: &Path, shared: &[(String, String)]) -> Result<Blueprint, ManifestError> {
        let manifest_path = dir.join(MANIFEST_FILE);
        let content = read_text(&manifest_path).await?;
        let manifest: BlueprintManifest =
            serde_yaml::from_str(&content).map_err(|e| ManifestError::Parse {
                path: manifest_path.clone(),
                message: e.to_string(),
            })?;

        let mut sources = BTreeMap::new();
        for spec in &manifest.files {
            if sources.contains_key(&spec.source) {
                continue;
            }
            let path = contained(dir, &spec.source, &manifest_path)?;
            let text = match fs::read_to_string(&path).await {
                Ok(text) => text,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    return Err(ManifestError::MissingSource {
                        entry: spec.source.clone(),
                        path,
                    })
                }
                Err(source) => return Err(ManifestError::Read { path, source }),
            };
            sources.insert(spec.source.clone(), text);
        }

        let mut fragment_sources = shared.to_vec();
        for source in &manifest.fragments {
            contained(dir, source, &manifest_path)?;
            fragment_sources.extend(read_fragment_sources(dir, source).await?);
        }

        debug!(
            blueprint = %manifest.id,
            files = manifest.files.len(),
            fragments = fragment_sources.len(),
            "loaded blueprint sources"
        );
        Blueprint::build(manifest, &sources, &fragment_sources)
    }
}

async fn read_text(path: &Path) -> Result<String, ManifestError> {
    fs::read_to_string(path)
        .await
        .map_err(|source| ManifestError::Read {
            path: path.to_path_buf(),
            source,
        })
}

/// Join a manifest-relative path, refusing anything that leaves `base`
fn contained(base: &Path, relative: &str, manifest: &Path) -> Result<PathBuf, ManifestError> {
    normalize_destination(relative)
        .map(|clean| base.join(clean))
        .map_err(|_| ManifestError::Parse {
            path: manifest.to_path_buf(),
            message: format!("'{}' must be a relative path inside the blueprint", relative),
        })
}

/// Read a fragment file, or every file below a fragment directory in name order
async fn read_fragment_sources(base: &Path, relative: &str) -> Result<Vec<(String, String)>, ManifestError> {
    let path = base.join(relative);
    if !path.is_dir() {
        return Ok(vec![(relative.to_string(), read_text(&path).await?)]);
    }

    let mut found = Vec::new();
    for entry in WalkDir::new(&path).sort_by_file_name() {
        let entry = entry.map_err(|e| ManifestError::Read {
            path: path.clone(),
            source: e.into(),
        })?;
        if entry.file_type().is_file() {
            let origin = entry
                .path()
                .strip_prefix(base)
                .unwrap_or(entry.path())
                .to_string_lossy()
                .replace('\\', "/");
            found.push((origin, read_text(entry.path()).await?));
        }
    }
    Ok(found)
}
