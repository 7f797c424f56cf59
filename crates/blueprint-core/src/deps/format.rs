//! Ecosystem-specific rendering of dependency manifests and workspace indexes

use super::aggregator::{AggregateManifest, PathOverride, WorkspaceIndex};
use crate::blueprint::Ecosystem;
use toml_edit::{value, Array, DocumentMut, InlineTable, Item, Table};

/// How one ecosystem spells its manifests
pub trait ManifestFormat: Send + Sync {
    /// Per-module manifest file name
    fn manifest_file(&self) -> &'static str;

    /// Workspace index file name, placed at the project root
    fn workspace_file(&self) -> &'static str;

    fn render_manifest(&self, manifest: &AggregateManifest, overrides: &[PathOverride]) -> String;

    fn render_workspace(&self, index: &WorkspaceIndex) -> String;
}

/// Formatter for an ecosystem, `None` when the blueprint generates no manifests
pub fn format_for(ecosystem: Ecosystem) -> Option<Box<dyn ManifestFormat>> {
    match ecosystem {
        Ecosystem::Go => Some(Box::new(GoFormat)),
        Ecosystem::Cargo => Some(Box::new(CargoFormat)),
        Ecosystem::None => None,
    }
}

/// Join a module directory and a file name into a destination
pub fn manifest_destination(module_path: &str, file: &str) -> String {
    if module_path == "." {
        file.to_string()
    } else {
        format!("{}/{}", module_path, file)
    }
}

/// `go.mod` and `go.work`
#[derive(Debug, Clone, Copy, Default)]
pub struct GoFormat;

impl ManifestFormat for GoFormat {
    fn manifest_file(&self) -> &'static str {
        "go.mod"
    }

    fn workspace_file(&self) -> &'static str {
        "go.work"
    }

    fn render_manifest(&self, manifest: &AggregateManifest, _overrides: &[PathOverride]) -> String {
        let mut out = format!("module {}\n", manifest.module.name);
        if let Some(toolchain) = &manifest.module.toolchain {
            out.push_str(&format!("\ngo {}\n", toolchain));
        }
        if !manifest.dependencies.is_empty() {
            out.push_str("\nrequire (\n");
            for dep in &manifest.dependencies {
                out.push_str(&format!("\t{} {}\n", dep.package_path, dep.version));
            }
            out.push_str(")\n");
        }
        out
    }

    fn render_workspace(&self, index: &WorkspaceIndex) -> String {
        let mut out = String::new();
        if let Some(toolchain) = &index.toolchain {
            out.push_str(&format!("go {}\n\n", toolchain));
        }
        out.push_str("use (\n");
        for member in &index.members {
            out.push_str(&format!("\t{}\n", go_dir(member)));
        }
        out.push_str(")\n");
        if !index.overrides.is_empty() {
            out.push('\n');
            for o in &index.overrides {
                out.push_str(&format!(
                    "replace {} => {}\n",
                    o.package_path,
                    go_dir(&o.module_path)
                ));
            }
        }
        out
    }
}

fn go_dir(path: &str) -> String {
    if path == "." {
        ".".to_string()
    } else {
        format!("./{}", path)
    }
}

/// `Cargo.toml` per member and a root `Cargo.toml` workspace
#[derive(Debug, Clone, Copy, Default)]
pub struct CargoFormat;

impl ManifestFormat for CargoFormat {
    fn manifest_file(&self) -> &'static str {
        "Cargo.toml"
    }

    fn workspace_file(&self) -> &'static str {
        "Cargo.toml"
    }

    fn render_manifest(&self, manifest: &AggregateManifest, overrides: &[PathOverride]) -> String {
        let mut package = Table::new();
        package["name"] = value(manifest.module.name.as_str());
        package["version"] = value("0.1.0");
        package["edition"] = value("2021");
        if let Some(toolchain) = &manifest.module.toolchain {
            package["rust-version"] = value(toolchain.as_str());
        }

        let mut dependencies = Table::new();
        for dep in &manifest.dependencies {
            let spec = if overrides.iter().any(|o| o.package_path == dep.package_path) {
                let mut inline = InlineTable::new();
                inline.insert("workspace", true.into());
                value(inline)
            } else {
                value(dep.version.strip_prefix('v').unwrap_or(&dep.version))
            };
            dependencies.insert(dep.package_path.as_str(), spec);
        }

        let mut doc = DocumentMut::new();
        doc.insert("package", Item::Table(package));
        doc.insert("dependencies", Item::Table(dependencies));
        doc.to_string()
    }

    fn render_workspace(&self, index: &WorkspaceIndex) -> String {
        let mut workspace = Table::new();
        workspace["resolver"] = value("2");
        workspace["members"] = value(index.members.iter().map(String::as_str).collect::<Array>());

        if let Some(toolchain) = &index.toolchain {
            let mut package = Table::new();
            package["rust-version"] = value(toolchain.as_str());
            workspace.insert("package", Item::Table(package));
        }
        if !index.overrides.is_empty() {
            let mut dependencies = Table::new();
            for o in &index.overrides {
                let mut inline = InlineTable::new();
                inline.insert("path", o.module_path.as_str().into());
                dependencies.insert(o.package_path.as_str(), value(inline));
            }
            workspace.insert("dependencies", Item::Table(dependencies));
        }

        let mut doc = DocumentMut::new();
        doc.insert("workspace", Item::Table(workspace));
        doc.to_string()
    }
}
