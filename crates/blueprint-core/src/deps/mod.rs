//! Dependency facts, their aggregation and manifest output

pub mod aggregator;
pub mod format;

pub use aggregator::{
    aggregate, resolve_version, workspace_index, AggregateManifest, Aggregator, DependencyFact,
    ModuleInfo, PathOverride, ResolvedDependency, WorkspaceIndex,
};
pub use format::{format_for, manifest_destination, CargoFormat, GoFormat, ManifestFormat};
