//! Blueprint manifests and loading

pub mod loader;
pub mod manifest;

pub use loader::{Blueprint, BlueprintLibrary, FileEntry, Module, CATALOG_FILE, MANIFEST_FILE};
pub use manifest::{BlueprintManifest, CatalogManifest, Ecosystem, FileSpec, ModuleSpec};
