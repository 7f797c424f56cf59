//! Shared helpers for running the bundled blueprints

#![allow(dead_code)]

use blueprint_core::{BlueprintLibrary, GenerationSession, OverwritePolicy, StagedOutput};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

pub fn library() -> BlueprintLibrary {
    BlueprintLibrary::new(Path::new(env!("CARGO_MANIFEST_DIR")).join("../../blueprints"))
}

pub fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

pub async fn session(id: &str, pairs: &[(&str, &str)]) -> GenerationSession {
    let blueprint = library().load(id).await.unwrap();
    GenerationSession::new(blueprint, &vars(pairs)).unwrap()
}

pub async fn stage(id: &str, pairs: &[(&str, &str)]) -> StagedOutput {
    session(id, pairs).await.stage().await.unwrap()
}

/// Generate into a fresh temporary directory
pub async fn generate(id: &str, pairs: &[(&str, &str)]) -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    session(id, pairs)
        .await
        .run(dir.path(), OverwritePolicy::Refuse)
        .await
        .unwrap();
    dir
}

pub fn read(root: &Path, relative: &str) -> String {
    std::fs::read_to_string(root.join(relative))
        .unwrap_or_else(|e| panic!("reading {}: {}", relative, e))
}

/// Every regular file below `root`, relative and sorted
pub fn files(root: &Path) -> Vec<String> {
    let mut found: Vec<String> = WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| relative(root, e.path()))
        .collect();
    found.sort();
    found
}

pub fn relative(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .map(PathBuf::from)
        .unwrap_or_else(|_| path.to_path_buf())
        .to_string_lossy()
        .replace('\\', "/")
}
