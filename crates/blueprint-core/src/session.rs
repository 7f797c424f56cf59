//! One generation run: validate, stage, commit
//!
//! Nothing touches the destination before [`GenerationSession::commit`].
//! Rendering fans out one blocking task per included file entry; dependency
//! facts are only aggregated once every task has finished.

use crate::blueprint::{Blueprint, FileEntry};
use crate::condition::evaluate;
use crate::deps::{
    aggregate, format_for, manifest_destination, workspace_index, AggregateManifest,
    DependencyFact, ModuleInfo, WorkspaceIndex,
};
use crate::error::{GenerateError, ManifestError, RenderError};
use crate::materialize::{CommitReport, Materializer, OverwritePolicy, StagedFile};
use crate::schema::{validate, Configuration};
use crate::template::{render, render_inline, render_path, Rendered, RenderOutcome};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// Shared cancellation signal, checked at the render barrier and between writes
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Everything a run would write, fully rendered
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StagedOutput {
    /// Rendered files in manifest order, then generated manifests
    pub files: Vec<StagedFile>,
    pub manifests: Vec<AggregateManifest>,
    pub workspace: Option<WorkspaceIndex>,
    /// Destinations whose content rendered empty
    pub dropped: Vec<String>,
    /// Sources whose inclusion condition was false
    pub excluded: Vec<String>,
}

impl StagedOutput {
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.files.iter().map(|f| f.path.as_str())
    }
}

/// An included entry after its path and content were rendered
struct RenderedEntry {
    index: usize,
    destination: String,
    rendered: Rendered,
}

pub struct GenerationSession {
    blueprint: Arc<Blueprint>,
    config: Arc<Configuration>,
    cancel: CancelFlag,
}

impl GenerationSession {
    /// Validate raw bindings against the blueprint's schema
    pub fn new(
        blueprint: impl Into<Arc<Blueprint>>,
        raw: &HashMap<String, String>,
    ) -> Result<Self, GenerateError> {
        let blueprint = blueprint.into();
        let config = validate(&blueprint.variables, raw).map_err(|source| {
            GenerateError::Configuration {
                blueprint: blueprint.id.clone(),
                source,
            }
        })?;
        debug!(blueprint = %blueprint.id, bindings = config.len(), "configuration resolved");
        Ok(Self {
            blueprint,
            config: Arc::new(config),
            cancel: CancelFlag::new(),
        })
    }

    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn blueprint(&self) -> &Blueprint {
        &self.blueprint
    }

    pub fn configuration(&self) -> &Configuration {
        &self.config
    }

    /// Render everything in memory; the filesystem is not touched
    pub async fn stage(&self) -> Result<StagedOutput, GenerateError> {
        let blueprint = &self.blueprint;
        let mut staged = StagedOutput::default();

        let mut included = Vec::new();
        for (index, entry) in blueprint.files.iter().enumerate() {
            let keep = match &entry.condition {
                Some(condition) => evaluate(condition, &self.config)
                    .map_err(|source| self.render_error(&entry.source, source))?,
                None => true,
            };
            debug!(source = %entry.source, included = keep, "evaluated entry condition");
            if keep {
                included.push(index);
            } else {
                staged.excluded.push(entry.source.clone());
            }
        }

        let rendered = self.render_all(included).await?;

        let mut owners: BTreeMap<&str, &str> = BTreeMap::new();
        for item in &rendered {
            let source = blueprint.files[item.index].source.as_str();
            if let Some(first) = owners.insert(item.destination.as_str(), source) {
                return Err(self.manifest_error(ManifestError::DuplicateDestination {
                    path: item.destination.clone(),
                    first: first.to_string(),
                    second: source.to_string(),
                }));
            }
        }

        let mut facts = Vec::new();
        let mut active_modules = BTreeSet::new();
        for item in &rendered {
            let entry = &blueprint.files[item.index];
            let module = blueprint.module_for(&item.destination);

            if !item.rendered.is_dropped() {
                if let Some(module) = module {
                    active_modules.insert(module.path.clone());
                }
            }

            for requirement in &item.rendered.requirements {
                let Some(module) = module else {
                    if blueprint.modules.is_empty() {
                        warn!(
                            package = %requirement.package_path,
                            source = %entry.source,
                            "blueprint declares no modules, ignoring dependency"
                        );
                        continue;
                    }
                    return Err(self.render_error(
                        &entry.source,
                        RenderError::DependencyOutsideModule {
                            package: requirement.package_path.clone(),
                            path: item.destination.clone(),
                        },
                    ));
                };
                facts.push(DependencyFact {
                    module_scope: module.path.clone(),
                    package_path: requirement.package_path.clone(),
                    version: requirement.version.clone(),
                    condition: entry.condition.clone(),
                    origin: entry.source.clone(),
                });
            }

            match &item.rendered.outcome {
                RenderOutcome::Content(content) => staged.files.push(StagedFile {
                    path: item.destination.clone(),
                    content: content.clone(),
                    mode: entry.mode,
                }),
                RenderOutcome::Drop => {
                    debug!(destination = %item.destination, "dropping empty file");
                    staged.dropped.push(item.destination.clone());
                }
            }
        }

        if let Some(format) = format_for(blueprint.ecosystem) {
            let modules = blueprint
                .modules
                .iter()
                .filter(|m| active_modules.contains(&m.path))
                .map(|m| self.module_info(&m.path, &m.name, m.toolchain.as_deref()))
                .collect::<Result<Vec<_>, _>>()?;

            let manifests = aggregate(modules, facts).map_err(|source| GenerateError::Dependency {
                blueprint: blueprint.id.clone(),
                source,
            })?;

            let workspace = blueprint.is_multi_module().then(|| workspace_index(&manifests));
            let overrides = workspace.as_ref().map(|w| w.overrides.as_slice()).unwrap_or(&[]);

            let mut generated = Vec::new();
            for manifest in &manifests {
                generated.push(StagedFile {
                    path: manifest_destination(&manifest.module.path, format.manifest_file()),
                    content: format.render_manifest(manifest, overrides).into_bytes(),
                    mode: 0o644,
                });
            }
            if let Some(index) = &workspace {
                generated.push(StagedFile {
                    path: format.workspace_file().to_string(),
                    content: format.render_workspace(index).into_bytes(),
                    mode: 0o644,
                });
            }

            for file in &generated {
                if let Some(first) = owners.get(file.path.as_str()) {
                    return Err(self.manifest_error(ManifestError::DuplicateDestination {
                        path: file.path.clone(),
                        first: first.to_string(),
                        second: "generated manifest".to_string(),
                    }));
                }
            }

            staged.files.extend(generated);
            staged.manifests = manifests;
            staged.workspace = workspace;
        } else if !facts.is_empty() {
            warn!(count = facts.len(), "blueprint has no ecosystem, ignoring dependencies");
        }

        if self.cancel.is_cancelled() {
            return Err(GenerateError::Cancelled {
                blueprint: blueprint.id.clone(),
            });
        }

        info!(
            blueprint = %blueprint.id,
            files = staged.files.len(),
            dropped = staged.dropped.len(),
            excluded = staged.excluded.len(),
            "staged output"
        );
        Ok(staged)
    }

    /// Write staged output under `root` in one all-or-nothing commit
    pub async fn commit(
        &self,
        staged: StagedOutput,
        root: &Path,
        policy: OverwritePolicy,
    ) -> Result<CommitReport, GenerateError> {
        let blueprint = self.blueprint.id.clone();
        if self.cancel.is_cancelled() {
            return Err(GenerateError::Cancelled { blueprint });
        }

        let root: PathBuf = root.to_path_buf();
        let cancel = self.cancel.clone();
        let result = tokio::task::spawn_blocking(move || {
            Materializer::new(policy).commit(&staged.files, &root, &cancel)
        })
        .await
        .map_err(|e| GenerateError::Internal {
            blueprint: blueprint.clone(),
            message: format!("commit task failed: {}", e),
        })?;

        result.map_err(|source| GenerateError::Materialization { blueprint, source })
    }

    /// Stage and commit
    pub async fn run(&self, root: &Path, policy: OverwritePolicy) -> Result<CommitReport, GenerateError> {
        let staged = self.stage().await?;
        self.commit(staged, root, policy).await
    }

    /// Render every included entry on the blocking pool, results in entry order
    async fn render_all(&self, included: Vec<usize>) -> Result<Vec<RenderedEntry>, GenerateError> {
        let mut tasks = JoinSet::new();
        for index in included {
            let blueprint = Arc::clone(&self.blueprint);
            let config = Arc::clone(&self.config);
            tasks.spawn_blocking(move || {
                let entry: &FileEntry = &blueprint.files[index];
                let result = render_path(&entry.destination, &config).and_then(|destination| {
                    render(&entry.content, &config, &blueprint.fragments)
                        .map(|rendered| (destination, rendered))
                });
                (index, result)
            });
        }

        let mut results = Vec::with_capacity(tasks.len());
        while let Some(joined) = tasks.join_next().await {
            let outcome = joined.map_err(|e| GenerateError::Internal {
                blueprint: self.blueprint.id.clone(),
                message: format!("render task failed: {}", e),
            })?;
            results.push(outcome);
        }
        results.sort_by_key(|(index, _)| *index);

        results
            .into_iter()
            .map(|(index, result)| match result {
                Ok((destination, rendered)) => Ok(RenderedEntry {
                    index,
                    destination,
                    rendered,
                }),
                Err(source) => Err(self.render_error(&self.blueprint.files[index].source, source)),
            })
            .collect()
    }

    fn module_info(
        &self,
        path: &str,
        name: &str,
        toolchain: Option<&str>,
    ) -> Result<ModuleInfo, GenerateError> {
        let entry = format!("module {}", path);
        let name = render_inline(name, &self.config).map_err(|e| self.render_error(&entry, e))?;
        let toolchain = toolchain
            .map(|t| render_inline(t, &self.config))
            .transpose()
            .map_err(|e| self.render_error(&entry, e))?
            .filter(|t| !t.is_empty());
        Ok(ModuleInfo {
            path: path.to_string(),
            name,
            toolchain,
        })
    }

    fn render_error(&self, entry: &str, source: RenderError) -> GenerateError {
        GenerateError::Render {
            blueprint: self.blueprint.id.clone(),
            entry: entry.to_string(),
            source,
        }
    }

    fn manifest_error(&self, source: ManifestError) -> GenerateError {
        GenerateError::Manifest {
            blueprint: self.blueprint.id.clone(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blueprint::BlueprintManifest;
    use crate::error::ErrorClass;

    fn blueprint(yaml: &str, sources: &[(&str, &str)]) -> Blueprint {
        let manifest: BlueprintManifest = serde_yaml::from_str(yaml).unwrap();
        let sources = sources
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Blueprint::build(manifest, &sources, &[]).unwrap()
    }

    fn raw(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    const HANDLERS: &str = r#"
id: handlers
ecosystem: go
variables:
  - name: Framework
    kind: enum
    allowed_values: [stdlib, gin]
    default: stdlib
modules:
  - path: "."
    name: example.com/handlers
    toolchain: "1.22"
files:
  - source: handler_stdlib.go.tmpl
    destination: handler.go
    condition: eq .Framework "stdlib"
  - source: handler.go.tmpl
    condition: ne .Framework "stdlib"
  - source: deps.tmpl
"#;

    fn handlers() -> Blueprint {
        blueprint(
            HANDLERS,
            &[
                ("handler_stdlib.go.tmpl", "package main // stdlib\n"),
                ("handler.go.tmpl", "package main // {{.Framework}}\n"),
                (
                    "deps.tmpl",
                    "{{if eq .Framework \"gin\"}}\n{{require \"github.com/gin-gonic/gin\" \"v1.10.0\"}}\n{{end}}\n",
                ),
            ],
        )
    }

    #[tokio::test]
    async fn test_exclusive_entries_share_destination() {
        let session = GenerationSession::new(handlers(), &raw(&[])).unwrap();
        let staged = session.stage().await.unwrap();
        assert_eq!(staged.paths().collect::<Vec<_>>(), vec!["handler.go", "go.mod"]);
        assert_eq!(staged.excluded, vec!["handler.go.tmpl"]);
        assert_eq!(staged.dropped, vec!["deps"]);
        assert!(staged.manifests[0].dependencies.is_empty());
        assert!(staged.workspace.is_none());

        let session = GenerationSession::new(handlers(), &raw(&[("Framework", "gin")])).unwrap();
        let staged = session.stage().await.unwrap();
        assert_eq!(staged.manifests[0].dependencies[0].package_path, "github.com/gin-gonic/gin");
    }

    #[tokio::test]
    async fn test_overlapping_destinations_fail() {
        let yaml = HANDLERS.replace(r#"condition: ne .Framework "stdlib""#, "destination: handler.go");
        let bp = blueprint(
            &yaml,
            &[
                ("handler_stdlib.go.tmpl", "a\n"),
                ("handler.go.tmpl", "b\n"),
                ("deps.tmpl", ""),
            ],
        );
        let err = GenerationSession::new(bp, &raw(&[]))
            .unwrap()
            .stage()
            .await
            .unwrap_err();
        assert_eq!(err.class(), ErrorClass::Manifest);
    }

    #[tokio::test]
    async fn test_first_render_error_by_entry_order() {
        let bp = blueprint(
            HANDLERS,
            &[
                ("handler_stdlib.go.tmpl", "{{template \"nope\"}}\n"),
                ("handler.go.tmpl", "ok\n"),
                ("deps.tmpl", "{{range .Framework}}{{.}}{{end}}"),
            ],
        );
        let err = GenerationSession::new(bp, &raw(&[]))
            .unwrap()
            .stage()
            .await
            .unwrap_err();
        match err {
            GenerateError::Render { entry, source, .. } => {
                assert_eq!(entry, "handler_stdlib.go.tmpl");
                assert!(matches!(source, RenderError::UnknownFragment { .. }));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_pseudo_version_disagreement_is_a_dependency_error() {
        let bp = blueprint(
            HANDLERS,
            &[
                (
                    "handler_stdlib.go.tmpl",
                    "{{require \"golang.org/x/exp\" \"v0.0.0-20240101120000-abcdef123456\"}}package main\n",
                ),
                ("handler.go.tmpl", "package main\n"),
                (
                    "deps.tmpl",
                    "{{require \"golang.org/x/exp\" \"v0.0.0-20240202120000-123456abcdef\"}}",
                ),
            ],
        );
        let dir = tempfile::tempdir().unwrap();
        let err = GenerationSession::new(bp, &raw(&[]))
            .unwrap()
            .run(dir.path(), OverwritePolicy::Refuse)
            .await
            .unwrap_err();
        match &err {
            GenerateError::Dependency { blueprint, source } => {
                assert_eq!(blueprint, "handlers");
                assert_eq!(source.package, "golang.org/x/exp");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(err.class(), ErrorClass::Dependency);
        assert_eq!(err.class().exit_code(), 5);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_configuration_errors_surface_before_rendering() {
        let err = GenerationSession::new(handlers(), &raw(&[("Framework", "fiber")]))
            .err()
            .unwrap();
        assert_eq!(err.class(), ErrorClass::Configuration);
    }

    #[tokio::test]
    async fn test_cancelled_before_commit() {
        let cancel = CancelFlag::new();
        let session = GenerationSession::new(handlers(), &raw(&[]))
            .unwrap()
            .with_cancel(cancel.clone());
        cancel.cancel();
        let err = session.stage().await.unwrap_err();
        assert_eq!(err.class(), ErrorClass::Cancelled);
    }

    #[tokio::test]
    async fn test_run_writes_project() {
        let dir = tempfile::tempdir().unwrap();
        let session = GenerationSession::new(handlers(), &raw(&[])).unwrap();
        let report = session.run(dir.path(), OverwritePolicy::Refuse).await.unwrap();
        assert_eq!(report.written, vec!["handler.go", "go.mod"]);
        let go_mod = std::fs::read_to_string(dir.path().join("go.mod")).unwrap();
        assert_eq!(go_mod, "module example.com/handlers\n\ngo 1.22\n");

        let err = session.run(dir.path(), OverwritePolicy::Refuse).await.unwrap_err();
        assert_eq!(err.class(), ErrorClass::Materialization);
    }
}
