//! Whole-run guarantees checked across the bundled blueprints

mod common;

use blueprint_core::materialize::{EntryKind, FsTarget, Snapshot, WriteTarget};
use blueprint_core::{
    CancelFlag, ConfigurationError, ErrorClass, GenerateError, MaterializationError, Materializer,
    OverwritePolicy,
};
use common::{files, generate, library, read, session, stage, vars};
use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

const SCENARIOS: &[(&str, &[(&str, &str)])] = &[
    ("cli-standard", &[("ProjectName", "demo")]),
    (
        "cli-standard",
        &[("ProjectName", "demo"), ("Logger", "logrus"), ("EnableConfig", "true")],
    ),
    ("lambda-proxy", &[("ProjectName", "fn"), ("Framework", "echo")]),
    ("web-api-clean", &[("ProjectName", "shop"), ("AuthType", "jwt")]),
    (
        "workspace",
        &[("ProjectName", "fleet"), ("EnableWorker", "true"), ("EnableCLI", "true")],
    ),
];

#[tokio::test]
async fn test_generation_is_deterministic() {
    for (id, pairs) in SCENARIOS {
        assert_eq!(stage(id, pairs).await, stage(id, pairs).await, "{}", id);

        let first = generate(id, pairs).await;
        let second = generate(id, pairs).await;
        let listing = files(first.path());
        assert_eq!(listing, files(second.path()));
        for file in &listing {
            assert_eq!(read(first.path(), file), read(second.path(), file), "{}/{}", id, file);
        }
    }
}

#[tokio::test]
async fn test_every_framework_yields_one_handler() {
    for framework in ["stdlib", "gin", "echo", "fiber", "chi"] {
        let staged = stage("lambda-proxy", &[("ProjectName", "fn"), ("Framework", framework)]).await;
        let handlers = staged.paths().filter(|p| *p == "handler.go").count();
        assert_eq!(handlers, 1, "framework {}", framework);
        assert_eq!(staged.excluded.len(), 1);
    }
}

#[tokio::test]
async fn test_no_written_file_is_blank() {
    for (id, pairs) in SCENARIOS {
        let staged = stage(id, pairs).await;
        for file in &staged.files {
            assert!(
                file.content.iter().any(|b| !b.is_ascii_whitespace()),
                "{} staged blank file {}",
                id,
                file.path
            );
            assert!(!String::from_utf8_lossy(&file.content).contains("{{"));
        }
    }
}

#[tokio::test]
async fn test_empty_outputs_are_reported_as_dropped() {
    let staged = stage("cli-standard", &[("ProjectName", "demo")]).await;
    assert_eq!(staged.dropped, vec!["deps"]);
    assert_eq!(staged.excluded, vec!["config.go.tmpl"]);

    let staged = stage("web-api-clean", &[("ProjectName", "shop"), ("AuthType", "jwt")]).await;
    assert_eq!(staged.dropped, vec!["internal/auth/session_store.go"]);
}

#[tokio::test]
async fn test_dependencies_are_the_union_of_active_requirements() {
    let staged = stage("web-api-clean", &[("ProjectName", "shop"), ("AuthType", "jwt")]).await;
    let deps: Vec<&str> = staged.manifests[0]
        .dependencies
        .iter()
        .map(|d| d.package_path.as_str())
        .collect();
    assert_eq!(deps, vec!["github.com/go-chi/chi/v5", "github.com/golang-jwt/jwt/v5"]);

    // slog is the standard library, so nothing is required
    let staged = stage("cli-standard", &[("ProjectName", "demo")]).await;
    assert!(staged.manifests[0].dependencies.is_empty());
}

#[tokio::test]
async fn test_workspace_lists_exactly_the_generated_modules() {
    let dir = generate(
        "workspace",
        &[("ProjectName", "fleet"), ("EnableWorker", "true"), ("EnableCLI", "true")],
    )
    .await;
    let root = dir.path();
    let listing = files(root);

    let mut module_dirs: Vec<String> = listing
        .iter()
        .filter_map(|f| f.strip_suffix("/go.mod"))
        .map(str::to_string)
        .collect();
    module_dirs.sort();
    assert_eq!(module_dirs, vec!["cmd/api", "cmd/cli", "cmd/worker", "pkg/shared"]);

    let go_work = read(root, "go.work");
    for module in &module_dirs {
        assert!(go_work.contains(&format!("\t./{}\n", module)), "{} not in go.work", module);
        assert!(
            listing.iter().any(|f| f.starts_with(module.as_str()) && !f.ends_with("go.mod")),
            "{} has no sources",
            module
        );
    }
    assert!(read(root, "cmd/cli/go.mod").contains("\tgithub.com/spf13/cobra v1.8.1\n"));
    assert!(!read(root, "cmd/worker/go.mod").contains("cobra"));
}

#[tokio::test]
async fn test_single_module_has_no_workspace_file() {
    let staged = stage("web-api-clean", &[("ProjectName", "shop")]).await;
    assert!(staged.workspace.is_none());
    assert!(!staged.paths().any(|p| p == "go.work"));
}

#[tokio::test]
async fn test_configuration_errors() {
    let blueprint = library().load("cli-standard").await.unwrap();

    let err = blueprint_core::GenerationSession::new(blueprint.clone(), &vars(&[])).err().unwrap();
    assert_eq!(err.class(), ErrorClass::Configuration);
    assert!(matches!(
        err,
        GenerateError::Configuration {
            source: ConfigurationError::MissingVariable { ref name },
            ..
        } if name == "ProjectName"
    ));

    let err = blueprint_core::GenerationSession::new(
        blueprint.clone(),
        &vars(&[("ProjectName", "demo"), ("Loger", "zap")]),
    )
    .err()
    .unwrap();
    assert!(matches!(
        err,
        GenerateError::Configuration {
            source: ConfigurationError::UnknownVariable { ref suggestion, .. },
            ..
        } if suggestion.as_deref() == Some("Logger")
    ));

    let err = blueprint_core::GenerationSession::new(
        blueprint,
        &vars(&[("ProjectName", "demo"), ("Logger", "log4j")]),
    )
    .err()
    .unwrap();
    assert_eq!(err.exit_code(), 2);
}

#[tokio::test]
async fn test_unknown_blueprint() {
    let err = library().load("rails-app").await.unwrap_err();
    let message = err.to_string();
    assert!(message.contains("rails-app"));
    assert!(message.contains("cli-standard"));
}

#[tokio::test]
async fn test_existing_files_are_left_untouched() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("go.mod"), "module mine\n").unwrap();

    let err = session("cli-standard", &[("ProjectName", "demo")])
        .await
        .run(dir.path(), OverwritePolicy::Refuse)
        .await
        .unwrap_err();
    assert_eq!(err.class(), ErrorClass::Materialization);
    assert_eq!(files(dir.path()), vec!["go.mod"]);
    assert_eq!(read(dir.path(), "go.mod"), "module mine\n");

    session("cli-standard", &[("ProjectName", "demo")])
        .await
        .run(dir.path(), OverwritePolicy::Overwrite)
        .await
        .unwrap();
    assert!(read(dir.path(), "go.mod").starts_with("module example.com/app\n"));
}

/// Real filesystem whose write number `fail_at` fails
struct FailOnWrite {
    fail_at: usize,
    writes: AtomicUsize,
}

impl WriteTarget for FailOnWrite {
    fn kind(&self, path: &Path) -> io::Result<Option<EntryKind>> {
        FsTarget.kind(path)
    }

    fn create_dir(&self, path: &Path) -> io::Result<()> {
        FsTarget.create_dir(path)
    }

    fn read(&self, path: &Path) -> io::Result<Snapshot> {
        FsTarget.read(path)
    }

    fn write(&self, path: &Path, content: &[u8], mode: u32) -> io::Result<()> {
        if self.writes.fetch_add(1, Ordering::SeqCst) == self.fail_at {
            return Err(io::Error::new(io::ErrorKind::Other, "disk full"));
        }
        FsTarget.write(path, content, mode)
    }

    fn remove_file(&self, path: &Path) -> io::Result<()> {
        FsTarget.remove_file(path)
    }

    fn remove_dir(&self, path: &Path) -> io::Result<()> {
        FsTarget.remove_dir(path)
    }
}

#[tokio::test]
async fn test_failed_commit_leaves_nothing_behind() {
    let staged = stage(
        "workspace",
        &[("ProjectName", "fleet"), ("EnableWorker", "true")],
    )
    .await;
    let dir = tempfile::tempdir().unwrap();
    let project = dir.path().join("fleet");

    let target = FailOnWrite {
        fail_at: staged.files.len() - 1,
        writes: AtomicUsize::new(0),
    };
    let err = Materializer::with_target(target, OverwritePolicy::Refuse)
        .commit(&staged.files, &project, &CancelFlag::new())
        .unwrap_err();

    match err {
        MaterializationError::PartialWriteFailure { leftovers, .. } => assert!(leftovers.is_empty()),
        other => panic!("unexpected error: {}", other),
    }
    assert!(!project.exists());
    assert!(files(dir.path()).is_empty());
}
