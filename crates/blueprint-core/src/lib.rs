//! Blueprint Core - Engine for scaffolding projects from declarative blueprints
//!
//! A blueprint is a directory of parameterized source templates plus a
//! `blueprint.yaml` manifest declaring typed variables, module roots, reusable
//! fragments and the files to generate. Given user bindings, the engine decides
//! which files exist, renders their paths and contents, merges the
//! dependencies the templates declare into per-module manifests, and writes the
//! result in one all-or-nothing commit.
//!
//! # Architecture
//!
//! The library is organized into layers:
//!
//! - **Layer 1: Core Operations** - Schema validation, condition evaluation,
//!   template rendering, dependency aggregation, materialization
//! - **Layer 2: Workflow Orchestration** - `ProductConfig` trait and
//!   `GenerationSession` for custom UIs
//! - **Layer 3: CLI/TUI Interface** - Optional cliclack-based prompts (feature-gated)
//!
//! # Feature Flags
//!
//! - `tui` (default): Enables the cliclack-based TUI prompts module
//!
//! # Example Usage (without TUI)
//!
//! ```ignore
//! use blueprint_core::{BlueprintLibrary, GenerationSession, OverwritePolicy};
//!
//! let library = BlueprintLibrary::new("blueprints");
//! let blueprint = library.load("cli-standard").await?;
//! let raw = [("Logger".to_string(), "zap".to_string())].into_iter().collect();
//! let session = GenerationSession::new(blueprint, &raw)?;
//! session.run(Path::new("my-cli"), OverwritePolicy::Refuse).await?;
//! ```

pub mod bindings;
pub mod blueprint;
pub mod condition;
pub mod deps;
pub mod error;
pub mod materialize;
pub mod product;
pub mod schema;
pub mod session;
pub mod template;
pub mod version;

#[cfg(feature = "tui")]
pub mod tui;

// Re-export main types for convenience
pub use blueprint::{Blueprint, BlueprintLibrary, Ecosystem, FileEntry, Module};
pub use error::{
    ConfigurationError, DependencyConflict, ErrorClass, GenerateError, ManifestError,
    MaterializationError, RenderError,
};
pub use materialize::{CommitReport, Materializer, OverwritePolicy, StagedFile};
pub use product::ProductConfig;
pub use schema::{validate, Configuration, Value, Variable, VariableKind};
pub use session::{CancelFlag, GenerationSession, StagedOutput};

#[cfg(feature = "tui")]
pub use tui::{run_generate, run_inspect, run_list, GenerateArgs};

