//! blueprint CLI - Project scaffolding from declarative blueprints

use anyhow::Result;
use blueprint_core::bindings::parse_assignment;
use blueprint_core::{
    Blueprint, CancelFlag, ErrorClass, GenerateArgs, GenerateError, ProductConfig,
};
use clap::{CommandFactory, FromArgMatches, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// CLI version
pub const CLI_VERSION: &str = env!("CARGO_PKG_VERSION");

/// blueprint product configuration
#[derive(Clone)]
pub struct BlueprintConfig;

impl ProductConfig for BlueprintConfig {
    fn name(&self) -> &'static str {
        "blueprint"
    }

    fn display_name(&self) -> &'static str {
        "blueprint"
    }

    fn default_blueprint_dir(&self) -> &'static str {
        "blueprints"
    }

    fn blueprint_dir_env(&self) -> &'static str {
        "BLUEPRINT_DIR"
    }

    fn engine_version(&self) -> &'static str {
        CLI_VERSION
    }

    fn cli_description(&self) -> &'static str {
        "CLI for scaffolding projects from blueprints"
    }

    fn upgrade_command(&self) -> &'static str {
        "cargo install blueprint-tools --force"
    }

    fn next_steps(&self, dir: &Path, blueprint: &Blueprint) -> Vec<String> {
        let mut steps = Vec::new();
        let current = std::env::current_dir().ok();

        // Step 1: cd to directory if not current
        if current.as_ref() != Some(&dir.to_path_buf()) {
            steps.push(format!("cd {}", dir.display()));
        }

        // Step 2: Fetch dependencies for the generated manifests
        match blueprint.ecosystem {
            blueprint_core::Ecosystem::Go => steps.push("go mod tidy".to_string()),
            blueprint_core::Ecosystem::Cargo => steps.push("cargo build".to_string()),
            blueprint_core::Ecosystem::None => {}
        }

        // Step 3: Open README for instructions
        if blueprint.files.iter().any(|f| f.destination == "README.md") {
            steps.push("Open README.md to get started".to_string());
        }

        steps
    }
}

#[derive(Parser, Debug)]
#[command(name = "blueprint")]
#[command(version)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Generate a project from a blueprint
    Generate(CliGenerateArgs),
    /// List the blueprints in the library
    List(LibraryArgs),
    /// Show a blueprint's variables, modules and files
    Inspect(InspectArgs),
}

#[derive(Parser, Debug)]
pub struct LibraryArgs {
    /// Blueprint library directory (defaults to $BLUEPRINT_DIR, then ./blueprints)
    #[arg(long = "blueprint-dir")]
    pub blueprint_dir: Option<PathBuf>,
}

#[derive(Parser, Debug)]
pub struct InspectArgs {
    /// Blueprint id
    pub blueprint: String,

    #[command(flatten)]
    pub library: LibraryArgs,
}

#[derive(Parser, Debug)]
pub struct CliGenerateArgs {
    /// Blueprint id (prompted for when omitted)
    pub blueprint: Option<String>,

    /// Variable binding, repeatable
    #[arg(long = "var", value_name = "KEY=VALUE", value_parser = parse_assignment)]
    pub vars: Vec<(String, String)>,

    /// YAML file of variable bindings; --var wins on conflicts
    #[arg(long = "vars-file")]
    pub vars_file: Option<PathBuf>,

    /// Project directory to generate into
    #[arg(short, long)]
    pub directory: Option<PathBuf>,

    #[command(flatten)]
    pub library: LibraryArgs,

    /// Overwrite existing files
    #[arg(long)]
    pub force: bool,

    /// Render and list the files without writing anything
    #[arg(long = "dry-run")]
    pub dry_run: bool,

    /// Auto-confirm all prompts (non-interactive mode)
    #[arg(short, long)]
    pub yes: bool,
}

impl From<CliGenerateArgs> for GenerateArgs {
    fn from(args: CliGenerateArgs) -> Self {
        GenerateArgs {
            blueprint: args.blueprint,
            vars: args.vars,
            vars_file: args.vars_file,
            directory: args.directory,
            blueprint_dir: args.library.blueprint_dir,
            force: args.force,
            dry_run: args.dry_run,
            yes: args.yes,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("BLUEPRINT_LOG").unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    // Ensure terminal cursor is restored on panic
    let default_panic = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let _ = console::Term::stderr().show_cursor();
        default_panic(info);
    }));

    // First Ctrl+C cancels the run (rolling back a commit in progress), the second exits
    let cancel = CancelFlag::new();
    let handler_flag = cancel.clone();
    ctrlc::set_handler(move || {
        let _ = console::Term::stderr().show_cursor();
        if handler_flag.is_cancelled() {
            std::process::exit(130);
        }
        handler_flag.cancel();
    })
    .ok();

    let config = BlueprintConfig;
    let matches = Args::command()
        .name(config.name())
        .about(config.cli_description())
        .get_matches();
    let args = match Args::from_arg_matches(&matches) {
        Ok(args) => args,
        Err(e) => e.exit(),
    };
    tracing::debug!(command = ?args.command, "parsed arguments");
    let result = run(args, &config, cancel).await;

    // Ensure cursor is visible on normal exit
    let _ = console::Term::stderr().show_cursor();

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {:#}", console::style("error:").red().bold(), e);
            ExitCode::from(exit_code(&e))
        }
    }
}

async fn run(args: Args, config: &BlueprintConfig, cancel: CancelFlag) -> Result<()> {
    match args.command {
        Command::Generate(generate_args) => {
            blueprint_core::run_generate(config, generate_args.into(), cancel).await
        }
        Command::List(library) => blueprint_core::run_list(config, library.blueprint_dir).await,
        Command::Inspect(inspect) => {
            blueprint_core::run_inspect(config, inspect.library.blueprint_dir, &inspect.blueprint)
                .await
        }
    }
}

/// Distinct exit code per error class; anything unclassified is 1
fn exit_code(error: &anyhow::Error) -> u8 {
    let class = error
        .downcast_ref::<GenerateError>()
        .map(GenerateError::class)
        .unwrap_or(ErrorClass::Internal);
    tracing::debug!(class = class.as_str(), "run failed");
    class.exit_code()
}

#[cfg(test)]
mod tests {
    use super::*;
    use blueprint_core::ConfigurationError;

    #[test]
    fn test_parse_generate_args() {
        let args = Args::try_parse_from([
            "blueprint",
            "generate",
            "cli-standard",
            "--var",
            "Logger=zap",
            "--var",
            "ProjectName=demo",
            "--dry-run",
        ])
        .unwrap();
        let Command::Generate(generate) = args.command else {
            panic!("expected generate");
        };
        let generate: GenerateArgs = generate.into();
        assert_eq!(generate.blueprint.as_deref(), Some("cli-standard"));
        assert_eq!(generate.vars[0], ("Logger".to_string(), "zap".to_string()));
        assert!(generate.dry_run);
        assert!(!generate.force);
    }

    #[test]
    fn test_rejects_malformed_var() {
        assert!(Args::try_parse_from(["blueprint", "generate", "x", "--var", "Logger"]).is_err());
    }

    #[test]
    fn test_exit_code_from_generate_error() {
        let err: anyhow::Error = GenerateError::Configuration {
            blueprint: "cli-standard".to_string(),
            source: ConfigurationError::MissingVariable {
                name: "ProjectName".to_string(),
            },
        }
        .into();
        assert_eq!(exit_code(&err), ErrorClass::Configuration.exit_code());
        assert_eq!(exit_code(&anyhow::anyhow!("boom")), 1);
    }
}
