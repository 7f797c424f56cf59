//! Charm-style CLI prompts using cliclack

use crate::bindings;
use crate::blueprint::{Blueprint, BlueprintLibrary, CatalogManifest};
use crate::error::GenerateError;
use crate::materialize::OverwritePolicy;
use crate::product::ProductConfig;
use crate::schema::{Variable, VariableKind};
use crate::session::{CancelFlag, GenerationSession, StagedOutput};
use crate::version;
use anyhow::Result;
use colored::Colorize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// CLI arguments for the generate command
#[derive(Debug, Clone, Default)]
pub struct GenerateArgs {
    /// Blueprint id; prompted for when absent
    pub blueprint: Option<String>,

    /// `--var KEY=VALUE` assignments, in command-line order
    pub vars: Vec<(String, String)>,

    /// YAML file of variable bindings, overridden by `vars`
    pub vars_file: Option<PathBuf>,

    /// Project directory to generate into
    pub directory: Option<PathBuf>,

    /// Blueprint library to use instead of the configured one
    pub blueprint_dir: Option<PathBuf>,

    /// Replace existing files
    pub force: bool,

    /// Render and report without writing
    pub dry_run: bool,

    /// Auto-confirm all prompts (non-interactive mode)
    pub yes: bool,
}

/// Run the generate flow with interactive prompts
pub async fn run_generate<C: ProductConfig>(
    config: &C,
    args: GenerateArgs,
    cancel: CancelFlag,
) -> Result<()> {
    cliclack::intro(config.display_name())?;

    let library = BlueprintLibrary::from_config(config, args.blueprint_dir.clone());
    cliclack::log::info(format!("Using blueprints from {}", library.root().display()))?;

    // Step 1: Select and load the blueprint
    let blueprint = select_blueprint(&library, args.blueprint.as_deref(), args.yes).await?;

    if let Some(warning) = version::check_compatibility(
        config.engine_version(),
        &blueprint.version,
        config.upgrade_command(),
    ) {
        cliclack::log::warning(format!(
            "Version warning: {}",
            warning.lines().next().unwrap_or(&warning)
        ))?;
    }

    // Step 2: Collect variable bindings
    let mut raw = match &args.vars_file {
        Some(path) => bindings::load_vars_file(path).await?,
        None => HashMap::new(),
    };
    raw = bindings::merge(raw, args.vars.iter().cloned());
    if !args.yes {
        prompt_missing(&blueprint, &mut raw)?;
    }

    // Step 3: Select directory
    let project_dir = select_directory(&args)?;

    // Step 4: Render everything in memory
    let session = GenerationSession::new(blueprint, &raw)?.with_cancel(cancel);
    let spinner = cliclack::spinner();
    spinner.start("Rendering blueprint...");
    let staged = match session.stage().await {
        Ok(staged) => staged,
        Err(e) => {
            spinner.stop("Rendering failed");
            return Err(e.into());
        }
    };
    spinner.stop(format!("Rendered {} files", staged.files.len()));

    if args.dry_run {
        print_plan(&staged, &project_dir)?;
        cliclack::outro("Dry run, nothing was written")?;
        return Ok(());
    }

    // Step 5: Commit
    let policy = if args.force {
        OverwritePolicy::Overwrite
    } else {
        OverwritePolicy::Refuse
    };
    let spinner = cliclack::spinner();
    spinner.start("Writing files...");
    let report = match session.commit(staged, &project_dir, policy).await {
        Ok(report) => report,
        Err(e) => {
            spinner.stop("Nothing was written");
            return Err(e.into());
        }
    };
    spinner.stop(format!(
        "Created {} files in {}",
        report.written.len(),
        project_dir.display()
    ));
    if report.replaced > 0 {
        cliclack::log::warning(format!("Replaced {} existing files", report.replaced))?;
    }

    // Step 6: Show next steps
    print_next_steps(config, &project_dir, session.blueprint())?;

    Ok(())
}

async fn select_blueprint(
    library: &BlueprintLibrary,
    specified: Option<&str>,
    yes: bool,
) -> Result<Blueprint> {
    let id = match specified {
        Some(id) => id.to_string(),
        None => {
            let catalog = load_catalog(library).await?;
            match catalog.blueprints.as_slice() {
                [] => anyhow::bail!("No blueprints found in {}", library.root().display()),
                [only] => only.clone(),
                many if yes => anyhow::bail!(
                    "A blueprint id is required in non-interactive mode. Available blueprints: {}",
                    many.join(", ")
                ),
                many => {
                    let mut select = cliclack::select("Select a blueprint");
                    for id in many {
                        select = select.item(id.clone(), id, "");
                    }
                    select.interact()?
                }
            }
        }
    };

    let spinner = cliclack::spinner();
    spinner.start("Loading blueprint...");

    match library.load(&id).await {
        Ok(blueprint) => {
            spinner.stop(format!("Blueprint: {} - {}", blueprint.id, blueprint.description));
            Ok(blueprint)
        }
        Err(source) => {
            spinner.stop("Failed to load blueprint");
            Err(GenerateError::Manifest {
                blueprint: id,
                source,
            }
            .into())
        }
    }
}

/// Read the library catalog, classed as a manifest failure
async fn load_catalog(library: &BlueprintLibrary) -> Result<CatalogManifest, GenerateError> {
    library
        .catalog()
        .await
        .map_err(|source| GenerateError::Manifest {
            blueprint: library.root().display().to_string(),
            source,
        })
}

/// Ask for required variables that were not bound on the command line
fn prompt_missing(blueprint: &Blueprint, raw: &mut HashMap<String, String>) -> Result<()> {
    for variable in blueprint.variables.iter().filter(|v| v.required) {
        if raw.contains_key(&variable.name) {
            continue;
        }
        let value = prompt_variable(variable)?;
        raw.insert(variable.name.clone(), value);
    }
    Ok(())
}

fn prompt_variable(variable: &Variable) -> Result<String> {
    let label = variable.description.as_deref().unwrap_or(&variable.name);
    let value = match variable.kind {
        VariableKind::Bool => {
            let answer: bool = cliclack::confirm(label).initial_value(false).interact()?;
            answer.to_string()
        }
        VariableKind::Enum => {
            let mut select = cliclack::select(label);
            for allowed in &variable.allowed_values {
                let shown = if allowed.is_empty() { "(none)" } else { allowed.as_str() };
                select = select.item(allowed.clone(), shown, "");
            }
            select.interact()?
        }
        VariableKind::List => cliclack::input(label)
            .placeholder("comma-separated values")
            .interact()?,
        VariableKind::String | VariableKind::Int => cliclack::input(label)
            .placeholder(&variable.name)
            .interact()?,
    };
    Ok(value)
}

fn select_directory(args: &GenerateArgs) -> Result<PathBuf> {
    let current_dir = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));

    // Use --directory flag if provided
    let path = if let Some(dir) = &args.directory {
        let p = if dir.is_absolute() {
            dir.clone()
        } else {
            current_dir.join(dir)
        };
        cliclack::log::info(format!("Using directory: {}", p.display()))?;
        p
    } else if args.yes {
        current_dir
    } else {
        let input: String = cliclack::input("Project directory")
            .placeholder(".")
            .default_input(".")
            .interact()?;

        if input.is_empty() || input == "." {
            current_dir
        } else {
            let p = PathBuf::from(&input);
            if p.is_absolute() {
                p
            } else {
                current_dir.join(p)
            }
        }
    };

    // Validate parent directory exists
    if let Some(parent) = path.parent() {
        if !parent.exists() && parent != Path::new("") {
            anyhow::bail!("Parent directory does not exist: {}", parent.display());
        }
    }

    Ok(path)
}

fn print_plan(staged: &StagedOutput, project_dir: &Path) -> Result<()> {
    cliclack::log::info(format!("Would write to {}:", project_dir.display()))?;
    for file in &staged.files {
        println!("  {} {}", "+".green(), file.path);
    }
    for path in &staged.dropped {
        println!("  {} {} (empty)", "-".dimmed(), path.dimmed());
    }
    for source in &staged.excluded {
        println!("  {} {} (condition false)", "-".dimmed(), source.dimmed());
    }
    Ok(())
}

fn print_next_steps<C: ProductConfig>(
    config: &C,
    project_dir: &Path,
    blueprint: &Blueprint,
) -> Result<()> {
    let steps = config.next_steps(project_dir, blueprint);

    println!();
    println!("  Next steps");
    println!();

    for (i, step) in steps.iter().enumerate() {
        println!("  {}.  {}", i + 1, step);
    }

    cliclack::outro("Happy coding!")?;

    Ok(())
}

/// Print the blueprints of a library
pub async fn run_list<C: ProductConfig>(config: &C, blueprint_dir: Option<PathBuf>) -> Result<()> {
    let library = BlueprintLibrary::from_config(config, blueprint_dir);
    let catalog = load_catalog(&library).await?;

    println!("{}", format!("Blueprints in {}", library.root().display()).bold());
    for id in &catalog.blueprints {
        match library.load(id).await {
            Ok(blueprint) => println!("  {:<20} {}", id.cyan().bold(), blueprint.description),
            Err(e) => println!("  {:<20} {}", id.cyan().bold(), format!("invalid: {}", e).red()),
        }
    }
    Ok(())
}

/// Print a blueprint's variables, modules and files
pub async fn run_inspect<C: ProductConfig>(
    config: &C,
    blueprint_dir: Option<PathBuf>,
    id: &str,
) -> Result<()> {
    let library = BlueprintLibrary::from_config(config, blueprint_dir);
    let blueprint = library
        .load(id)
        .await
        .map_err(|source| GenerateError::Manifest {
            blueprint: id.to_string(),
            source,
        })?;

    println!("{} {}", blueprint.id.cyan().bold(), blueprint.version.dimmed());
    if !blueprint.description.is_empty() {
        println!("{}", blueprint.description);
    }

    println!();
    println!("{}", "Variables".bold());
    for variable in &blueprint.variables {
        println!(
            "  {:<18} {:<7} {}",
            variable.name,
            variable.kind.display_name(),
            describe(variable).dimmed()
        );
    }

    if !blueprint.modules.is_empty() {
        println!();
        println!("{}", "Modules".bold());
        for module in &blueprint.modules {
            println!("  {:<18} {}", module.path, module.name);
        }
    }

    println!();
    println!("{}", "Files".bold());
    for entry in &blueprint.files {
        match &entry.condition {
            Some(condition) => println!(
                "  {:<32} {}",
                entry.destination,
                format!("if {}", condition).yellow()
            ),
            None => println!("  {}", entry.destination),
        }
    }
    Ok(())
}

fn describe(variable: &Variable) -> String {
    let mut parts = Vec::new();
    if variable.required {
        parts.push("required".to_string());
    }
    if let Some(default) = &variable.default {
        parts.push(format!("default {:?}", default));
    }
    if !variable.allowed_values.is_empty() {
        parts.push(format!("one of [{}]", variable.allowed_values.join(", ")));
    }
    if let Some(description) = &variable.description {
        parts.push(description.clone());
    }
    parts.join(", ")
}
