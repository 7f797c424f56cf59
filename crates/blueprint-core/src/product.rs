//! Product configuration trait for CLI binaries
//!
//! This trait defines the interface a binary implements to brand the engine:
//! where it looks for blueprints, which version it reports for compatibility
//! checks and what it tells the user once a project is generated.

use crate::blueprint::Blueprint;
use std::path::Path;

/// Configuration trait for CLI products built on the engine
///
/// Each product implements this trait to define:
/// - Product identity (name, display name)
/// - Blueprint library location
/// - Engine version for blueprint compatibility
/// - Post-generation instructions
pub trait ProductConfig: Clone + Send + Sync + 'static {
    /// Internal product name (used for the CLI command)
    fn name(&self) -> &'static str;

    /// Human-readable display name
    fn display_name(&self) -> &'static str;

    /// Blueprint library used when neither a flag nor the env var names one
    fn default_blueprint_dir(&self) -> &'static str;

    /// Environment variable name for overriding the blueprint library
    fn blueprint_dir_env(&self) -> &'static str;

    /// Version compared against each blueprint's `version`
    fn engine_version(&self) -> &'static str;

    /// Generate the "next steps" instructions after project creation
    fn next_steps(&self, dir: &Path, blueprint: &Blueprint) -> Vec<String>;

    /// CLI description shown in help text
    fn cli_description(&self) -> &'static str;

    /// Upgrade/install command shown in version warnings
    fn upgrade_command(&self) -> &'static str;
}
