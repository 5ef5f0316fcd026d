//! Commands module
//!
//! Defines all CLI commands and their handlers.

mod build;
mod contract;
mod plan;
mod recipe;
mod version;

pub use contract::ContractFormat;
pub use recipe::RecipeCommands;

use anyhow::Result;
use clap::Subcommand;
use std::path::PathBuf;

use crate::settings::BuildArgs;

/// Top-level CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Run the full build pipeline
    Build {
        #[command(flatten)]
        args: BuildArgs,

        /// Write the JSON build report to this file
        #[arg(long)]
        report: Option<PathBuf>,
    },
    /// Show every command a build would run, without running anything
    Plan {
        #[command(flatten)]
        args: BuildArgs,

        /// Print the plan as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print the runtime contract of the image
    Contract {
        #[arg(short, long, value_enum, default_value = "json")]
        format: ContractFormat,
    },
    /// Print the version declared by a source tree
    Version {
        /// Source tree containing version.ini
        #[arg(short, long, default_value = ".")]
        source_dir: PathBuf,

        /// Print all version fields as JSON
        #[arg(long)]
        json: bool,
    },
    /// Inspect build recipes
    Recipe {
        #[command(subcommand)]
        command: RecipeCommands,
    },
}

/// Handle a CLI command
///
/// Routes the command to the appropriate handler module.
///
/// # Arguments
/// * `command` - The command to execute
///
/// # Returns
/// Result indicating success or failure
pub async fn handle_command(command: Commands) -> Result<()> {
    match command {
        Commands::Build { args, report } => build::handle_build(args, report).await,
        Commands::Plan { args, json } => plan::handle_plan(args, json),
        Commands::Contract { format } => contract::handle_contract(format),
        Commands::Version { source_dir, json } => version::handle_version(&source_dir, json),
        Commands::Recipe { command } => recipe::handle_recipe_command(command),
    }
}
