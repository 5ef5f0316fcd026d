//! Recipe command handlers

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::*;
use grrbuild_core::domain::recipe::BuildRecipe;
use std::path::PathBuf;

/// Recipe subcommands
#[derive(Subcommand)]
pub enum RecipeCommands {
    /// Print a recipe as JSON (the built-in GRR server recipe by default)
    Show {
        /// Recipe file to show instead
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
    /// Check that a recipe file is valid
    Validate {
        /// Recipe file
        file: PathBuf,
    },
}

pub fn handle_recipe_command(command: RecipeCommands) -> Result<()> {
    match command {
        RecipeCommands::Show { file } => show_recipe(file),
        RecipeCommands::Validate { file } => validate_recipe(file),
    }
}

fn show_recipe(file: Option<PathBuf>) -> Result<()> {
    let recipe = match file {
        Some(path) => BuildRecipe::load(&path)
            .with_context(|| format!("Failed to load recipe {}", path.display()))?,
        None => BuildRecipe::grr_server(),
    };

    let out = serde_json::to_string_pretty(&recipe).context("Failed to serialize recipe")?;
    println!("{}", out);
    Ok(())
}

fn validate_recipe(file: PathBuf) -> Result<()> {
    let recipe = BuildRecipe::load(&file)
        .with_context(|| format!("Invalid recipe {}", file.display()))?;

    println!("{} {}", "✓".green(), file.display());
    println!("  Base image: {}", recipe.base_image);
    println!("  Core:       {}", recipe.core.requirement());
    println!("  Server:     {}", recipe.server_package);
    println!(
        "  Templates:  {} from {}",
        recipe.templates.requirement(),
        recipe.templates_index.url.dimmed()
    );
    Ok(())
}
