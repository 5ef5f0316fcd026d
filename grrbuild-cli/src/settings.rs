//! Build settings
//!
//! Layers command-line flags over the runner configuration read from the
//! environment, and loads the recipe.

use anyhow::{Context, Result};
use clap::Args;
use grrbuild_core::domain::recipe::BuildRecipe;
use grrbuild_runner::backend::BackendKind;
use grrbuild_runner::config::Config;
use std::path::PathBuf;
use std::time::Duration;

/// Flags shared by `build` and `plan`
#[derive(Args, Debug, Clone, Default)]
pub struct BuildArgs {
    /// Where commands run: host or podman
    #[arg(short, long)]
    pub backend: Option<String>,

    /// Source tree to build
    #[arg(short, long)]
    pub source_dir: Option<PathBuf>,

    /// JSON recipe replacing the built-in GRR server recipe
    #[arg(short, long, env = "GRRBUILD_RECIPE")]
    pub recipe: Option<PathBuf>,

    /// Isolated environment directory
    #[arg(long)]
    pub env_dir: Option<PathBuf>,

    /// Package cache directory
    #[arg(long)]
    pub wheelhouse: Option<PathBuf>,

    /// Parent of the core and server sdist directories
    #[arg(long)]
    pub sdist_dir: Option<PathBuf>,

    /// Where the host backend writes the runtime contract
    #[arg(long)]
    pub output_dir: Option<PathBuf>,

    /// Base image for podman builds
    #[arg(long)]
    pub base_image: Option<String>,

    /// Image name podman commits to
    #[arg(long)]
    pub image_tag: Option<String>,

    /// Alternate index for the templates package
    #[arg(long)]
    pub templates_index: Option<String>,

    /// Do not check the alternate index before resolving
    #[arg(long)]
    pub skip_index_probe: bool,

    /// Alternate index check timeout in seconds
    #[arg(long)]
    pub probe_timeout: Option<u64>,
}

impl BuildArgs {
    /// Produces the validated configuration and recipe of a build
    pub fn resolve(&self) -> Result<(Config, BuildRecipe)> {
        let mut config = Config::from_env().context("Invalid environment configuration")?;
        self.apply(&mut config)?;
        config.validate().context("Invalid configuration")?;

        let mut recipe = match &self.recipe {
            Some(path) => BuildRecipe::load(path)
                .with_context(|| format!("Failed to load recipe {}", path.display()))?,
            None => BuildRecipe::grr_server(),
        };
        config.apply_to(&mut recipe);
        recipe.validate().context("Invalid recipe")?;

        Ok((config, recipe))
    }

    fn apply(&self, config: &mut Config) -> Result<()> {
        if let Some(backend) = &self.backend {
            config.backend = backend.parse::<BackendKind>()?;
        }
        if let Some(dir) = &self.source_dir {
            config.source_dir = dir.clone();
        }
        if let Some(dir) = &self.env_dir {
            config.env_dir = dir.clone();
        }
        if let Some(dir) = &self.wheelhouse {
            config.wheelhouse_dir = dir.clone();
        }
        if let Some(dir) = &self.sdist_dir {
            config.sdist_dir = dir.clone();
        }
        if let Some(dir) = &self.output_dir {
            config.output_dir = dir.clone();
        }
        if let Some(image) = &self.base_image {
            config.base_image = Some(image.clone());
        }
        if let Some(tag) = &self.image_tag {
            config.image_tag = tag.clone();
        }
        if let Some(url) = &self.templates_index {
            config.templates_index = Some(url.clone());
        }
        if self.skip_index_probe {
            config.probe_index = false;
        }
        if let Some(seconds) = self.probe_timeout {
            config.probe_timeout = Duration::from_secs(seconds);
        }
        Ok(())
    }
}
