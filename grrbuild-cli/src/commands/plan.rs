//! Plan command handler
//!
//! Prints the commands a build would issue, stage by stage, without
//! touching the backend.

use anyhow::{Context, Result};
use colored::*;
use grrbuild_core::domain::context::BuildContext;
use grrbuild_core::domain::contract::RuntimeContract;
use grrbuild_core::domain::recipe::BuildRecipe;
use grrbuild_core::domain::sdist::{BuiltSdist, PackageRole};
use grrbuild_core::domain::stage::{StageKind, Step};
use grrbuild_core::domain::version::{VersionError, VersionInfo};
use grrbuild_runner::config::Config;
use grrbuild_runner::service::{Artifacts, InMemoryLogBuffer, SkipIndexProbe};
use grrbuild_runner::{BuildPipeline, create_backend};
use serde::Serialize;
use std::sync::Arc;
use tracing::warn;

use crate::settings::BuildArgs;

#[derive(Serialize)]
struct PlannedStage {
    stage: StageKind,
    title: &'static str,
    steps: Vec<Step>,
}

pub fn handle_plan(args: BuildArgs, json: bool) -> Result<()> {
    let (config, recipe) = args.resolve()?;
    let (artifacts, version_problem) = match expected_artifacts(&config, &recipe) {
        Ok(artifacts) => (artifacts, None),
        Err(e) => {
            warn!("Cannot plan install commands: {}", e);
            (Artifacts::default(), Some(e.to_string()))
        }
    };
    let version = artifacts
        .version
        .as_ref()
        .map(|v| v.package_version().to_string());

    let layout = config.layout(&recipe);
    // The backend is never prepared, so nothing is started
    let pipeline = BuildPipeline::new(
        Arc::new(recipe.clone()),
        create_backend(&config, &recipe),
        Arc::new(SkipIndexProbe),
        Arc::new(InMemoryLogBuffer::new()),
    );
    let ctx = BuildContext::new(layout);

    let planned: Vec<PlannedStage> = pipeline
        .plan(&ctx, &artifacts)
        .into_iter()
        .map(|(stage, steps)| PlannedStage {
            stage,
            title: stage.title(),
            steps,
        })
        .collect();

    if json {
        let out = serde_json::to_string_pretty(&planned).context("Failed to serialize plan")?;
        println!("{}", out);
        return Ok(());
    }

    println!(
        "{} ({} backend, version {})",
        "Build plan".bold(),
        config.backend,
        version.as_deref().unwrap_or("unknown")
    );
    if config.probe_index {
        println!(
            "  {} {}",
            "probe".dimmed(),
            recipe.templates_index.url.cyan()
        );
    }

    for (index, stage) in planned.iter().enumerate() {
        println!();
        println!(
            "{}",
            format!("{}. {} ({})", index + 1, stage.title, stage.stage).bold()
        );
        for step in &stage.steps {
            println!("  {} {}", "$".dimmed(), step);
        }
        if stage.stage == StageKind::Install {
            match &version_problem {
                Some(problem) => println!(
                    "  {} {}",
                    "install commands unknown:".yellow(),
                    problem
                ),
                None => println!(
                    "  {}",
                    "(a package the wheelhouse cannot satisfy is retried against the default index)"
                        .dimmed()
                ),
            }
        }
        if stage.stage == StageKind::Contract {
            for directive in RuntimeContract::grr_server().directives() {
                println!("  {} {}", "+".dimmed(), directive);
            }
        }
    }

    Ok(())
}

/// Artifacts a build of the local source tree is expected to produce
fn expected_artifacts(config: &Config, recipe: &BuildRecipe) -> Result<Artifacts, VersionError> {
    let version = VersionInfo::load(&config.source_dir)?;

    let layout = config.layout(recipe);
    let sdists = vec![
        BuiltSdist::expected(
            PackageRole::Core,
            &layout.core_sdist_dir,
            &recipe.core.name,
            version.package_version(),
            &recipe.sdist_format,
        ),
        BuiltSdist::expected(
            PackageRole::Server,
            &layout.server_sdist_dir,
            &recipe.server_package,
            version.package_version(),
            &recipe.sdist_format,
        ),
    ];

    Ok(Artifacts {
        version: Some(version),
        sdists,
        ..Default::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use grrbuild_runner::backend::BackendKind;

    #[test]
    fn test_expected_artifacts_follow_version_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("version.ini"),
            "[Version]\nmajor = 3\nminor = 2\nrevision = 0\nrelease = 1\n",
        )
        .unwrap();

        let config = Config::new(BackendKind::Host, dir.path().to_path_buf());
        let artifacts = expected_artifacts(&config, &BuildRecipe::default()).unwrap();

        assert_eq!(artifacts.sdists.len(), 2);
        assert_eq!(
            artifacts.sdists[0].archive,
            std::path::PathBuf::from("/sdists/core/grr-response-core-3.2.0.post1.zip")
        );
        assert_eq!(artifacts.sdists[1].role, PackageRole::Server);
    }

    #[test]
    fn test_missing_version_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::new(BackendKind::Host, dir.path().to_path_buf());
        let err = expected_artifacts(&config, &BuildRecipe::default()).unwrap_err();
        assert!(matches!(err, VersionError::Read { .. }));
    }

    #[test]
    fn test_malformed_version_file_keeps_its_reason() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("version.ini"), "[Version]\nmajor = three\n").unwrap();
        let config = Config::new(BackendKind::Host, dir.path().to_path_buf());

        let err = expected_artifacts(&config, &BuildRecipe::default()).unwrap_err();
        assert!(matches!(err, VersionError::InvalidNumber { .. }));
        assert!(err.to_string().contains("three"));
    }
}
