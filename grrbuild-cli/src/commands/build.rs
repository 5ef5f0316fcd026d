//! Build command handler
//!
//! Runs the pipeline and shows the outcome of every stage. When a stage
//! fails, the raw output of the command that failed is printed as-is.

use anyhow::{Context, Result};
use colored::*;
use grrbuild_core::BuildError;
use grrbuild_core::domain::context::BuildContext;
use grrbuild_core::domain::stage::StageStatus;
use grrbuild_core::dto::report::BuildReport;
use grrbuild_runner::backend::{BackendKind, check_podman_available};
use grrbuild_runner::service::InMemoryLogBuffer;
use grrbuild_runner::service::log_buffer::diagnostics;
use grrbuild_runner::{BuildPipeline, create_backend, create_probe};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

use crate::settings::BuildArgs;

pub async fn handle_build(args: BuildArgs, report_path: Option<PathBuf>) -> Result<()> {
    let (config, recipe) = args.resolve()?;

    if config.backend == BackendKind::Podman {
        check_podman_available().context("Podman backend selected")?;
    }

    let backend = create_backend(&config, &recipe);
    let probe = create_probe(&config).context("Failed to create index probe")?;
    let layout = config.layout(&recipe);
    let recipe = Arc::new(recipe);
    let pipeline = BuildPipeline::new(
        recipe,
        backend,
        probe,
        Arc::new(InMemoryLogBuffer::new()),
    );

    let mut ctx = BuildContext::new(layout);
    println!(
        "{} {} ({} backend)",
        "Building".bold(),
        ctx.id().to_string().cyan(),
        config.backend
    );
    info!("Source tree: {}", config.source_dir.display());

    let outcome = pipeline.run(&mut ctx).await;
    print_stages(&outcome.report);

    if let Some(path) = &report_path {
        write_report(&outcome.report, path)?;
        println!("Report written to {}", path.display().to_string().dimmed());
    }

    match outcome.result {
        Ok(()) => {
            println!();
            println!("{}", "✓ Build succeeded".green().bold());
            if let Some(version) = &outcome.report.version {
                println!("  Version: {}", version);
            }
            if let Some(image) = &outcome.report.image {
                println!("  Output:  {}", image.cyan());
            }
            Ok(())
        }
        Err(e) => {
            print_failure(&e, &outcome.report);
            Err(anyhow::Error::new(e).context("Build failed"))
        }
    }
}

fn print_stages(report: &BuildReport) {
    println!();
    for record in &report.stages {
        let marker = match record.status {
            StageStatus::Succeeded => "✓".green(),
            StageStatus::Failed => "✗".red(),
            StageStatus::Skipped => "-".dimmed(),
            StageStatus::Pending | StageStatus::Running => "…".yellow(),
        };

        let duration = match (record.started_at, record.completed_at) {
            (Some(start), Some(end)) => {
                format!("{}s", end.signed_duration_since(start).num_seconds())
            }
            _ => String::new(),
        };

        println!(
            "  {} {:<26} {:<10} {}",
            marker,
            record.stage.title(),
            record.status.to_string(),
            duration.dimmed()
        );
    }
}

/// Shows the failing command's own output
fn print_failure(error: &BuildError, report: &BuildReport) {
    println!();
    println!("{}", format!("✗ {}", error).red().bold());

    if let Some(failure) = error.failure() {
        println!("  Command:   {}", failure.command);
        println!("  Exit code: {}", failure.exit_code);

        for (label, text) in [("stdout", &failure.stdout), ("stderr", &failure.stderr)] {
            if text.trim().is_empty() {
                continue;
            }
            println!("{}", format!("── {} ", label).dimmed());
            println!("{}", text.trim_end());
        }
        return;
    }

    if let Some(stage) = error.stage() {
        let text = diagnostics(&report.log, stage);
        if !text.is_empty() {
            println!("{}", "── diagnostics ".dimmed());
            println!("{}", text);
        }
    }
}

fn write_report(report: &BuildReport, path: &Path) -> Result<()> {
    let content = serde_json::to_string_pretty(report).context("Failed to serialize report")?;
    std::fs::write(path, content)
        .with_context(|| format!("Failed to write report to {}", path.display()))
}
