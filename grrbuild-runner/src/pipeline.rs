//! Build pipeline
//!
//! Runs the five stages in their fixed order against one build context.
//! The first failing stage aborts the build; later stages are reported as
//! skipped and nothing is retried.

use grrbuild_core::Result;
use grrbuild_core::domain::context::BuildContext;
use grrbuild_core::domain::log::{LogEntry, LogLevel};
use grrbuild_core::domain::recipe::BuildRecipe;
use grrbuild_core::domain::stage::{StageKind, Step};
use grrbuild_core::dto::report::BuildReport;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::backend::CommandBackend;
use crate::service::{
    Artifacts, DependencyCacheBuilder, EnvironmentProvisioner, IndexProbe, InstallSequencer,
    LogBufferService, RuntimeContractEmitter, SourcePackager, Stage, StageIo,
};

/// Result of one pipeline run
pub struct PipelineOutcome {
    pub report: BuildReport,
    /// The error of the failing stage, kept intact for its raw diagnostics
    pub result: Result<()>,
}

impl PipelineOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

pub struct BuildPipeline {
    backend: Arc<dyn CommandBackend>,
    log: Arc<dyn LogBufferService>,
    stages: Vec<Box<dyn Stage>>,
}

impl BuildPipeline {
    /// Creates the pipeline for a recipe
    ///
    /// # Arguments
    /// * `recipe` - What to build
    /// * `backend` - Where commands run
    /// * `probe` - Checks the alternate index before resolution
    /// * `log` - Receives every step's command line and raw output
    pub fn new(
        recipe: Arc<BuildRecipe>,
        backend: Arc<dyn CommandBackend>,
        probe: Arc<dyn IndexProbe>,
        log: Arc<dyn LogBufferService>,
    ) -> Self {
        let stages: Vec<Box<dyn Stage>> = vec![
            Box::new(EnvironmentProvisioner::new(recipe.clone())),
            Box::new(DependencyCacheBuilder::new(recipe.clone(), probe)),
            Box::new(SourcePackager::new(recipe)),
            Box::new(InstallSequencer::new()),
            Box::new(RuntimeContractEmitter::new()),
        ];

        Self {
            backend,
            log,
            stages,
        }
    }

    /// Every step the build would issue, in order, without running anything
    pub fn plan(&self, ctx: &BuildContext, artifacts: &Artifacts) -> Vec<(StageKind, Vec<Step>)> {
        self.stages
            .iter()
            .map(|stage| (stage.kind(), stage.plan(ctx, artifacts)))
            .collect()
    }

    /// Runs the whole build
    ///
    /// Always releases the backend and always returns a report, whether or
    /// not a stage failed.
    pub async fn run(&self, ctx: &mut BuildContext) -> PipelineOutcome {
        let mut report = BuildReport::new(ctx.id());
        let mut artifacts = Artifacts::default();

        info!(
            "Starting build {} on {} backend",
            ctx.id(),
            self.backend.name()
        );
        self.log.add_entry(LogEntry::new(
            LogLevel::Info,
            None,
            format!("Starting build {}", ctx.id()),
        ));

        let result = self.execute(ctx, &mut report, &mut artifacts).await;

        if let Err(e) = self.backend.cleanup() {
            warn!("Backend cleanup failed: {}", e);
        }

        match &result {
            Ok(()) => info!("Build {} completed", ctx.id()),
            Err(e) => {
                error!("Build {} failed: {}", ctx.id(), e);
                self.log
                    .add_entry(LogEntry::new(LogLevel::Error, e.stage(), e.to_string()));
                if report.error_message.is_none() {
                    report.error_message = Some(e.to_string());
                }
            }
        }

        report.version = artifacts
            .version
            .as_ref()
            .map(|v| v.package_version().to_string());
        report.wheelhouse = artifacts.wheelhouse;
        report.sdists = artifacts.sdists;
        report.contract = artifacts.contract;
        report.image = artifacts.image;
        report.log = self.log.drain();
        report.finish();

        PipelineOutcome { report, result }
    }

    async fn execute(
        &self,
        ctx: &mut BuildContext,
        report: &mut BuildReport,
        artifacts: &mut Artifacts,
    ) -> Result<()> {
        let io = StageIo::new(self.backend.as_ref(), self.log.as_ref());

        // Without a backend nothing can be provisioned
        if let Err(e) = self.backend.prepare(ctx) {
            report.fail(StageKind::Provision, e.to_string());
            return Err(e);
        }

        for stage in &self.stages {
            let kind = stage.kind();
            info!("Stage {}: {}", kind, kind.title());
            report.begin(kind);

            if let Err(e) = stage.run(ctx, &io, artifacts).await {
                report.fail(kind, e.to_string());
                return Err(e);
            }

            report.succeed(kind);
        }

        Ok(())
    }
}
