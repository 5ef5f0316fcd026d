//! Service layer
//!
//! One service per pipeline stage. Each stage describes the steps it issues
//! (`plan`) and executes them against a command backend (`run`), handing its
//! products to later stages through [`Artifacts`].

pub mod contract;
pub mod installer;
pub mod log_buffer;
pub mod packager;
pub mod probe;
pub mod provision;
pub mod wheelhouse;

pub use contract::RuntimeContractEmitter;
pub use installer::{InstallSequencer, ResolutionPlan, ResolutionSource, validate_order};
pub use log_buffer::{InMemoryLogBuffer, LogBufferService};
pub use packager::SourcePackager;
pub use probe::{HttpIndexProbe, IndexProbe, SkipIndexProbe};
pub use provision::EnvironmentProvisioner;
pub use wheelhouse::DependencyCacheBuilder;

use async_trait::async_trait;
use grrbuild_core::domain::context::BuildContext;
use grrbuild_core::domain::contract::RuntimeContract;
use grrbuild_core::domain::log::{LogEntry, LogLevel};
use grrbuild_core::domain::sdist::BuiltSdist;
use grrbuild_core::domain::stage::{StageKind, Step, StepOutput};
use grrbuild_core::domain::version::VersionInfo;
use grrbuild_core::error::StepFailure;
use grrbuild_core::{BuildError, Result};
use tracing::{debug, info, warn};

use crate::backend::CommandBackend;

/// What a stage uses to talk to the outside world
pub struct StageIo<'a> {
    pub backend: &'a dyn CommandBackend,
    pub log: &'a dyn LogBufferService,
}

impl<'a> StageIo<'a> {
    pub fn new(backend: &'a dyn CommandBackend, log: &'a dyn LogBufferService) -> Self {
        Self { backend, log }
    }

    /// Runs a step and turns a non-zero exit into the stage's error
    ///
    /// The raw output of the step is captured into the build log either way.
    pub fn run(&self, step: &Step) -> Result<StepOutput> {
        let output = self.attempt(step)?;

        if !output.success() {
            let failure = StepFailure {
                command: step.command_line(),
                exit_code: output.exit_code,
                stdout: output.stdout.clone(),
                stderr: output.stderr.clone(),
            };
            self.log.add_entry(LogEntry::new(
                LogLevel::Error,
                Some(step.stage),
                failure.to_string(),
            ));
            return Err(BuildError::for_stage(
                step.stage,
                format!("{} exited with code {}", step.program, output.exit_code),
                Some(failure),
            ));
        }

        debug!("[{}] {} succeeded", step.stage, step.program);
        Ok(output)
    }

    /// Runs a step and logs its raw output, leaving a non-zero exit to the
    /// caller
    ///
    /// Only a step that cannot be started at all is an error here.
    pub fn attempt(&self, step: &Step) -> Result<StepOutput> {
        info!("[{}] {}", step.stage, step);
        self.log.add_entry(LogEntry::new(
            LogLevel::Info,
            Some(step.stage),
            format!("$ {}", step),
        ));

        let output = self.backend.run(step)?;

        for (level, text) in [(LogLevel::Debug, &output.stdout), (LogLevel::Warning, &output.stderr)] {
            if !text.trim().is_empty() {
                self.log
                    .add_entry(LogEntry::new(level, Some(step.stage), text.trim_end()));
            }
        }

        Ok(output)
    }

    pub fn info(&self, stage: StageKind, message: impl Into<String>) {
        let message = message.into();
        info!("[{}] {}", stage, message);
        self.log
            .add_entry(LogEntry::new(LogLevel::Info, Some(stage), message));
    }

    pub fn warn(&self, stage: StageKind, message: impl Into<String>) {
        let message = message.into();
        warn!("[{}] {}", stage, message);
        self.log
            .add_entry(LogEntry::new(LogLevel::Warning, Some(stage), message));
    }
}

/// Products handed from one stage to the next
#[derive(Debug, Clone, Default)]
pub struct Artifacts {
    /// Parsed `version.ini`, set by the packager
    pub version: Option<VersionInfo>,
    /// Sorted wheelhouse listing, set by the cache builder
    pub wheelhouse: Vec<String>,
    /// Built sdists in install order, set by the packager
    pub sdists: Vec<BuiltSdist>,
    pub contract: Option<RuntimeContract>,
    /// What the backend produced when sealing
    pub image: Option<String>,
}

/// One pipeline stage
#[async_trait]
pub trait Stage: Send + Sync {
    fn kind(&self) -> StageKind;

    /// Steps the stage would issue, without running anything
    ///
    /// # Arguments
    /// * `ctx` - The build context
    /// * `artifacts` - Products of earlier stages; stages that depend on
    ///   them plan with whatever is known
    fn plan(&self, ctx: &BuildContext, artifacts: &Artifacts) -> Vec<Step>;

    /// Runs the stage and advances the context by one state
    async fn run(
        &self,
        ctx: &mut BuildContext,
        io: &StageIo<'_>,
        artifacts: &mut Artifacts,
    ) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::recording::RecordingBackend;

    #[test]
    fn test_run_maps_exit_code_to_stage_error() {
        let backend = RecordingBackend::new().failing_when(|s| s.program == "apt-get");
        let log = InMemoryLogBuffer::new();
        let io = StageIo::new(&backend, &log);

        let step = Step::new(StageKind::Provision, "apt-get").arg("update");
        let err = io.run(&step).unwrap_err();

        assert!(matches!(err, BuildError::Provisioning { .. }));
        let failure = err.failure().unwrap();
        assert_eq!(failure.command, "apt-get update");
        assert_eq!(failure.exit_code, 1);
        assert!(failure.stderr.contains("simulated failure"));

        let entries = log.drain();
        assert!(entries.iter().any(|e| e.level == LogLevel::Error));
        assert!(entries.iter().all(|e| e.stage == Some(StageKind::Provision)));
    }

    #[test]
    fn test_run_logs_command() {
        let backend = RecordingBackend::new();
        let log = InMemoryLogBuffer::new();
        let io = StageIo::new(&backend, &log);

        let step = Step::new(StageKind::Install, "/env/bin/pip").args(["install", "x.zip"]);
        io.run(&step).unwrap();

        let entries = log.drain();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].message, "$ /env/bin/pip install x.zip");
        assert_eq!(backend.steps(), vec![step]);
    }

    #[test]
    fn test_attempt_keeps_failure_with_caller() {
        let backend = RecordingBackend::new().failing_when(|_| true);
        let log = InMemoryLogBuffer::new();
        let io = StageIo::new(&backend, &log);

        let step = Step::new(StageKind::Install, "/env/bin/pip").args(["install", "x.zip"]);
        let output = io.attempt(&step).unwrap();

        assert_eq!(output.exit_code, 1);
        let entries = log.drain();
        assert!(entries.iter().all(|e| e.level != LogLevel::Error));
        assert!(entries.iter().any(|e| e.message.contains("simulated failure")));
    }
}
