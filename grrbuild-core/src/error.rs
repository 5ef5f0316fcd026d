//! Error types for the build pipeline

use std::path::PathBuf;
use thiserror::Error;

use crate::domain::context::ContextState;
use crate::domain::stage::StageKind;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, BuildError>;

/// A command that ran and exited unsuccessfully
///
/// Carries the raw output so the operator sees the tool's own diagnostics.
#[derive(Debug, Clone, Error)]
#[error("`{command}` exited with code {exit_code}")]
pub struct StepFailure {
    pub command: String,
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

/// Errors that abort the pipeline
///
/// Every variant is fatal. There is no local recovery and no retry.
#[derive(Debug, Error)]
pub enum BuildError {
    /// A prerequisite install or environment creation failed
    #[error("provisioning failed: {reason}")]
    Provisioning {
        reason: String,
        #[source]
        failure: Option<StepFailure>,
    },

    /// A dependency could not be resolved or built into the wheelhouse
    #[error("dependency resolution failed: {reason}")]
    Resolution {
        reason: String,
        #[source]
        failure: Option<StepFailure>,
    },

    /// Source distribution generation failed
    #[error("packaging failed: {reason}")]
    Packaging {
        reason: String,
        #[source]
        failure: Option<StepFailure>,
    },

    /// A built sdist could not be installed
    #[error("install failed: {reason}")]
    Install {
        reason: String,
        #[source]
        failure: Option<StepFailure>,
    },

    /// Sdists were handed to the installer in an order that breaks dependencies
    #[error("install order rejected: {0}")]
    InstallOrder(String),

    /// The runtime contract could not be attached to the image
    #[error("runtime contract emission failed: {reason}")]
    Contract {
        reason: String,
        #[source]
        failure: Option<StepFailure>,
    },

    /// The command backend is unavailable or a process could not be spawned
    #[error("backend error: {0}")]
    Backend(String),

    /// The build recipe is invalid
    #[error("invalid recipe: {0}")]
    Recipe(String),

    /// A stage ran against a build context in the wrong state
    #[error("build context is {found}, expected {expected}")]
    State {
        expected: ContextState,
        found: ContextState,
    },

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl BuildError {
    /// Builds the taxonomy variant that belongs to `stage`
    pub fn for_stage(
        stage: StageKind,
        reason: impl Into<String>,
        failure: Option<StepFailure>,
    ) -> Self {
        let reason = reason.into();
        match stage {
            StageKind::Provision => Self::Provisioning { reason, failure },
            StageKind::Wheelhouse => Self::Resolution { reason, failure },
            StageKind::Package => Self::Packaging { reason, failure },
            StageKind::Install => Self::Install { reason, failure },
            StageKind::Contract => Self::Contract { reason, failure },
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// The stage this error is attributed to, if it belongs to one
    pub fn stage(&self) -> Option<StageKind> {
        match self {
            Self::Provisioning { .. } => Some(StageKind::Provision),
            Self::Resolution { .. } => Some(StageKind::Wheelhouse),
            Self::Packaging { .. } => Some(StageKind::Package),
            Self::Install { .. } | Self::InstallOrder(_) => Some(StageKind::Install),
            Self::Contract { .. } => Some(StageKind::Contract),
            _ => None,
        }
    }

    /// The failed command behind this error, if any
    pub fn failure(&self) -> Option<&StepFailure> {
        match self {
            Self::Provisioning { failure, .. }
            | Self::Resolution { failure, .. }
            | Self::Packaging { failure, .. }
            | Self::Install { failure, .. }
            | Self::Contract { failure, .. } => failure.as_ref(),
            _ => None,
        }
    }
}
