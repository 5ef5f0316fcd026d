//! Command backends
//!
//! A backend is where the pipeline's commands run. Stages only describe
//! steps; the backend executes them and gives access to the files the
//! steps produce.

mod host;
mod podman;

#[cfg(test)]
pub(crate) mod recording;

pub use host::HostBackend;
pub use podman::{PodmanBackend, check_podman_available};

use grrbuild_core::Result;
use grrbuild_core::domain::context::BuildContext;
use grrbuild_core::domain::contract::RuntimeContract;
use grrbuild_core::domain::stage::{Step, StepOutput};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Executes steps and exposes the build filesystem
///
/// `run` only fails when a process cannot be started at all; a process
/// that exits non-zero is reported through `StepOutput::exit_code`.
pub trait CommandBackend: Send + Sync {
    fn name(&self) -> &'static str;

    /// Readies the backend for a build (e.g. starts the build container)
    fn prepare(&self, ctx: &BuildContext) -> Result<()>;

    /// Runs a single step to completion
    fn run(&self, step: &Step) -> Result<StepOutput>;

    /// Reads a text file, `None` if it does not exist
    fn read_file(&self, path: &Path) -> Result<Option<String>>;

    /// Sorted entry names of a directory, `None` if it does not exist
    fn list_dir(&self, path: &Path) -> Result<Option<Vec<String>>>;

    /// Removes a directory and recreates it empty
    fn reset_dir(&self, path: &Path) -> Result<()>;

    /// Attaches the runtime contract to the build output
    ///
    /// # Returns
    /// A reference to what was produced (image id or file path)
    fn seal(&self, ctx: &BuildContext, contract: &RuntimeContract) -> Result<String>;

    /// Releases everything `prepare` acquired
    fn cleanup(&self) -> Result<()>;
}

/// Available backends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// Run directly on this machine, e.g. inside a `docker build` step
    Host,
    /// Run inside a podman build container and commit it as the image
    Podman,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Host => write!(f, "host"),
            BackendKind::Podman => write!(f, "podman"),
        }
    }
}

impl FromStr for BackendKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "host" => Ok(BackendKind::Host),
            "podman" => Ok(BackendKind::Podman),
            other => anyhow::bail!("unknown backend '{}', expected host or podman", other),
        }
    }
}
