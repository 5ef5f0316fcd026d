//! Host backend
//!
//! Runs steps directly on the current machine. This is the backend used
//! when grrbuild itself is invoked from a container build step.

use grrbuild_core::domain::context::BuildContext;
use grrbuild_core::domain::contract::RuntimeContract;
use grrbuild_core::domain::stage::{StageKind, Step, StepOutput};
use grrbuild_core::{BuildError, Result};
use serde_json::json;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, info};

use super::CommandBackend;

/// File the runtime contract is written to
pub const CONTRACT_FILE: &str = "runtime-contract.json";

pub struct HostBackend {
    output_dir: PathBuf,
}

impl HostBackend {
    /// # Arguments
    /// * `output_dir` - Directory that receives the runtime contract file
    pub fn new(output_dir: PathBuf) -> Self {
        Self { output_dir }
    }
}

impl CommandBackend for HostBackend {
    fn name(&self) -> &'static str {
        "host"
    }

    fn prepare(&self, ctx: &BuildContext) -> Result<()> {
        let source_dir = &ctx.layout().source_dir;
        if !source_dir.is_dir() {
            return Err(BuildError::Backend(format!(
                "source tree {} does not exist",
                source_dir.display()
            )));
        }

        std::fs::create_dir_all(&self.output_dir)
            .map_err(|e| BuildError::io(&self.output_dir, e))?;

        info!("Building on host from {}", source_dir.display());
        Ok(())
    }

    fn run(&self, step: &Step) -> Result<StepOutput> {
        let mut command = Command::new(&step.program);
        command.args(&step.args);

        if let Some(dir) = &step.cwd {
            command.current_dir(dir);
        }
        for (key, value) in &step.env {
            command.env(key, value);
        }

        let output = command.output().map_err(|e| {
            BuildError::Backend(format!("Failed to execute {}: {}", step.program, e))
        })?;

        let result = StepOutput {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            exit_code: output.status.code().unwrap_or(-1),
        };

        debug!(
            "{} exited with {} (stdout_len={}, stderr_len={})",
            step.program,
            result.exit_code,
            result.stdout.len(),
            result.stderr.len()
        );

        Ok(result)
    }

    fn read_file(&self, path: &Path) -> Result<Option<String>> {
        match std::fs::read_to_string(path) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(BuildError::io(path, e)),
        }
    }

    fn list_dir(&self, path: &Path) -> Result<Option<Vec<String>>> {
        let entries = match std::fs::read_dir(path) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(BuildError::io(path, e)),
        };

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| BuildError::io(path, e))?;
            names.push(entry.file_name().to_string_lossy().to_string());
        }
        names.sort();

        Ok(Some(names))
    }

    fn reset_dir(&self, path: &Path) -> Result<()> {
        match std::fs::remove_dir_all(path) {
            Ok(()) => debug!("Removed {}", path.display()),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(BuildError::io(path, e)),
        }
        std::fs::create_dir_all(path).map_err(|e| BuildError::io(path, e))
    }

    fn seal(&self, ctx: &BuildContext, contract: &RuntimeContract) -> Result<String> {
        let path = self.output_dir.join(CONTRACT_FILE);
        let document = json!({
            "build_id": ctx.id(),
            "config": contract.to_image_config(),
        });

        let content = serde_json::to_string_pretty(&document).map_err(|e| {
            BuildError::for_stage(StageKind::Contract, e.to_string(), None)
        })?;

        std::fs::write(&path, content).map_err(|e| {
            BuildError::for_stage(
                StageKind::Contract,
                format!("cannot write {}: {}", path.display(), e),
                None,
            )
        })?;

        info!("Runtime contract written to {}", path.display());
        Ok(path.display().to_string())
    }

    fn cleanup(&self) -> Result<()> {
        Ok(())
    }
}
