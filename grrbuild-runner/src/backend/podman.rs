//! Podman backend
//!
//! Handles the build container lifecycle:
//! - Checking podman availability
//! - Starting one build container from the recipe's base image
//! - Copying the source tree into it
//! - Executing every step in it
//! - Committing it as the image, with the runtime contract attached
//! - Removing it after the build

use grrbuild_core::domain::context::BuildContext;
use grrbuild_core::domain::contract::RuntimeContract;
use grrbuild_core::domain::stage::{StageKind, Step, StepOutput};
use grrbuild_core::error::StepFailure;
use grrbuild_core::{BuildError, Result};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Mutex;
use tracing::{debug, error, info, warn};

use super::CommandBackend;

const PODMAN: &str = "podman";

/// Checks if podman is installed and available
pub fn check_podman_available() -> Result<()> {
    check_available(PODMAN)
}

fn check_available(program: &str) -> Result<()> {
    let output = Command::new(program)
        .arg("--version")
        .output()
        .map_err(|e| {
            BuildError::Backend(format!(
                "Failed to execute '{} --version'. Is podman installed? ({})",
                program, e
            ))
        })?;

    if !output.status.success() {
        return Err(BuildError::Backend(
            "Podman is not working correctly".to_string(),
        ));
    }

    let version = String::from_utf8_lossy(&output.stdout);
    info!("Podman is available: {}", version.trim());

    Ok(())
}

/// Backend running every step inside one podman build container
pub struct PodmanBackend {
    program: String,
    base_image: String,
    image_tag: String,
    host_source_dir: PathBuf,

    /// Name of the running build container
    container: Mutex<Option<String>>,
}

impl PodmanBackend {
    /// Creates a new podman backend
    ///
    /// # Arguments
    /// * `base_image` - Image the build container starts from
    /// * `image_tag` - Name the finished container is committed as
    /// * `host_source_dir` - Source tree to copy into the container
    pub fn new(base_image: String, image_tag: String, host_source_dir: PathBuf) -> Self {
        Self {
            program: PODMAN.to_string(),
            base_image,
            image_tag,
            host_source_dir,
            container: Mutex::new(None),
        }
    }

    #[cfg(test)]
    fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    /// Name of the build container for a build
    pub fn container_name(ctx: &BuildContext) -> String {
        format!("grrbuild-{}", ctx.id())
    }

    fn current_container(&self) -> Result<String> {
        self.container
            .lock()
            .map_err(|_| BuildError::Backend("container registry poisoned".to_string()))?
            .clone()
            .ok_or_else(|| BuildError::Backend("No active build container".to_string()))
    }

    /// Runs podman with `args` and captures its output
    fn podman(&self, args: &[String]) -> Result<StepOutput> {
        let output = Command::new(&self.program)
            .args(args)
            .output()
            .map_err(|e| BuildError::Backend(format!("Failed to execute podman: {}", e)))?;

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();

        if !stdout.trim().is_empty() {
            debug!("podman {} stdout: {}", args[0], stdout.trim());
        }
        if !stderr.trim().is_empty() {
            debug!("podman {} stderr: {}", args[0], stderr.trim());
        }

        Ok(StepOutput {
            stdout,
            stderr,
            exit_code: output.status.code().unwrap_or(-1),
        })
    }

    /// Runs podman and turns a non-zero exit into a backend error
    fn podman_checked(&self, args: &[String], what: &str) -> Result<StepOutput> {
        let output = self.podman(args)?;
        if !output.success() {
            let error_msg = format!(
                "{}: exit_code={}, stdout='{}', stderr='{}'",
                what,
                output.exit_code,
                output.stdout.trim(),
                output.stderr.trim()
            );
            error!("{}", error_msg);
            return Err(BuildError::Backend(error_msg));
        }
        Ok(output)
    }

    /// Runs a plain command inside the build container
    fn exec_simple(&self, program: &str, args: &[&str]) -> Result<StepOutput> {
        let container = self.current_container()?;
        let step = Step::new(StageKind::Provision, program).args(args.iter().copied());
        self.podman(&exec_args(&container, &step))
    }
}

/// `podman run` arguments starting an idle build container
///
/// The entrypoint is overridden so images with custom entrypoints still
/// sleep until the build is done.
pub fn run_args(container: &str, image: &str) -> Vec<String> {
    [
        "run",
        "-d",
        "--name",
        container,
        "--entrypoint",
        "/bin/sh",
        image,
        "-c",
        "sleep infinity",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// `podman exec` arguments for a step
pub fn exec_args(container: &str, step: &Step) -> Vec<String> {
    let mut args = vec!["exec".to_string()];
    if let Some(dir) = &step.cwd {
        args.push("-w".to_string());
        args.push(dir.display().to_string());
    }
    for (key, value) in &step.env {
        args.push("-e".to_string());
        args.push(format!("{}={}", key, value));
    }
    args.push(container.to_string());
    args.push(step.program.clone());
    args.extend(step.args.iter().cloned());
    args
}

/// `podman commit` arguments attaching the runtime contract
pub fn commit_args(container: &str, image_tag: &str, contract: &RuntimeContract) -> Vec<String> {
    let mut args = vec!["commit".to_string()];
    for directive in contract.directives() {
        args.push("--change".to_string());
        args.push(directive);
    }
    args.push(container.to_string());
    args.push(image_tag.to_string());
    args
}

impl CommandBackend for PodmanBackend {
    fn name(&self) -> &'static str {
        "podman"
    }

    fn prepare(&self, ctx: &BuildContext) -> Result<()> {
        check_available(&self.program)?;

        if !self.host_source_dir.is_dir() {
            return Err(BuildError::Backend(format!(
                "source tree {} does not exist",
                self.host_source_dir.display()
            )));
        }

        let container = Self::container_name(ctx);
        info!(
            "Creating build container {} from {}",
            container, self.base_image
        );

        let output = self.podman_checked(
            &run_args(&container, &self.base_image),
            &format!("Failed to start container for image {}", self.base_image),
        )?;
        info!(
            "Container {} started with ID: {}",
            container,
            output.stdout.trim()
        );

        {
            let mut current = self
                .container
                .lock()
                .map_err(|_| BuildError::Backend("container registry poisoned".to_string()))?;
            *current = Some(container.clone());
        }

        let source_dir = ctx.layout().source_dir.display().to_string();
        let mkdir = self.exec_simple("mkdir", &["-p", source_dir.as_str()])?;
        if !mkdir.success() {
            return Err(BuildError::Backend(format!(
                "Failed to create {} in container: {}",
                source_dir,
                mkdir.stderr.trim()
            )));
        }

        self.podman_checked(
            &[
                "cp".to_string(),
                format!("{}/.", self.host_source_dir.display()),
                format!("{}:{}", container, source_dir),
            ],
            "Failed to copy source tree into container",
        )?;

        info!("Source tree copied to {}:{}", container, source_dir);
        Ok(())
    }

    fn run(&self, step: &Step) -> Result<StepOutput> {
        let container = self.current_container()?;
        debug!("Executing in container {}: {}", container, step);

        let output = self.podman(&exec_args(&container, step))?;

        if !output.success() {
            debug!(
                "Command failed in container {}: cmd={} exit_code={}",
                container, step.program, output.exit_code
            );
        }

        Ok(output)
    }

    fn read_file(&self, path: &Path) -> Result<Option<String>> {
        let target = path.display().to_string();
        let output = self.exec_simple("cat", &[target.as_str()])?;
        if output.success() {
            Ok(Some(output.stdout))
        } else {
            Ok(None)
        }
    }

    fn list_dir(&self, path: &Path) -> Result<Option<Vec<String>>> {
        let target = path.display().to_string();
        let output = self.exec_simple("ls", &["-1A", target.as_str()])?;
        if !output.success() {
            return Ok(None);
        }

        let mut names: Vec<String> = output
            .stdout
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect();
        names.sort();

        Ok(Some(names))
    }

    fn reset_dir(&self, path: &Path) -> Result<()> {
        let target = path.display().to_string();
        for (program, args) in [
            ("rm", ["-rf", target.as_str()]),
            ("mkdir", ["-p", target.as_str()]),
        ] {
            let output = self.exec_simple(program, &args)?;
            if !output.success() {
                return Err(BuildError::Backend(format!(
                    "Failed to reset {}: {}",
                    target,
                    output.stderr.trim()
                )));
            }
        }
        Ok(())
    }

    fn seal(&self, _ctx: &BuildContext, contract: &RuntimeContract) -> Result<String> {
        let container = self.current_container()?;
        let args = commit_args(&container, &self.image_tag, contract);

        info!("Committing {} as {}", container, self.image_tag);
        let output = self.podman(&args)?;

        if !output.success() {
            let failure = StepFailure {
                command: format!("podman {}", args.join(" ")),
                exit_code: output.exit_code,
                stdout: output.stdout,
                stderr: output.stderr,
            };
            return Err(BuildError::for_stage(
                StageKind::Contract,
                format!("cannot commit image {}", self.image_tag),
                Some(failure),
            ));
        }

        let image_id = output.stdout.trim().to_string();
        info!("Image {} committed ({})", self.image_tag, image_id);
        Ok(format!("{}@{}", self.image_tag, image_id))
    }

    /// Stops and removes the build container
    fn cleanup(&self) -> Result<()> {
        let container = match self.container.lock() {
            Ok(mut current) => current.take(),
            Err(_) => return Err(BuildError::Backend("container registry poisoned".to_string())),
        };

        let Some(container) = container else {
            return Ok(());
        };

        info!("Removing build container {}", container);

        // Stop container (ignore errors if already stopped)
        let _ = self.podman(&["stop".to_string(), container.clone()]);

        let output = self.podman(&["rm".to_string(), "-f".to_string(), container.clone()])?;
        if output.success() {
            debug!("Container {} removed", container);
        } else {
            warn!(
                "Failed to remove container {}: {}",
                container,
                output.stderr.trim()
            );
        }

        Ok(())
    }
}

impl Drop for PodmanBackend {
    fn drop(&mut self) {
        if let Err(e) = self.cleanup() {
            warn!("Failed to cleanup build container on drop: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_args_override_entrypoint() {
        let args = run_args("grrbuild-1", "docker.io/library/ubuntu:xenial");
        assert_eq!(
            args,
            vec![
                "run",
                "-d",
                "--name",
                "grrbuild-1",
                "--entrypoint",
                "/bin/sh",
                "docker.io/library/ubuntu:xenial",
                "-c",
                "sleep infinity",
            ]
        );
    }

    #[test]
    fn test_exec_args() {
        let step = Step::new(StageKind::Provision, "apt-get")
            .args(["install", "-y", "zip"])
            .current_dir("/usr/src/grr")
            .env("DEBIAN_FRONTEND", "noninteractive");

        assert_eq!(
            exec_args("grrbuild-1", &step),
            vec![
                "exec",
                "-w",
                "/usr/src/grr",
                "-e",
                "DEBIAN_FRONTEND=noninteractive",
                "grrbuild-1",
                "apt-get",
                "install",
                "-y",
                "zip",
            ]
        );
    }

    #[test]
    fn test_commit_args_carry_contract() {
        let args = commit_args(
            "grrbuild-1",
            "localhost/grr-server:latest",
            &RuntimeContract::grr_server(),
        );

        assert_eq!(args.first().map(String::as_str), Some("commit"));
        assert_eq!(args.iter().filter(|a| *a == "--change").count(), 5);
        assert!(args.contains(&"EXPOSE 8000/tcp".to_string()));
        assert!(args.contains(&"EXPOSE 8080/tcp".to_string()));
        assert_eq!(
            &args[args.len() - 2..],
            &["grrbuild-1", "localhost/grr-server:latest"]
        );
    }

    /// Writes a stand-in podman that records its arguments into `log` and
    /// fails `podman cp`
    #[cfg(unix)]
    fn stub_podman(dir: &Path, log: &Path) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let script = dir.join("podman");
        std::fs::write(
            &script,
            format!(
                "#!/bin/sh\n\
                 echo \"$@\" >> '{}'\n\
                 case \"$1\" in\n\
                 --version) echo 'podman version 4.9.3' ;;\n\
                 run) echo c0ffee ;;\n\
                 cp) echo 'Error: copy failed' >&2; exit 125 ;;\n\
                 esac\n\
                 exit 0\n",
                log.display()
            ),
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        script
    }

    #[cfg(unix)]
    #[test]
    fn test_failed_copy_leaves_container_for_cleanup() {
        use grrbuild_core::domain::context::BuildLayout;

        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("grr");
        std::fs::create_dir_all(&source).unwrap();
        let log = dir.path().join("podman.log");
        let podman = stub_podman(dir.path(), &log);

        let backend = PodmanBackend::new("ubuntu:xenial".to_string(), "grr:test".to_string(), source)
            .with_program(podman.display().to_string());
        let ctx = BuildContext::new(BuildLayout {
            source_dir: PathBuf::from("/usr/src/grr"),
            env_dir: PathBuf::from("/usr/share/grr-server"),
            wheelhouse_dir: PathBuf::from("/wheelhouse"),
            core_sdist_dir: PathBuf::from("/sdists/core"),
            server_sdist_dir: PathBuf::from("/sdists/server"),
            server_subdir: PathBuf::from("grr/config/grr-response-server"),
        });
        let container = PodmanBackend::container_name(&ctx);

        let err = backend.prepare(&ctx).unwrap_err();
        assert!(matches!(err, BuildError::Backend(ref m) if m.contains("copy failed")));
        assert_eq!(backend.current_container().unwrap(), container);

        backend.cleanup().unwrap();
        assert!(backend.current_container().is_err());
        // A second cleanup has nothing left to remove
        backend.cleanup().unwrap();

        let calls: Vec<String> = std::fs::read_to_string(&log)
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect();
        let rm = format!("rm -f {}", container);
        assert!(calls.iter().any(|c| c.starts_with("run -d --name")));
        assert!(calls.iter().any(|c| c.starts_with("cp ")));
        assert_eq!(calls.iter().filter(|c| **c == rm).count(), 1);
        assert_eq!(calls.last(), Some(&rm));
    }

    #[test]
    fn test_run_without_container_fails() {
        let backend = PodmanBackend::new(
            "ubuntu:xenial".to_string(),
            "grr:test".to_string(),
            PathBuf::from("/nonexistent"),
        );
        let step = Step::new(StageKind::Provision, "true");
        assert!(matches!(backend.run(&step), Err(BuildError::Backend(_))));
        assert!(backend.cleanup().is_ok());
    }
}
