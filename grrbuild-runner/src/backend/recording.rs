//! In-memory backend for tests
//!
//! Records every step, emulates the files `pip wheel` and `setup.py sdist`
//! would produce, and fails steps on demand.

use grrbuild_core::domain::context::{BuildContext, BuildLayout};
use grrbuild_core::domain::contract::RuntimeContract;
use grrbuild_core::domain::stage::{Step, StepOutput};
use grrbuild_core::{BuildError, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::CommandBackend;

pub const GRR_VERSION_INI: &str = "\
[Version]
major = 3
minor = 2
revision = 0
release = 1
packageversion = %(major)s.%(minor)s.%(revision)s.post%(release)s
";

type StepPredicate = Box<dyn Fn(&Step) -> bool + Send + Sync>;

pub struct RecordingBackend {
    steps: Mutex<Vec<Step>>,
    files: Mutex<HashMap<PathBuf, String>>,
    dirs: Mutex<HashMap<PathBuf, Vec<String>>>,
    /// `--dist-dir` value -> archive file the sdist step produces
    sdist_outputs: HashMap<PathBuf, String>,
    /// requirement -> wheel files `pip wheel` produces for it
    wheel_outputs: HashMap<String, Vec<String>>,
    fail_when: Option<StepPredicate>,
    /// Error `prepare` reports instead of readying the backend
    prepare_error: Option<String>,
    sealed: Mutex<Vec<RuntimeContract>>,
    cleaned_up: Mutex<bool>,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self {
            steps: Mutex::new(Vec::new()),
            files: Mutex::new(HashMap::new()),
            dirs: Mutex::new(HashMap::new()),
            sdist_outputs: HashMap::new(),
            wheel_outputs: HashMap::new(),
            fail_when: None,
            prepare_error: None,
            sealed: Mutex::new(Vec::new()),
            cleaned_up: Mutex::new(false),
        }
    }

    /// A backend behaving like a healthy GRR build of `version`
    pub fn grr(layout: &BuildLayout, version: &str) -> Self {
        Self::new()
            .with_file(layout.version_file(), GRR_VERSION_INI)
            .with_sdist_output(
                &layout.core_sdist_dir,
                &format!("grr-response-core-{}.zip", version),
            )
            .with_sdist_output(
                &layout.server_sdist_dir,
                &format!("grr-response-server-{}.zip", version),
            )
            .with_wheels(
                "grr-response-core",
                &[
                    "grr_response_core-3.2.0.post1-py2-none-any.whl",
                    "protobuf-3.3.0-cp27-cp27mu-manylinux1_x86_64.whl",
                    "six-1.10.0-py2.py3-none-any.whl",
                ],
            )
            .with_wheels(
                "grr-response-templates",
                &["grr_response_templates-3.2.0.post1-py2-none-any.whl"],
            )
    }

    pub fn with_file(self, path: impl Into<PathBuf>, content: &str) -> Self {
        self.files
            .lock()
            .unwrap()
            .insert(path.into(), content.to_string());
        self
    }

    pub fn with_sdist_output(mut self, dist_dir: &Path, file: &str) -> Self {
        self.sdist_outputs
            .insert(dist_dir.to_path_buf(), file.to_string());
        self
    }

    pub fn with_wheels(mut self, requirement: &str, files: &[&str]) -> Self {
        self.wheel_outputs.insert(
            requirement.to_string(),
            files.iter().map(|f| f.to_string()).collect(),
        );
        self
    }

    pub fn failing_when(mut self, predicate: impl Fn(&Step) -> bool + Send + Sync + 'static) -> Self {
        self.fail_when = Some(Box::new(predicate));
        self
    }

    pub fn failing_prepare(mut self, reason: &str) -> Self {
        self.prepare_error = Some(reason.to_string());
        self
    }

    pub fn steps(&self) -> Vec<Step> {
        self.steps.lock().unwrap().clone()
    }

    pub fn command_lines(&self) -> Vec<String> {
        self.steps().iter().map(|s| s.command_line()).collect()
    }

    pub fn sealed(&self) -> Vec<RuntimeContract> {
        self.sealed.lock().unwrap().clone()
    }

    pub fn cleaned_up(&self) -> bool {
        *self.cleaned_up.lock().unwrap()
    }

    fn produce(&self, step: &Step) {
        let mut dirs = self.dirs.lock().unwrap();

        if let Some(dist_dir) = step.flag_value("--dist-dir") {
            if let Some(file) = self.sdist_outputs.get(Path::new(dist_dir)) {
                dirs.entry(PathBuf::from(dist_dir))
                    .or_default()
                    .push(file.clone());
            }
        }

        if let Some(wheel_dir) = step.flag_value("--wheel-dir") {
            let requirement = step.args.last().cloned().unwrap_or_default();
            if let Some(files) = self.wheel_outputs.get(&requirement) {
                let entry = dirs.entry(PathBuf::from(wheel_dir)).or_default();
                for file in files {
                    if !entry.contains(file) {
                        entry.push(file.clone());
                    }
                }
            }
        }
    }
}

impl CommandBackend for RecordingBackend {
    fn name(&self) -> &'static str {
        "recording"
    }

    fn prepare(&self, _ctx: &BuildContext) -> Result<()> {
        match &self.prepare_error {
            Some(reason) => Err(BuildError::Backend(reason.clone())),
            None => Ok(()),
        }
    }

    fn run(&self, step: &Step) -> Result<StepOutput> {
        self.steps.lock().unwrap().push(step.clone());

        if self.fail_when.as_ref().is_some_and(|f| f(step)) {
            return Ok(StepOutput {
                stdout: String::new(),
                stderr: format!("{}: simulated failure", step.program),
                exit_code: 1,
            });
        }

        self.produce(step);
        Ok(StepOutput::default())
    }

    fn read_file(&self, path: &Path) -> Result<Option<String>> {
        Ok(self.files.lock().unwrap().get(path).cloned())
    }

    fn list_dir(&self, path: &Path) -> Result<Option<Vec<String>>> {
        Ok(self.dirs.lock().unwrap().get(path).map(|names| {
            let mut names = names.clone();
            names.sort();
            names
        }))
    }

    fn reset_dir(&self, path: &Path) -> Result<()> {
        if path.as_os_str().is_empty() {
            return Err(BuildError::Backend("empty path".to_string()));
        }
        self.dirs
            .lock()
            .unwrap()
            .insert(path.to_path_buf(), Vec::new());
        Ok(())
    }

    fn seal(&self, _ctx: &BuildContext, contract: &RuntimeContract) -> Result<String> {
        self.sealed.lock().unwrap().push(contract.clone());
        Ok("recorded".to_string())
    }

    fn cleanup(&self) -> Result<()> {
        *self.cleaned_up.lock().unwrap() = true;
        Ok(())
    }
}

/// Layout rooted at `/build`
pub fn test_layout() -> BuildLayout {
    BuildLayout {
        source_dir: PathBuf::from("/build/src"),
        env_dir: PathBuf::from("/build/env"),
        wheelhouse_dir: PathBuf::from("/build/wheelhouse"),
        core_sdist_dir: PathBuf::from("/build/sdists/core"),
        server_sdist_dir: PathBuf::from("/build/sdists/server"),
        server_subdir: PathBuf::from("grr/config/grr-response-server"),
    }
}
