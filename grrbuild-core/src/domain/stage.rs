//! Stage and step domain types

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// The five pipeline stages, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    Provision,
    Wheelhouse,
    Package,
    Install,
    Contract,
}

impl StageKind {
    /// Fixed execution order of the pipeline
    pub const ORDER: [StageKind; 5] = [
        StageKind::Provision,
        StageKind::Wheelhouse,
        StageKind::Package,
        StageKind::Install,
        StageKind::Contract,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            StageKind::Provision => "provision",
            StageKind::Wheelhouse => "wheelhouse",
            StageKind::Package => "package",
            StageKind::Install => "install",
            StageKind::Contract => "contract",
        }
    }

    /// Human readable description used in CLI output
    pub fn title(&self) -> &'static str {
        match self {
            StageKind::Provision => "Environment Provisioner",
            StageKind::Wheelhouse => "Dependency Cache Builder",
            StageKind::Package => "Source Packager",
            StageKind::Install => "Install Sequencer",
            StageKind::Contract => "Runtime Contract Emitter",
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Status of a stage within one build
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StageStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    /// Never started because an earlier stage failed
    Skipped,
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageStatus::Pending => write!(f, "Pending"),
            StageStatus::Running => write!(f, "Running"),
            StageStatus::Succeeded => write!(f, "Succeeded"),
            StageStatus::Failed => write!(f, "Failed"),
            StageStatus::Skipped => write!(f, "Skipped"),
        }
    }
}

/// A single command issued by a stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    pub stage: StageKind,
    pub program: String,
    pub args: Vec<String>,
    /// Working directory, `None` means the backend default
    pub cwd: Option<PathBuf>,
    pub env: Vec<(String, String)>,
}

impl Step {
    pub fn new(stage: StageKind, program: impl Into<String>) -> Self {
        Self {
            stage,
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            env: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Value of a `--flag=value` argument, if present
    pub fn flag_value(&self, flag: &str) -> Option<&str> {
        let prefix = format!("{}=", flag);
        self.args.iter().find_map(|a| a.strip_prefix(prefix.as_str()))
    }

    /// The command as an operator would type it
    pub fn command_line(&self) -> String {
        let mut parts = Vec::with_capacity(self.args.len() + 1);
        parts.push(quote(&self.program));
        parts.extend(self.args.iter().map(|a| quote(a)));
        parts.join(" ")
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(cwd) = &self.cwd {
            write!(f, "(cd {}) ", cwd.display())?;
        }
        f.write_str(&self.command_line())
    }
}

fn quote(s: &str) -> String {
    if !s.is_empty()
        && s.chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:,+@%[]".contains(c))
    {
        s.to_string()
    } else {
        format!("'{}'", s.replace('\'', r"'\''"))
    }
}

/// Captured result of a step
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StepOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl StepOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}
