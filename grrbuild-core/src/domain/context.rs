//! Build context
//!
//! The explicit handle every stage receives. It owns the paths of the
//! isolated environment, the wheelhouse and the sdist output directories for
//! one build, plus a state that only moves forward.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::error::{BuildError, Result};

/// Where a build reads and writes
///
/// All paths are as seen by the command backend (inside the build
/// container for podman, on the local filesystem for host builds).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildLayout {
    /// Checked-out source tree
    pub source_dir: PathBuf,
    /// Isolated Python environment
    pub env_dir: PathBuf,
    /// Pre-built package cache
    pub wheelhouse_dir: PathBuf,
    /// Output directory of the core sdist
    pub core_sdist_dir: PathBuf,
    /// Output directory of the server-extension sdist
    pub server_sdist_dir: PathBuf,
    /// Server-extension subtree, relative to `source_dir`
    pub server_subdir: PathBuf,
}

impl BuildLayout {
    /// Path of an executable inside the isolated environment
    pub fn env_bin(&self, tool: &str) -> PathBuf {
        self.env_dir.join("bin").join(tool)
    }

    pub fn server_source_dir(&self) -> PathBuf {
        self.source_dir.join(&self.server_subdir)
    }

    /// Path of the version-declaration file
    pub fn version_file(&self) -> PathBuf {
        self.source_dir
            .join(crate::domain::version::VersionInfo::FILE_NAME)
    }
}

/// Lifecycle of a build context
///
/// Each stage moves the context exactly one state forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ContextState {
    Fresh,
    Provisioned,
    Cached,
    Packaged,
    Installed,
    Sealed,
}

impl ContextState {
    pub fn next(&self) -> Option<ContextState> {
        match self {
            ContextState::Fresh => Some(ContextState::Provisioned),
            ContextState::Provisioned => Some(ContextState::Cached),
            ContextState::Cached => Some(ContextState::Packaged),
            ContextState::Packaged => Some(ContextState::Installed),
            ContextState::Installed => Some(ContextState::Sealed),
            ContextState::Sealed => None,
        }
    }
}

impl fmt::Display for ContextState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContextState::Fresh => write!(f, "Fresh"),
            ContextState::Provisioned => write!(f, "Provisioned"),
            ContextState::Cached => write!(f, "Cached"),
            ContextState::Packaged => write!(f, "Packaged"),
            ContextState::Installed => write!(f, "Installed"),
            ContextState::Sealed => write!(f, "Sealed"),
        }
    }
}

/// Handle for one build
#[derive(Debug, Clone)]
pub struct BuildContext {
    id: Uuid,
    layout: BuildLayout,
    state: ContextState,
}

impl BuildContext {
    pub fn new(layout: BuildLayout) -> Self {
        Self {
            id: Uuid::new_v4(),
            layout,
            state: ContextState::Fresh,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn layout(&self) -> &BuildLayout {
        &self.layout
    }

    pub fn state(&self) -> ContextState {
        self.state
    }

    pub fn env_dir(&self) -> &Path {
        &self.layout.env_dir
    }

    /// Fails unless the context is currently in `expected`
    pub fn expect(&self, expected: ContextState) -> Result<()> {
        if self.state != expected {
            return Err(BuildError::State {
                expected,
                found: self.state,
            });
        }
        Ok(())
    }

    /// Moves the context to `to`, which must be the immediate successor
    pub fn advance(&mut self, to: ContextState) -> Result<()> {
        match self.state.next() {
            Some(next) if next == to => {
                self.state = to;
                Ok(())
            }
            _ => Err(BuildError::State {
                expected: to,
                found: self.state,
            }),
        }
    }
}
