//! Build recipe
//!
//! Describes what a build installs and packages. Where the files live is a
//! runtime concern handled by the runner configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{BuildError, Result};

/// Default alternate index hosting `grr-response-templates`
pub const TEMPLATES_INDEX_URL: &str =
    "https://storage.googleapis.com/releases.grr-response.com/index.html";

/// A package to resolve
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageSpec {
    pub name: String,
    /// PEP 440 constraint appended to the name, e.g. `>=3.2`
    #[serde(default)]
    pub constraint: Option<String>,
    /// Allow pre-release versions
    #[serde(default)]
    pub pre_release: bool,
}

impl PackageSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            constraint: None,
            pre_release: false,
        }
    }

    pub fn with_pre_release(mut self) -> Self {
        self.pre_release = true;
        self
    }

    /// Requirement string as passed to pip
    pub fn requirement(&self) -> String {
        match &self.constraint {
            Some(c) => format!("{}{}", self.name, c.trim()),
            None => self.name.clone(),
        }
    }
}

/// How pip should read an alternate index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexKind {
    /// A flat HTML page of links (`--find-links`)
    FindLinks,
    /// A PEP 503 simple index (`--index-url`)
    Simple,
}

/// Index override for the templates package
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlternateIndex {
    pub url: String,
    pub kind: IndexKind,
}

impl AlternateIndex {
    pub fn find_links(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            kind: IndexKind::FindLinks,
        }
    }

    pub fn pip_arg(&self) -> String {
        match self.kind {
            IndexKind::FindLinks => format!("--find-links={}", self.url),
            IndexKind::Simple => format!("--index-url={}", self.url),
        }
    }
}

/// Everything a build needs to know besides paths
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildRecipe {
    /// Base image for podman builds
    pub base_image: String,
    /// OS-level prerequisites installed with apt-get
    pub os_packages: Vec<String>,
    /// Installed with the system pip before the environment exists
    pub bootstrap_packages: Vec<String>,
    /// Upgraded inside the environment right after it is created
    pub env_packages: Vec<String>,
    /// Core package, whose closure is pre-built into the wheelhouse
    pub core: PackageSpec,
    /// Server-extension package built from `server_subdir`
    pub server_package: String,
    /// Templates package resolved from `templates_index`
    pub templates: PackageSpec,
    pub templates_index: AlternateIndex,
    /// Server-extension subtree, relative to the source root
    pub server_subdir: PathBuf,
    /// Extra `setup.py sdist` options for the core package
    pub core_sdist_options: Vec<String>,
    /// `--formats` value passed to `setup.py sdist`
    pub sdist_format: String,
}

impl BuildRecipe {
    /// Recipe for the GRR server image
    pub fn grr_server() -> Self {
        Self {
            base_image: "docker.io/library/ubuntu:xenial".to_string(),
            os_packages: [
                "build-essential",
                "debhelper",
                "dh-virtualenv",
                "libffi-dev",
                "libssl-dev",
                "python-dev",
                "python-pip",
                "protobuf-compiler",
                "git",
                "wget",
                "zip",
                "unzip",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            bootstrap_packages: vec!["setuptools".to_string(), "virtualenv".to_string()],
            env_packages: ["pip", "wheel", "setuptools", "six"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            core: PackageSpec::new("grr-response-core").with_pre_release(),
            server_package: "grr-response-server".to_string(),
            templates: PackageSpec::new("grr-response-templates"),
            templates_index: AlternateIndex::find_links(TEMPLATES_INDEX_URL),
            server_subdir: PathBuf::from("grr/config/grr-response-server"),
            core_sdist_options: vec![
                "--no-make-docs".to_string(),
                "--no-sync-artifacts".to_string(),
            ],
            sdist_format: "zip".to_string(),
        }
    }

    /// Loads a recipe from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| BuildError::io(path, e))?;
        let recipe: Self = serde_json::from_str(&content)
            .map_err(|e| BuildError::Recipe(format!("{}: {}", path.display(), e)))?;
        recipe.validate()?;
        Ok(recipe)
    }

    /// Validates the recipe
    pub fn validate(&self) -> Result<()> {
        if self.base_image.trim().is_empty() {
            return Err(BuildError::Recipe("base_image cannot be empty".to_string()));
        }

        if self.os_packages.is_empty() {
            return Err(BuildError::Recipe(
                "os_packages must list the build prerequisites".to_string(),
            ));
        }

        for (field, value) in [
            ("core.name", &self.core.name),
            ("server_package", &self.server_package),
            ("templates.name", &self.templates.name),
        ] {
            if value.trim().is_empty() {
                return Err(BuildError::Recipe(format!("{} cannot be empty", field)));
            }
        }

        if !self.templates_index.url.starts_with("http://")
            && !self.templates_index.url.starts_with("https://")
        {
            return Err(BuildError::Recipe(
                "templates_index.url must start with http:// or https://".to_string(),
            ));
        }

        if self.server_subdir.as_os_str().is_empty() || self.server_subdir.is_absolute() {
            return Err(BuildError::Recipe(
                "server_subdir must be a relative path inside the source tree".to_string(),
            ));
        }

        if !matches!(self.sdist_format.as_str(), "zip" | "gztar") {
            return Err(BuildError::Recipe(format!(
                "unsupported sdist format: {}",
                self.sdist_format
            )));
        }

        Ok(())
    }
}

impl Default for BuildRecipe {
    fn default() -> Self {
        Self::grr_server()
    }
}
