//! Runner configuration
//!
//! Defines where a build reads and writes, which backend executes its
//! commands and how the alternate index is checked.

use grrbuild_core::domain::context::BuildLayout;
use grrbuild_core::domain::recipe::BuildRecipe;
use std::path::PathBuf;
use std::time::Duration;

use crate::backend::BackendKind;

/// Isolated environment location used by the GRR images
pub const DEFAULT_ENV_DIR: &str = "/usr/share/grr-server";

/// Where the source tree lives inside a podman build container
///
/// The entrypoint script path of the runtime contract is relative to it.
pub const CONTAINER_SOURCE_DIR: &str = "/usr/src/grr";

/// Runner configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Which backend executes commands
    pub backend: BackendKind,

    /// Source tree on the machine running grrbuild
    pub source_dir: PathBuf,

    /// Isolated environment directory (GRR_VENV)
    pub env_dir: PathBuf,

    /// Package cache directory
    pub wheelhouse_dir: PathBuf,

    /// Parent of the `core` and `server` sdist output directories
    pub sdist_dir: PathBuf,

    /// Where the host backend writes the runtime contract
    pub output_dir: PathBuf,

    /// Overrides the recipe's base image for podman builds
    pub base_image: Option<String>,

    /// Image name the podman backend commits to
    pub image_tag: String,

    /// Overrides the recipe's alternate index URL
    pub templates_index: Option<String>,

    /// Check the alternate index over HTTP before resolving
    pub probe_index: bool,

    /// Timeout of the alternate index check
    pub probe_timeout: Duration,
}

impl Config {
    /// Creates a new configuration with defaults
    pub fn new(backend: BackendKind, source_dir: PathBuf) -> Self {
        Self {
            backend,
            source_dir,
            env_dir: PathBuf::from(DEFAULT_ENV_DIR),
            wheelhouse_dir: PathBuf::from("/wheelhouse"),
            sdist_dir: PathBuf::from("/sdists"),
            output_dir: PathBuf::from("."),
            base_image: None,
            image_tag: "localhost/grr-server:latest".to_string(),
            templates_index: None,
            probe_index: true,
            probe_timeout: Duration::from_secs(30),
        }
    }

    /// Creates configuration from environment variables
    ///
    /// Expected environment variables (all optional):
    /// - GRRBUILD_BACKEND (host | podman, default: host)
    /// - GRRBUILD_SOURCE_DIR (default: current directory)
    /// - GRR_VENV (default: /usr/share/grr-server)
    /// - GRRBUILD_WHEELHOUSE (default: /wheelhouse)
    /// - GRRBUILD_SDIST_DIR (default: /sdists)
    /// - GRRBUILD_OUTPUT_DIR (default: .)
    /// - GRRBUILD_BASE_IMAGE (default: recipe value)
    /// - GRRBUILD_IMAGE_TAG (default: localhost/grr-server:latest)
    /// - GRRBUILD_TEMPLATES_INDEX (default: recipe value)
    /// - GRRBUILD_PROBE_INDEX (true | false, default: true)
    /// - GRRBUILD_PROBE_TIMEOUT (seconds, default: 30)
    pub fn from_env() -> anyhow::Result<Self> {
        let backend = match std::env::var("GRRBUILD_BACKEND") {
            Ok(value) => value.parse::<BackendKind>()?,
            Err(_) => BackendKind::Host,
        };

        let source_dir = match std::env::var("GRRBUILD_SOURCE_DIR") {
            Ok(dir) => PathBuf::from(dir),
            Err(_) => std::env::current_dir()
                .map_err(|e| anyhow::anyhow!("Cannot determine current directory: {}", e))?,
        };

        let mut config = Self::new(backend, source_dir);

        if let Ok(dir) = std::env::var("GRR_VENV") {
            config.env_dir = PathBuf::from(dir);
        }
        if let Ok(dir) = std::env::var("GRRBUILD_WHEELHOUSE") {
            config.wheelhouse_dir = PathBuf::from(dir);
        }
        if let Ok(dir) = std::env::var("GRRBUILD_SDIST_DIR") {
            config.sdist_dir = PathBuf::from(dir);
        }
        if let Ok(dir) = std::env::var("GRRBUILD_OUTPUT_DIR") {
            config.output_dir = PathBuf::from(dir);
        }
        if let Ok(tag) = std::env::var("GRRBUILD_IMAGE_TAG") {
            config.image_tag = tag;
        }

        config.base_image = std::env::var("GRRBUILD_BASE_IMAGE").ok();
        config.templates_index = std::env::var("GRRBUILD_TEMPLATES_INDEX").ok();

        config.probe_index = std::env::var("GRRBUILD_PROBE_INDEX")
            .ok()
            .and_then(|s| s.parse::<bool>().ok())
            .unwrap_or(true);

        config.probe_timeout = std::env::var("GRRBUILD_PROBE_TIMEOUT")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(30));

        Ok(config)
    }

    /// Applies configuration overrides to a recipe
    pub fn apply_to(&self, recipe: &mut BuildRecipe) {
        if let Some(image) = &self.base_image {
            recipe.base_image = image.clone();
        }
        if let Some(url) = &self.templates_index {
            recipe.templates_index.url = url.clone();
        }
    }

    /// Paths of a build, as seen by the configured backend
    pub fn layout(&self, recipe: &BuildRecipe) -> BuildLayout {
        let source_dir = match self.backend {
            BackendKind::Host => self.source_dir.clone(),
            BackendKind::Podman => PathBuf::from(CONTAINER_SOURCE_DIR),
        };

        BuildLayout {
            source_dir,
            env_dir: self.env_dir.clone(),
            wheelhouse_dir: self.wheelhouse_dir.clone(),
            core_sdist_dir: self.sdist_dir.join("core"),
            server_sdist_dir: self.sdist_dir.join("server"),
            server_subdir: recipe.server_subdir.clone(),
        }
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        for (name, path) in [
            ("env_dir", &self.env_dir),
            ("wheelhouse_dir", &self.wheelhouse_dir),
            ("sdist_dir", &self.sdist_dir),
        ] {
            if !path.is_absolute() {
                anyhow::bail!("{} must be an absolute path", name);
            }
        }

        if self.wheelhouse_dir == self.sdist_dir {
            anyhow::bail!("wheelhouse_dir and sdist_dir must differ");
        }

        if self.sdist_dir.starts_with(&self.env_dir) || self.wheelhouse_dir.starts_with(&self.env_dir)
        {
            anyhow::bail!("build outputs cannot live inside the isolated environment");
        }

        if self.source_dir.as_os_str().is_empty() {
            anyhow::bail!("source_dir cannot be empty");
        }

        if self.backend == BackendKind::Podman && self.image_tag.trim().is_empty() {
            anyhow::bail!("image_tag cannot be empty for podman builds");
        }

        if let Some(url) = &self.templates_index {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                anyhow::bail!("templates_index must start with http:// or https://");
            }
        }

        if self.probe_index && self.probe_timeout.as_secs() == 0 {
            anyhow::bail!("probe_timeout must be greater than 0");
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new(BackendKind::Host, PathBuf::from("."))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.env_dir, PathBuf::from("/usr/share/grr-server"));
        assert_eq!(config.wheelhouse_dir, PathBuf::from("/wheelhouse"));
        assert_eq!(config.probe_timeout, Duration::from_secs(30));
        assert!(config.probe_index);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();
        assert!(config.validate().is_ok());

        config.env_dir = PathBuf::from("relative/env");
        assert!(config.validate().is_err());
        config.env_dir = PathBuf::from(DEFAULT_ENV_DIR);

        config.sdist_dir = config.wheelhouse_dir.clone();
        assert!(config.validate().is_err());
        config.sdist_dir = PathBuf::from("/usr/share/grr-server/sdists");
        assert!(config.validate().is_err());
        config.sdist_dir = PathBuf::from("/sdists");

        config.templates_index = Some("not-a-url".to_string());
        assert!(config.validate().is_err());
        config.templates_index = Some("https://mirror.example.com/index.html".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_layout_per_backend() {
        let recipe = BuildRecipe::default();

        let host = Config::new(BackendKind::Host, PathBuf::from("/home/dev/grr"));
        let layout = host.layout(&recipe);
        assert_eq!(layout.source_dir, PathBuf::from("/home/dev/grr"));
        assert_eq!(layout.core_sdist_dir, PathBuf::from("/sdists/core"));
        assert_eq!(layout.server_sdist_dir, PathBuf::from("/sdists/server"));

        let podman = Config::new(BackendKind::Podman, PathBuf::from("/home/dev/grr"));
        assert_eq!(
            podman.layout(&recipe).source_dir,
            PathBuf::from(CONTAINER_SOURCE_DIR)
        );
    }

    #[test]
    fn test_apply_templates_override() {
        let mut recipe = BuildRecipe::default();
        let mut config = Config::default();
        config.apply_to(&mut recipe);
        assert_eq!(recipe, BuildRecipe::default());

        config.templates_index = Some("https://mirror.example.com/index.html".to_string());
        config.base_image = Some("docker.io/library/ubuntu:bionic".to_string());
        config.apply_to(&mut recipe);
        assert_eq!(
            recipe.templates_index.url,
            "https://mirror.example.com/index.html"
        );
        assert_eq!(recipe.base_image, "docker.io/library/ubuntu:bionic");
    }
}
