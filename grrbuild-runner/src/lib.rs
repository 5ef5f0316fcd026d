//! grrbuild Runner
//!
//! Executes the GRR server image build as a strictly sequential, fail-fast
//! pipeline.
//!
//! Architecture:
//! - Configuration: paths and backend selection from environment or defaults
//! - Backends: where commands run (the local host, or a podman build container)
//! - Services: one per pipeline stage, plus log buffering and index probing
//! - Pipeline: runs the stages in order and stops at the first failure

pub mod backend;
pub mod config;
pub mod pipeline;
pub mod service;

use grrbuild_core::domain::recipe::BuildRecipe;
use std::sync::Arc;

use crate::backend::{BackendKind, CommandBackend, HostBackend, PodmanBackend};
use crate::config::Config;
use crate::service::{HttpIndexProbe, IndexProbe, SkipIndexProbe};

pub use pipeline::{BuildPipeline, PipelineOutcome};

/// Creates the command backend selected by the configuration
pub fn create_backend(config: &Config, recipe: &BuildRecipe) -> Arc<dyn CommandBackend> {
    match config.backend {
        BackendKind::Host => Arc::new(HostBackend::new(config.output_dir.clone())),
        BackendKind::Podman => Arc::new(PodmanBackend::new(
            recipe.base_image.clone(),
            config.image_tag.clone(),
            config.source_dir.clone(),
        )),
    }
}

/// Creates the alternate-index probe, or a no-op when probing is disabled
pub fn create_probe(config: &Config) -> anyhow::Result<Arc<dyn IndexProbe>> {
    if !config.probe_index {
        return Ok(Arc::new(SkipIndexProbe));
    }
    Ok(Arc::new(HttpIndexProbe::new(config.probe_timeout)?))
}
