//! Dependency cache builder
//!
//! Pre-builds the core package's dependency closure and the templates
//! package into the wheelhouse so the installs that follow resolve locally.

use async_trait::async_trait;
use grrbuild_core::Result;
use grrbuild_core::domain::context::{BuildContext, ContextState};
use grrbuild_core::domain::recipe::{BuildRecipe, PackageSpec};
use grrbuild_core::domain::stage::{StageKind, Step};
use std::sync::Arc;

use super::probe::IndexProbe;
use super::{Artifacts, Stage, StageIo};

pub struct DependencyCacheBuilder {
    recipe: Arc<BuildRecipe>,
    probe: Arc<dyn IndexProbe>,
}

impl DependencyCacheBuilder {
    pub fn new(recipe: Arc<BuildRecipe>, probe: Arc<dyn IndexProbe>) -> Self {
        Self { recipe, probe }
    }

    /// `pip wheel` for one package; the requirement is always the last argument
    fn wheel_step(ctx: &BuildContext, package: &PackageSpec, index_arg: Option<String>) -> Step {
        let layout = ctx.layout();
        let mut step = Step::new(
            StageKind::Wheelhouse,
            layout.env_bin("pip").display().to_string(),
        )
        .arg("wheel")
        .arg(format!("--wheel-dir={}", layout.wheelhouse_dir.display()));

        if let Some(index_arg) = index_arg {
            step = step.arg(index_arg);
        }
        if package.pre_release {
            step = step.arg("--pre");
        }
        step.arg(package.requirement())
    }
}

#[async_trait]
impl Stage for DependencyCacheBuilder {
    fn kind(&self) -> StageKind {
        StageKind::Wheelhouse
    }

    fn plan(&self, ctx: &BuildContext, _artifacts: &Artifacts) -> Vec<Step> {
        vec![
            Self::wheel_step(ctx, &self.recipe.core, None),
            Self::wheel_step(
                ctx,
                &self.recipe.templates,
                Some(self.recipe.templates_index.pip_arg()),
            ),
        ]
    }

    async fn run(
        &self,
        ctx: &mut BuildContext,
        io: &StageIo<'_>,
        artifacts: &mut Artifacts,
    ) -> Result<()> {
        ctx.expect(ContextState::Provisioned)?;

        // An unavailable alternate index fails the stage before any resolution
        self.probe
            .check(&self.recipe.templates_index, &self.recipe.templates)
            .await?;

        for step in self.plan(ctx, artifacts) {
            io.run(&step)?;
        }

        let wheelhouse_dir = &ctx.layout().wheelhouse_dir;
        let listing = io.backend.list_dir(wheelhouse_dir)?.unwrap_or_default();
        if listing.is_empty() {
            io.warn(
                StageKind::Wheelhouse,
                format!("{} is empty after resolution", wheelhouse_dir.display()),
            );
        } else {
            io.info(
                StageKind::Wheelhouse,
                format!(
                    "{} artifact(s) cached in {}",
                    listing.len(),
                    wheelhouse_dir.display()
                ),
            );
        }
        artifacts.wheelhouse = listing;

        ctx.advance(ContextState::Cached)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::recording::{RecordingBackend, test_layout};
    use crate::service::InMemoryLogBuffer;
    use crate::service::probe::tests::StaticProbe;
    use grrbuild_core::BuildError;

    fn provisioned() -> BuildContext {
        let mut ctx = BuildContext::new(test_layout());
        ctx.advance(ContextState::Provisioned).unwrap();
        ctx
    }

    #[tokio::test]
    async fn test_wheel_steps() {
        let layout = test_layout();
        let backend = RecordingBackend::grr(&layout, "3.2.0.post1");
        let log = InMemoryLogBuffer::new();
        let io = StageIo::new(&backend, &log);
        let mut ctx = provisioned();
        let mut artifacts = Artifacts::default();
        let stage = DependencyCacheBuilder::new(
            Arc::new(BuildRecipe::default()),
            Arc::new(StaticProbe::new(true)),
        );

        stage.run(&mut ctx, &io, &mut artifacts).await.unwrap();

        assert_eq!(
            backend.command_lines(),
            vec![
                "/build/env/bin/pip wheel --wheel-dir=/build/wheelhouse --pre grr-response-core",
                "/build/env/bin/pip wheel --wheel-dir=/build/wheelhouse \
                 --find-links=https://storage.googleapis.com/releases.grr-response.com/index.html \
                 grr-response-templates",
            ]
        );
        assert_eq!(ctx.state(), ContextState::Cached);
    }

    #[tokio::test]
    async fn test_listing_is_sorted() {
        let layout = test_layout();
        let backend = RecordingBackend::grr(&layout, "3.2.0.post1");
        let log = InMemoryLogBuffer::new();
        let io = StageIo::new(&backend, &log);
        let mut ctx = provisioned();
        let mut artifacts = Artifacts::default();
        let stage = DependencyCacheBuilder::new(
            Arc::new(BuildRecipe::default()),
            Arc::new(StaticProbe::new(true)),
        );

        stage.run(&mut ctx, &io, &mut artifacts).await.unwrap();

        let mut sorted = artifacts.wheelhouse.clone();
        sorted.sort();
        assert_eq!(artifacts.wheelhouse, sorted);
        assert_eq!(artifacts.wheelhouse.len(), 4);
    }

    #[tokio::test]
    async fn test_unavailable_index_stops_before_resolution() {
        let backend = RecordingBackend::new();
        let log = InMemoryLogBuffer::new();
        let io = StageIo::new(&backend, &log);
        let mut ctx = provisioned();
        let probe = Arc::new(StaticProbe::new(false));
        let stage = DependencyCacheBuilder::new(Arc::new(BuildRecipe::default()), probe.clone());

        let err = stage
            .run(&mut ctx, &io, &mut Artifacts::default())
            .await
            .unwrap_err();

        assert!(matches!(err, BuildError::Resolution { .. }));
        assert!(backend.steps().is_empty());
        assert_eq!(*probe.calls.lock().unwrap(), 1);
        assert_eq!(ctx.state(), ContextState::Provisioned);
    }

    #[tokio::test]
    async fn test_core_failure_skips_templates() {
        let backend = RecordingBackend::new().failing_when(|s| {
            s.args.last().map(String::as_str) == Some("grr-response-core")
        });
        let log = InMemoryLogBuffer::new();
        let io = StageIo::new(&backend, &log);
        let mut ctx = provisioned();
        let stage = DependencyCacheBuilder::new(
            Arc::new(BuildRecipe::default()),
            Arc::new(StaticProbe::new(true)),
        );

        let err = stage
            .run(&mut ctx, &io, &mut Artifacts::default())
            .await
            .unwrap_err();

        assert!(matches!(err, BuildError::Resolution { .. }));
        assert_eq!(backend.steps().len(), 1);
    }

    #[test]
    fn test_simple_index_and_constraints() {
        let mut recipe = BuildRecipe::default();
        recipe.templates_index.kind = grrbuild_core::domain::recipe::IndexKind::Simple;
        recipe.templates_index.url = "https://pypi.example.com/simple".to_string();
        recipe.templates.constraint = Some("==3.2.0.post1".to_string());
        let stage = DependencyCacheBuilder::new(Arc::new(recipe), Arc::new(StaticProbe::new(true)));

        let steps = stage.plan(&provisioned(), &Artifacts::default());
        assert_eq!(
            steps[1].flag_value("--index-url"),
            Some("https://pypi.example.com/simple")
        );
        assert_eq!(
            steps[1].args.last().map(String::as_str),
            Some("grr-response-templates==3.2.0.post1")
        );
    }

    #[tokio::test]
    async fn test_requires_provisioned_context() {
        let backend = RecordingBackend::new();
        let log = InMemoryLogBuffer::new();
        let io = StageIo::new(&backend, &log);
        let mut ctx = BuildContext::new(test_layout());
        let stage = DependencyCacheBuilder::new(
            Arc::new(BuildRecipe::default()),
            Arc::new(StaticProbe::new(true)),
        );

        let err = stage
            .run(&mut ctx, &io, &mut Artifacts::default())
            .await
            .unwrap_err();
        assert!(matches!(err, BuildError::State { .. }));
    }
}
