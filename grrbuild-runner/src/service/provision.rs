//! Environment provisioner
//!
//! Installs the OS-level prerequisites and creates the isolated
//! environment every later stage installs into.

use async_trait::async_trait;
use grrbuild_core::{BuildError, Result};
use grrbuild_core::domain::context::{BuildContext, ContextState};
use grrbuild_core::domain::recipe::BuildRecipe;
use grrbuild_core::domain::stage::{StageKind, Step};
use std::sync::Arc;

use super::{Artifacts, Stage, StageIo};

pub struct EnvironmentProvisioner {
    recipe: Arc<BuildRecipe>,
}

impl EnvironmentProvisioner {
    pub fn new(recipe: Arc<BuildRecipe>) -> Self {
        Self { recipe }
    }

    fn apt_get(&self) -> Step {
        Step::new(StageKind::Provision, "apt-get").env("DEBIAN_FRONTEND", "noninteractive")
    }
}

#[async_trait]
impl Stage for EnvironmentProvisioner {
    fn kind(&self) -> StageKind {
        StageKind::Provision
    }

    fn plan(&self, ctx: &BuildContext, _artifacts: &Artifacts) -> Vec<Step> {
        let layout = ctx.layout();
        let env_dir = layout.env_dir.display().to_string();

        vec![
            self.apt_get().arg("update"),
            self.apt_get()
                .args(["install", "-y", "--no-install-recommends"])
                .args(self.recipe.os_packages.iter().cloned()),
            Step::new(StageKind::Provision, "pip")
                .args(["install", "--upgrade"])
                .args(self.recipe.bootstrap_packages.iter().cloned()),
            Step::new(StageKind::Provision, "virtualenv").arg(env_dir),
            Step::new(
                StageKind::Provision,
                layout.env_bin("pip").display().to_string(),
            )
            .args(["install", "--upgrade"])
            .args(self.recipe.env_packages.iter().cloned()),
        ]
    }

    async fn run(
        &self,
        ctx: &mut BuildContext,
        io: &StageIo<'_>,
        artifacts: &mut Artifacts,
    ) -> Result<()> {
        // The environment is created exactly once per context
        ctx.expect(ContextState::Fresh)?;

        if self.recipe.os_packages.is_empty() {
            return Err(BuildError::for_stage(
                StageKind::Provision,
                "no OS prerequisites to install",
                None,
            ));
        }

        for step in self.plan(ctx, artifacts) {
            io.run(&step)?;
        }

        io.info(
            StageKind::Provision,
            format!("Isolated environment ready at {}", ctx.env_dir().display()),
        );
        ctx.advance(ContextState::Provisioned)
    }
}
