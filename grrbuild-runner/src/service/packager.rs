//! Source packager
//!
//! Builds the core and server-extension sdists from the source tree and
//! checks that both carry the version declared in `version.ini`.

use async_trait::async_trait;
use grrbuild_core::domain::context::{BuildContext, ContextState};
use grrbuild_core::domain::recipe::BuildRecipe;
use grrbuild_core::domain::sdist::{BuiltSdist, PackageRole, is_archive};
use grrbuild_core::domain::stage::{StageKind, Step};
use grrbuild_core::domain::version::VersionInfo;
use grrbuild_core::{BuildError, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

use super::{Artifacts, Stage, StageIo};

pub struct SourcePackager {
    recipe: Arc<BuildRecipe>,
}

fn packaging_error(reason: impl Into<String>) -> BuildError {
    BuildError::for_stage(StageKind::Package, reason, None)
}

impl SourcePackager {
    pub fn new(recipe: Arc<BuildRecipe>) -> Self {
        Self { recipe }
    }

    fn sdist_step(&self, ctx: &BuildContext, source: PathBuf, dist_dir: &Path) -> Step {
        Step::new(
            StageKind::Package,
            ctx.layout().env_bin("python").display().to_string(),
        )
        .args(["setup.py", "sdist"])
        .arg(format!("--formats={}", self.recipe.sdist_format))
        .arg(format!("--dist-dir={}", dist_dir.display()))
        .current_dir(source)
    }

    fn core_step(&self, ctx: &BuildContext) -> Step {
        let layout = ctx.layout();
        self.sdist_step(ctx, layout.source_dir.clone(), &layout.core_sdist_dir)
            .args(self.recipe.core_sdist_options.iter().cloned())
    }

    fn server_step(&self, ctx: &BuildContext) -> Step {
        let layout = ctx.layout();
        self.sdist_step(ctx, layout.server_source_dir(), &layout.server_sdist_dir)
    }

    fn package_name(&self, role: PackageRole) -> &str {
        match role {
            PackageRole::Core => &self.recipe.core.name,
            PackageRole::Server => &self.recipe.server_package,
        }
    }

    /// Reads and parses `version.ini` through the backend
    fn read_version(ctx: &BuildContext, io: &StageIo<'_>) -> Result<VersionInfo> {
        let path = ctx.layout().version_file();
        let content = io
            .backend
            .read_file(&path)?
            .ok_or_else(|| packaging_error(format!("{} not found", path.display())))?;

        VersionInfo::from_ini(&content)
            .map_err(|e| packaging_error(format!("{}: {}", path.display(), e)))
    }

    /// Finds the single archive a sdist step left in `dir` and checks it
    fn collect(
        &self,
        io: &StageIo<'_>,
        role: PackageRole,
        dir: &Path,
        version: &VersionInfo,
    ) -> Result<BuiltSdist> {
        let archives: Vec<String> = io
            .backend
            .list_dir(dir)?
            .unwrap_or_default()
            .into_iter()
            .filter(|name| is_archive(name))
            .collect();

        let file_name = match archives.as_slice() {
            [single] => single,
            [] => {
                return Err(packaging_error(format!(
                    "no {} sdist found in {}",
                    role,
                    dir.display()
                )));
            }
            many => {
                return Err(packaging_error(format!(
                    "expected one {} sdist in {}, found {}: {}",
                    role,
                    dir.display(),
                    many.len(),
                    many.join(", ")
                )));
            }
        };

        let sdist = BuiltSdist::from_archive(role, dir, file_name).ok_or_else(|| {
            packaging_error(format!("cannot read name and version from {}", file_name))
        })?;

        let expected_package = self.package_name(role);
        if !sdist.is_package(expected_package) {
            return Err(packaging_error(format!(
                "{} is not an sdist of {}",
                file_name, expected_package
            )));
        }

        if !sdist.has_version(version.package_version()) {
            return Err(packaging_error(format!(
                "{} carries version {}, {} declares {}",
                file_name,
                sdist.version,
                VersionInfo::FILE_NAME,
                version.package_version()
            )));
        }

        debug!("Collected {} sdist {}", role, sdist.archive.display());
        Ok(sdist)
    }
}

#[async_trait]
impl Stage for SourcePackager {
    fn kind(&self) -> StageKind {
        StageKind::Package
    }

    fn plan(&self, ctx: &BuildContext, _artifacts: &Artifacts) -> Vec<Step> {
        vec![self.core_step(ctx), self.server_step(ctx)]
    }

    async fn run(
        &self,
        ctx: &mut BuildContext,
        io: &StageIo<'_>,
        artifacts: &mut Artifacts,
    ) -> Result<()> {
        ctx.expect(ContextState::Cached)?;

        let version = Self::read_version(ctx, io)?;
        io.info(
            StageKind::Package,
            format!("Packaging version {}", version.package_version()),
        );

        // Sdists are never reused across runs
        let layout = ctx.layout();
        io.backend.reset_dir(&layout.core_sdist_dir)?;
        io.backend.reset_dir(&layout.server_sdist_dir)?;

        io.run(&self.core_step(ctx))?;
        let core = self.collect(io, PackageRole::Core, &layout.core_sdist_dir, &version)?;

        io.run(&self.server_step(ctx))?;
        let server = self.collect(io, PackageRole::Server, &layout.server_sdist_dir, &version)?;

        io.info(
            StageKind::Package,
            format!(
                "Built {} and {}",
                core.archive.display(),
                server.archive.display()
            ),
        );

        artifacts.version = Some(version);
        artifacts.sdists = vec![core, server];
        ctx.advance(ContextState::Packaged)
    }
}
