//! Install sequencer
//!
//! Installs the core sdist and then the server-extension sdist into the
//! isolated environment, resolving dependencies from the wheelhouse before
//! the network.

use async_trait::async_trait;
use grrbuild_core::domain::context::{BuildContext, ContextState};
use grrbuild_core::domain::sdist::{BuiltSdist, PackageRole};
use grrbuild_core::domain::stage::{StageKind, Step};
use grrbuild_core::{BuildError, Result};
use std::path::{Path, PathBuf};

use super::{Artifacts, Stage, StageIo};

/// Where pip may find a distribution
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolutionSource {
    /// The local wheelhouse, with every index disabled
    Cache(PathBuf),
    /// The default package index
    Remote,
}

impl ResolutionSource {
    /// pip arguments restricting resolution to this source alone
    pub fn pip_args(&self) -> Vec<String> {
        match self {
            ResolutionSource::Cache(dir) => vec![
                "--no-index".to_string(),
                format!("--find-links={}", dir.display()),
            ],
            ResolutionSource::Remote => Vec::new(),
        }
    }
}

impl std::fmt::Display for ResolutionSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResolutionSource::Cache(dir) => write!(f, "wheelhouse {}", dir.display()),
            ResolutionSource::Remote => write!(f, "default index"),
        }
    }
}

/// Ordered resolution tiers, highest precedence first
///
/// Each tier is tried on its own. A later tier is only consulted when every
/// earlier one failed to install the package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolutionPlan {
    sources: Vec<ResolutionSource>,
}

impl ResolutionPlan {
    /// Wheelhouse first, then the default index
    pub fn cache_first(wheelhouse: &Path) -> Self {
        Self {
            sources: vec![
                ResolutionSource::Cache(wheelhouse.to_path_buf()),
                ResolutionSource::Remote,
            ],
        }
    }

    pub fn remote_only() -> Self {
        Self {
            sources: vec![ResolutionSource::Remote],
        }
    }

    /// Picks the plan from what the wheelhouse holds
    ///
    /// # Arguments
    /// * `wheelhouse` - The wheelhouse directory
    /// * `listing` - Its entries, `None` if the directory does not exist
    pub fn for_wheelhouse(wheelhouse: &Path, listing: Option<&[String]>) -> Self {
        let has_artifacts = listing
            .map(|names| names.iter().any(|n| !n.starts_with('.')))
            .unwrap_or(false);

        if has_artifacts {
            Self::cache_first(wheelhouse)
        } else {
            Self::remote_only()
        }
    }

    pub fn sources(&self) -> &[ResolutionSource] {
        &self.sources
    }

    pub fn uses_cache(&self) -> bool {
        self.sources
            .iter()
            .any(|s| matches!(s, ResolutionSource::Cache(_)))
    }
}

/// Checks that sdists are in dependency order
///
/// Exactly one core and one server sdist are expected, core first.
pub fn validate_order(sdists: &[BuiltSdist]) -> Result<()> {
    let positions = |role: PackageRole| -> Vec<usize> {
        sdists
            .iter()
            .enumerate()
            .filter(|(_, s)| s.role == role)
            .map(|(i, _)| i)
            .collect()
    };

    let core = positions(PackageRole::Core);
    let server = positions(PackageRole::Server);

    match (core.as_slice(), server.as_slice()) {
        ([], _) => Err(BuildError::InstallOrder(
            "no core sdist to install".to_string(),
        )),
        (_, []) => Err(BuildError::InstallOrder(
            "no server sdist to install".to_string(),
        )),
        ([c], [s]) if c < s => Ok(()),
        ([c], [s]) => Err(BuildError::InstallOrder(format!(
            "server sdist {} is queued before core sdist {}",
            sdists[*s].archive.display(),
            sdists[*c].archive.display()
        ))),
        _ => Err(BuildError::InstallOrder(format!(
            "expected one core and one server sdist, got {} and {}",
            core.len(),
            server.len()
        ))),
    }
}

#[derive(Debug, Default)]
pub struct InstallSequencer;

impl InstallSequencer {
    pub fn new() -> Self {
        Self
    }

    fn install_step(ctx: &BuildContext, sdist: &BuiltSdist, source: &ResolutionSource) -> Step {
        Step::new(
            StageKind::Install,
            ctx.layout().env_bin("pip").display().to_string(),
        )
        .arg("install")
        .args(source.pip_args())
        .arg(sdist.archive.display().to_string())
    }

    /// Installs `sdists` in the given order, which must be core then server
    ///
    /// Each sdist goes through the plan's tiers in order and stops at the
    /// first one that installs it. Nothing runs if the order is wrong; an
    /// sdist no tier can install stops the sequence.
    pub fn install(
        &self,
        ctx: &BuildContext,
        io: &StageIo<'_>,
        sdists: &[BuiltSdist],
        plan: &ResolutionPlan,
    ) -> Result<()> {
        validate_order(sdists)?;

        let Some((last, fallbacks)) = plan.sources().split_last() else {
            return Err(BuildError::for_stage(
                StageKind::Install,
                "resolution plan has no sources",
                None,
            ));
        };

        for sdist in sdists {
            let mut installed_from = None;

            for source in fallbacks {
                let output = io.attempt(&Self::install_step(ctx, sdist, source))?;
                if output.success() {
                    installed_from = Some(source);
                    break;
                }
                io.warn(
                    StageKind::Install,
                    format!(
                        "{} could not install {}, falling back",
                        source, sdist.package
                    ),
                );
            }

            let source = match installed_from {
                Some(source) => source,
                None => {
                    io.run(&Self::install_step(ctx, sdist, last))?;
                    last
                }
            };

            io.info(
                StageKind::Install,
                format!(
                    "Installed {} {} from {}",
                    sdist.package, sdist.version, source
                ),
            );
        }
        Ok(())
    }
}

#[async_trait]
impl Stage for InstallSequencer {
    fn kind(&self) -> StageKind {
        StageKind::Install
    }

    /// First-tier install of each sdist; the network tier only runs when
    /// the wheelhouse cannot satisfy a package
    fn plan(&self, ctx: &BuildContext, artifacts: &Artifacts) -> Vec<Step> {
        let cache = ResolutionSource::Cache(ctx.layout().wheelhouse_dir.clone());
        artifacts
            .sdists
            .iter()
            .map(|sdist| Self::install_step(ctx, sdist, &cache))
            .collect()
    }

    async fn run(
        &self,
        ctx: &mut BuildContext,
        io: &StageIo<'_>,
        artifacts: &mut Artifacts,
    ) -> Result<()> {
        ctx.expect(ContextState::Packaged)?;

        let wheelhouse = &ctx.layout().wheelhouse_dir;
        let listing = io.backend.list_dir(wheelhouse)?;
        let plan = ResolutionPlan::for_wheelhouse(wheelhouse, listing.as_deref());

        if !plan.uses_cache() {
            io.warn(
                StageKind::Install,
                format!(
                    "wheelhouse {} is missing or empty, resolving from the network only",
                    wheelhouse.display()
                ),
            );
        }

        self.install(ctx, io, &artifacts.sdists, &plan)?;
        ctx.advance(ContextState::Installed)
    }
}
