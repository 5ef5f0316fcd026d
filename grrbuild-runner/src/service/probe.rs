//! Alternate index probe
//!
//! Checks that the index hosting the templates package answers and lists
//! the package before any resolution work starts.

use async_trait::async_trait;
use grrbuild_core::domain::recipe::{AlternateIndex, PackageSpec};
use grrbuild_core::domain::stage::StageKind;
use grrbuild_core::{BuildError, Result};
use grrbuild_index::{IndexClient, IndexError};
use std::time::Duration;
use tracing::{debug, info};

#[async_trait]
pub trait IndexProbe: Send + Sync {
    /// Fails with a resolution error if `package` cannot come from `index`
    async fn check(&self, index: &AlternateIndex, package: &PackageSpec) -> Result<()>;
}

/// Probe backed by the HTTP index client
pub struct HttpIndexProbe {
    client: IndexClient,
}

impl HttpIndexProbe {
    pub fn new(timeout: Duration) -> std::result::Result<Self, IndexError> {
        Ok(Self {
            client: IndexClient::with_timeout(timeout)?,
        })
    }
}

#[async_trait]
impl IndexProbe for HttpIndexProbe {
    async fn check(&self, index: &AlternateIndex, package: &PackageSpec) -> Result<()> {
        debug!("Probing {} for {}", index.url, package.name);

        let files = self
            .client
            .ensure_available(index, &package.name)
            .await
            .map_err(|e| {
                let reason = if e.is_unreachable() {
                    format!("alternate index unavailable: {}", e)
                } else {
                    e.to_string()
                };
                BuildError::for_stage(StageKind::Wheelhouse, reason, None)
            })?;

        info!(
            "Alternate index offers {} file(s) for {}",
            files.len(),
            package.name
        );
        Ok(())
    }
}

/// Probe that always passes, for offline mirrors
pub struct SkipIndexProbe;

#[async_trait]
impl IndexProbe for SkipIndexProbe {
    async fn check(&self, index: &AlternateIndex, _package: &PackageSpec) -> Result<()> {
        debug!("Skipping probe of {}", index.url);
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Probe returning a canned answer and counting calls
    pub struct StaticProbe {
        pub available: bool,
        pub calls: Mutex<usize>,
    }

    impl StaticProbe {
        pub fn new(available: bool) -> Self {
            Self {
                available,
                calls: Mutex::new(0),
            }
        }
    }

    #[async_trait]
    impl IndexProbe for StaticProbe {
        async fn check(&self, index: &AlternateIndex, _package: &PackageSpec) -> Result<()> {
            *self.calls.lock().unwrap() += 1;
            if self.available {
                Ok(())
            } else {
                Err(BuildError::for_stage(
                    StageKind::Wheelhouse,
                    format!("alternate index unavailable: {}", index.url),
                    None,
                ))
            }
        }
    }

    #[tokio::test]
    async fn test_skip_probe_passes() {
        let index = AlternateIndex::find_links("http://127.0.0.1:9/index.html");
        let package = PackageSpec::new("grr-response-templates");
        assert!(SkipIndexProbe.check(&index, &package).await.is_ok());
    }

    #[tokio::test]
    async fn test_unreachable_index_is_resolution_failure() {
        let probe = HttpIndexProbe::new(Duration::from_secs(2)).unwrap();
        // Port 9 (discard) is closed on test machines
        let index = AlternateIndex::find_links("http://127.0.0.1:9/index.html");
        let package = PackageSpec::new("grr-response-templates");

        let err = probe.check(&index, &package).await.unwrap_err();
        assert!(matches!(err, BuildError::Resolution { .. }));
        assert_eq!(err.stage(), Some(StageKind::Wheelhouse));
    }
}
