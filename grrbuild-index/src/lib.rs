//! grrbuild index client
//!
//! A small HTTP client for the alternate package index that hosts the GRR
//! templates package. The build uses it to fail fast when that index is
//! unreachable or does not offer the package, before any resolution work
//! is started.
//!
//! # Example
//!
//! ```no_run
//! use grrbuild_core::domain::recipe::AlternateIndex;
//! use grrbuild_index::IndexClient;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = IndexClient::new();
//!     let index = AlternateIndex::find_links(
//!         "https://storage.googleapis.com/releases.grr-response.com/index.html",
//!     );
//!
//!     let files = client.ensure_available(&index, "grr-response-templates").await?;
//!     println!("{} candidate files", files.len());
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod listing;

pub use error::{IndexError, Result};
pub use listing::IndexListing;

use grrbuild_core::domain::recipe::{AlternateIndex, IndexKind};
use grrbuild_core::domain::sdist::normalize_name;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, info};

/// HTTP client for package index pages
#[derive(Debug, Clone)]
pub struct IndexClient {
    client: Client,
}

impl IndexClient {
    /// Create a client with reqwest defaults
    pub fn new() -> Self {
        Self {
            client: Client::new(),
        }
    }

    /// Create a client whose requests give up after `timeout`
    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|source| IndexError::RequestFailed {
                url: String::new(),
                source,
            })?;
        Ok(Self { client })
    }

    /// Create a client from a configured reqwest Client
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    /// Fetch an index page and list the files it links to
    pub async fn fetch_listing(&self, url: &str) -> Result<IndexListing> {
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(IndexError::InvalidUrl(url.to_string()));
        }

        debug!("Fetching index page {}", url);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|source| IndexError::RequestFailed {
                url: url.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(IndexError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response
            .text()
            .await
            .map_err(|source| IndexError::RequestFailed {
                url: url.to_string(),
                source,
            })?;

        Ok(IndexListing::parse(url, &body))
    }

    /// Check that `index` is reachable and offers `package`
    ///
    /// # Returns
    /// The file names the index offers for the package
    pub async fn ensure_available(
        &self,
        index: &AlternateIndex,
        package: &str,
    ) -> Result<Vec<String>> {
        let url = project_url(index, package);
        let listing = self.fetch_listing(&url).await?;

        let files: Vec<String> = listing
            .files_for(package)
            .into_iter()
            .map(str::to_string)
            .collect();

        if files.is_empty() {
            return Err(IndexError::PackageMissing {
                package: package.to_string(),
                url,
            });
        }

        info!("{} offers {} file(s) for {}", url, files.len(), package);
        Ok(files)
    }
}

impl Default for IndexClient {
    fn default() -> Self {
        Self::new()
    }
}

/// Page listing the files of `package` on `index`
pub fn project_url(index: &AlternateIndex, package: &str) -> String {
    match index.kind {
        IndexKind::FindLinks => index.url.clone(),
        IndexKind::Simple => format!(
            "{}/{}/",
            index.url.trim_end_matches('/'),
            normalize_name(package)
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serves a single HTTP response and returns the base URL
    async fn serve_once(status: &'static str, body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 4096];
            let _ = socket.read(&mut buf).await;
            let response = format!(
                "HTTP/1.1 {}\r\nContent-Type: text/html\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            );
            let _ = socket.write_all(response.as_bytes()).await;
            let _ = socket.shutdown().await;
        });

        format!("http://{}", addr)
    }

    fn local_client() -> IndexClient {
        IndexClient::with_client(Client::builder().no_proxy().build().unwrap())
    }

    #[test]
    fn test_project_url() {
        let index = AlternateIndex::find_links("https://example.com/index.html");
        assert_eq!(
            project_url(&index, "grr-response-templates"),
            "https://example.com/index.html"
        );

        let index = AlternateIndex {
            url: "https://pypi.example.com/simple/".to_string(),
            kind: IndexKind::Simple,
        };
        assert_eq!(
            project_url(&index, "GRR_Response_Templates"),
            "https://pypi.example.com/simple/grr-response-templates/"
        );
    }

    #[tokio::test]
    async fn test_ensure_available_finds_package() {
        let base = serve_once(
            "200 OK",
            r#"<a href="grr-response-templates-3.2.0.post1.zip">t</a>"#,
        )
        .await;
        let index = AlternateIndex::find_links(format!("{}/index.html", base));

        let files = local_client()
            .ensure_available(&index, "grr-response-templates")
            .await
            .unwrap();
        assert_eq!(files, vec!["grr-response-templates-3.2.0.post1.zip"]);
    }

    #[tokio::test]
    async fn test_ensure_available_reports_missing_package() {
        let base = serve_once("200 OK", r#"<a href="something-else-1.0.zip">x</a>"#).await;
        let index = AlternateIndex::find_links(format!("{}/index.html", base));

        let err = local_client()
            .ensure_available(&index, "grr-response-templates")
            .await
            .unwrap_err();
        assert!(matches!(err, IndexError::PackageMissing { .. }));
        assert!(!err.is_unreachable());
    }

    #[tokio::test]
    async fn test_ensure_available_reports_server_error() {
        let base = serve_once("503 Service Unavailable", "").await;
        let index = AlternateIndex::find_links(format!("{}/index.html", base));

        let err = local_client()
            .ensure_available(&index, "grr-response-templates")
            .await
            .unwrap_err();
        assert!(matches!(err, IndexError::Status { status: 503, .. }));
        assert!(err.is_unreachable());
    }

    #[tokio::test]
    async fn test_rejects_non_http_url() {
        let err = IndexClient::new()
            .fetch_listing("file:///tmp/index.html")
            .await
            .unwrap_err();
        assert!(matches!(err, IndexError::InvalidUrl(_)));
    }
}
