//! Error types for the index client

use thiserror::Error;

/// Result type alias for index operations
pub type Result<T> = std::result::Result<T, IndexError>;

/// Errors that can occur when querying a package index
#[derive(Debug, Error)]
pub enum IndexError {
    /// HTTP request failed (DNS, connect, TLS, timeout)
    #[error("HTTP request to {url} failed: {source}")]
    RequestFailed {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// Index answered with a non-success status
    #[error("index {url} returned status {status}")]
    Status { url: String, status: u16 },

    /// Index is reachable but does not offer the package
    #[error("package {package} not found on {url}")]
    PackageMissing { package: String, url: String },

    /// Index URL is not usable
    #[error("invalid index URL: {0}")]
    InvalidUrl(String),
}

impl IndexError {
    /// Check if the index itself could not be reached
    pub fn is_unreachable(&self) -> bool {
        matches!(self, Self::RequestFailed { .. })
            || matches!(self, Self::Status { status, .. } if *status >= 500)
    }
}
