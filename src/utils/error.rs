use std::io;
use std::path::Path;

use thiserror::Error;

/// Failure of a single request against the release mirror.
///
/// The variant is chosen where the request fails, so callers never have to
/// inspect error text to tell a DNS failure from a missing artifact.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("could not connect to {mirror}")]
    Connect { mirror: String },

    #[error("{url} returned 404 Not Found")]
    NotFound { url: String },

    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("request to {url} timed out")]
    Timeout { url: String },

    #[error("download was cancelled")]
    Cancelled,

    #[error("invalid mirror URL: {0}")]
    InvalidUrl(String),

    #[error("{0}")]
    Network(String),
}

impl FetchError {
    pub(crate) fn from_reqwest(err: reqwest::Error, mirror: &str, url: &str) -> Self {
        if err.is_timeout() {
            return FetchError::Timeout {
                url: url.to_string(),
            };
        }

        if err.is_connect() {
            return FetchError::Connect {
                mirror: mirror.to_string(),
            };
        }

        if let Some(status) = err.status() {
            return FetchError::from_status(url, status.as_u16());
        }

        FetchError::Network(err.to_string())
    }

    pub(crate) fn from_status(url: &str, status: u16) -> Self {
        if status == 404 {
            FetchError::NotFound {
                url: url.to_string(),
            }
        } else {
            FetchError::Status {
                url: url.to_string(),
                status,
            }
        }
    }
}

/// Errors surfaced by the install orchestrator.
///
/// `Display` is the message shown to the user.
#[derive(Debug, Error)]
pub enum InstallError {
    #[error("{0}")]
    Validation(String),

    #[error("Unsupported Node.js version: {version}. Must be >= {minimum}.")]
    UnsupportedVersion { version: String, minimum: String },

    #[error("Unsupported platform: {0}")]
    UnsupportedPlatform(String),

    #[error("Could not connect to {mirror}")]
    Connect { mirror: String },

    #[error("No Node.js binaries available for {version} on {platform} {arch}")]
    NotFound {
        version: String,
        platform: String,
        arch: String,
    },

    #[error("Could not download Node.js {version}: {reason}")]
    Download { version: String, reason: String },

    #[error("{0}")]
    Integrity(String),

    #[error("Download of Node.js {0} was cancelled")]
    Cancelled(String),

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },
}

impl InstallError {
    pub(crate) fn io(context: impl Into<String>, source: io::Error) -> Self {
        InstallError::Io {
            context: context.into(),
            source,
        }
    }

    pub(crate) fn io_at(action: &str, path: &Path, source: io::Error) -> Self {
        InstallError::io(format!("Failed to {} {}", action, path.display()), source)
    }
}
