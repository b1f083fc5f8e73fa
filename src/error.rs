//! Error types for playlist-dl
//!
//! Errors fall into two groups:
//! - Fatal errors ([`Error`]) that end the run before or instead of the pipeline
//!   (bad configuration, unreachable catalog).
//! - Per-item errors ([`DownloadError`]) that are contained within one worker
//!   iteration and only ever surface as a terminal item state.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for playlist-dl operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for playlist-dl
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "download.worker_count")
        key: Option<String>,
    },

    /// The catalog could not be reached or refused our credentials
    #[error("catalog unavailable: {0}")]
    CatalogUnavailable(String),

    /// Remote service answered with an unexpected HTTP status
    #[error("HTTP {status}: {message}")]
    Http {
        /// The HTTP status code
        status: u16,
        /// Response body or a short description
        message: String,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Network error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// External tool execution failed (yt-dlp, ffmpeg)
    #[error("external tool error: {0}")]
    ExternalTool(String),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Shorthand for a configuration error tied to a specific key
    pub fn config(key: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.into()),
        }
    }

    /// Process exit code for a fatal error
    ///
    /// Configuration problems exit with 2, everything else with 1.
    pub fn exit_code(&self) -> u8 {
        match self {
            Error::Config { .. } => 2,
            _ => 1,
        }
    }
}

/// Per-item download failure
///
/// The split between the two variants drives the retry policy: only
/// [`DownloadError::Transient`] is retried by the pipeline.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DownloadError {
    /// Presumed recoverable by retrying (timeout, connection reset, flaky tool run)
    #[error("transient failure for {locator}: {reason}")]
    Transient {
        /// The source locator being fetched
        locator: String,
        /// The reason the attempt failed
        reason: String,
    },

    /// Retrying cannot succeed (bad locator, unsupported content, missing tool)
    #[error("permanent failure for {locator}: {reason}")]
    Permanent {
        /// The source locator being fetched
        locator: String,
        /// The reason the attempt failed
        reason: String,
    },
}

impl DownloadError {
    /// Create a transient error
    pub fn transient(locator: impl Into<String>, reason: impl Into<String>) -> Self {
        DownloadError::Transient {
            locator: locator.into(),
            reason: reason.into(),
        }
    }

    /// Create a permanent error
    pub fn permanent(locator: impl Into<String>, reason: impl Into<String>) -> Self {
        DownloadError::Permanent {
            locator: locator.into(),
            reason: reason.into(),
        }
    }

    /// The failure reason without the locator prefix
    pub fn reason(&self) -> &str {
        match self {
            DownloadError::Transient { reason, .. } | DownloadError::Permanent { reason, .. } => {
                reason
            }
        }
    }
}

/// Storage errors raised while materializing an artifact
#[derive(Debug, Error)]
pub enum StorageError {
    /// Creating the staging directory failed
    #[error("failed to create staging area in {dir}: {reason}")]
    StagingFailed {
        /// Directory the staging area was created in
        dir: PathBuf,
        /// The underlying reason
        reason: String,
    },

    /// Moving the finished file to its canonical path failed
    #[error("failed to move {source_path} to {dest_path}: {source}")]
    MoveFailed {
        /// The staged file
        source_path: PathBuf,
        /// The canonical artifact path
        dest_path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },
}

impl StorageError {
    /// Whether repeating the same operation is bound to fail the same way
    ///
    /// Invalid or over-long names, denied permissions and read-only targets
    /// do not change between attempts.
    pub fn is_permanent(&self) -> bool {
        use std::io::ErrorKind;

        match self {
            StorageError::StagingFailed { .. } => false,
            StorageError::MoveFailed { source, .. } => matches!(
                source.kind(),
                ErrorKind::InvalidFilename
                    | ErrorKind::PermissionDenied
                    | ErrorKind::ReadOnlyFilesystem
            ),
        }
    }
}
