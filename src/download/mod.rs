//! Fetching and storing artifacts.
//!
//! - [`storage`] - Canonical artifact paths and atomic staging
//! - [`ytdlp`] - yt-dlp adapter implementing [`Downloader`]

mod storage;
mod ytdlp;

pub use storage::{ArtifactStore, STAGING_PREFIX, sanitize_file_name};
pub use ytdlp::{YtDlpDownloader, classify_failure};

pub(crate) use ytdlp::error_summary;

use crate::error::DownloadError;
use crate::types::{SongDescriptor, SourceLocator};
use async_trait::async_trait;

/// Fetches a located source and materializes it as the song's artifact
///
/// Implementations must re-check the canonical path before doing any network
/// work and must never leave a partial file at the canonical path.
#[async_trait]
pub trait Downloader: Send + Sync {
    /// Acquire `song` from `locator`
    async fn acquire(&self, locator: &SourceLocator, song: &SongDescriptor)
    -> Result<(), DownloadError>;
}

#[cfg(all(test, unix))]
#[allow(clippy::unwrap_used, clippy::expect_used)]
pub(crate) mod tests_support {
    use std::os::unix::fs::PermissionsExt;
    use std::path::{Path, PathBuf};

    /// Write an executable `/bin/sh` script standing in for an external tool
    pub(crate) fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }
}
