//! Artifact storage layout.
//!
//! One file per fingerprint at `<output_dir>/<fingerprint>.<ext>`. Downloads
//! land in a `.partial-*` staging directory next to the artifacts and are
//! renamed into place only once complete, so a canonical path either holds a
//! finished artifact or nothing.
//!
//! Fingerprints that cannot be used verbatim as a file name (path separators,
//! NUL, more than 255 bytes) are sanitized, shortened if needed, and tagged
//! with a digest of the full fingerprint so distinct songs never share a path.

use crate::config::{AudioFormat, Config};
use crate::error::{Result, StorageError};
use crate::types::SongDescriptor;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Prefix of staging directories inside the output directory
pub const STAGING_PREFIX: &str = ".partial-";

/// Longest file name common filesystems accept, in bytes
pub const MAX_FILE_NAME_BYTES: usize = 255;

/// Hex digits of the fingerprint digest appended to altered names
const DIGEST_LEN: usize = 10;

/// Replace characters that cannot appear in a file name
pub fn sanitize_file_name(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '/' | '\\' | '\0' => '_',
            c => c,
        })
        .collect()
}

/// File stem for `fingerprint`, given the artifact extension
///
/// Returned verbatim when it is already a valid name that fits. Otherwise the
/// sanitized name is cut at a character boundary and suffixed with
/// ` [<digest>]`, where the digest covers the untouched fingerprint.
pub fn artifact_stem(fingerprint: &str, extension: &str) -> String {
    let sanitized = sanitize_file_name(fingerprint);
    let limit = MAX_FILE_NAME_BYTES.saturating_sub(extension.len() + 1);
    if sanitized == fingerprint && sanitized.len() <= limit {
        return sanitized;
    }

    let digest = format!("{:x}", Sha256::digest(fingerprint.as_bytes()));
    let suffix = format!(" [{}]", &digest[..DIGEST_LEN]);
    let mut end = sanitized.len().min(limit.saturating_sub(suffix.len()));
    while !sanitized.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}{}", sanitized[..end].trim_end(), suffix)
}

/// Maps songs to artifact paths inside the output directory
#[derive(Clone, Debug)]
pub struct ArtifactStore {
    output_dir: PathBuf,
    format: AudioFormat,
}

impl ArtifactStore {
    /// Create a store rooted at `output_dir`
    pub fn new(output_dir: impl Into<PathBuf>, format: AudioFormat) -> Self {
        Self {
            output_dir: output_dir.into(),
            format,
        }
    }

    /// Create a store from the download settings
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.download.output_dir.clone(), config.download.format)
    }

    /// Root directory of all artifacts
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Format, and therefore extension, of every artifact
    pub fn format(&self) -> AudioFormat {
        self.format
    }

    /// Canonical artifact path for `song`
    pub fn artifact_path(&self, song: &SongDescriptor) -> PathBuf {
        let extension = self.format.extension();
        let file_name = format!(
            "{}.{}",
            artifact_stem(&song.fingerprint(), extension),
            extension
        );
        self.output_dir.join(file_name)
    }

    /// Whether a finished artifact for `song` is already present
    pub async fn exists(&self, song: &SongDescriptor) -> bool {
        let path = self.artifact_path(song);
        match tokio::fs::metadata(&path).await {
            Ok(meta) => meta.is_file(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
            Err(e) => {
                tracing::warn!(
                    song = %song,
                    path = %path.display(),
                    error = %e,
                    "Cannot inspect artifact path, treating as missing"
                );
                false
            }
        }
    }

    /// Create the output directory (and parents) if missing
    pub async fn ensure_dir(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.output_dir).await?;
        Ok(())
    }

    /// Create a private staging directory, removed when dropped
    pub fn staging(&self) -> std::result::Result<TempDir, StorageError> {
        tempfile::Builder::new()
            .prefix(STAGING_PREFIX)
            .tempdir_in(&self.output_dir)
            .map_err(|e| StorageError::StagingFailed {
                dir: self.output_dir.clone(),
                reason: e.to_string(),
            })
    }

    /// Move a finished file from staging to the canonical path for `song`
    ///
    /// Staging lives on the same filesystem as the artifacts, so the rename
    /// is atomic.
    pub async fn commit(
        &self,
        staged: &Path,
        song: &SongDescriptor,
    ) -> std::result::Result<PathBuf, StorageError> {
        let dest = self.artifact_path(song);
        tokio::fs::rename(staged, &dest)
            .await
            .map_err(|source| StorageError::MoveFailed {
                source_path: staged.to_path_buf(),
                dest_path: dest.clone(),
                source,
            })?;

        tracing::debug!(song = %song, path = %dest.display(), "Committed artifact");
        Ok(dest)
    }
}
