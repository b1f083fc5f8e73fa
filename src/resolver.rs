//! Source resolution: maps a song to a downloadable source locator.
//!
//! A miss is not an error: [`Resolver::resolve`] returns `None` both when the
//! search has no results and when the search itself failed, and the pipeline
//! marks the item unresolved without retrying.

use crate::config::Config;
use crate::download::error_summary;
use crate::error::{Error, Result};
use crate::types::{SongDescriptor, SourceLocator};
use async_trait::async_trait;
use serde::Deserialize;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

/// Maps a song descriptor to zero or one source locator
///
/// Implementations are stateless per call and shared between workers.
#[async_trait]
pub trait Resolver: Send + Sync {
    /// Find the best source for `song`, or `None` when nothing matched
    async fn resolve(&self, song: &SongDescriptor) -> Option<SourceLocator>;
}

/// Resolver that asks yt-dlp for the first video search result
///
/// # Examples
///
/// ```no_run
/// use playlist_dl::resolver::{Resolver, YtDlpResolver};
/// use playlist_dl::SongDescriptor;
/// use std::path::PathBuf;
/// use std::time::Duration;
///
/// # #[tokio::main]
/// # async fn main() {
/// let resolver = YtDlpResolver::new(PathBuf::from("/usr/bin/yt-dlp"), Duration::from_secs(30));
/// let locator = resolver.resolve(&SongDescriptor::new("Song", "Artist")).await;
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct YtDlpResolver {
    binary_path: PathBuf,
    timeout: Duration,
}

impl YtDlpResolver {
    /// Create a resolver with an explicit binary path and per-search timeout
    pub fn new(binary_path: PathBuf, timeout: Duration) -> Self {
        Self {
            binary_path,
            timeout,
        }
    }

    /// Create a resolver from the tool and timeout settings
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.tools.yt_dlp_binary(), config.download.search_timeout)
    }

    async fn search(&self, query: &str) -> Result<Option<SourceLocator>> {
        let mut command = Command::new(&self.binary_path);
        command
            .arg("--dump-single-json")
            .arg("--flat-playlist")
            .arg("--no-warnings")
            .arg(format!("ytsearch1:{}", query))
            .stdin(Stdio::null())
            .kill_on_drop(true);

        let output = tokio::time::timeout(self.timeout, command.output())
            .await
            .map_err(|_| {
                Error::ExternalTool(format!(
                    "search timeout after {}s",
                    self.timeout.as_secs_f64()
                ))
            })?
            .map_err(|e| Error::ExternalTool(format!("Failed to execute yt-dlp: {}", e)))?;

        if !output.status.success() {
            return Err(Error::ExternalTool(format!(
                "yt-dlp search exited with {}: {}",
                output.status,
                error_summary(&output.stderr)
            )));
        }

        parse_search_output(&output.stdout)
    }
}

#[async_trait]
impl Resolver for YtDlpResolver {
    async fn resolve(&self, song: &SongDescriptor) -> Option<SourceLocator> {
        let query = song.search_query();
        match self.search(&query).await {
            Ok(Some(locator)) => {
                tracing::debug!(song = %song, locator = %locator, "Resolved source");
                Some(locator)
            }
            Ok(None) => {
                tracing::warn!(song = %song, query = %query, "No search results");
                None
            }
            Err(e) => {
                tracing::warn!(song = %song, error = %e, "Search failed");
                None
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct SearchResult {
    #[serde(default)]
    entries: Vec<SearchEntry>,
}

#[derive(Debug, Deserialize)]
struct SearchEntry {
    #[serde(default)]
    webpage_url: Option<String>,
    #[serde(default)]
    url: Option<String>,
}

/// Extract the first result's locator from a `--dump-single-json` document
///
/// Prefers `webpage_url` and falls back to `url`, which is all flat
/// extraction provides for some extractors.
pub fn parse_search_output(stdout: &[u8]) -> Result<Option<SourceLocator>> {
    let result: SearchResult = serde_json::from_slice(stdout)?;
    Ok(result
        .entries
        .into_iter()
        .next()
        .and_then(|entry| entry.webpage_url.or(entry.url))
        .filter(|locator| !locator.trim().is_empty())
        .map(SourceLocator::new))
}
