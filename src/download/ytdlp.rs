//! yt-dlp based downloader with ffmpeg audio extraction

use super::{ArtifactStore, Downloader};
use crate::config::Config;
use crate::error::DownloadError;
use crate::types::{SongDescriptor, SourceLocator};
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

/// File stem used inside a staging directory
const STAGED_STEM: &str = "artifact";

/// Longest error excerpt kept from tool output
const MAX_SUMMARY_LEN: usize = 300;

/// Stderr fragments after which retrying cannot succeed (matched case-insensitively)
const PERMANENT_PATTERNS: &[&str] = &[
    "unsupported url",
    "is not a valid url",
    "video unavailable",
    "private video",
    "this video is not available",
    "has been removed",
    "account associated with this video has been terminated",
    "sign in to confirm your age",
    "members-only",
    "copyright",
    "http error 404",
    "http error 410",
    "requested format is not available",
    "ffprobe and ffmpeg not found",
    "ffmpeg not found",
];

/// Short human-readable excerpt of a tool's stderr
///
/// Prefers the last `ERROR:` line, falls back to the last non-empty line.
pub(crate) fn error_summary(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let mut lines = text.lines().map(str::trim).filter(|l| !l.is_empty());
    let line = text
        .lines()
        .map(str::trim)
        .filter(|l| l.starts_with("ERROR:"))
        .last()
        .or_else(|| lines.next_back());

    match line {
        Some(line) if line.chars().count() > MAX_SUMMARY_LEN => {
            let truncated: String = line.chars().take(MAX_SUMMARY_LEN).collect();
            format!("{}...", truncated)
        }
        Some(line) => line.to_string(),
        None => "no error output".to_string(),
    }
}

/// Classify a failed yt-dlp run by its stderr
pub fn classify_failure(locator: &SourceLocator, stderr: &[u8]) -> DownloadError {
    let lowered = String::from_utf8_lossy(stderr).to_lowercase();
    let reason = error_summary(stderr);

    if PERMANENT_PATTERNS.iter().any(|p| lowered.contains(p)) {
        DownloadError::permanent(locator.as_str(), reason)
    } else {
        DownloadError::transient(locator.as_str(), reason)
    }
}

/// Downloader that runs yt-dlp to fetch the best audio stream and transcode it
///
/// Every attempt gets its own staging directory; the finished file is renamed
/// into the [`ArtifactStore`] only when yt-dlp succeeded and produced the
/// expected output. The child process is killed when the attempt times out.
#[derive(Debug, Clone)]
pub struct YtDlpDownloader {
    binary_path: PathBuf,
    store: ArtifactStore,
    timeout: Duration,
    socket_timeout: Duration,
    bitrate_kbps: u32,
    ffmpeg_path: Option<PathBuf>,
}

impl YtDlpDownloader {
    /// Create a downloader with default timeouts and bitrate
    pub fn new(binary_path: PathBuf, store: ArtifactStore) -> Self {
        let defaults = crate::config::DownloadConfig::default();
        Self {
            binary_path,
            store,
            timeout: defaults.timeout,
            socket_timeout: defaults.socket_timeout,
            bitrate_kbps: defaults.bitrate_kbps,
            ffmpeg_path: None,
        }
    }

    /// Create a downloader from the download and tool settings
    pub fn from_config(config: &Config, store: ArtifactStore) -> Self {
        Self {
            binary_path: config.tools.yt_dlp_binary(),
            store,
            timeout: config.download.timeout,
            socket_timeout: config.download.socket_timeout,
            bitrate_kbps: config.download.bitrate_kbps,
            ffmpeg_path: config.tools.ffmpeg_path.clone(),
        }
    }

    /// Override the per-attempt timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn command(&self, locator: &SourceLocator, staging_dir: &std::path::Path) -> Command {
        let format = self.store.format();
        let template = staging_dir.join(format!("{}.%(ext)s", STAGED_STEM));

        let mut command = Command::new(&self.binary_path);
        command
            .arg("-f")
            .arg("bestaudio/best")
            .arg("-x")
            .arg("--audio-format")
            .arg(format.to_string());
        if format.is_lossy() {
            command
                .arg("--audio-quality")
                .arg(format!("{}K", self.bitrate_kbps));
        }
        command
            .arg("--socket-timeout")
            .arg(self.socket_timeout.as_secs().max(1).to_string())
            .arg("--no-playlist")
            .arg("--no-progress")
            .arg("--no-warnings");
        if let Some(ref ffmpeg) = self.ffmpeg_path {
            command.arg("--ffmpeg-location").arg(ffmpeg);
        }
        command
            .arg("-o")
            .arg(template)
            .arg("--")
            .arg(locator.as_str())
            .stdin(Stdio::null())
            .kill_on_drop(true);
        command
    }
}

#[async_trait]
impl Downloader for YtDlpDownloader {
    async fn acquire(
        &self,
        locator: &SourceLocator,
        song: &SongDescriptor,
    ) -> Result<(), DownloadError> {
        if self.store.exists(song).await {
            tracing::debug!(song = %song, "Artifact appeared before download, nothing to do");
            return Ok(());
        }

        let staging = self
            .store
            .staging()
            .map_err(|e| DownloadError::transient(locator.as_str(), e.to_string()))?;

        tracing::debug!(
            song = %song,
            locator = %locator,
            staging = %staging.path().display(),
            "Running yt-dlp"
        );

        let output = match tokio::time::timeout(
            self.timeout,
            self.command(locator, staging.path()).output(),
        )
        .await
        {
            Err(_) => {
                return Err(DownloadError::transient(
                    locator.as_str(),
                    format!("download timeout after {}s", self.timeout.as_secs_f64()),
                ));
            }
            Ok(Err(e))
                if matches!(
                    e.kind(),
                    std::io::ErrorKind::NotFound | std::io::ErrorKind::PermissionDenied
                ) =>
            {
                return Err(DownloadError::permanent(
                    locator.as_str(),
                    format!("cannot run {}: {}", self.binary_path.display(), e),
                ));
            }
            Ok(Err(e)) => {
                return Err(DownloadError::transient(
                    locator.as_str(),
                    format!("Failed to execute yt-dlp: {}", e),
                ));
            }
            Ok(Ok(output)) => output,
        };

        if !output.status.success() {
            return Err(classify_failure(locator, &output.stderr));
        }

        let staged = staging
            .path()
            .join(format!("{}.{}", STAGED_STEM, self.store.format().extension()));
        let produced = tokio::fs::metadata(&staged)
            .await
            .map(|meta| meta.is_file())
            .unwrap_or(false);
        if !produced {
            return Err(DownloadError::permanent(
                locator.as_str(),
                format!(
                    "yt-dlp produced no {} output",
                    self.store.format().extension()
                ),
            ));
        }

        self.store.commit(&staged, song).await.map_err(|e| {
            if e.is_permanent() {
                DownloadError::permanent(locator.as_str(), e.to_string())
            } else {
                DownloadError::transient(locator.as_str(), e.to_string())
            }
        })?;

        Ok(())
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AudioFormat;
    use std::path::Path;

    fn locator() -> SourceLocator {
        SourceLocator::new("https://video.example/watch?v=1")
    }

    fn leftover_staging(dir: &Path) -> Vec<PathBuf> {
        std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().path())
            .filter(|p| {
                p.file_name()
                    .unwrap()
                    .to_string_lossy()
                    .starts_with(crate::download::STAGING_PREFIX)
            })
            .collect()
    }

    #[test]
    fn unavailable_content_is_permanent() {
        let stderr = b"[youtube] abc: Downloading webpage\nERROR: [youtube] abc: Video unavailable. This video has been removed by the uploader\n";
        let err = classify_failure(&locator(), stderr);

        assert!(matches!(err, DownloadError::Permanent { .. }));
        assert_eq!(
            err.reason(),
            "ERROR: [youtube] abc: Video unavailable. This video has been removed by the uploader"
        );
    }

    #[test]
    fn unsupported_url_is_permanent() {
        let err = classify_failure(&locator(), b"ERROR: Unsupported URL: https://nope.example/\n");
        assert!(matches!(err, DownloadError::Permanent { .. }));
    }

    #[test]
    fn network_trouble_is_transient() {
        let err = classify_failure(
            &locator(),
            b"ERROR: unable to download video data: <urlopen error [Errno 104] Connection reset by peer>\n",
        );
        assert!(matches!(err, DownloadError::Transient { .. }));

        let err = classify_failure(&locator(), b"");
        assert!(matches!(err, DownloadError::Transient { .. }));
        assert_eq!(err.reason(), "no error output");
    }

    #[test]
    fn summary_prefers_error_line_and_truncates() {
        assert_eq!(
            error_summary(b"ERROR: first\nsome trailing noise\n"),
            "ERROR: first"
        );
        assert_eq!(error_summary(b"warning\n\nlast line\n\n"), "last line");

        let long = format!("ERROR: {}", "x".repeat(1000));
        let summary = error_summary(long.as_bytes());
        assert!(summary.ends_with("..."));
        assert_eq!(summary.chars().count(), MAX_SUMMARY_LEN + 3);
    }

    #[test]
    fn command_carries_format_quality_and_template() {
        let store = ArtifactStore::new("/music", AudioFormat::Mp3);
        let downloader = YtDlpDownloader::new(PathBuf::from("yt-dlp"), store);
        let command = downloader.command(&locator(), Path::new("/music/.partial-1"));

        let args: Vec<String> = command
            .as_std()
            .get_args()
            .map(|a| a.to_string_lossy().to_string())
            .collect();

        let position = |flag: &str| args.iter().position(|a| a == flag).unwrap();
        assert_eq!(args[position("-f") + 1], "bestaudio/best");
        assert_eq!(args[position("--audio-format") + 1], "mp3");
        assert_eq!(args[position("--audio-quality") + 1], "192K");
        assert_eq!(args[position("--socket-timeout") + 1], "30");
        assert_eq!(args[position("-o") + 1], "/music/.partial-1/artifact.%(ext)s");
        assert!(args.contains(&"--no-playlist".to_string()));
        assert_eq!(args.last().unwrap(), "https://video.example/watch?v=1");
    }

    #[test]
    fn lossless_command_has_no_quality_flag() {
        let store = ArtifactStore::new("/music", AudioFormat::Flac);
        let downloader = YtDlpDownloader::new(PathBuf::from("yt-dlp"), store);
        let command = downloader.command(&locator(), Path::new("/tmp"));

        assert!(
            !command
                .as_std()
                .get_args()
                .any(|a| a == "--audio-quality")
        );
    }

    #[tokio::test]
    async fn existing_artifact_short_circuits() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path(), AudioFormat::Mp3);
        let song = SongDescriptor::new("A", "X");
        std::fs::write(store.artifact_path(&song), b"audio").unwrap();

        // The binary does not exist, so any spawn would fail
        let downloader =
            YtDlpDownloader::new(PathBuf::from("/nonexistent/yt-dlp-binary-xyz"), store);

        downloader.acquire(&locator(), &song).await.unwrap();
    }

    #[tokio::test]
    async fn missing_binary_is_permanent() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path(), AudioFormat::Mp3);
        let downloader =
            YtDlpDownloader::new(PathBuf::from("/nonexistent/yt-dlp-binary-xyz"), store);

        let err = downloader
            .acquire(&locator(), &SongDescriptor::new("A", "X"))
            .await
            .unwrap_err();

        assert!(matches!(err, DownloadError::Permanent { .. }), "got {err:?}");
        assert!(leftover_staging(dir.path()).is_empty());
    }

    #[cfg(unix)]
    mod with_fake_tool {
        use super::*;
        use crate::download::tests_support::write_script;

        /// Shell prelude that extracts the `-o` template and substitutes the extension
        const FIND_OUTPUT: &str = r#"while [ $# -gt 0 ]; do
  if [ "$1" = "-o" ]; then tmpl="$2"; fi
  shift
done
out=$(printf '%s' "$tmpl" | sed 's/%(ext)s/mp3/')"#;

        fn downloader(dir: &Path, tool: &Path, body: &str) -> YtDlpDownloader {
            let script = write_script(tool, "fake-yt-dlp", &format!("{}\n{}", FIND_OUTPUT, body));
            YtDlpDownloader::new(script, ArtifactStore::new(dir, AudioFormat::Mp3))
        }

        #[tokio::test]
        async fn successful_run_commits_artifact() {
            let out = tempfile::tempdir().unwrap();
            let tool = tempfile::tempdir().unwrap();
            let downloader = downloader(out.path(), tool.path(), r#"printf 'audio' > "$out""#);
            let song = SongDescriptor::new("A", "X");

            downloader.acquire(&locator(), &song).await.unwrap();

            let artifact = out.path().join("A - X.mp3");
            assert_eq!(std::fs::read(&artifact).unwrap(), b"audio");
            assert!(leftover_staging(out.path()).is_empty());
        }

        #[tokio::test]
        async fn long_title_is_committed_under_a_shortened_name() {
            let out = tempfile::tempdir().unwrap();
            let tool = tempfile::tempdir().unwrap();
            let downloader = downloader(out.path(), tool.path(), r#"printf 'audio' > "$out""#);
            let song = SongDescriptor::new("歌".repeat(90), "X");

            downloader.acquire(&locator(), &song).await.unwrap();

            let artifact = downloader.store.artifact_path(&song);
            assert_eq!(std::fs::read(&artifact).unwrap(), b"audio");
            assert!(downloader.store.exists(&song).await);
            assert!(leftover_staging(out.path()).is_empty());
        }

        #[tokio::test]
        async fn failed_run_leaves_nothing_at_canonical_path() {
            let out = tempfile::tempdir().unwrap();
            let tool = tempfile::tempdir().unwrap();
            let downloader = downloader(
                out.path(),
                tool.path(),
                r#"printf 'half' > "$out"
echo "ERROR: unable to download video data: HTTP Error 503" >&2
exit 1"#,
            );
            let song = SongDescriptor::new("A", "X");

            let err = downloader.acquire(&locator(), &song).await.unwrap_err();

            assert!(matches!(err, DownloadError::Transient { .. }), "got {err:?}");
            assert!(!out.path().join("A - X.mp3").exists());
            assert!(leftover_staging(out.path()).is_empty());
        }

        #[tokio::test]
        async fn unavailable_video_is_permanent() {
            let out = tempfile::tempdir().unwrap();
            let tool = tempfile::tempdir().unwrap();
            let downloader = downloader(
                out.path(),
                tool.path(),
                r#"echo "ERROR: [youtube] abc: Private video. Sign in if you've been granted access" >&2
exit 1"#,
            );

            let err = downloader
                .acquire(&locator(), &SongDescriptor::new("A", "X"))
                .await
                .unwrap_err();
            assert!(matches!(err, DownloadError::Permanent { .. }), "got {err:?}");
        }

        #[tokio::test]
        async fn success_without_output_is_permanent() {
            let out = tempfile::tempdir().unwrap();
            let tool = tempfile::tempdir().unwrap();
            let downloader = downloader(out.path(), tool.path(), "exit 0");

            let err = downloader
                .acquire(&locator(), &SongDescriptor::new("A", "X"))
                .await
                .unwrap_err();
            assert!(matches!(err, DownloadError::Permanent { .. }), "got {err:?}");
        }

        #[tokio::test]
        async fn timeout_is_transient_and_cleans_up() {
            let out = tempfile::tempdir().unwrap();
            let tool = tempfile::tempdir().unwrap();
            let downloader = downloader(
                out.path(),
                tool.path(),
                r#"printf 'half' > "$out"
sleep 5"#,
            )
            .with_timeout(Duration::from_millis(200));

            let err = downloader
                .acquire(&locator(), &SongDescriptor::new("A", "X"))
                .await
                .unwrap_err();

            assert!(matches!(err, DownloadError::Transient { .. }), "got {err:?}");
            assert!(err.reason().contains("timeout"));
            assert!(!out.path().join("A - X.mp3").exists());
            assert!(leftover_staging(out.path()).is_empty());
        }
    }
}
