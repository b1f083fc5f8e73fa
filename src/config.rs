//! Configuration types for playlist-dl

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::{path::Path, path::PathBuf, time::Duration};

/// Collection name that selects the account's saved ("liked") tracks
pub const LIKED_COLLECTION_NAME: &str = "Liked Songs";

/// Catalog provider credentials and endpoints
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// OAuth client ID of the registered application
    #[serde(default)]
    pub client_id: String,

    /// OAuth client secret of the registered application
    #[serde(default)]
    pub client_secret: String,

    /// Redirect URI registered for the application (used to build the authorization URL)
    #[serde(default)]
    pub redirect_uri: String,

    /// Long-lived refresh token obtained from a previous authorization
    #[serde(default)]
    pub refresh_token: Option<String>,

    /// Web API base URL (default: "https://api.spotify.com/v1")
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// Accounts service base URL (default: "https://accounts.spotify.com")
    #[serde(default = "default_accounts_base_url")]
    pub accounts_base_url: String,

    /// Items requested per catalog page (default: 50, provider maximum)
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    /// Timeout for each catalog request (default: 30 seconds)
    #[serde(default = "default_request_timeout", with = "duration_serde")]
    pub request_timeout: Duration,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            redirect_uri: String::new(),
            refresh_token: None,
            api_base_url: default_api_base_url(),
            accounts_base_url: default_accounts_base_url(),
            page_size: default_page_size(),
            request_timeout: default_request_timeout(),
        }
    }
}

/// Download behavior configuration (directories, concurrency, output format)
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DownloadConfig {
    /// Output directory for finished artifacts (default: "./downloads")
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Number of concurrent workers (default: 4)
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,

    /// Upper bound for one download attempt including transcoding (default: 300 seconds)
    #[serde(default = "default_download_timeout", with = "duration_serde")]
    pub timeout: Duration,

    /// Upper bound for one source search (default: 30 seconds)
    #[serde(default = "default_search_timeout", with = "duration_serde")]
    pub search_timeout: Duration,

    /// Socket timeout handed to the fetch tool (default: 30 seconds)
    #[serde(default = "default_socket_timeout", with = "duration_serde")]
    pub socket_timeout: Duration,

    /// Output audio format (default: mp3)
    #[serde(default)]
    pub format: AudioFormat,

    /// Target bitrate in kbit/s for lossy formats (default: 192)
    #[serde(default = "default_bitrate_kbps")]
    pub bitrate_kbps: u32,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            worker_count: default_worker_count(),
            timeout: default_download_timeout(),
            search_timeout: default_search_timeout(),
            socket_timeout: default_socket_timeout(),
            format: AudioFormat::default(),
            bitrate_kbps: default_bitrate_kbps(),
        }
    }
}

/// External tool paths
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Path to yt-dlp executable (auto-detected if None)
    #[serde(default)]
    pub yt_dlp_path: Option<PathBuf>,

    /// Path to ffmpeg executable or its directory (yt-dlp's own lookup if None)
    #[serde(default)]
    pub ffmpeg_path: Option<PathBuf>,

    /// Whether to search PATH for external binaries if explicit paths not set (default: true)
    #[serde(default = "default_true")]
    pub search_path: bool,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            yt_dlp_path: None,
            ffmpeg_path: None,
            search_path: true,
        }
    }
}

impl ToolsConfig {
    /// The yt-dlp binary to run
    ///
    /// An explicit path wins. Otherwise PATH is searched when allowed; if that
    /// fails the bare name is returned and a missing binary surfaces per item
    /// when the first command is spawned.
    pub fn yt_dlp_binary(&self) -> PathBuf {
        if let Some(ref path) = self.yt_dlp_path {
            return path.clone();
        }
        if self.search_path {
            match which::which("yt-dlp") {
                Ok(path) => return path,
                Err(e) => tracing::warn!(error = %e, "yt-dlp not found in PATH"),
            }
        }
        PathBuf::from("yt-dlp")
    }
}

/// Retry configuration for transient download failures
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Number of retries after the first attempt (default: 3)
    #[serde(default = "default_retry_limit")]
    pub retry_limit: u32,

    /// Initial delay before first retry (default: 1 second)
    #[serde(default = "default_initial_delay", with = "duration_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between retries (default: 30 seconds)
    #[serde(default = "default_max_delay", with = "duration_serde")]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: true)
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            retry_limit: default_retry_limit(),
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// Retry policy without any delay between attempts
    pub fn immediate(retry_limit: u32) -> Self {
        Self {
            retry_limit,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            backoff_multiplier: 1.0,
            jitter: false,
        }
    }
}

/// Output audio format
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    /// MPEG-1 Layer III (default)
    #[default]
    Mp3,
    /// AAC in an MP4 container
    M4a,
    /// Opus in an Ogg container
    Opus,
    /// Free Lossless Audio Codec
    Flac,
    /// Uncompressed PCM
    Wav,
}

impl AudioFormat {
    /// File extension of the produced artifact
    pub fn extension(&self) -> &'static str {
        match self {
            AudioFormat::Mp3 => "mp3",
            AudioFormat::M4a => "m4a",
            AudioFormat::Opus => "opus",
            AudioFormat::Flac => "flac",
            AudioFormat::Wav => "wav",
        }
    }

    /// Whether the bitrate setting applies
    pub fn is_lossy(&self) -> bool {
        !matches!(self, AudioFormat::Flac | AudioFormat::Wav)
    }
}

impl std::fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.extension())
    }
}

/// Main configuration for a playlist-dl run
///
/// Loaded from a TOML file and then overridden field by field from the
/// command line or environment.
///
/// ```toml
/// collection_name = "Road Trip"
///
/// [catalog]
/// client_id = "..."
/// client_secret = "..."
/// redirect_uri = "http://localhost:8888/callback"
/// refresh_token = "..."
///
/// [download]
/// worker_count = 4
/// output_dir = "downloads"
///
/// [retry]
/// retry_limit = 3
/// ```
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    /// Collection to acquire; [`LIKED_COLLECTION_NAME`] selects the saved tracks
    #[serde(default = "default_collection_name")]
    pub collection_name: String,

    /// Catalog provider credentials and endpoints
    #[serde(default)]
    pub catalog: CatalogConfig,

    /// Download behavior settings
    #[serde(default)]
    pub download: DownloadConfig,

    /// Retry policy for transient download failures
    #[serde(default)]
    pub retry: RetryConfig,

    /// External tool paths
    #[serde(default)]
    pub tools: ToolsConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            collection_name: default_collection_name(),
            catalog: CatalogConfig::default(),
            download: DownloadConfig::default(),
            retry: RetryConfig::default(),
            tools: ToolsConfig::default(),
        }
    }
}

impl Config {
    /// Read and parse a TOML configuration file
    ///
    /// A missing file yields the default configuration so that everything can
    /// be supplied through the environment instead.
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "Config file not found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(Error::Config {
                    message: format!("failed to read {}: {}", path.display(), e),
                    key: None,
                });
            }
        };
        Self::from_toml_str(&contents)
    }

    /// Parse configuration from TOML text
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        toml::from_str(contents).map_err(|e| Error::Config {
            message: format!("invalid config file: {}", e),
            key: None,
        })
    }

    /// Check every setting the run depends on
    ///
    /// Runs before anything touches the network so that a bad setting fails
    /// fast with the offending key named.
    pub fn validate(&self) -> Result<()> {
        let required = [
            ("catalog.client_id", &self.catalog.client_id),
            ("catalog.client_secret", &self.catalog.client_secret),
            ("catalog.redirect_uri", &self.catalog.redirect_uri),
        ];
        for (key, value) in required {
            if value.trim().is_empty() {
                return Err(Error::config(key, format!("missing required setting {key}")));
            }
        }

        if url::Url::parse(&self.catalog.redirect_uri).is_err() {
            return Err(Error::config(
                "catalog.redirect_uri",
                format!("not a valid URL: {}", self.catalog.redirect_uri),
            ));
        }

        if !(1..=50).contains(&self.catalog.page_size) {
            return Err(Error::config(
                "catalog.page_size",
                format!("must be between 1 and 50, got {}", self.catalog.page_size),
            ));
        }

        if self.download.worker_count == 0 {
            return Err(Error::config(
                "download.worker_count",
                "must be a positive integer",
            ));
        }

        let timeouts = [
            ("catalog.request_timeout", self.catalog.request_timeout),
            ("download.timeout", self.download.timeout),
            ("download.search_timeout", self.download.search_timeout),
            ("download.socket_timeout", self.download.socket_timeout),
        ];
        for (key, value) in timeouts {
            if value.is_zero() {
                return Err(Error::config(key, "timeout must be at least one second"));
            }
        }

        if self.download.bitrate_kbps == 0 {
            return Err(Error::config(
                "download.bitrate_kbps",
                "must be greater than zero",
            ));
        }

        if !self.retry.backoff_multiplier.is_finite() || self.retry.backoff_multiplier < 1.0 {
            return Err(Error::config(
                "retry.backoff_multiplier",
                format!("must be at least 1.0, got {}", self.retry.backoff_multiplier),
            ));
        }

        Ok(())
    }
}

fn default_collection_name() -> String {
    LIKED_COLLECTION_NAME.to_string()
}

fn default_api_base_url() -> String {
    "https://api.spotify.com/v1".to_string()
}

fn default_accounts_base_url() -> String {
    "https://accounts.spotify.com".to_string()
}

fn default_page_size() -> u32 {
    50
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("./downloads")
}

fn default_worker_count() -> usize {
    4
}

fn default_download_timeout() -> Duration {
    Duration::from_secs(300)
}

fn default_search_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_socket_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_bitrate_kbps() -> u32 {
    192
}

fn default_true() -> bool {
    true
}

fn default_retry_limit() -> u32 {
    3
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(30)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

// Duration serialization helper (whole seconds)
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
