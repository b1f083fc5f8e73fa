//! playlist-dl - download a music collection as local audio files
//!
//! Reads `config.toml` (or the file given with `--config`), applies command
//! line and environment overrides, and runs one acquisition of the configured
//! collection.

use clap::Parser;
use playlist_dl::{
    AcquisitionPipeline, ArtifactStore, CatalogClient, CollectionSelector, Config, Result,
    RunSummary, SpotifyCatalog, YtDlpDownloader, YtDlpResolver, acquire_collection,
    drain_on_signal, spawn_progress,
};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for playlist-dl
#[derive(Parser, Debug)]
#[command(name = "playlist-dl")]
#[command(about = "Download a music collection as local audio files")]
#[command(version)]
struct Cli {
    /// Configuration file
    #[arg(short, long, default_value = "config.toml", env = "PLAYLIST_DL_CONFIG")]
    config: PathBuf,

    /// Collection to download ("Liked Songs" or a playlist name)
    #[arg(long, env = "PLAYLIST_DL_COLLECTION")]
    collection: Option<String>,

    /// Number of concurrent workers
    #[arg(short, long, env = "PLAYLIST_DL_WORKERS")]
    workers: Option<usize>,

    /// Retries after a transient download failure
    #[arg(long, env = "PLAYLIST_DL_RETRY_LIMIT")]
    retry_limit: Option<u32>,

    /// Directory receiving the audio files
    #[arg(short, long, env = "PLAYLIST_DL_OUTPUT_DIR")]
    output_dir: Option<PathBuf>,

    /// Upper bound for one download attempt, in seconds
    #[arg(long, env = "PLAYLIST_DL_DOWNLOAD_TIMEOUT")]
    download_timeout: Option<u64>,

    /// Catalog application client ID
    #[arg(long, env = "PLAYLIST_DL_CLIENT_ID", hide_env_values = true)]
    client_id: Option<String>,

    /// Catalog application client secret
    #[arg(long, env = "PLAYLIST_DL_CLIENT_SECRET", hide_env_values = true)]
    client_secret: Option<String>,

    /// Redirect URI registered for the application
    #[arg(long, env = "PLAYLIST_DL_REDIRECT_URI")]
    redirect_uri: Option<String>,

    /// Refresh token from a previous authorization
    #[arg(long, env = "PLAYLIST_DL_REFRESH_TOKEN", hide_env_values = true)]
    refresh_token: Option<String>,

    /// Hide the progress bar
    #[arg(short, long)]
    quiet: bool,
}

impl Cli {
    /// Overlay explicitly given values onto the file configuration
    fn apply(&self, config: &mut Config) {
        if let Some(ref collection) = self.collection {
            config.collection_name = collection.clone();
        }
        if let Some(workers) = self.workers {
            config.download.worker_count = workers;
        }
        if let Some(retry_limit) = self.retry_limit {
            config.retry.retry_limit = retry_limit;
        }
        if let Some(ref output_dir) = self.output_dir {
            config.download.output_dir = output_dir.clone();
        }
        if let Some(secs) = self.download_timeout {
            config.download.timeout = Duration::from_secs(secs);
        }
        if let Some(ref client_id) = self.client_id {
            config.catalog.client_id = client_id.clone();
        }
        if let Some(ref client_secret) = self.client_secret {
            config.catalog.client_secret = client_secret.clone();
        }
        if let Some(ref redirect_uri) = self.redirect_uri {
            config.catalog.redirect_uri = redirect_uri.clone();
        }
        if let Some(ref refresh_token) = self.refresh_token {
            config.catalog.refresh_token = Some(refresh_token.clone());
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "playlist_dl=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    match run(&cli).await {
        Ok(summary) => {
            println!("{}", summary);
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %e, "Run aborted");
            eprintln!("error: {}", e);
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run(cli: &Cli) -> Result<RunSummary> {
    let mut config = Config::from_file(&cli.config)?;
    cli.apply(&mut config);
    config.validate()?;

    let store = ArtifactStore::from_config(&config);
    store.ensure_dir().await?;
    tracing::info!(
        output_dir = %store.output_dir().display(),
        format = %store.format(),
        workers = config.download.worker_count,
        "Configuration loaded"
    );

    let client = CatalogClient::connect(&config.catalog, &config.retry).await?;
    let catalog = SpotifyCatalog::new(Arc::new(client), config.catalog.page_size);

    let pipeline = AcquisitionPipeline::from_config(
        &config,
        Arc::new(YtDlpResolver::from_config(&config)),
        Arc::new(YtDlpDownloader::from_config(&config, store)),
    );

    let signals = tokio::spawn(drain_on_signal(pipeline.cancellation_token()));
    let progress = spawn_progress(pipeline.subscribe(), cli.quiet);

    let collection = CollectionSelector::parse(&config.collection_name);
    let result = acquire_collection(&catalog, &collection, &pipeline).await;

    signals.abort();
    if result.is_ok() {
        progress.await.ok();
    } else {
        progress.abort();
    }
    result
}
