//! # playlist-dl
//!
//! Bulk audio acquisition for a music library: reads a collection (saved
//! tracks or a named playlist) from the catalog, finds a source for every
//! song with yt-dlp and stores each one as a local audio file.
//!
//! ## Design Philosophy
//!
//! - **Idempotent** - Songs already on disk are skipped, so re-running resumes
//! - **Bounded** - A fixed pool of workers, every external call has a timeout
//! - **Interruptible** - The first signal drains in-flight work, the second exits
//! - **Event-driven** - Consumers subscribe to events, no polling required
//!
//! ## Quick Start
//!
//! ```no_run
//! use playlist_dl::{
//!     AcquisitionPipeline, ArtifactStore, CatalogClient, CollectionSelector, Config,
//!     SpotifyCatalog, YtDlpDownloader, YtDlpResolver, acquire_collection,
//! };
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_file(Path::new("config.toml"))?;
//!     config.validate()?;
//!
//!     let client = CatalogClient::connect(&config.catalog, &config.retry).await?;
//!     let catalog = SpotifyCatalog::new(Arc::new(client), config.catalog.page_size);
//!
//!     let store = ArtifactStore::from_config(&config);
//!     store.ensure_dir().await?;
//!     let pipeline = AcquisitionPipeline::from_config(
//!         &config,
//!         Arc::new(YtDlpResolver::from_config(&config)),
//!         Arc::new(YtDlpDownloader::from_config(&config, store)),
//!     );
//!
//!     let collection = CollectionSelector::parse(&config.collection_name);
//!     let summary = acquire_collection(&catalog, &collection, &pipeline).await?;
//!     println!("{}", summary);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Catalog access (collections, pagination, authentication)
pub mod catalog;
/// Configuration types
pub mod config;
/// Fetching and storing artifacts
pub mod download;
/// Error types
pub mod error;
/// Bounded worker pool driving the acquisition
pub mod pipeline;
/// Source resolution
pub mod resolver;
/// Retry logic with exponential backoff
pub mod retry;
/// Core types and events
pub mod types;

// Re-export commonly used types
pub use catalog::{CatalogClient, CatalogSource, CollectionSelector, SpotifyCatalog};
pub use config::{AudioFormat, Config};
pub use download::{ArtifactStore, Downloader, YtDlpDownloader};
pub use error::{DownloadError, Error, Result, StorageError};
pub use pipeline::{AcquisitionPipeline, acquire_collection, spawn_progress};
pub use resolver::{Resolver, YtDlpResolver};
pub use types::{Event, RunSummary, SongDescriptor, SourceLocator, TaskState};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Exit code used when a second signal aborts a draining run
pub const INTERRUPTED_EXIT_CODE: i32 = 130;

/// Cancel `token` on the first termination signal and exit the process on the second.
///
/// The first signal starts a cooperative drain; a second one while draining
/// exits immediately with [`INTERRUPTED_EXIT_CODE`]. Returns without doing
/// anything else if `token` is cancelled by other means first.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// # Example
///
/// ```no_run
/// use playlist_dl::drain_on_signal;
/// use tokio_util::sync::CancellationToken;
///
/// # #[tokio::main]
/// # async fn main() {
/// let token = CancellationToken::new();
/// tokio::spawn(drain_on_signal(token.clone()));
/// # }
/// ```
pub async fn drain_on_signal(token: CancellationToken) {
    let (signal_tx, signal_rx) = mpsc::channel(4);
    let forwarder = tokio::spawn(forward_signals(signal_tx));

    let outcome = drain_on(signal_rx, token).await;
    forwarder.abort();

    if outcome == DrainOutcome::Aborted {
        tracing::warn!("Second signal received, aborting");
        std::process::exit(INTERRUPTED_EXIT_CODE);
    }
}

/// How [`drain_on`] ended
#[derive(Debug, PartialEq, Eq)]
enum DrainOutcome {
    /// The token was cancelled elsewhere or the signal source went away
    Finished,
    /// A second signal arrived while draining
    Aborted,
}

/// First delivery on `signals` cancels `token`, the second aborts
async fn drain_on(mut signals: mpsc::Receiver<()>, token: CancellationToken) -> DrainOutcome {
    tokio::select! {
        received = signals.recv() => {
            if received.is_none() {
                token.cancelled().await;
                return DrainOutcome::Finished;
            }
        }
        _ = token.cancelled() => return DrainOutcome::Finished,
    }
    tracing::warn!("Stopping after in-flight downloads finish; signal again to abort");
    token.cancel();

    match signals.recv().await {
        Some(()) => DrainOutcome::Aborted,
        None => DrainOutcome::Finished,
    }
}

/// Forward every termination signal into `tx` until the receiver is gone
///
/// Handlers are registered once, so a signal arriving between two deliveries
/// is queued rather than lost.
async fn forward_signals(tx: mpsc::Sender<()>) {
    let mut signals = ShutdownSignals::register();
    loop {
        signals.recv().await;
        if tx.send(()).await.is_err() {
            break;
        }
    }
}

#[cfg(unix)]
struct ShutdownSignals {
    sigterm: Option<tokio::signal::unix::Signal>,
    sigint: Option<tokio::signal::unix::Signal>,
}

#[cfg(unix)]
impl ShutdownSignals {
    fn register() -> Self {
        use tokio::signal::unix::{SignalKind, signal};

        // Registration may fail in restricted environments (containers, tests)
        let sigterm = signal(SignalKind::terminate())
            .map_err(|e| tracing::warn!(error = %e, "Could not register SIGTERM handler"))
            .ok();
        let sigint = signal(SignalKind::interrupt())
            .map_err(|e| tracing::warn!(error = %e, "Could not register SIGINT handler"))
            .ok();
        Self { sigterm, sigint }
    }

    async fn recv(&mut self) {
        match (self.sigterm.as_mut(), self.sigint.as_mut()) {
            (Some(sigterm), Some(sigint)) => {
                tokio::select! {
                    _ = sigterm.recv() => {
                        tracing::info!("Received SIGTERM signal");
                    }
                    _ = sigint.recv() => {
                        tracing::info!("Received SIGINT signal (Ctrl+C)");
                    }
                }
            }
            (Some(sigterm), None) => {
                sigterm.recv().await;
                tracing::info!("Received SIGTERM signal");
            }
            (None, Some(sigint)) => {
                sigint.recv().await;
                tracing::info!("Received SIGINT signal (Ctrl+C)");
            }
            (None, None) => {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
    }
}

#[cfg(not(unix))]
struct ShutdownSignals;

#[cfg(not(unix))]
impl ShutdownSignals {
    fn register() -> Self {
        ShutdownSignals
    }

    async fn recv(&mut self) {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("Received Ctrl+C signal");
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
                std::future::pending::<()>().await;
            }
        }
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn drain_on_signal_returns_when_token_cancelled_elsewhere() {
        let token = CancellationToken::new();
        let handle = tokio::spawn(drain_on_signal(token.clone()));

        token.cancel();

        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("signal task should return once the token is cancelled")
            .unwrap();
    }

    #[tokio::test]
    async fn first_signal_drains_and_second_aborts() {
        let token = CancellationToken::new();
        let (tx, rx) = mpsc::channel(4);
        let drain = tokio::spawn(drain_on(rx, token.clone()));

        tx.send(()).await.unwrap();
        tokio::time::timeout(Duration::from_secs(5), token.cancelled())
            .await
            .expect("first signal should cancel the token");
        assert!(!drain.is_finished());

        tx.send(()).await.unwrap();
        let outcome = tokio::time::timeout(Duration::from_secs(5), drain)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(outcome, DrainOutcome::Aborted);
    }

    #[tokio::test]
    async fn back_to_back_signals_are_not_lost() {
        let token = CancellationToken::new();
        let (tx, rx) = mpsc::channel(4);
        tx.send(()).await.unwrap();
        tx.send(()).await.unwrap();

        let outcome = drain_on(rx, token.clone()).await;

        assert_eq!(outcome, DrainOutcome::Aborted);
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn closed_signal_source_waits_for_the_token() {
        let token = CancellationToken::new();
        let (tx, rx) = mpsc::channel::<()>(1);
        drop(tx);
        let drain = tokio::spawn(drain_on(rx, token.clone()));

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!drain.is_finished());
        assert!(!token.is_cancelled());

        token.cancel();
        let outcome = tokio::time::timeout(Duration::from_secs(5), drain)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(outcome, DrainOutcome::Finished);
    }
}
