//! Acquisition pipeline: a bounded worker pool over the collection.
//!
//! Songs are deduplicated by fingerprint and by artifact path, then placed in
//! one shared queue.
//! `worker_count` workers pull from it; each worker runs the idempotence
//! check, the resolver and the downloader (with retry) for one song at a time
//! and reports the terminal state over a channel to the aggregator in
//! [`AcquisitionPipeline::run`].
//!
//! Cancelling the pipeline's token starts a cooperative drain: the queue stops
//! handing out songs, songs already picked up run to completion, and `run`
//! returns once every worker has exited.

mod progress;
mod queue;
mod run;
mod worker;


pub use progress::spawn_progress;

use crate::catalog::{CatalogSource, CollectionSelector};
use crate::config::{Config, RetryConfig};
use crate::download::{ArtifactStore, Downloader};
use crate::error::Result;
use crate::resolver::Resolver;
use crate::types::{Event, ItemReport, RunSummary, SongDescriptor, TaskState};
use queue::{Deduped, WorkQueue, dedupe};
use run::PipelineRun;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use worker::{WorkerContext, run_worker};

/// Capacity of the event broadcast channel
const EVENT_CHANNEL_CAPACITY: usize = 1000;

/// Bounded worker pool acquiring a list of songs
pub struct AcquisitionPipeline {
    resolver: Arc<dyn Resolver>,
    downloader: Arc<dyn Downloader>,
    store: ArtifactStore,
    worker_count: usize,
    retry: RetryConfig,
    event_tx: broadcast::Sender<Event>,
    cancel: CancellationToken,
}

impl AcquisitionPipeline {
    /// Create a pipeline around the given adapters
    ///
    /// A `worker_count` of zero is treated as one.
    pub fn new(
        resolver: Arc<dyn Resolver>,
        downloader: Arc<dyn Downloader>,
        store: ArtifactStore,
        worker_count: usize,
        retry: RetryConfig,
    ) -> Self {
        let (event_tx, _rx) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            resolver,
            downloader,
            store,
            worker_count: worker_count.max(1),
            retry,
            event_tx,
            cancel: CancellationToken::new(),
        }
    }

    /// Create a pipeline using the configured worker count, retry policy and storage
    pub fn from_config(
        config: &Config,
        resolver: Arc<dyn Resolver>,
        downloader: Arc<dyn Downloader>,
    ) -> Self {
        Self::new(
            resolver,
            downloader,
            ArtifactStore::from_config(config),
            config.download.worker_count,
            config.retry.clone(),
        )
    }

    /// Subscribe to pipeline events
    ///
    /// Slow subscribers lose events rather than slowing the pipeline down.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Token that starts a cooperative drain when cancelled
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Stop dispatching new songs; in-flight songs still complete
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    fn emit(&self, event: Event) {
        self.event_tx.send(event).ok();
    }

    /// Acquire every song and return the tally
    ///
    /// Per-item failures never fail the run; they are counted in the summary.
    pub async fn run(&self, songs: Vec<SongDescriptor>) -> RunSummary {
        let Deduped {
            songs,
            duplicates,
            collisions,
        } = dedupe(songs, &self.store);
        let total = songs.len();
        let run = Arc::new(PipelineRun::new(total, duplicates, collisions));
        let workers = self.worker_count.min(total);

        tracing::info!(
            total,
            duplicates,
            collisions,
            workers,
            retry_limit = self.retry.retry_limit,
            "Starting acquisition"
        );
        self.emit(Event::RunStarted { total, workers });

        let queue = Arc::new(WorkQueue::new(songs, self.cancel.clone()));
        let (report_tx, mut report_rx) = mpsc::unbounded_channel();
        let ctx = Arc::new(WorkerContext {
            resolver: Arc::clone(&self.resolver),
            downloader: Arc::clone(&self.downloader),
            store: self.store.clone(),
            retry: self.retry.clone(),
            event_tx: self.event_tx.clone(),
            run: Arc::clone(&run),
            reports: report_tx,
        });

        let mut join_set = JoinSet::new();
        for worker_id in 0..workers {
            join_set.spawn(run_worker(worker_id, Arc::clone(&ctx), Arc::clone(&queue)));
        }
        // The report channel closes once the last worker drops its context
        drop(ctx);

        let mut draining = false;
        loop {
            tokio::select! {
                report = report_rx.recv() => match report {
                    Some(report) => self.record(&run, report),
                    None => break,
                },
                _ = self.cancel.cancelled(), if !draining => {
                    draining = true;
                    let in_flight = run.in_flight();
                    tracing::info!(
                        in_flight,
                        "Interrupt received, finishing in-flight items without starting new ones"
                    );
                    self.emit(Event::Draining { in_flight });
                }
            }
        }

        while let Some(joined) = join_set.join_next().await {
            if let Err(e) = joined {
                tracing::error!(error = %e, "Worker task ended abnormally");
            }
        }

        let not_started = queue.remaining().await;
        let summary = run.summary(not_started, self.cancel.is_cancelled());

        tracing::info!(
            done = summary.done,
            skipped = summary.skipped,
            unresolved = summary.unresolved,
            failed = summary.failed,
            not_started = summary.not_started,
            elapsed_ms = summary.elapsed.as_millis() as u64,
            "Acquisition finished"
        );
        self.emit(Event::RunComplete {
            summary: summary.clone(),
        });
        summary
    }

    fn record(&self, run: &PipelineRun, report: ItemReport) {
        let completed = run.record(report.state);
        let song = &report.descriptor;

        match report.state {
            TaskState::Done => {
                tracing::info!(song = %song, attempts = report.download_attempts, "Downloaded")
            }
            TaskState::Skipped => tracing::info!(song = %song, "Already present, skipped"),
            TaskState::Unresolved => tracing::warn!(song = %song, "No source found"),
            TaskState::Failed => tracing::error!(
                song = %song,
                attempts = report.download_attempts,
                error = report.error.as_deref().unwrap_or("unknown"),
                "Download failed"
            ),
            other => tracing::error!(song = %song, state = %other, "Unexpected outcome state"),
        }

        self.emit(Event::ItemFinished {
            song: report.descriptor,
            state: report.state,
            completed,
            total: run.total(),
        });
    }
}

/// Fetch a collection from the catalog and acquire it
///
/// A catalog failure is fatal and returned before any song is dispatched.
pub async fn acquire_collection(
    catalog: &dyn CatalogSource,
    collection: &CollectionSelector,
    pipeline: &AcquisitionPipeline,
) -> Result<RunSummary> {
    let songs = catalog.fetch(collection).await?;
    Ok(pipeline.run(songs).await)
}
