//! Per-item processing: idempotence check, resolve, download with retry.

use super::queue::WorkQueue;
use super::run::PipelineRun;
use crate::config::RetryConfig;
use crate::download::{ArtifactStore, Downloader};
use crate::error::DownloadError;
use crate::resolver::Resolver;
use crate::retry::retry_with_hook;
use crate::types::{DownloadTask, Event, ItemReport, SongDescriptor, SourceLocator, TaskState};
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};

/// Everything a worker needs, shared by all workers of a run
pub(crate) struct WorkerContext {
    pub(crate) resolver: Arc<dyn Resolver>,
    pub(crate) downloader: Arc<dyn Downloader>,
    pub(crate) store: ArtifactStore,
    pub(crate) retry: RetryConfig,
    pub(crate) event_tx: broadcast::Sender<Event>,
    pub(crate) run: Arc<PipelineRun>,
    pub(crate) reports: mpsc::UnboundedSender<ItemReport>,
}

impl WorkerContext {
    fn emit(&self, event: Event) {
        // No subscribers is fine
        self.event_tx.send(event).ok();
    }
}

/// Pull items from `queue` until it is empty or cancelled
pub(crate) async fn run_worker(worker_id: usize, ctx: Arc<WorkerContext>, queue: Arc<WorkQueue>) {
    tracing::debug!(worker_id, "Worker started");

    while let Some(song) = queue.next().await {
        ctx.run.item_started();
        let report = process_item(&ctx, song).await;
        ctx.run.item_finished();

        if ctx.reports.send(report).is_err() {
            tracing::warn!(worker_id, "Outcome receiver gone, stopping worker");
            break;
        }
    }

    tracing::debug!(worker_id, "Worker exiting");
}

/// Drive one song to a terminal state
///
/// Never fails: every error is folded into the returned report.
pub(crate) async fn process_item(ctx: &WorkerContext, song: SongDescriptor) -> ItemReport {
    ctx.emit(Event::ItemStarted { song: song.clone() });
    let mut task = DownloadTask::new(song.clone());

    if ctx.store.exists(&song).await {
        task.transition(TaskState::Skipped);
        return report(&task, None);
    }

    task.transition(TaskState::Resolving);
    let Some(locator) = resolve(ctx, &song).await else {
        task.transition(TaskState::Unresolved);
        return report(&task, None);
    };
    ctx.emit(Event::Resolved {
        song: song.clone(),
        locator: locator.clone(),
    });

    task.transition(TaskState::Downloading);
    ctx.emit(Event::DownloadAttempt {
        song: song.clone(),
        attempt: task.attempt(),
    });
    let result = retry_with_hook(
        &ctx.retry,
        || acquire_guarded(ctx.downloader.as_ref(), &locator, &song),
        |attempt, error: &DownloadError| {
            task.transition(TaskState::Downloading);
            ctx.emit(Event::Retrying {
                song: song.clone(),
                attempt,
                error: error.reason().to_string(),
            });
            ctx.emit(Event::DownloadAttempt {
                song: song.clone(),
                attempt: task.attempt(),
            });
        },
    )
    .await;

    match result {
        Ok(()) => {
            task.transition(TaskState::Done);
            report(&task, None)
        }
        Err(e) => {
            task.transition(TaskState::Failed);
            report(&task, Some(e.to_string()))
        }
    }
}

async fn resolve(ctx: &WorkerContext, song: &SongDescriptor) -> Option<SourceLocator> {
    match AssertUnwindSafe(ctx.resolver.resolve(song))
        .catch_unwind()
        .await
    {
        Ok(locator) => locator,
        Err(payload) => {
            tracing::error!(
                song = %song,
                panic = %panic_message(payload.as_ref()),
                "Resolver panicked"
            );
            None
        }
    }
}

/// Run one download attempt, turning a panic into a transient failure
async fn acquire_guarded(
    downloader: &dyn Downloader,
    locator: &SourceLocator,
    song: &SongDescriptor,
) -> Result<(), DownloadError> {
    match AssertUnwindSafe(downloader.acquire(locator, song))
        .catch_unwind()
        .await
    {
        Ok(result) => result,
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            tracing::error!(song = %song, panic = %message, "Downloader panicked");
            Err(DownloadError::transient(
                locator.as_str(),
                format!("downloader panicked: {}", message),
            ))
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn report(task: &DownloadTask, error: Option<String>) -> ItemReport {
    // Only items that reached Downloading made download calls
    let download_attempts = match task.state() {
        TaskState::Done | TaskState::Failed => task.attempt() + 1,
        _ => 0,
    };
    ItemReport {
        descriptor: task.descriptor().clone(),
        state: task.state(),
        download_attempts,
        error,
    }
}
