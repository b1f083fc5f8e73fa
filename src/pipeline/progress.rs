//! Terminal progress bar driven by pipeline events.

use crate::types::{Event, TaskState};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

const BAR_TEMPLATE: &str = "[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} (ETA: {eta}) {msg}";

fn progress_bar(hidden: bool) -> ProgressBar {
    let pb = ProgressBar::new(0);
    if hidden {
        pb.set_draw_target(ProgressDrawTarget::hidden());
    } else {
        match ProgressStyle::default_bar().template(BAR_TEMPLATE) {
            Ok(style) => pb.set_style(style.progress_chars("=> ")),
            Err(e) => tracing::debug!(error = %e, "Invalid progress template, using default"),
        }
    }
    pb
}

/// Apply one event to the bar, returning `false` once the run is complete
fn apply(pb: &ProgressBar, event: &Event) -> bool {
    match event {
        Event::RunStarted { total, .. } => {
            pb.set_length(*total as u64);
            pb.set_message("starting");
        }
        Event::ItemStarted { song } => pb.set_message(song.to_string()),
        Event::Retrying { song, attempt, .. } => {
            pb.set_message(format!("{} (retry {})", song, attempt));
        }
        Event::ItemFinished {
            song,
            state,
            completed,
            ..
        } => {
            pb.set_position(*completed as u64);
            if *state == TaskState::Failed || *state == TaskState::Unresolved {
                pb.println(format!("{}: {}", state, song));
            }
        }
        Event::Draining { in_flight } => {
            pb.set_message(format!("stopping, waiting for {} in flight", in_flight));
        }
        Event::RunComplete { summary } => {
            pb.finish_with_message(summary.to_string());
            return false;
        }
        Event::Resolved { .. } | Event::DownloadAttempt { .. } => {}
    }
    true
}

/// Spawn a task rendering a progress bar until the run completes
///
/// With `hidden` set the bar is never drawn; the bar is also not drawn when
/// stderr is not a terminal.
pub fn spawn_progress(mut events: broadcast::Receiver<Event>, hidden: bool) -> JoinHandle<()> {
    let pb = progress_bar(hidden);

    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => {
                    if !apply(&pb, &event) {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "Progress display lagged behind events");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    pb.abandon();
                    break;
                }
            }
        }
    })
}
