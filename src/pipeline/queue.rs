//! Shared work queue, the single dispatch point for all workers.

use crate::download::ArtifactStore;
use crate::types::SongDescriptor;
use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet, VecDeque};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

/// Unique acquisition targets left after [`dedupe`]
#[derive(Debug)]
pub(crate) struct Deduped {
    pub(crate) songs: Vec<SongDescriptor>,
    /// Entries whose fingerprint was already seen
    pub(crate) duplicates: usize,
    /// Entries with a new fingerprint whose artifact path was already claimed
    pub(crate) collisions: usize,
}

/// Drop descriptors that would acquire an artifact already queued
///
/// Keeps the first occurrence and the original order. Two songs are the same
/// target when they share a fingerprint or map to the same artifact path in
/// `store`; only one worker may ever write a given path.
pub(crate) fn dedupe(songs: Vec<SongDescriptor>, store: &ArtifactStore) -> Deduped {
    let mut fingerprints = HashSet::with_capacity(songs.len());
    let mut paths = HashMap::with_capacity(songs.len());
    let mut unique = Vec::with_capacity(songs.len());
    let mut duplicates = 0;
    let mut collisions = 0;

    for song in songs {
        if !fingerprints.insert(song.fingerprint()) {
            tracing::debug!(song = %song, "Dropping duplicate catalog entry");
            duplicates += 1;
            continue;
        }
        match paths.entry(store.artifact_path(&song)) {
            Entry::Occupied(claimed) => {
                tracing::warn!(
                    song = %song,
                    kept = %claimed.get(),
                    path = %claimed.key().display(),
                    "Artifact path already claimed by another song, dropping"
                );
                collisions += 1;
            }
            Entry::Vacant(slot) => {
                slot.insert(song.clone());
                unique.push(song);
            }
        }
    }

    Deduped {
        songs: unique,
        duplicates,
        collisions,
    }
}

/// FIFO queue of pending songs that stops handing out work once cancelled
pub(crate) struct WorkQueue {
    items: Mutex<VecDeque<SongDescriptor>>,
    cancel: CancellationToken,
}

impl WorkQueue {
    pub(crate) fn new(items: Vec<SongDescriptor>, cancel: CancellationToken) -> Self {
        Self {
            items: Mutex::new(items.into()),
            cancel,
        }
    }

    /// Next song in catalog order, or `None` when empty or cancelled
    pub(crate) async fn next(&self) -> Option<SongDescriptor> {
        let mut items = self.items.lock().await;
        // Checked under the lock so no item is handed out after a cancel is observed
        if self.cancel.is_cancelled() {
            return None;
        }
        items.pop_front()
    }

    /// Songs never handed out
    pub(crate) async fn remaining(&self) -> usize {
        self.items.lock().await.len()
    }
}
