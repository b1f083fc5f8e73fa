//! Core types and events for playlist-dl

use serde::{Deserialize, Serialize};
use std::hash::{Hash, Hasher};
use std::time::Duration;

/// A song to acquire, as listed by the catalog
///
/// Identity is the [fingerprint](SongDescriptor::fingerprint): two descriptors
/// with the same fingerprint compare equal and hash the same.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SongDescriptor {
    /// Track title, exactly as the catalog spells it
    pub title: String,
    /// Primary artist name
    pub artist: String,
}

impl SongDescriptor {
    /// Create a new descriptor
    pub fn new(title: impl Into<String>, artist: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            artist: artist.into(),
        }
    }

    /// Canonical `"{title} - {artist}"` identity, also the artifact base name
    pub fn fingerprint(&self) -> String {
        format!("{} - {}", self.title, self.artist)
    }

    /// Free-text search query for the resolver
    pub fn search_query(&self) -> String {
        format!("{} {}", self.title, self.artist)
    }
}

impl PartialEq for SongDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.fingerprint() == other.fingerprint()
    }
}

impl Eq for SongDescriptor {}

impl Hash for SongDescriptor {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.fingerprint().hash(state);
    }
}

impl std::fmt::Display for SongDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} - {}", self.title, self.artist)
    }
}

/// Opaque source location returned by a resolver (typically a video page URL)
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceLocator(pub String);

impl SourceLocator {
    /// Create a new locator
    pub fn new(locator: impl Into<String>) -> Self {
        Self(locator.into())
    }

    /// Borrow the locator string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SourceLocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Per-item acquisition state
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    /// Dispatched, nothing checked yet
    Pending,
    /// Searching for a source
    Resolving,
    /// Fetching and transcoding
    Downloading,
    /// Artifact already present
    Skipped,
    /// No source found
    Unresolved,
    /// Artifact written
    Done,
    /// Gave up after a permanent error or exhausted retries
    Failed,
}

impl TaskState {
    /// Whether no further transitions are possible
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskState::Skipped | TaskState::Unresolved | TaskState::Done | TaskState::Failed
        )
    }

    /// Whether `next` is a legal successor of this state
    pub fn can_transition_to(&self, next: TaskState) -> bool {
        use TaskState::*;
        matches!(
            (self, next),
            (Pending, Skipped)
                | (Pending, Resolving)
                | (Resolving, Unresolved)
                | (Resolving, Downloading)
                | (Downloading, Downloading)
                | (Downloading, Done)
                | (Downloading, Failed)
        )
    }
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TaskState::Pending => "pending",
            TaskState::Resolving => "resolving",
            TaskState::Downloading => "downloading",
            TaskState::Skipped => "skipped",
            TaskState::Unresolved => "unresolved",
            TaskState::Done => "done",
            TaskState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Mutable per-item state, owned by exactly one worker at a time
#[derive(Debug)]
pub struct DownloadTask {
    descriptor: SongDescriptor,
    attempt: u32,
    state: TaskState,
}

impl DownloadTask {
    /// Create a task in the `Pending` state
    pub fn new(descriptor: SongDescriptor) -> Self {
        Self {
            descriptor,
            attempt: 0,
            state: TaskState::Pending,
        }
    }

    /// The song this task acquires
    pub fn descriptor(&self) -> &SongDescriptor {
        &self.descriptor
    }

    /// Number of retries performed so far
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Current state
    pub fn state(&self) -> TaskState {
        self.state
    }

    /// Move to `next`, counting a retry on `Downloading -> Downloading`
    ///
    /// Illegal transitions leave the task untouched and return `false`.
    pub fn transition(&mut self, next: TaskState) -> bool {
        if !self.state.can_transition_to(next) {
            tracing::error!(
                song = %self.descriptor,
                from = %self.state,
                to = %next,
                "Rejected illegal task state transition"
            );
            return false;
        }
        if self.state == TaskState::Downloading && next == TaskState::Downloading {
            self.attempt += 1;
        }
        self.state = next;
        true
    }
}

/// Final per-item report produced by a worker
#[derive(Clone, Debug)]
pub struct ItemReport {
    /// The song
    pub descriptor: SongDescriptor,
    /// Terminal state reached
    pub state: TaskState,
    /// Download calls made (0 when skipped or unresolved)
    pub download_attempts: u32,
    /// Last error message for failed items
    pub error: Option<String>,
}

/// Aggregate outcome of one pipeline run
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Unique acquisition targets handed to the pipeline
    pub total: usize,
    /// Artifacts written in this run
    pub done: usize,
    /// Artifacts that already existed
    pub skipped: usize,
    /// Items without a source match
    pub unresolved: usize,
    /// Items that failed permanently or exhausted retries
    pub failed: usize,
    /// Items never dispatched because the run was interrupted
    pub not_started: usize,
    /// Descriptors dropped because their fingerprint was already queued
    pub duplicates: usize,
    /// Descriptors dropped because another song already claimed their artifact path
    pub collisions: usize,
    /// Whether the run was interrupted
    pub cancelled: bool,
    /// Wall-clock duration of the run
    #[serde(with = "duration_millis")]
    pub elapsed: Duration,
}

impl RunSummary {
    /// Items that reached a terminal state
    pub fn completed(&self) -> usize {
        self.done + self.skipped + self.unresolved + self.failed
    }
}

impl std::fmt::Display for RunSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} done, {} skipped, {} unresolved, {} failed",
            self.done, self.skipped, self.unresolved, self.failed
        )?;
        if self.not_started > 0 {
            write!(f, ", {} not started", self.not_started)?;
        }
        write!(f, " ({} of {} items", self.completed(), self.total)?;
        if self.duplicates > 0 {
            write!(f, ", {} duplicates dropped", self.duplicates)?;
        }
        if self.collisions > 0 {
            write!(f, ", {} name collisions dropped", self.collisions)?;
        }
        write!(f, ", {:.1}s)", self.elapsed.as_secs_f64())
    }
}

/// Event emitted by the pipeline
///
/// Delivered over a broadcast channel; subscribers that lag or go away never
/// slow the pipeline down.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Pipeline started with `total` unique items
    RunStarted {
        /// Number of unique items
        total: usize,
        /// Worker pool size
        workers: usize,
    },

    /// A worker picked up an item
    ItemStarted {
        /// The song
        song: SongDescriptor,
    },

    /// A source was found for an item
    Resolved {
        /// The song
        song: SongDescriptor,
        /// Source found
        locator: SourceLocator,
    },

    /// A download attempt is queued up
    ///
    /// Retries are announced right after their [`Event::Retrying`], before
    /// the backoff delay.
    DownloadAttempt {
        /// The song
        song: SongDescriptor,
        /// Zero-based attempt number
        attempt: u32,
    },

    /// A transient failure will be retried
    Retrying {
        /// The song
        song: SongDescriptor,
        /// Retry number about to run (1-based)
        attempt: u32,
        /// Failure that triggered the retry
        error: String,
    },

    /// An item reached a terminal state
    ItemFinished {
        /// The song
        song: SongDescriptor,
        /// Terminal state
        state: TaskState,
        /// Items finished so far, including this one
        completed: usize,
        /// Total unique items
        total: usize,
    },

    /// Interrupt received, no new items will be dispatched
    Draining {
        /// Items still being processed
        in_flight: usize,
    },

    /// All workers have exited
    RunComplete {
        /// Final tally
        summary: RunSummary,
    },
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
