/// Task state definitions for tracking crawl progress
///
/// Every URL the frontier sees moves through these states at most once.
use std::fmt;

/// Represents the current state of a crawl task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskState {
    // ===== Active States =====
    /// URL has been seen; it stays here if a ceiling or robots.txt stops it
    Discovered,

    /// Task is queued and waiting for a worker
    Queued,

    /// Task is being fetched and processed
    Fetching,

    // ===== Terminal States =====
    /// Resource was fetched and written
    Done,

    /// Fetch, processing or writing failed
    Failed,
}

impl TaskState {
    /// Whether moving from `self` to `next` is allowed
    ///
    /// The only legal path is `Discovered → Queued → Fetching → Done | Failed`.
    pub fn can_transition_to(&self, next: TaskState) -> bool {
        matches!(
            (self, next),
            (Self::Discovered, Self::Queued)
                | (Self::Queued, Self::Fetching)
                | (Self::Fetching, Self::Done)
                | (Self::Fetching, Self::Failed)
        )
    }

    /// Converts the state to the string stored in the event log
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Discovered => "discovered",
            Self::Queued => "queued",
            Self::Fetching => "fetching",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
