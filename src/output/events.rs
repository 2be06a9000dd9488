//! Crawl events
//!
//! Every task outcome is reported as one [`CrawlEvent`]. Sinks turn the
//! stream into totals, logs or database rows.

use crate::crawler::{RenderMode, ResourceKind};
use crate::mirror::WriteOutcome;
use std::fmt;

/// What happened to a URL
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// Fetched and written
    Fetched,
    Failed,
    /// Never fetched
    Skipped,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fetched => "fetched",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }
}

/// Pipeline step an event is attributed to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Stage {
    Resolve,
    Robots,
    Limit,
    Fetch,
    Parse,
    Write,
    Timeout,
    Abort,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Resolve => "resolve",
            Self::Robots => "robots",
            Self::Limit => "limit",
            Self::Fetch => "fetch",
            Self::Parse => "parse",
            Self::Write => "write",
            Self::Timeout => "timeout",
            Self::Abort => "abort",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One reported outcome
#[derive(Debug, Clone, PartialEq)]
pub struct CrawlEvent {
    pub kind: EventKind,
    pub url: String,
    pub resource_kind: Option<ResourceKind>,
    /// Bytes written to the mirror
    pub bytes: u64,
    pub elapsed_ms: u64,
    pub render_mode: Option<RenderMode>,
    pub stage: Option<Stage>,
    pub error: Option<String>,
    pub message: Option<String>,
    /// Set on fetched events
    pub write: Option<WriteOutcome>,
    /// A render was attempted but static content was used
    pub render_fallback: bool,
}

impl CrawlEvent {
    fn new(kind: EventKind, url: impl Into<String>) -> Self {
        Self {
            kind,
            url: url.into(),
            resource_kind: None,
            bytes: 0,
            elapsed_ms: 0,
            render_mode: None,
            stage: None,
            error: None,
            message: None,
            write: None,
            render_fallback: false,
        }
    }

    /// A resource that was fetched and written
    pub fn fetched(
        url: impl Into<String>,
        kind: ResourceKind,
        bytes: u64,
        elapsed_ms: u64,
        render_mode: RenderMode,
        write: WriteOutcome,
    ) -> Self {
        Self {
            resource_kind: Some(kind),
            bytes,
            elapsed_ms,
            render_mode: Some(render_mode),
            write: Some(write),
            ..Self::new(EventKind::Fetched, url)
        }
    }

    /// A resource that failed at `stage`
    pub fn failed(url: impl Into<String>, kind: Option<ResourceKind>, stage: Stage, error: impl ToString) -> Self {
        Self {
            resource_kind: kind,
            stage: Some(stage),
            error: Some(error.to_string()),
            ..Self::new(EventKind::Failed, url)
        }
    }

    /// A URL that was never fetched
    pub fn skipped(url: impl Into<String>, kind: Option<ResourceKind>, stage: Stage, message: impl Into<String>) -> Self {
        Self {
            resource_kind: kind,
            stage: Some(stage),
            message: Some(message.into()),
            ..Self::new(EventKind::Skipped, url)
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_render_fallback(mut self, fallback: bool) -> Self {
        self.render_fallback = fallback;
        self
    }
}
