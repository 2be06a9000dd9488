//! Report sink trait

use crate::output::events::CrawlEvent;
use crate::output::stats::CrawlStats;
use crate::MirrorError;

/// Receives crawl events as they happen
///
/// Sinks are shared by the coordinator as trait objects, so implementations
/// must be thread-safe. A failing sink is logged and never stops the crawl.
pub trait ReportSink: Send + Sync {
    /// Records one event
    ///
    /// # Arguments
    ///
    /// * `event` - The outcome of one task or skipped URL
    fn record(&self, event: &CrawlEvent) -> Result<(), MirrorError>;

    /// Called once after the last event
    ///
    /// # Arguments
    ///
    /// * `stats` - Final totals
    /// * `aborted` - Whether the run was cancelled
    fn finish(&self, stats: &CrawlStats, aborted: bool) -> Result<(), MirrorError>;
}
