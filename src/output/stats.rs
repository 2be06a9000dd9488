//! Crawl statistics
//!
//! [`StatsCollector`] folds the event stream into [`CrawlStats`], which the
//! binary prints at the end of a run.

use crate::crawler::{RenderMode, ResourceKind};
use crate::mirror::WriteOutcome;
use crate::output::events::{CrawlEvent, EventKind, Stage};
use crate::output::traits::ReportSink;
use crate::MirrorError;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

/// A failed URL and why it failed
#[derive(Debug, Clone, PartialEq)]
pub struct FailureRecord {
    pub url: String,
    pub stage: Stage,
    pub error: String,
}

/// Totals for one run
#[derive(Debug, Clone, Default)]
pub struct CrawlStats {
    /// Bytes written to the mirror, including unchanged files
    pub total_bytes: u64,
    pub succeeded: BTreeMap<ResourceKind, u64>,
    pub failed: BTreeMap<ResourceKind, u64>,
    pub skipped: BTreeMap<Stage, u64>,
    pub written: u64,
    pub unchanged: u64,
    pub rendered: u64,
    pub render_fallbacks: u64,
    pub depth_limit_hit: bool,
    pub page_limit_hit: bool,
    pub failures: Vec<FailureRecord>,
    pub elapsed: Duration,
}

impl CrawlStats {
    /// Folds one event into the totals
    pub fn record(&mut self, event: &CrawlEvent) {
        let kind = event.resource_kind.unwrap_or(ResourceKind::Other);

        match event.kind {
            EventKind::Fetched => {
                *self.succeeded.entry(kind).or_default() += 1;
                self.total_bytes += event.bytes;
                match event.write {
                    Some(WriteOutcome::Written) => self.written += 1,
                    Some(WriteOutcome::Unchanged) => self.unchanged += 1,
                    None => {}
                }
                if event.render_mode == Some(RenderMode::Dynamic) {
                    self.rendered += 1;
                }
                if event.render_fallback {
                    self.render_fallbacks += 1;
                }
            }
            EventKind::Failed => {
                *self.failed.entry(kind).or_default() += 1;
                self.failures.push(FailureRecord {
                    url: event.url.clone(),
                    stage: event.stage.unwrap_or(Stage::Fetch),
                    error: event.error.clone().unwrap_or_default(),
                });
            }
            EventKind::Skipped => {
                *self.skipped.entry(event.stage.unwrap_or(Stage::Resolve)).or_default() += 1;
            }
        }
    }

    pub fn total_succeeded(&self) -> u64 {
        self.succeeded.values().sum()
    }

    pub fn total_failed(&self) -> u64 {
        self.failed.values().sum()
    }

    pub fn total_skipped(&self) -> u64 {
        self.skipped.values().sum()
    }

    /// Pages written to the mirror
    pub fn pages(&self) -> u64 {
        self.succeeded.get(&ResourceKind::Html).copied().unwrap_or(0)
    }
}

/// In-memory [`ReportSink`] that keeps running totals
#[derive(Debug, Default)]
pub struct StatsCollector {
    stats: Mutex<CrawlStats>,
}

impl StatsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the totals so far
    pub fn snapshot(&self) -> CrawlStats {
        match self.stats.lock() {
            Ok(stats) => stats.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Applies a change to the totals
    pub fn update(&self, f: impl FnOnce(&mut CrawlStats)) {
        match self.stats.lock() {
            Ok(mut stats) => f(&mut *stats),
            Err(poisoned) => f(&mut *poisoned.into_inner()),
        }
    }
}

impl ReportSink for StatsCollector {
    fn record(&self, event: &CrawlEvent) -> Result<(), MirrorError> {
        self.update(|stats| stats.record(event));
        Ok(())
    }

    fn finish(&self, _stats: &CrawlStats, _aborted: bool) -> Result<(), MirrorError> {
        Ok(())
    }
}

/// Formats the end-of-run summary
///
/// # Arguments
///
/// * `stats` - Final totals
/// * `site` - Site folder name, e.g. `example.com`
/// * `output_dir` - Where the mirror was written
/// * `stylesheet` - Consolidated stylesheet, when consolidation was on
/// * `aborted` - Whether the run was cancelled
pub fn format_statistics(
    stats: &CrawlStats,
    site: &str,
    output_dir: &Path,
    stylesheet: Option<&Path>,
    aborted: bool,
) -> String {
    let mut out = String::new();
    let secs = stats.elapsed.as_secs();

    let _ = writeln!(out, "=== Mirror Statistics ===\n");
    let _ = writeln!(out, "Site: {}", site);
    let _ = writeln!(out, "Output directory: {}", output_dir.display());
    let _ = writeln!(out, "Elapsed: {}m {}s", secs / 60, secs % 60);
    let _ = writeln!(out, "Size: {:.2} MB", stats.total_bytes as f64 / (1024.0 * 1024.0));
    if let Some(path) = stylesheet {
        let _ = writeln!(out, "Consolidated stylesheet: {}", path.display());
    }
    if aborted {
        let _ = writeln!(out, "Status: aborted");
    }
    let _ = writeln!(out);

    let _ = writeln!(out, "Resources:");
    for kind in ResourceKind::ALL {
        let ok = stats.succeeded.get(&kind).copied().unwrap_or(0);
        let failed = stats.failed.get(&kind).copied().unwrap_or(0);
        if ok + failed > 0 {
            let _ = writeln!(out, "  {}: {} mirrored, {} failed", kind, ok, failed);
        }
    }
    let _ = writeln!(out, "  Written: {}, unchanged: {}", stats.written, stats.unchanged);
    if stats.rendered + stats.render_fallbacks > 0 {
        let _ = writeln!(
            out,
            "  Rendered: {} ({} fell back to static HTML)",
            stats.rendered, stats.render_fallbacks
        );
    }
    let _ = writeln!(out);

    if !stats.skipped.is_empty() {
        let _ = writeln!(out, "Skipped ({}):", stats.total_skipped());
        for (stage, count) in &stats.skipped {
            let _ = writeln!(out, "  {}: {}", stage, count);
        }
        let _ = writeln!(out);
    }

    if stats.depth_limit_hit {
        let _ = writeln!(out, "Depth limit reached");
    }
    if stats.page_limit_hit {
        let _ = writeln!(out, "Page limit reached");
    }

    if !stats.failures.is_empty() {
        let _ = writeln!(out, "Failed URLs ({}):", stats.failures.len());
        for failure in &stats.failures {
            let _ = writeln!(out, "  - {} [{}]: {}", failure.url, failure.stage, failure.error);
        }
    }

    out
}

/// Prints the end-of-run summary to stdout
pub fn print_statistics(
    stats: &CrawlStats,
    site: &str,
    output_dir: &Path,
    stylesheet: Option<&Path>,
    aborted: bool,
) {
    print!("{}", format_statistics(stats, site, output_dir, stylesheet, aborted));
}
