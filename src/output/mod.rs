//! Crawl reporting
//!
//! This module handles:
//! - The event stream every task outcome is reported through
//! - In-memory totals and the end-of-run summary
//! - An optional SQLite event log

mod events;
mod sqlite_sink;
pub mod stats;
mod traits;

pub use events::{CrawlEvent, EventKind, Stage};
pub use sqlite_sink::SqliteSink;
pub use stats::{format_statistics, print_statistics, CrawlStats, FailureRecord, StatsCollector};
pub use traits::ReportSink;
