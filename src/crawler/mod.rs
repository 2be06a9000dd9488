//! Crawler module for fetching and mirroring a site
//!
//! This module contains the core crawling logic, including:
//! - Resource classification by content type, extension and sniffing
//! - HTTP fetching with retry logic and optional headless rendering
//! - The breadth-first frontier with depth and page ceilings
//! - Overall crawl coordination

mod classify;
mod coordinator;
mod fetcher;
mod frontier;
mod parser;
mod render;

pub use classify::{classify, essence, expected_kind, path_extension, LinkContext, ResourceKind};
pub use coordinator::{mirror_site, AbortHandle, Coordinator, CrawlReport};
pub use fetcher::{backoff_delay, build_http_client, FetchedResource, Fetcher, RenderMode};
pub use frontier::{CrawlTask, Frontier, Offer};
pub use parser::{collect_class_tokens, needs_render};
pub use render::{ChromeRenderer, DisabledRenderer, Renderer};
