//! Crawl frontier
//!
//! Holds every URL the crawl has seen and the queue of work still to do. The
//! queue is breadth-first: tasks are handed out one depth level at a time, in
//! the order they were discovered, so a crawl's output never depends on how
//! fast individual fetches complete.

use crate::config::CrawlerConfig;
use crate::crawler::ResourceKind;
use crate::state::TaskState;
use crate::url::CanonicalUrl;
use crate::MirrorError;
use std::collections::{HashMap, VecDeque};
use url::Url;

/// One resource to fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlTask {
    pub url: CanonicalUrl,
    /// Absolute URL to request
    pub location: Url,
    /// Link distance from the root
    pub depth: u32,
    /// Kind expected from the referencing markup
    pub kind: ResourceKind,
    /// Page or stylesheet the link was found in
    pub referrer: Option<CanonicalUrl>,
    /// Discovery order
    pub seq: u64,
}

/// Result of offering a URL to the frontier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Offer {
    Queued,
    /// Seen before, in any state
    AlreadySeen,
    /// A page beyond `max-depth`
    DepthLimited,
    /// A page beyond `max-pages`
    PageLimited,
}

/// The visited map and BFS queue
#[derive(Debug)]
pub struct Frontier {
    queue: VecDeque<CrawlTask>,
    states: HashMap<CanonicalUrl, TaskState>,
    max_depth: Option<u32>,
    max_pages: Option<u32>,
    pages_queued: u32,
    next_seq: u64,
    depth_limit_hit: bool,
    page_limit_hit: bool,
}

impl Frontier {
    /// Creates an empty frontier with the given page ceilings
    pub fn new(max_depth: Option<u32>, max_pages: Option<u32>) -> Self {
        Self {
            queue: VecDeque::new(),
            states: HashMap::new(),
            max_depth,
            max_pages,
            pages_queued: 0,
            next_seq: 0,
            depth_limit_hit: false,
            page_limit_hit: false,
        }
    }

    pub fn from_config(config: &CrawlerConfig) -> Self {
        Self::new(config.max_depth, config.max_pages)
    }

    /// Offers a discovered internal URL
    ///
    /// Ceilings apply to pages only; assets of an accepted page are always
    /// queued. A URL rejected by a ceiling stays `Discovered` and is reported
    /// as already seen from then on.
    ///
    /// # Arguments
    ///
    /// * `url` - Canonical form, the visited-map key
    /// * `location` - Absolute URL to request
    /// * `depth` - Link distance from the root
    /// * `kind` - Expected kind
    /// * `referrer` - Where the link was found
    pub fn offer(
        &mut self,
        url: CanonicalUrl,
        location: Url,
        depth: u32,
        kind: ResourceKind,
        referrer: Option<CanonicalUrl>,
    ) -> Offer {
        if self.states.contains_key(&url) {
            return Offer::AlreadySeen;
        }

        if kind == ResourceKind::Html {
            if self.max_depth.is_some_and(|max| depth > max) {
                self.depth_limit_hit = true;
                self.states.insert(url, TaskState::Discovered);
                return Offer::DepthLimited;
            }
            if self.max_pages.is_some_and(|max| self.pages_queued >= max) {
                self.page_limit_hit = true;
                self.states.insert(url, TaskState::Discovered);
                return Offer::PageLimited;
            }
            self.pages_queued += 1;
        }

        self.states.insert(url.clone(), TaskState::Queued);
        self.queue.push_back(CrawlTask {
            url,
            location,
            depth,
            kind,
            referrer,
            seq: self.next_seq,
        });
        self.next_seq += 1;

        Offer::Queued
    }

    /// Records a URL that will never be queued, e.g. one disallowed by robots.txt
    ///
    /// Returns `false` when the URL was already known.
    pub fn mark_discovered(&mut self, url: CanonicalUrl) -> bool {
        if self.states.contains_key(&url) {
            return false;
        }
        self.states.insert(url, TaskState::Discovered);
        true
    }

    /// Takes every queued task at the shallowest depth, in discovery order
    pub fn next_batch(&mut self) -> Vec<CrawlTask> {
        let Some(depth) = self.queue.front().map(|t| t.depth) else {
            return Vec::new();
        };

        let mut batch = Vec::new();
        while self.queue.front().is_some_and(|t| t.depth == depth) {
            if let Some(task) = self.queue.pop_front() {
                batch.push(task);
            }
        }
        batch
    }

    /// Removes and returns every task still queued
    pub fn drain_queued(&mut self) -> Vec<CrawlTask> {
        self.queue.drain(..).collect()
    }

    fn transition(&mut self, url: &CanonicalUrl, to: TaskState) -> Result<(), MirrorError> {
        let state = self
            .states
            .get_mut(url)
            .ok_or(MirrorError::InvalidTransition {
                from: TaskState::Discovered,
                to,
            })?;

        if !state.can_transition_to(to) {
            return Err(MirrorError::InvalidTransition { from: *state, to });
        }
        *state = to;
        Ok(())
    }

    pub fn mark_fetching(&mut self, url: &CanonicalUrl) -> Result<(), MirrorError> {
        self.transition(url, TaskState::Fetching)
    }

    pub fn mark_done(&mut self, url: &CanonicalUrl) -> Result<(), MirrorError> {
        self.transition(url, TaskState::Done)
    }

    pub fn mark_failed(&mut self, url: &CanonicalUrl) -> Result<(), MirrorError> {
        self.transition(url, TaskState::Failed)
    }

    /// Current state of a URL, if it was ever seen
    pub fn state(&self, url: &CanonicalUrl) -> Option<TaskState> {
        self.states.get(url).copied()
    }

    /// Number of tasks waiting in the queue
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Number of distinct URLs seen
    pub fn seen(&self) -> usize {
        self.states.len()
    }

    pub fn depth_limit_hit(&self) -> bool {
        self.depth_limit_hit
    }

    pub fn page_limit_hit(&self) -> bool {
        self.page_limit_hit
    }
}
