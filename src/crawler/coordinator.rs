//! Crawler coordinator - main crawl orchestration logic
//!
//! This module contains the main crawl loop that coordinates all aspects of
//! mirroring a site, including:
//! - Seeding the frontier and honoring robots.txt
//! - Fetching one depth level at a time with bounded concurrency
//! - Rewriting, consolidating and writing each result in discovery order
//! - Handling aborts and reporting

use crate::config::{compute_config_hash, validate, Config};
use crate::consolidate::StyleConsolidator;
use crate::crawler::frontier::{CrawlTask, Frontier, Offer};
use crate::crawler::{
    build_http_client, classify, ChromeRenderer, DisabledRenderer, FetchedResource, Fetcher,
    Renderer, ResourceKind,
};
use crate::mirror::{map_path, FsMirrorWriter, MappedPath, MirrorWriter, STYLESHEET_PATH};
use crate::output::{CrawlEvent, CrawlStats, ReportSink, SqliteSink, Stage, StatsCollector};
use crate::rewrite::{rewrite_css, rewrite_html, Discovered, KnownKinds, Rewritten};
use crate::robots::{fetch_robots, product_token, RobotsRules};
use crate::url::{parse_root, site_folder_name, CanonicalUrl, UrlScope};
use crate::{FetchError, MirrorError};
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;
use url::Url;

/// Cancels a running crawl
///
/// Cloned handles share one flag. After [`AbortHandle::abort`] no new task
/// is started or queued; tasks already in flight get the configured grace
/// period to finish before they are dropped.
#[derive(Debug, Clone, Default)]
pub struct AbortHandle {
    flag: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl AbortHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn abort(&self) {
        self.flag.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub fn is_aborted(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Completes once `abort` has been called
    pub async fn aborted(&self) {
        loop {
            let notified = self.notify.notified();
            if self.is_aborted() {
                return;
            }
            notified.await;
        }
    }
}

/// Result of a mirror run
#[derive(Debug, Clone)]
pub struct CrawlReport {
    /// Site folder name, e.g. `example.com`
    pub site: String,
    pub root: CanonicalUrl,
    pub output_dir: PathBuf,
    /// Consolidated stylesheet, when consolidation was on and it was written
    pub stylesheet: Option<PathBuf>,
    pub stats: CrawlStats,
    pub aborted: bool,
}

/// How one task ended before merging
enum TaskOutcome {
    Fetched(FetchedResource),
    FetchFailed(FetchError),
    TimedOut,
    /// Never started because the crawl was aborted
    NotStarted,
}

/// Main crawler coordinator structure
pub struct Coordinator {
    config: Config,
    scope: UrlScope,
    fetcher: Fetcher,
    writer: Arc<dyn MirrorWriter>,
    frontier: Frontier,
    robots: RobotsRules,
    agent: String,
    stats: StatsCollector,
    sinks: Vec<Arc<dyn ReportSink>>,
    consolidator: Option<StyleConsolidator>,
    /// Kind of every URL referenced so far; the first reference decides
    kinds: KnownKinds,
    abort: AbortHandle,
}

impl Coordinator {
    /// Creates a new coordinator instance
    ///
    /// # Arguments
    ///
    /// * `config` - Validated configuration
    /// * `root` - The crawl root, as returned by [`parse_root`]
    /// * `writer` - Where mirrored files go
    /// * `renderer` - Headless renderer for incomplete pages
    ///
    /// # Returns
    ///
    /// * `Ok(Coordinator)` - Ready to run
    /// * `Err(MirrorError)` - The HTTP client could not be built
    pub fn new(
        config: Config,
        root: Url,
        writer: Arc<dyn MirrorWriter>,
        renderer: Arc<dyn Renderer>,
    ) -> Result<Self, MirrorError> {
        let client = build_http_client(&config.fetch)?;
        let fetcher = Fetcher::new(client, config.fetch.clone(), config.render.clone(), renderer);
        let scope = UrlScope::new(root, &config.cdn_allow_list);
        let agent = product_token(&config.fetch.user_agent).to_string();
        let consolidator = config
            .css
            .consolidate
            .then(|| StyleConsolidator::new(config.css.selector_prefix.clone()));

        Ok(Self {
            frontier: Frontier::from_config(&config.crawler),
            scope,
            fetcher,
            writer,
            robots: RobotsRules::allow_all(),
            agent,
            stats: StatsCollector::new(),
            sinks: Vec::new(),
            consolidator,
            kinds: KnownKinds::new(),
            abort: AbortHandle::new(),
            config,
        })
    }

    /// Adds a sink that receives every event
    pub fn with_sink(mut self, sink: Arc<dyn ReportSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    /// Uses an externally controlled abort handle
    pub fn with_abort(mut self, abort: AbortHandle) -> Self {
        self.abort = abort;
        self
    }

    /// Runs the crawl to completion or until aborted
    ///
    /// # Returns
    ///
    /// * `Ok(CrawlReport)` - The crawl finished; individual failures are in the stats
    /// * `Err(MirrorError)` - An internal invariant was violated
    pub async fn run(mut self) -> Result<CrawlReport, MirrorError> {
        let started = Instant::now();
        let root = self.scope.root().clone();
        tracing::info!(
            "Mirroring {} into {}",
            root,
            self.writer.root().display()
        );

        if self.config.crawler.respect_robots {
            self.robots = fetch_robots(self.fetcher.client(), root.as_url()).await;
        }

        self.kinds.insert(root.clone(), ResourceKind::Html);
        self.frontier
            .offer(root.clone(), root.as_url().clone(), 0, ResourceKind::Html, None);

        let mut aborted = false;
        while !self.frontier.is_empty() {
            if self.abort.is_aborted() {
                aborted = true;
                break;
            }

            let batch = self.frontier.next_batch();
            let depth = batch.first().map(|t| t.depth).unwrap_or_default();
            tracing::info!(
                "Depth {}: {} tasks ({} seen so far)",
                depth,
                batch.len(),
                self.frontier.seen()
            );

            for task in &batch {
                self.frontier.mark_fetching(&task.url)?;
            }

            let (finished, dropped) = self.run_batch(batch).await;
            for (task, outcome) in finished {
                self.merge(task, outcome)?;
            }
            for task in dropped {
                self.frontier.mark_failed(&task.url)?;
                self.emit(CrawlEvent::failed(
                    task.url.as_str(),
                    Some(task.kind),
                    Stage::Abort,
                    "dropped after the abort grace period",
                ));
            }

            if self.abort.is_aborted() {
                aborted = true;
                break;
            }
        }

        if aborted {
            tracing::warn!("Crawl aborted; {} queued tasks not started", self.frontier.pending());
            for task in self.frontier.drain_queued() {
                self.emit(CrawlEvent::skipped(
                    task.url.as_str(),
                    Some(task.kind),
                    Stage::Abort,
                    "crawl aborted",
                ));
            }
        }

        let stylesheet = self.flush_stylesheet();
        self.fetcher.renderer().shutdown().await;

        let depth_limit_hit = self.frontier.depth_limit_hit();
        let page_limit_hit = self.frontier.page_limit_hit();
        self.stats.update(|s| {
            s.elapsed = started.elapsed();
            s.depth_limit_hit = depth_limit_hit;
            s.page_limit_hit = page_limit_hit;
        });
        let stats = self.stats.snapshot();

        for sink in &self.sinks {
            if let Err(e) = sink.finish(&stats, aborted) {
                tracing::warn!("Report sink failed to finish: {}", e);
            }
        }

        tracing::info!(
            "Mirror finished: {} succeeded, {} failed, {} skipped in {:?}",
            stats.total_succeeded(),
            stats.total_failed(),
            stats.total_skipped(),
            stats.elapsed
        );

        Ok(CrawlReport {
            site: site_folder_name(root.as_url()),
            root,
            output_dir: self.writer.root().to_path_buf(),
            stylesheet,
            stats,
            aborted,
        })
    }

    /// Fetches one depth level
    ///
    /// At most `concurrency` tasks are in flight; results come back in batch
    /// order. Returns the finished tasks and the ones dropped after the abort
    /// grace period.
    async fn run_batch(&self, batch: Vec<CrawlTask>) -> (Vec<(CrawlTask, TaskOutcome)>, Vec<CrawlTask>) {
        let task_timeout = Duration::from_millis(self.config.crawler.task_timeout_ms);
        let grace = Duration::from_millis(self.config.crawler.abort_grace_ms);
        let concurrency = self.config.crawler.concurrency.max(1) as usize;
        let order = batch.clone();

        let mut stream = futures::stream::iter(batch.into_iter().map(|task| async move {
            if self.abort.is_aborted() {
                return (task, TaskOutcome::NotStarted);
            }
            tracing::debug!("Fetching {} (depth {}, {})", task.url, task.depth, task.kind);
            let outcome = match tokio::time::timeout(
                task_timeout,
                self.fetcher.fetch(&task.url, &task.location),
            )
            .await
            {
                Ok(Ok(resource)) => TaskOutcome::Fetched(resource),
                Ok(Err(e)) => TaskOutcome::FetchFailed(e),
                Err(_) => TaskOutcome::TimedOut,
            };
            (task, outcome)
        }))
        .buffered(concurrency);

        let mut finished = Vec::with_capacity(order.len());
        let mut deadline: Option<Instant> = None;

        loop {
            let next = match deadline {
                None => {
                    tokio::select! {
                        item = stream.next() => item,
                        _ = self.abort.aborted() => {
                            tracing::info!("Abort requested; draining in-flight tasks for {:?}", grace);
                            deadline = Some(Instant::now() + grace);
                            continue;
                        }
                    }
                }
                Some(at) => match tokio::time::timeout_at(at, stream.next()).await {
                    Ok(item) => item,
                    Err(_) => {
                        tracing::warn!("Abort grace period elapsed; dropping in-flight tasks");
                        break;
                    }
                },
            };

            match next {
                Some(result) => finished.push(result),
                None => break,
            }
        }
        drop(stream);

        // Results arrive in batch order, so whatever did not finish is a suffix
        let dropped = order.into_iter().skip(finished.len()).collect();
        (finished, dropped)
    }

    /// Applies one task's outcome; sequential, in batch order
    fn merge(&mut self, task: CrawlTask, outcome: TaskOutcome) -> Result<(), MirrorError> {
        match outcome {
            TaskOutcome::Fetched(resource) => self.process(task, resource),
            TaskOutcome::FetchFailed(e) => {
                tracing::warn!("Failed to fetch {}: {}", task.url, e);
                self.frontier.mark_failed(&task.url)?;
                self.emit(CrawlEvent::failed(task.url.as_str(), Some(task.kind), Stage::Fetch, &e));
                Ok(())
            }
            TaskOutcome::TimedOut => {
                let message = format!(
                    "task exceeded {}ms",
                    self.config.crawler.task_timeout_ms
                );
                tracing::warn!("{} {}", task.url, message);
                self.frontier.mark_failed(&task.url)?;
                self.emit(CrawlEvent::failed(task.url.as_str(), Some(task.kind), Stage::Timeout, message));
                Ok(())
            }
            TaskOutcome::NotStarted => {
                self.frontier.mark_failed(&task.url)?;
                self.emit(CrawlEvent::skipped(
                    task.url.as_str(),
                    Some(task.kind),
                    Stage::Abort,
                    "crawl aborted",
                ));
                Ok(())
            }
        }
    }

    /// Rewrites, writes and follows one fetched resource
    fn process(&mut self, task: CrawlTask, resource: FetchedResource) -> Result<(), MirrorError> {
        let actual = classify(
            &resource.final_url,
            resource.content_type.as_deref(),
            &resource.bytes,
        );
        // The path follows the link's expected kind so references agree with it
        let path = map_path(&task.url, task.kind);

        let rewritten = match actual {
            ResourceKind::Html => Some(self.process_page(&task, &resource, &path)),
            ResourceKind::Css => {
                let text = String::from_utf8_lossy(&resource.bytes);
                Some(rewrite_css(&text, &self.scope, &self.kinds, &resource.final_url, &path))
            }
            _ => None,
        };

        let (bytes, discovered, malformed) = match rewritten {
            Some(r) => (r.content.into_bytes(), r.discovered, r.malformed),
            None => (resource.bytes.clone(), Vec::new(), Vec::new()),
        };

        match self.writer.write(&path, &bytes) {
            Ok(outcome) => {
                tracing::debug!("{} -> {} ({:?})", task.url, path, outcome);
                self.frontier.mark_done(&task.url)?;
                let mut event = CrawlEvent::fetched(
                    task.url.as_str(),
                    actual,
                    bytes.len() as u64,
                    resource.elapsed.as_millis() as u64,
                    resource.render_mode,
                    outcome,
                );
                if let Some(reason) = &resource.render_fallback {
                    event = event.with_render_fallback(true).with_message(reason.clone());
                }
                self.emit(event);
            }
            Err(e) => {
                tracing::warn!("Failed to write {}: {}", path, e);
                self.frontier.mark_failed(&task.url)?;
                self.emit(CrawlEvent::failed(task.url.as_str(), Some(actual), Stage::Write, &e));
            }
        }

        for reference in malformed {
            self.emit(CrawlEvent::skipped(reference, None, Stage::Resolve, "unresolvable reference"));
        }
        self.offer_links(&task, discovered);

        Ok(())
    }

    /// Rewrites a page and, when enabled, moves its styles to the stylesheet
    fn process_page(&mut self, task: &CrawlTask, resource: &FetchedResource, path: &MappedPath) -> Rewritten {
        let html = String::from_utf8_lossy(&resource.bytes);
        let css_base = match self.consolidator {
            Some(_) => MappedPath::new(STYLESHEET_PATH),
            None => path.clone(),
        };

        let mut rewritten = rewrite_html(&html, &self.scope, &self.kinds, &resource.final_url, path, &css_base);
        if let Some(e) = rewritten.error.take() {
            self.emit(CrawlEvent::failed(task.url.as_str(), Some(ResourceKind::Html), Stage::Parse, &e));
            return rewritten;
        }

        let Some(consolidator) = self.consolidator.as_mut() else {
            return rewritten;
        };

        match consolidator.consolidate(&rewritten.content, path) {
            Ok(page) => rewritten.content = page,
            Err(e) => {
                tracing::warn!("Leaving styles of {} in place: {}", task.url, e);
                self.emit(CrawlEvent::failed(task.url.as_str(), Some(ResourceKind::Html), Stage::Parse, &e));
                // Embedded CSS stays in the page, so rewrite it relative to the page
                rewritten = rewrite_html(&html, &self.scope, &self.kinds, &resource.final_url, path, path);
            }
        }
        rewritten
    }

    /// Offers the links found in `task` to the frontier
    fn offer_links(&mut self, task: &CrawlTask, discovered: Vec<Discovered>) {
        for link in discovered {
            if self.abort.is_aborted() {
                break;
            }
            self.kinds.entry(link.url.clone()).or_insert(link.kind);
            if self.frontier.state(&link.url).is_some() {
                continue;
            }

            if self.config.crawler.respect_robots
                && !self.robots.is_allowed(link.location.as_str(), &self.agent)
            {
                tracing::info!("URL {} disallowed by robots.txt", link.url);
                self.frontier.mark_discovered(link.url.clone());
                self.emit(CrawlEvent::skipped(
                    link.url.as_str(),
                    Some(link.kind),
                    Stage::Robots,
                    "disallowed by robots.txt",
                ));
                continue;
            }

            let url = link.url.clone();
            match self.frontier.offer(
                link.url,
                link.location,
                task.depth + 1,
                link.kind,
                Some(task.url.clone()),
            ) {
                Offer::Queued | Offer::AlreadySeen => {}
                Offer::DepthLimited => self.emit(CrawlEvent::skipped(
                    url.as_str(),
                    Some(link.kind),
                    Stage::Limit,
                    "beyond max-depth",
                )),
                Offer::PageLimited => self.emit(CrawlEvent::skipped(
                    url.as_str(),
                    Some(link.kind),
                    Stage::Limit,
                    "beyond max-pages",
                )),
            }
        }
    }

    fn flush_stylesheet(&self) -> Option<PathBuf> {
        let consolidator = self.consolidator.as_ref()?;
        match consolidator.flush(self.writer.as_ref()) {
            Ok(_) => Some(MappedPath::new(STYLESHEET_PATH).to_path_buf(self.writer.root())),
            Err(e) => {
                tracing::warn!("Failed to write consolidated stylesheet: {}", e);
                self.emit(CrawlEvent::failed(STYLESHEET_PATH, Some(ResourceKind::Css), Stage::Write, &e));
                None
            }
        }
    }

    /// Reports an event to the stats and every sink
    fn emit(&self, event: CrawlEvent) {
        tracing::debug!(
            "{} {} {}",
            event.kind.as_str(),
            event.url,
            event.stage.map(|s| s.as_str()).unwrap_or_default()
        );
        self.stats.update(|s| s.record(&event));
        for sink in &self.sinks {
            if let Err(e) = sink.record(&event) {
                tracing::warn!("Report sink failed: {}", e);
            }
        }
    }
}

/// Mirrors the site at `root` with the given configuration
///
/// This is the main entry point. It will:
/// 1. Parse and validate the root
/// 2. Prepare `<output.root>/<site>` and check it is writable
/// 3. Choose the renderer and optional SQLite event log
/// 4. Run the crawl
///
/// # Arguments
///
/// * `config` - Validated configuration
/// * `root` - Bare domain, `www.` domain or full URL
/// * `abort` - Handle the caller can use to cancel the run
///
/// # Returns
///
/// * `Ok(CrawlReport)` - The crawl ran; failures of single resources are in the stats
/// * `Err(MirrorError)` - Invalid root, unwritable output or database error
///
/// # Example
///
/// ```no_run
/// use sitegrab::{mirror_site, AbortHandle, Config};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let report = mirror_site(Config::default(), "example.com", AbortHandle::new()).await?;
/// println!("{} pages", report.stats.pages());
/// # Ok(())
/// # }
/// ```
pub async fn mirror_site(
    config: Config,
    root: &str,
    abort: AbortHandle,
) -> Result<CrawlReport, MirrorError> {
    validate(&config)?;
    let root = parse_root(root)?;
    let output_dir = Path::new(&config.output.root).join(site_folder_name(&root));
    let writer: Arc<dyn MirrorWriter> = Arc::new(FsMirrorWriter::new(&output_dir)?);

    let renderer: Arc<dyn Renderer> = if config.render.enabled {
        Arc::new(ChromeRenderer::new(Duration::from_millis(config.fetch.timeout_ms)))
    } else {
        Arc::new(DisabledRenderer)
    };

    let database = config.output.database_path.clone();
    let config_hash = compute_config_hash(&toml::to_string(&config).unwrap_or_default());
    tracing::info!("Configuration hash: {}", config_hash);

    let mut coordinator = Coordinator::new(config, root.clone(), writer, renderer)?.with_abort(abort);
    if let Some(path) = database {
        let sink = SqliteSink::new(Path::new(&path), root.as_str(), &config_hash)?;
        tracing::info!("Recording events to {} (run {})", path, sink.run_id());
        coordinator = coordinator.with_sink(Arc::new(sink));
    }

    coordinator.run().await
}
