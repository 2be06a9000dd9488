//! sitegrab main entry point
//!
//! This is the command-line interface for the sitegrab offline mirror.

use anyhow::Context;
use clap::Parser;
use sitegrab::config::{load_config_with_hash, validate, Config};
use sitegrab::output::print_statistics;
use sitegrab::{mirror_site, AbortHandle};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// sitegrab: an offline website mirror
///
/// Downloads every same-site page reachable from the root along with the
/// stylesheets, scripts, images and fonts they use, and rewrites links so
/// the copy browses locally.
#[derive(Parser, Debug)]
#[command(name = "sitegrab")]
#[command(version)]
#[command(about = "Mirror a website for offline browsing", long_about = None)]
struct Cli {
    /// Site to mirror: bare domain, www. domain or full URL
    #[arg(value_name = "URL")]
    url: String,

    /// Move inline and embedded styles into css/styles.css
    #[arg(long)]
    optimize_css: bool,

    /// Path to TOML configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Directory the site folder is created in
    #[arg(short, long, value_name = "DIR")]
    output: Option<String>,

    /// Maximum link depth of pages from the root
    #[arg(long)]
    max_depth: Option<u32>,

    /// Maximum number of pages to mirror
    #[arg(long)]
    max_pages: Option<u32>,

    /// Number of tasks in flight at once
    #[arg(long)]
    concurrency: Option<u32>,

    /// Never launch a headless browser
    #[arg(long)]
    no_render: bool,

    /// Record run events to this SQLite database
    #[arg(long, value_name = "FILE")]
    database: Option<String>,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    let mut config = match &cli.config {
        Some(path) => {
            tracing::info!("Loading configuration from: {}", path.display());
            let (config, hash) = load_config_with_hash(path)
                .with_context(|| format!("failed to load {}", path.display()))?;
            tracing::info!("Configuration loaded successfully (hash: {})", hash);
            config
        }
        None => Config::default(),
    };
    apply_overrides(&mut config, &cli);
    validate(&config).context("invalid configuration")?;

    let abort = AbortHandle::new();
    let on_signal = abort.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted; finishing in-flight downloads");
            on_signal.abort();
        }
    });

    let report = mirror_site(config, &cli.url, abort)
        .await
        .with_context(|| format!("failed to mirror {}", cli.url))?;

    if !cli.quiet {
        print_statistics(
            &report.stats,
            &report.site,
            &report.output_dir,
            report.stylesheet.as_deref(),
            report.aborted,
        );
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("sitegrab=info,warn"),
            1 => EnvFilter::new("sitegrab=debug,info"),
            2 => EnvFilter::new("sitegrab=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Command-line flags win over the configuration file
fn apply_overrides(config: &mut Config, cli: &Cli) {
    if cli.optimize_css {
        config.css.consolidate = true;
    }
    if let Some(output) = &cli.output {
        config.output.root = output.clone();
    }
    if cli.max_depth.is_some() {
        config.crawler.max_depth = cli.max_depth;
    }
    if cli.max_pages.is_some() {
        config.crawler.max_pages = cli.max_pages;
    }
    if let Some(concurrency) = cli.concurrency {
        config.crawler.concurrency = concurrency;
    }
    if cli.no_render {
        config.render.enabled = false;
    }
    if cli.database.is_some() {
        config.output.database_path = cli.database.clone();
    }
}
