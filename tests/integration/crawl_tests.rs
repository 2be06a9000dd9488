//! Integration tests for the mirror
//!
//! These tests use wiremock to create mock HTTP servers and test
//! the full mirror cycle end-to-end.

use sitegrab::config::Config;
use sitegrab::output::Stage;
use sitegrab::{mirror_site, AbortHandle, CrawlReport};
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const PNG: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR";

/// Creates a test configuration writing under `output`, with rendering off
fn create_test_config(output: &Path) -> Config {
    let mut config = Config::default();
    config.output.root = output.to_string_lossy().into_owned();
    config.render.enabled = false;
    config.fetch.max_retries = 0;
    config.fetch.timeout_ms = 5_000;
    config.crawler.concurrency = 4;
    config
}

async fn mount_page(server: &MockServer, at: &str, html: &str) {
    Mock::given(method("GET"))
        .and(path(at))
        .respond_with(ResponseTemplate::new(200).set_body_raw(html.to_string(), "text/html"))
        .expect(1)
        .mount(server)
        .await;
}

async fn run(server: &MockServer, config: Config) -> CrawlReport {
    mirror_site(config, &server.uri(), AbortHandle::new())
        .await
        .expect("mirror run failed")
}

fn read(report: &CrawlReport, relative: &str) -> String {
    std::fs::read_to_string(report.output_dir.join(relative))
        .unwrap_or_else(|e| panic!("missing {}: {}", relative, e))
}

/// Every `.html` file under `dir`, recursively
fn html_files(dir: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir).unwrap() {
        let path = entry.unwrap().path();
        if path.is_dir() {
            files.extend(html_files(&path));
        } else if path.extension().is_some_and(|e| e == "html") {
            files.push(path);
        }
    }
    files
}

/// `href` and `src` values of a page that point into the mirror
fn local_references(html: &str) -> Vec<String> {
    let document = scraper::Html::parse_document(html);
    let selector = scraper::Selector::parse("[href], [src]").unwrap();
    document
        .select(&selector)
        .flat_map(|el| [el.value().attr("href"), el.value().attr("src")])
        .flatten()
        .filter(|v| {
            !(v.is_empty()
                || v.starts_with('#')
                || v.starts_with("//")
                || v.contains(':'))
        })
        .map(str::to_string)
        .collect()
}

/// Asserts every local reference of every written page names an existing file
fn assert_references_resolve(report: &CrawlReport) {
    let pages = html_files(&report.output_dir);
    assert!(!pages.is_empty());

    for page in pages {
        let html = std::fs::read_to_string(&page).unwrap();
        let dir = page.parent().unwrap();
        for reference in local_references(&html) {
            let target = reference.split(['#', '?']).next().unwrap();
            let decoded = urlencoding::decode(target).unwrap();
            let resolved = dir.join(decoded.as_ref());
            assert!(
                resolved.is_file(),
                "{} references {} which does not exist",
                page.display(),
                reference
            );
        }
    }
}

#[tokio::test]
async fn test_mirror_with_consolidation() {
    let server = MockServer::start().await;
    let output = TempDir::new().unwrap();

    mount_page(
        &server,
        "/",
        r#"<html><head><title>Home</title></head><body>
<a href="/about">About</a>
<img src="logo.png">
<div style="color:red">Hello</div>
</body></html>"#,
    )
    .await;
    mount_page(&server, "/about", "<html><head></head><body><p>About us</p></body></html>").await;
    Mock::given(method("GET"))
        .and(path("/logo.png"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(PNG.to_vec(), "image/png"))
        .expect(1)
        .mount(&server)
        .await;

    let mut config = create_test_config(output.path());
    config.css.consolidate = true;
    let report = run(&server, config).await;

    let index = read(&report, "index.html");
    assert!(index.contains(r#"<a href="about.html">"#), "{}", index);
    assert!(index.contains(r#"<img src="images/logo.png">"#), "{}", index);
    assert!(index.contains(r#"<div class="wg-gen-0-0">"#), "{}", index);
    assert!(index.contains(r#"<link rel="stylesheet" href="css/styles.css">"#));
    assert!(!index.contains("style="));

    let about = read(&report, "about.html");
    assert!(about.contains("About us"));
    assert!(report.output_dir.join("images/logo.png").exists());

    let css = read(&report, "css/styles.css");
    assert!(css.starts_with("/* Consolidated styles */"));
    assert!(css.contains(".wg-gen-0-0{color:red}"));
    assert_eq!(report.stylesheet, Some(report.output_dir.join("css/styles.css")));

    assert_eq!(report.stats.pages(), 2);
    assert_eq!(report.stats.total_failed(), 0);
    assert!(!report.aborted);
}

#[tokio::test]
async fn test_cdn_and_external_links_left_verbatim() {
    let server = MockServer::start().await;
    let output = TempDir::new().unwrap();

    mount_page(
        &server,
        "/",
        r#"<html><head><script src="https://cdn.example.net/lib.js"></script></head>
<body><a href="https://other.org/page?x=1">Elsewhere</a></body></html>"#,
    )
    .await;

    let mut config = create_test_config(output.path());
    config.cdn_allow_list = vec!["cdn.example.net".to_string()];
    let report = run(&server, config).await;

    let index = read(&report, "index.html");
    assert!(index.contains(r#"<script src="https://cdn.example.net/lib.js">"#));
    assert!(index.contains(r#"<a href="https://other.org/page?x=1">"#));
    assert_eq!(report.stats.total_succeeded(), 1);
}

#[tokio::test]
async fn test_missing_page_is_one_failure() {
    let server = MockServer::start().await;
    let output = TempDir::new().unwrap();

    mount_page(
        &server,
        "/",
        r#"<html><body><a href="/about">About</a><a href="/gone">Gone</a></body></html>"#,
    )
    .await;
    mount_page(&server, "/about", "<html><body>About</body></html>").await;
    Mock::given(method("GET"))
        .and(path("/gone"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let report = run(&server, create_test_config(output.path())).await;

    assert_eq!(report.stats.total_failed(), 1);
    assert!(report.stats.failures[0].url.ends_with("/gone"));
    assert_eq!(report.stats.failures[0].stage, Stage::Fetch);
    assert_eq!(report.stats.pages(), 2);
    assert!(report.output_dir.join("about.html").exists());
    assert!(!report.output_dir.join("gone.html").exists());
}

#[tokio::test]
async fn test_robots_disallow_is_skipped() {
    let server = MockServer::start().await;
    let output = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_string("User-agent: *\nDisallow: /private"))
        .expect(1)
        .mount(&server)
        .await;
    mount_page(
        &server,
        "/",
        r#"<html><body><a href="/private/page">Secret</a><a href="/public">Public</a></body></html>"#,
    )
    .await;
    mount_page(&server, "/public", "<html><body>Public</body></html>").await;
    Mock::given(method("GET"))
        .and(path("/private/page"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let report = run(&server, create_test_config(output.path())).await;

    assert_eq!(report.stats.skipped.get(&Stage::Robots), Some(&1));
    assert_eq!(report.stats.pages(), 2);
}

#[tokio::test]
async fn test_depth_limit_stops_traversal() {
    let server = MockServer::start().await;
    let output = TempDir::new().unwrap();

    mount_page(&server, "/", r#"<html><body><a href="/a">A</a></body></html>"#).await;
    mount_page(&server, "/a", r#"<html><body><a href="/b">B</a></body></html>"#).await;
    Mock::given(method("GET"))
        .and(path("/b"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let mut config = create_test_config(output.path());
    config.crawler.max_depth = Some(1);
    let report = run(&server, config).await;

    assert_eq!(report.stats.pages(), 2);
    assert!(report.stats.depth_limit_hit);
    assert_eq!(report.stats.skipped.get(&Stage::Limit), Some(&1));
    // The link to the unfetched page is still rewritten
    assert!(read(&report, "a.html").contains(r#"href="b.html""#));
}

#[tokio::test]
async fn test_no_url_fetched_twice() {
    let server = MockServer::start().await;
    let output = TempDir::new().unwrap();

    mount_page(
        &server,
        "/",
        r#"<html><body><a href="/a">A</a><a href="/a#top">A again</a><a href="/a/">A slash</a></body></html>"#,
    )
    .await;
    mount_page(
        &server,
        "/a",
        r#"<html><body><a href="/">Home</a><a href="/a">Self</a></body></html>"#,
    )
    .await;

    let report = run(&server, create_test_config(output.path())).await;

    assert_eq!(report.stats.pages(), 2);
    assert_eq!(report.stats.total_failed(), 0);
}

#[tokio::test]
async fn test_second_run_is_unchanged() {
    let server = MockServer::start().await;
    let output = TempDir::new().unwrap();

    for at in ["/", "/about"] {
        Mock::given(method("GET"))
            .and(path(at))
            .respond_with(ResponseTemplate::new(200).set_body_raw(
                r#"<html><body><a href="/about" style="margin:0">About</a></body></html>"#,
                "text/html",
            ))
            .mount(&server)
            .await;
    }

    let mut config = create_test_config(output.path());
    config.css.consolidate = true;

    let first = run(&server, config.clone()).await;
    let before = read(&first, "index.html");
    let css_before = read(&first, "css/styles.css");
    assert_eq!(first.stats.written, 2);

    let second = run(&server, config).await;
    assert_eq!(second.stats.written, 0);
    assert_eq!(second.stats.unchanged, 2);
    assert_eq!(read(&second, "index.html"), before);
    assert_eq!(read(&second, "css/styles.css"), css_before);
}

#[tokio::test]
async fn test_aborted_before_start() {
    let server = MockServer::start().await;
    let output = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let abort = AbortHandle::new();
    abort.abort();
    let report = mirror_site(create_test_config(output.path()), &server.uri(), abort)
        .await
        .unwrap();

    assert!(report.aborted);
    assert_eq!(report.stats.total_succeeded(), 0);
    assert_eq!(report.stats.skipped.get(&Stage::Abort), Some(&1));
}

#[tokio::test]
async fn test_events_recorded_to_sqlite() {
    let server = MockServer::start().await;
    let output = TempDir::new().unwrap();
    let db = output.path().join("crawl.db");

    mount_page(&server, "/", r#"<html><body><a href="/missing">x</a></body></html>"#).await;

    let mut config = create_test_config(output.path());
    config.output.database_path = Some(db.to_string_lossy().into_owned());
    run(&server, config).await;

    let conn = rusqlite::Connection::open(&db).unwrap();
    let status: String = conn
        .query_row("SELECT status FROM runs", [], |r| r.get(0))
        .unwrap();
    assert_eq!(status, "completed");

    let failed: i64 = conn
        .query_row("SELECT COUNT(*) FROM events WHERE kind = 'failed' AND stage = 'fetch'", [], |r| r.get(0))
        .unwrap();
    assert_eq!(failed, 1);
}

#[tokio::test]
async fn test_invalid_root_is_rejected() {
    let output = TempDir::new().unwrap();
    let result = mirror_site(create_test_config(output.path()), "not a domain", AbortHandle::new()).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_every_local_reference_resolves() {
    let server = MockServer::start().await;
    let output = TempDir::new().unwrap();

    mount_page(
        &server,
        "/",
        r#"<html><head><link rel="stylesheet" href="/site.css"><script src="/app"></script></head><body>
<a href="/photo"><img src="/photo"></a>
<a href="/docs/intro#setup">Intro</a>
<img src="logo.png">
</body></html>"#,
    )
    .await;
    mount_page(&server, "/photo", "<html><body>Photo page</body></html>").await;
    mount_page(
        &server,
        "/docs/intro",
        r#"<html><body><a href="../">Home</a><img src="/logo.png"><a href="/photo">Photo</a></body></html>"#,
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/site.css"))
        .respond_with(ResponseTemplate::new(200).set_body_raw("body{background:url(/logo.png)}", "text/css"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/app"))
        .respond_with(ResponseTemplate::new(200).set_body_raw("console.log(1)", "application/javascript"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/logo.png"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(PNG.to_vec(), "image/png"))
        .expect(1)
        .mount(&server)
        .await;

    let report = run(&server, create_test_config(output.path())).await;

    assert_eq!(report.stats.total_failed(), 0);
    assert_references_resolve(&report);

    let index = read(&report, "index.html");
    assert!(index.contains(r#"<a href="photo.html"><img src="photo.html"></a>"#), "{}", index);
    assert!(index.contains(r#"<a href="docs/intro.html#setup">"#), "{}", index);
}

#[tokio::test]
async fn test_page_and_html_named_alias_both_mirrored() {
    let server = MockServer::start().await;
    let output = TempDir::new().unwrap();

    mount_page(
        &server,
        "/",
        r#"<html><body><a href="/about">About</a><a href="/about.html">About (old)</a></body></html>"#,
    )
    .await;
    mount_page(&server, "/about", "<html><body>New about</body></html>").await;
    mount_page(&server, "/about.html", "<html><body>Old about</body></html>").await;

    let report = run(&server, create_test_config(output.path())).await;

    assert_eq!(report.stats.pages(), 3);
    assert_eq!(report.stats.total_failed(), 0);
    assert!(read(&report, "about.html").contains("New about"));

    let index = read(&report, "index.html");
    let old = local_references(&index)
        .into_iter()
        .find(|r| r.starts_with("about-"))
        .unwrap_or_else(|| panic!("no separate file for /about.html in {}", index));
    assert!(read(&report, &old).contains("Old about"));
    assert_references_resolve(&report);
}

#[tokio::test]
async fn test_index_page_kept_apart_from_root() {
    let server = MockServer::start().await;
    let output = TempDir::new().unwrap();

    mount_page(&server, "/", r#"<html><body>Root<a href="/index">Index</a></body></html>"#).await;
    mount_page(&server, "/index", r#"<html><body>Index page<a href="/">Home</a></body></html>"#).await;

    let report = run(&server, create_test_config(output.path())).await;

    assert_eq!(report.stats.pages(), 2);
    let root = read(&report, "index.html");
    assert!(root.contains("Root"), "{}", root);

    let target = local_references(&root).pop().unwrap();
    assert_ne!(target, "index.html");
    assert!(read(&report, &target).contains("Index page"));
    assert!(read(&report, &target).contains(r#"<a href="index.html">"#));
}

#[tokio::test]
async fn test_entity_encoded_query_link_fetched_once() {
    let server = MockServer::start().await;
    let output = TempDir::new().unwrap();

    mount_page(
        &server,
        "/",
        r#"<html><body><a href="/list?a=1&amp;b=2">Encoded</a><a href="/list?a=1&b=2">Plain</a></body></html>"#,
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/list"))
        .and(query_param("a", "1"))
        .and(query_param("b", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_raw("<html><body>List</body></html>", "text/html"))
        .expect(1)
        .mount(&server)
        .await;

    let report = run(&server, create_test_config(output.path())).await;

    assert_eq!(report.stats.pages(), 2);
    assert_eq!(report.stats.total_failed(), 0);

    let links = local_references(&read(&report, "index.html"));
    assert_eq!(links.len(), 2);
    assert_eq!(links[0], links[1]);
    assert!(read(&report, &links[0]).contains("List"));
}

#[tokio::test]
async fn test_not_found_is_not_retried() {
    let server = MockServer::start().await;
    let output = TempDir::new().unwrap();

    mount_page(&server, "/", r#"<html><body><a href="/gone">Gone</a></body></html>"#).await;
    Mock::given(method("GET"))
        .and(path("/gone"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let mut config = create_test_config(output.path());
    config.fetch.max_retries = 2;
    let report = run(&server, config).await;

    assert_eq!(report.stats.total_failed(), 1);
    assert_eq!(report.stats.failures[0].stage, Stage::Fetch);
    assert!(report.stats.failures[0].url.ends_with("/gone"));
}
