//! Read-only HTML inspection
//!
//! This module parses fetched HTML with `scraper` to answer questions about a
//! page without modifying it:
//! - Whether the static response looks incomplete and should be rendered
//! - Which class tokens the page already uses

use scraper::{ElementRef, Html, Node, Selector};
use std::collections::HashSet;

/// Elements whose text content is never visible
const INVISIBLE: &[&str] = &["script", "style", "noscript", "template"];

/// Mount points of common single-page-app frameworks
const SPA_ROOTS: &str = "#root, #app, #__next, #__nuxt, [ng-app], [data-reactroot]";

/// Decides whether static HTML should be replaced by a rendered DOM
///
/// # Heuristic
///
/// The page is considered incomplete when any of these hold:
/// - The trimmed body is shorter than `min_static_bytes`
/// - The body has no visible text while the page carries scripts
/// - A known SPA mount point exists and is empty
///
/// # Arguments
///
/// * `html` - The static HTML
/// * `min_static_bytes` - Length below which static HTML is always rendered
///
/// # Example
///
/// ```
/// use sitegrab::crawler::needs_render;
///
/// let spa = r#"<html><body><div id="root"></div><script src="/app.js"></script></body></html>"#;
/// assert!(needs_render(spa, 0));
///
/// let article = "<html><body><h1>Title</h1><p>Some text.</p></body></html>";
/// assert!(!needs_render(article, 0));
/// ```
pub fn needs_render(html: &str, min_static_bytes: usize) -> bool {
    if html.trim().len() < min_static_bytes {
        return true;
    }

    let document = Html::parse_document(html);

    let has_scripts = Selector::parse("script")
        .map(|s| document.select(&s).next().is_some())
        .unwrap_or(false);

    if has_scripts && !has_visible_text(&document) {
        return true;
    }

    if let Ok(spa_selector) = Selector::parse(SPA_ROOTS) {
        if document.select(&spa_selector).any(|el| is_empty_element(&el)) {
            return true;
        }
    }

    false
}

/// Returns true if any text outside script-like elements is non-blank
fn has_visible_text(document: &Html) -> bool {
    let body = match Selector::parse("body")
        .ok()
        .and_then(|s| document.select(&s).next())
    {
        Some(body) => body,
        None => return false,
    };

    body.descendants().any(|node| match node.value() {
        Node::Text(text) => {
            !text.trim().is_empty()
                && !node.ancestors().any(|a| {
                    a.value()
                        .as_element()
                        .map(|e| INVISIBLE.contains(&e.name()))
                        .unwrap_or(false)
                })
        }
        _ => false,
    })
}

/// No child elements and no non-blank text
fn is_empty_element(element: &ElementRef) -> bool {
    element.children().all(|child| match child.value() {
        Node::Element(_) => false,
        Node::Text(text) => text.trim().is_empty(),
        _ => true,
    })
}

/// Collects every class token used anywhere in the page
///
/// Generated selectors must never coincide with one of these.
pub fn collect_class_tokens(html: &str) -> HashSet<String> {
    let document = Html::parse_document(html);
    let mut tokens = HashSet::new();

    if let Ok(selector) = Selector::parse("[class]") {
        for element in document.select(&selector) {
            tokens.extend(element.value().classes().map(str::to_string));
        }
    }

    tokens
}
