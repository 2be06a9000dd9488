//! Streaming HTML reference rewriting

use super::css::rewrite_with;
use super::{KnownKinds, LinkCollector, Rewritten};
use crate::crawler::LinkContext;
use crate::mirror::MappedPath;
use crate::url::UrlScope;
use crate::RewriteError;
use lol_html::html_content::ContentType;
use lol_html::{element, text, HtmlRewriter, Settings};
use std::borrow::Cow;
use std::cell::RefCell;
use url::Url;

/// Attributes that can hold a reference
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RefSite {
    Href,
    Src,
    Srcset,
    Poster,
}

impl RefSite {
    const ALL: [RefSite; 4] = [Self::Href, Self::Src, Self::Srcset, Self::Poster];

    fn attribute(&self) -> &'static str {
        match self {
            Self::Href => "href",
            Self::Src => "src",
            Self::Srcset => "srcset",
            Self::Poster => "poster",
        }
    }

    fn selector(&self) -> &'static str {
        match self {
            Self::Href => "a[href], area[href], link[href]",
            Self::Src => {
                "img[src], script[src], iframe[src], frame[src], source[src], video[src], \
                 audio[src], track[src], embed[src], input[src]"
            }
            Self::Srcset => "img[srcset], source[srcset]",
            Self::Poster => "video[poster]",
        }
    }

    /// Context of the reference held by `tag`'s attribute
    fn context(&self, tag: &str, rel: Option<&str>, as_hint: Option<&str>) -> Option<LinkContext> {
        let context = match (self, tag) {
            (Self::Href, "a" | "area") => LinkContext::Navigation,
            (Self::Href, "link") => return link_context(rel.unwrap_or_default(), as_hint),
            (Self::Src, "img" | "input") => LinkContext::Image,
            (Self::Src, "script") => LinkContext::Script,
            (Self::Src, "iframe" | "frame") => LinkContext::Navigation,
            (Self::Src, "source" | "video" | "audio" | "track" | "embed") => LinkContext::Media,
            (Self::Srcset, _) | (Self::Poster, _) => LinkContext::Image,
            _ => return None,
        };
        Some(context)
    }
}

/// Context of a `<link href>` from its `rel` tokens
fn link_context(rel: &str, as_hint: Option<&str>) -> Option<LinkContext> {
    let rels: Vec<String> = rel
        .split_ascii_whitespace()
        .map(|r| r.to_ascii_lowercase())
        .collect();
    let has = |name: &str| rels.iter().any(|r| r == name);

    if has("stylesheet") {
        return Some(LinkContext::Stylesheet);
    }
    if has("icon") || has("apple-touch-icon") || has("apple-touch-icon-precomposed") || has("mask-icon") {
        return Some(LinkContext::Image);
    }
    if has("modulepreload") {
        return Some(LinkContext::Script);
    }
    if has("preload") || has("prefetch") {
        let context = match as_hint.map(|a| a.trim().to_ascii_lowercase()).as_deref() {
            Some("style") => LinkContext::Stylesheet,
            Some("script") => LinkContext::Script,
            Some("image") => LinkContext::Image,
            Some("font") => LinkContext::Font,
            _ => LinkContext::Media,
        };
        return Some(context);
    }
    if has("canonical") || has("next") || has("prev") {
        return Some(LinkContext::Navigation);
    }
    if has("manifest") {
        return Some(LinkContext::Media);
    }
    None
}

/// Decodes character references the way a browser does before using a value
fn decoded(value: String) -> String {
    html_escape::decode_html_entities(&value).into_owned()
}

/// Escapes a decoded value for `set_attribute`, which only escapes `"`
fn encoded(value: &str) -> Cow<'_, str> {
    html_escape::encode_double_quoted_attribute(value)
}

/// Splits a `srcset` into `(url, descriptor)` candidates
fn split_srcset(value: &str) -> Vec<(&str, &str)> {
    let mut candidates = Vec::new();
    let mut rest = value;

    loop {
        rest = rest.trim_start_matches(|c: char| c.is_whitespace() || c == ',');
        if rest.is_empty() {
            break;
        }

        let url_end = rest.find(char::is_whitespace).unwrap_or(rest.len());
        let url = &rest[..url_end];
        rest = &rest[url_end..];

        if url.ends_with(',') {
            candidates.push((url.trim_end_matches(','), ""));
            continue;
        }

        let descriptor_end = rest.find(',').unwrap_or(rest.len());
        candidates.push((url, rest[..descriptor_end].trim()));
        rest = &rest[descriptor_end..];
    }

    candidates
}

/// Rewrites each candidate URL; `None` when nothing changed
fn rewrite_srcset(value: &str, links: &mut LinkCollector<'_>) -> Option<String> {
    let mut changed = false;
    let candidates: Vec<String> = split_srcset(value)
        .into_iter()
        .map(|(url, descriptor)| {
            let url = match links.rewrite(url, LinkContext::Image) {
                Some(local) => {
                    changed = true;
                    local
                }
                None => url.to_string(),
            };
            if descriptor.is_empty() {
                url
            } else {
                format!("{} {}", url, descriptor)
            }
        })
        .collect();

    changed.then(|| candidates.join(", "))
}

/// Rewrites CSS embedded in the page so that it is relative to `css_base`
fn rewrite_embedded_css(css: &str, links: &RefCell<LinkCollector<'_>>, css_base: &MappedPath) -> String {
    let mut inner = links.borrow().with_target(css_base);
    let out = rewrite_with(css, &mut inner);
    links.borrow_mut().absorb(inner);
    out
}

/// Rewrites the references of an HTML page
///
/// # Arguments
///
/// * `html` - Page markup
/// * `scope` - Classifies references as internal, external or CDN
/// * `known` - Kinds already assigned to URLs earlier in the crawl
/// * `base` - URL the page was served from, after redirects
/// * `path` - Output file of the page
/// * `css_base` - Output file that CSS embedded in the page will live in
///
/// # Returns
///
/// The rewritten page. When the markup cannot be processed the original is
/// returned with `error` set.
pub fn rewrite_html(
    html: &str,
    scope: &UrlScope,
    known: &KnownKinds,
    base: &Url,
    path: &MappedPath,
    css_base: &MappedPath,
) -> Rewritten {
    let links = RefCell::new(LinkCollector::new(scope, known, base, path));
    let style_text = RefCell::new(String::new());
    let mut output = Vec::with_capacity(html.len());

    let mut handlers = vec![
        element!("base[href]", |el| {
            if let Some(href) = el.get_attribute("href").map(decoded) {
                links.borrow_mut().set_base(&href);
            }
            // Local relative links must not be resolved against the live site
            el.remove();
            Ok(())
        }),
        element!("[style]", |el| {
            if let Some(style) = el.get_attribute("style").map(decoded) {
                let rewritten = rewrite_embedded_css(&style, &links, css_base);
                if rewritten != style {
                    el.set_attribute("style", &encoded(&rewritten))?;
                }
            }
            Ok(())
        }),
        text!("style", |t| {
            style_text.borrow_mut().push_str(t.as_str());
            if !t.last_in_text_node() {
                t.remove();
                return Ok(());
            }
            let css = std::mem::take(&mut *style_text.borrow_mut());
            let rewritten = rewrite_embedded_css(&css, &links, css_base);
            t.replace(&rewritten, ContentType::Html);
            Ok(())
        }),
    ];

    for site in RefSite::ALL {
        let links = &links;
        handlers.push(element!(site.selector(), move |el| {
            let attr = site.attribute();
            let Some(value) = el.get_attribute(attr).map(decoded) else {
                return Ok(());
            };
            let tag = el.tag_name().to_ascii_lowercase();
            let rel = el.get_attribute("rel");
            let as_hint = el.get_attribute("as");
            let Some(context) = site.context(&tag, rel.as_deref(), as_hint.as_deref()) else {
                return Ok(());
            };

            let rewritten = match site {
                RefSite::Srcset => rewrite_srcset(&value, &mut links.borrow_mut()),
                _ => links.borrow_mut().rewrite(&value, context),
            };

            if let Some(local) = rewritten {
                el.set_attribute(attr, &encoded(&local))?;
                if matches!(tag.as_str(), "link" | "script") {
                    // Local copies may differ from the hashed original
                    el.remove_attribute("integrity");
                    el.remove_attribute("crossorigin");
                }
            }
            Ok(())
        }));
    }

    let mut rewriter = HtmlRewriter::new(
        Settings {
            element_content_handlers: handlers,
            ..Settings::default()
        },
        |c: &[u8]| output.extend_from_slice(c),
    );

    let result = rewriter.write(html.as_bytes()).and_then(|_| rewriter.end());
    let links = links.into_inner();

    match result {
        Ok(()) => {
            let content = String::from_utf8(output)
                .unwrap_or_else(|e| String::from_utf8_lossy(e.as_bytes()).into_owned());
            links.finish(content, None)
        }
        Err(e) => {
            tracing::warn!("HTML rewrite failed for {}: {}", base, e);
            links.finish(html.to_string(), Some(RewriteError::Html(e.to_string())))
        }
    }
}
