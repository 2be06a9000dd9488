//! CSS reference scanning
//!
//! A small tokenizer that only understands what matters for references:
//! comments, strings, `url(...)` and `@import`. Everything else passes through
//! as verbatim text, so rewriting never reformats a stylesheet.

use super::{KnownKinds, LinkCollector, Rewritten};
use crate::crawler::LinkContext;
use crate::mirror::MappedPath;
use crate::url::UrlScope;
use url::Url;

/// A piece of a stylesheet
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CssToken<'a> {
    /// Text copied unchanged, comments and strings included
    Verbatim(&'a str),
    /// `url(...)`; `import` is set when it follows `@import`
    Url {
        value: &'a str,
        quote: Option<char>,
        import: bool,
    },
    /// The string operand of `@import "..."`
    ImportString { value: &'a str, quote: char },
}

fn starts_with_ignore_case(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.len() >= needle.len() && haystack[..needle.len()].eq_ignore_ascii_case(needle)
}

fn is_ident_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'-' || b == b'_' || b >= 0x80
}

/// Index just past the string starting at `open`, and whether it was closed
fn string_end(bytes: &[u8], open: usize) -> (usize, bool) {
    let quote = bytes[open];
    let mut i = open + 1;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b'\n' => return (i, false),
            b if b == quote => return (i + 1, true),
            _ => i += 1,
        }
    }
    (bytes.len(), false)
}

/// Parses the inside of `url(` starting at `pos`
///
/// Returns the value range, its quote and the index past `)`.
fn parse_url(bytes: &[u8], pos: usize) -> Option<(usize, usize, Option<char>, usize)> {
    let mut i = pos;
    while i < bytes.len() && bytes[i].is_ascii_whitespace() {
        i += 1;
    }

    if i < bytes.len() && (bytes[i] == b'"' || bytes[i] == b'\'') {
        let quote = bytes[i];
        let (end, closed) = string_end(bytes, i);
        if !closed {
            return None;
        }
        let mut j = end;
        while j < bytes.len() && bytes[j].is_ascii_whitespace() {
            j += 1;
        }
        return match bytes.get(j) {
            Some(b')') => Some((i + 1, end - 1, Some(quote as char), j + 1)),
            _ => None,
        };
    }

    let start = i;
    while i < bytes.len() {
        match bytes[i] {
            b')' => return Some((start, i, None, i + 1)),
            b'"' | b'\'' | b'(' => return None,
            b'\\' => i += 2,
            b if b.is_ascii_whitespace() => {
                let value_end = i;
                while i < bytes.len() && bytes[i].is_ascii_whitespace() {
                    i += 1;
                }
                return match bytes.get(i) {
                    Some(b')') => Some((start, value_end, None, i + 1)),
                    _ => None,
                };
            }
            _ => i += 1,
        }
    }
    None
}

fn push_verbatim<'a>(tokens: &mut Vec<CssToken<'a>>, css: &'a str, from: usize, to: usize) {
    if to > from {
        tokens.push(CssToken::Verbatim(&css[from..to]));
    }
}

/// Splits a stylesheet into verbatim text and references
///
/// Writing the tokens back reproduces the input except for whitespace
/// inside `url( ... )`.
///
/// # Examples
///
/// ```
/// use sitegrab::rewrite::{tokenize, CssToken};
///
/// let tokens = tokenize("a{background:url('bg.png')}");
/// assert_eq!(
///     tokens[1],
///     CssToken::Url { value: "bg.png", quote: Some('\''), import: false }
/// );
/// ```
pub fn tokenize(css: &str) -> Vec<CssToken<'_>> {
    let bytes = css.as_bytes();
    let mut tokens = Vec::new();
    let mut start = 0;
    let mut i = 0;
    let mut after_import = false;

    while i < bytes.len() {
        match bytes[i] {
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                i = css[i + 2..]
                    .find("*/")
                    .map(|p| i + 2 + p + 2)
                    .unwrap_or(bytes.len());
                continue;
            }
            b'"' | b'\'' => {
                let (end, closed) = string_end(bytes, i);
                if after_import && closed {
                    push_verbatim(&mut tokens, css, start, i);
                    tokens.push(CssToken::ImportString {
                        value: &css[i + 1..end - 1],
                        quote: bytes[i] as char,
                    });
                    start = end;
                }
                after_import = false;
                i = end;
                continue;
            }
            b'@' if starts_with_ignore_case(&bytes[i..], b"@import")
                && !bytes.get(i + 7).copied().is_some_and(is_ident_byte) =>
            {
                after_import = true;
                i += 7;
                continue;
            }
            b'u' | b'U'
                if starts_with_ignore_case(&bytes[i..], b"url(")
                    && (i == 0 || !is_ident_byte(bytes[i - 1])) =>
            {
                if let Some((from, to, quote, end)) = parse_url(bytes, i + 4) {
                    push_verbatim(&mut tokens, css, start, i);
                    tokens.push(CssToken::Url {
                        value: &css[from..to],
                        quote,
                        import: after_import,
                    });
                    after_import = false;
                    start = end;
                    i = end;
                    continue;
                }
            }
            b';' | b'{' | b'}' => after_import = false,
            _ => {}
        }
        i += 1;
    }

    push_verbatim(&mut tokens, css, start, bytes.len());
    tokens
}

/// Rewrites the references of a CSS document
///
/// Tokens are re-emitted in order; only internal references change.
pub(crate) fn rewrite_with(css: &str, links: &mut LinkCollector<'_>) -> String {
    let mut out = String::with_capacity(css.len());

    for token in tokenize(css) {
        match token {
            CssToken::Verbatim(text) => out.push_str(text),
            CssToken::Url {
                value,
                quote,
                import,
            } => {
                let context = if import {
                    LinkContext::Stylesheet
                } else {
                    LinkContext::CssUrl
                };
                let target = links.rewrite(value, context);
                let target = target.as_deref().unwrap_or(value);
                out.push_str("url(");
                if let Some(q) = quote {
                    out.push(q);
                    out.push_str(target);
                    out.push(q);
                } else {
                    out.push_str(target);
                }
                out.push(')');
            }
            CssToken::ImportString { value, quote } => {
                let target = links.rewrite(value, LinkContext::Stylesheet);
                out.push(quote);
                out.push_str(target.as_deref().unwrap_or(value));
                out.push(quote);
            }
        }
    }

    out
}

/// Rewrites a stylesheet fetched from `base` and written to `path`
///
/// # Arguments
///
/// * `css` - Stylesheet text
/// * `scope` - Classifies references as internal, external or CDN
/// * `known` - Kinds already assigned to URLs earlier in the crawl
/// * `base` - URL the stylesheet was served from
/// * `path` - Output file the rewritten references are relative to
pub fn rewrite_css(
    css: &str,
    scope: &UrlScope,
    known: &KnownKinds,
    base: &Url,
    path: &MappedPath,
) -> Rewritten {
    let mut links = LinkCollector::new(scope, known, base, path);
    let content = rewrite_with(css, &mut links);
    links.finish(content, None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::ResourceKind;
    use crate::url::parse_root;

    fn source(tokens: &[CssToken<'_>]) -> String {
        tokens
            .iter()
            .map(|t| match t {
                CssToken::Verbatim(s) => s.to_string(),
                CssToken::Url { value, quote, .. } => match quote {
                    Some(q) => format!("url({q}{value}{q})"),
                    None => format!("url({value})"),
                },
                CssToken::ImportString { value, quote } => format!("{quote}{value}{quote}"),
            })
            .collect()
    }

    fn scope() -> UrlScope {
        UrlScope::new(parse_root("http://example.com").unwrap(), &["fonts.googleapis.com"])
    }

    #[test]
    fn test_tokenize_finds_references() {
        let css = r#"@import "base.css"; @import url(theme.css) screen;
            .a { background: URL( "img/a.png" ) } .b{src:url(f.woff2)}"#;
        let tokens = tokenize(css);

        let refs: Vec<_> = tokens
            .iter()
            .filter(|t| !matches!(t, CssToken::Verbatim(_)))
            .cloned()
            .collect();
        assert_eq!(
            refs,
            vec![
                CssToken::ImportString { value: "base.css", quote: '"' },
                CssToken::Url { value: "theme.css", quote: None, import: true },
                CssToken::Url { value: "img/a.png", quote: Some('"'), import: false },
                CssToken::Url { value: "f.woff2", quote: None, import: false },
            ]
        );
    }

    #[test]
    fn test_comments_and_strings_are_not_references() {
        let css = r#"/* url(a.png) */ .x::before { content: "url(b.png)" } .y{}"#;
        let tokens = tokenize(css);
        assert!(tokens.iter().all(|t| matches!(t, CssToken::Verbatim(_))));
    }

    #[test]
    fn test_identifier_ending_in_url_is_not_a_reference() {
        let tokens = tokenize(".a { --my-url(x) }");
        assert!(tokens.iter().all(|t| matches!(t, CssToken::Verbatim(_))));
    }

    #[test]
    fn test_tokenize_reproduces_source() {
        let css = "@charset \"utf-8\";\n@import 'a.css';\n.a{background:url( b.png );}\n/* end";
        assert_eq!(source(&tokenize(css)), css.replace("url( b.png )", "url(b.png)"));
    }

    #[test]
    fn test_rewrite_internal_only() {
        let scope = scope();
        let base = Url::parse("http://example.com/css/site.css").unwrap();
        let css = r#"@import url("https://fonts.googleapis.com/css?family=Inter");
.hero{background:url(../img/hero.jpg)}
.x{background:url(data:image/png;base64,AAAA)}"#;

        let out = rewrite_css(css, &scope, &KnownKinds::new(), &base, &MappedPath::new("css/css/site.css"));

        assert!(out.content.contains(r#"url("https://fonts.googleapis.com/css?family=Inter")"#));
        assert!(out.content.contains("url(../../images/img/hero.jpg)"));
        assert!(out.content.contains("url(data:image/png;base64,AAAA)"));
        assert_eq!(out.discovered.len(), 1);
        assert_eq!(out.discovered[0].kind, ResourceKind::Image);
    }

    #[test]
    fn test_import_string_discovered_as_stylesheet() {
        let scope = scope();
        let base = Url::parse("http://example.com/").unwrap();
        let out = rewrite_css(
            "@import 'print';",
            &scope,
            &KnownKinds::new(),
            &base,
            &MappedPath::new("css/main.css"),
        );
        // No extension in the URL, so the added one is disambiguated
        assert!(out.content.starts_with("@import 'print-"), "{}", out.content);
        assert!(out.content.ends_with(".css';"));
        assert_eq!(out.discovered[0].kind, ResourceKind::Css);
    }

    #[test]
    fn test_unterminated_url_left_alone() {
        let scope = scope();
        let base = Url::parse("http://example.com/").unwrap();
        let css = ".a{background:url(oops.png";
        let out = rewrite_css(css, &scope, &KnownKinds::new(), &base, &MappedPath::new("css/a.css"));
        assert_eq!(out.content, css);
        assert!(out.discovered.is_empty());
    }
}
