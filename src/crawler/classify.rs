//! Resource classification
//!
//! A fetched resource is classified by, in order: the URL path suffix, the
//! declared Content-Type when it is unambiguous, and finally by sniffing the
//! first bytes of the body. Links are also classified *before* they are
//! fetched, from their suffix or the markup that referenced them, so that the
//! rewritten link and the written file agree on a path.

use std::fmt;
use url::Url;

/// What kind of file a resource is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceKind {
    Html,
    Css,
    Js,
    Image,
    Font,
    Other,
}

impl ResourceKind {
    /// All kinds, in reporting order
    pub const ALL: [ResourceKind; 6] = [
        Self::Html,
        Self::Css,
        Self::Js,
        Self::Image,
        Self::Font,
        Self::Other,
    ];

    /// Extension given to files of this kind whose URL has none
    pub fn canonical_extension(&self) -> Option<&'static str> {
        match self {
            Self::Html => Some("html"),
            Self::Css => Some("css"),
            Self::Js => Some("js"),
            Self::Image => Some("png"),
            Self::Font => Some("woff2"),
            Self::Other => None,
        }
    }

    /// Directory under the site root that holds files of this kind
    pub fn output_dir(&self) -> &'static str {
        match self {
            Self::Html => "",
            Self::Css => "css",
            Self::Js => "js",
            Self::Image => "images",
            Self::Font => "fonts",
            Self::Other => "assets",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Html => "html",
            Self::Css => "css",
            Self::Js => "js",
            Self::Image => "image",
            Self::Font => "font",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The markup construct a link was found in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkContext {
    /// `<a>`, `<area>`, `<iframe>`, `<frame>`
    Navigation,
    /// `<link rel=stylesheet>` or CSS `@import`
    Stylesheet,
    /// `<script src>`
    Script,
    /// `<img>`, `srcset`, `poster`, icons
    Image,
    /// CSS `url()`; usually an image, sometimes a font
    CssUrl,
    /// `<link rel=preload as=font>`
    Font,
    /// `<video>`, `<audio>`, `<track>`, `<embed>`, other `<link>` rels
    Media,
}

/// Maps a file extension to a kind
fn kind_from_extension(ext: &str) -> Option<ResourceKind> {
    let kind = match ext.to_ascii_lowercase().as_str() {
        "html" | "htm" | "xhtml" => ResourceKind::Html,
        "css" => ResourceKind::Css,
        "js" | "mjs" => ResourceKind::Js,
        "png" | "jpg" | "jpeg" | "gif" | "svg" | "webp" | "ico" | "bmp" | "avif" => {
            ResourceKind::Image
        }
        "woff" | "woff2" | "ttf" | "otf" | "eot" => ResourceKind::Font,
        "json" | "xml" | "txt" | "pdf" | "zip" | "mp4" | "webm" | "mp3" | "ogg" | "wav"
        | "vtt" | "map" | "csv" => ResourceKind::Other,
        _ => return None,
    };
    Some(kind)
}

/// Maps a MIME type (parameters already stripped) to a kind
///
/// `text/plain` and `application/octet-stream` are deliberately absent: servers
/// send them for anything, so they fall through to sniffing.
fn kind_from_mime(mime: &str) -> Option<ResourceKind> {
    let kind = match mime {
        "text/html" | "application/xhtml+xml" => ResourceKind::Html,
        "text/css" => ResourceKind::Css,
        "application/javascript" | "text/javascript" | "application/x-javascript"
        | "application/ecmascript" | "text/ecmascript" => ResourceKind::Js,
        "application/json" | "application/xml" | "text/xml" | "application/pdf" => {
            ResourceKind::Other
        }
        m if m.starts_with("image/") => ResourceKind::Image,
        m if m.starts_with("font/") => ResourceKind::Font,
        "application/font-woff" | "application/x-font-woff" | "application/x-font-ttf"
        | "application/vnd.ms-fontobject" => ResourceKind::Font,
        m if m.starts_with("video/") || m.starts_with("audio/") => ResourceKind::Other,
        _ => return None,
    };
    Some(kind)
}

/// Extension of the last path segment, if any
pub fn path_extension(path: &str) -> Option<&str> {
    let last = path.rsplit('/').next()?;
    let (stem, ext) = last.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext)
}

/// Strips parameters and lowercases a Content-Type header value
pub fn essence(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

/// Guesses a kind from the first bytes of a body
fn sniff(bytes: &[u8]) -> Option<ResourceKind> {
    const MAGIC: &[(&[u8], ResourceKind)] = &[
        (b"\x89PNG\r\n\x1a\n", ResourceKind::Image),
        (b"\xff\xd8\xff", ResourceKind::Image),
        (b"GIF87a", ResourceKind::Image),
        (b"GIF89a", ResourceKind::Image),
        (b"BM", ResourceKind::Image),
        (b"\x00\x00\x01\x00", ResourceKind::Image),
        (b"wOFF", ResourceKind::Font),
        (b"wOF2", ResourceKind::Font),
        (b"\x00\x01\x00\x00", ResourceKind::Font),
        (b"OTTO", ResourceKind::Font),
    ];

    for (magic, kind) in MAGIC {
        if bytes.starts_with(magic) {
            return Some(*kind);
        }
    }

    if bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        return Some(ResourceKind::Image);
    }

    let head = &bytes[..bytes.len().min(512)];
    let text = String::from_utf8_lossy(head);
    let text = text.trim_start_matches('\u{feff}').trim_start().to_ascii_lowercase();

    if text.starts_with("<svg") || (text.starts_with("<?xml") && text.contains("<svg")) {
        return Some(ResourceKind::Image);
    }

    const MARKUP: &[&str] = &["<!doctype html", "<html", "<head", "<body"];
    if MARKUP.iter().any(|m| text.starts_with(m)) {
        return Some(ResourceKind::Html);
    }

    None
}

/// Classifies a fetched resource
///
/// # Arguments
///
/// * `url` - Final URL of the resource
/// * `content_type` - Declared Content-Type, if any
/// * `bytes` - Body
///
/// # Examples
///
/// ```
/// use sitegrab::crawler::{classify, ResourceKind};
/// use url::Url;
///
/// let url = Url::parse("http://example.com/download").unwrap();
/// assert_eq!(classify(&url, Some("image/png"), b""), ResourceKind::Image);
/// assert_eq!(classify(&url, Some("text/plain"), b"<!DOCTYPE html>"), ResourceKind::Html);
/// ```
pub fn classify(url: &Url, content_type: Option<&str>, bytes: &[u8]) -> ResourceKind {
    if let Some(kind) = path_extension(url.path()).and_then(kind_from_extension) {
        return kind;
    }

    if let Some(kind) = content_type.map(essence).as_deref().and_then(kind_from_mime) {
        return kind;
    }

    sniff(bytes).unwrap_or(ResourceKind::Other)
}

/// Classifies a link before it is fetched
///
/// The suffix wins when it is known; otherwise the referencing markup decides.
pub fn expected_kind(url: &Url, context: LinkContext) -> ResourceKind {
    if let Some(kind) = path_extension(url.path()).and_then(kind_from_extension) {
        return kind;
    }

    match context {
        LinkContext::Navigation => ResourceKind::Html,
        LinkContext::Stylesheet => ResourceKind::Css,
        LinkContext::Script => ResourceKind::Js,
        LinkContext::Image | LinkContext::CssUrl => ResourceKind::Image,
        LinkContext::Font => ResourceKind::Font,
        LinkContext::Media => ResourceKind::Other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_suffix_wins_over_content_type() {
        let kind = classify(&url("http://e.com/app.js"), Some("text/html"), b"<html>");
        assert_eq!(kind, ResourceKind::Js);
    }

    #[test]
    fn test_content_type_when_no_suffix() {
        let u = url("http://e.com/styles");
        assert_eq!(classify(&u, Some("text/css; charset=utf-8"), b""), ResourceKind::Css);
        assert_eq!(classify(&u, Some("TEXT/HTML"), b""), ResourceKind::Html);
        assert_eq!(classify(&u, Some("font/woff2"), b""), ResourceKind::Font);
    }

    #[test]
    fn test_ambiguous_content_type_falls_through() {
        let u = url("http://e.com/blob");
        assert_eq!(
            classify(&u, Some("application/octet-stream"), b"\x89PNG\r\n\x1a\n...."),
            ResourceKind::Image
        );
        assert_eq!(classify(&u, Some("text/plain"), b"hello"), ResourceKind::Other);
    }

    #[test]
    fn test_sniffing() {
        let u = url("http://e.com/x");
        assert_eq!(classify(&u, None, b"GIF89a...."), ResourceKind::Image);
        assert_eq!(classify(&u, None, b"wOF2...."), ResourceKind::Font);
        assert_eq!(classify(&u, None, b"RIFF\0\0\0\0WEBPVP8 "), ResourceKind::Image);
        assert_eq!(
            classify(&u, None, b"  <?xml version=\"1.0\"?><svg></svg>"),
            ResourceKind::Image
        );
        assert_eq!(
            classify(&u, None, b"\n<!DOCTYPE html><html></html>"),
            ResourceKind::Html
        );
        assert_eq!(classify(&u, None, b""), ResourceKind::Other);
    }

    #[test]
    fn test_root_path_has_no_extension() {
        assert_eq!(path_extension("/"), None);
        assert_eq!(path_extension("/.hidden"), None);
        assert_eq!(path_extension("/a.b/c"), None);
        assert_eq!(path_extension("/a/logo.PNG"), Some("PNG"));
    }

    #[test]
    fn test_expected_kind_from_context() {
        let u = url("http://e.com/about");
        assert_eq!(expected_kind(&u, LinkContext::Navigation), ResourceKind::Html);
        assert_eq!(expected_kind(&u, LinkContext::Stylesheet), ResourceKind::Css);
        assert_eq!(expected_kind(&u, LinkContext::Script), ResourceKind::Js);
        assert_eq!(expected_kind(&u, LinkContext::CssUrl), ResourceKind::Image);
        assert_eq!(expected_kind(&u, LinkContext::Media), ResourceKind::Other);
    }

    #[test]
    fn test_expected_kind_suffix_wins() {
        assert_eq!(
            expected_kind(&url("http://e.com/font.woff2"), LinkContext::CssUrl),
            ResourceKind::Font
        );
        assert_eq!(
            expected_kind(&url("http://e.com/guide.pdf"), LinkContext::Navigation),
            ResourceKind::Other
        );
    }

    #[test]
    fn test_kind_layout() {
        assert_eq!(ResourceKind::Html.output_dir(), "");
        assert_eq!(ResourceKind::Image.output_dir(), "images");
        assert_eq!(ResourceKind::Font.canonical_extension(), Some("woff2"));
        assert_eq!(ResourceKind::Other.canonical_extension(), None);
    }
}
