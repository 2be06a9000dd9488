//! URL to local path mapping
//!
//! [`map_path`] is a pure function of the canonical URL and the resource
//! kind, so every page can compute the path of every other resource without
//! coordination and re-runs produce the same tree.

use crate::crawler::{path_extension, ResourceKind};
use crate::url::CanonicalUrl;
use sha2::{Digest, Sha256};
use std::borrow::Cow;
use std::fmt;
use std::path::{Component, Path, PathBuf};

/// Longest file or directory name emitted, in bytes
const MAX_SEGMENT_BYTES: usize = 120;

/// Length of the disambiguating hash suffix
const HASH_CHARS: usize = 8;

/// Characters that are unsafe in file names on at least one platform
const UNSAFE_CHARS: &[char] = &['<', '>', ':', '"', '\\', '|', '?', '*', '/'];

/// A `/`-separated path relative to the site's mirror root
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MappedPath(String);

impl MappedPath {
    /// Wraps an already relative path, e.g. the consolidated stylesheet
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Location of this file under `root`
    pub fn to_path_buf(&self, root: &Path) -> PathBuf {
        let mut path = root.to_path_buf();
        path.extend(self.0.split('/'));
        path
    }

    /// Relative reference from the file `from` to this file, URL-encoded
    ///
    /// # Examples
    ///
    /// ```
    /// use sitegrab::mirror::MappedPath;
    ///
    /// let logo = MappedPath::new("images/logo.png");
    /// assert_eq!(logo.relative_to(&MappedPath::new("index.html")), "images/logo.png");
    /// assert_eq!(logo.relative_to(&MappedPath::new("docs/intro.html")), "../images/logo.png");
    /// ```
    pub fn relative_to(&self, from: &MappedPath) -> String {
        let target = Path::new(&self.0);
        let from_dir = Path::new(&from.0).parent().unwrap_or_else(|| Path::new(""));

        let relative =
            pathdiff::diff_paths(target, from_dir).unwrap_or_else(|| target.to_path_buf());

        relative
            .components()
            .filter_map(|c| match c {
                Component::ParentDir => Some(Cow::Borrowed("..")),
                Component::Normal(name) => {
                    let name = name.to_string_lossy();
                    Some(Cow::Owned(urlencoding::encode(&name).into_owned()))
                }
                _ => None,
            })
            .collect::<Vec<Cow<str>>>()
            .join("/")
    }
}

impl fmt::Display for MappedPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Maps a canonical URL and its kind to a path under the mirror root
///
/// # Mapping Rules
///
/// - **Html** mirrors the URL path: `/` → `index.html`, `/about` →
///   `about.html`, `/docs/intro` → `docs/intro.html`; a last segment that
///   already ends in `.html`/`.htm` keeps it (see Collisions).
/// - **Other kinds** go under their directory: `/logo.png` →
///   `images/logo.png`, `/a/b` (Css) → `css/a/b.css`.
/// - Every segment is percent-decoded, then unsafe characters are replaced by
///   `_`, `.`/`..` become `_` and long names are truncated.
///
/// # Collisions
///
/// A mapping is lossless when no substitution, truncation or query was
/// involved and the file name cannot be produced by another URL. Names that
/// could are lossy too:
///
/// - a page whose name already ends in `.html`/`.htm` (`/about.html` would
///   otherwise share `about.html` with `/about`), and `/index` (which would
///   share `index.html` with the root);
/// - an asset whose extension had to be added (`/app` as Js would otherwise
///   share `js/app.js` with `/app.js`), or that ends in `.html`/`.htm`.
///
/// Lossless mappings are injective. Every lossy mapping gets `-<8 hex>` of
/// the SHA-256 of the canonical URL appended before the extension, so the
/// result never depends on crawl order.
///
/// # Examples
///
/// ```
/// use sitegrab::crawler::ResourceKind;
/// use sitegrab::mirror::map_path;
/// use sitegrab::url::CanonicalUrl;
///
/// let url = CanonicalUrl::parse("http://example.com/about").unwrap();
/// assert_eq!(map_path(&url, ResourceKind::Html).as_str(), "about.html");
///
/// let url = CanonicalUrl::parse("http://example.com/logo.png").unwrap();
/// assert_eq!(map_path(&url, ResourceKind::Image).as_str(), "images/logo.png");
/// ```
pub fn map_path(url: &CanonicalUrl, kind: ResourceKind) -> MappedPath {
    // css/styles.css is reserved for the consolidated stylesheet
    let reserved = kind == ResourceKind::Css && matches!(url.path(), "/styles.css" | "/styles");
    let mut lossy = reserved || url.query().is_some();

    let mut segments: Vec<String> = url
        .path()
        .split('/')
        .filter(|s| !s.is_empty())
        .map(|raw| {
            let (segment, changed) = sanitize_segment(raw);
            lossy |= changed;
            segment
        })
        .collect();

    let at_top = segments.len() <= 1;
    let mut file = segments.pop().unwrap_or_else(|| "index".to_string());

    let (stem, ext, added) = split_extension(&file, kind);
    let html_name = !added && ext.as_deref().is_some_and(is_html_extension);
    lossy |= match kind {
        ResourceKind::Html => html_name || (at_top && url.path() != "/" && file == "index"),
        _ => added || html_name,
    };

    if lossy {
        let hash = url_hash(url);
        file = match ext {
            Some(ext) => format!("{}-{}.{}", stem, hash, ext),
            None => format!("{}-{}", stem, hash),
        };
    } else if let Some(ext) = ext {
        file = format!("{}.{}", stem, ext);
    }

    segments.push(file);

    let dir = kind.output_dir();
    let joined = segments.join("/");
    if dir.is_empty() {
        MappedPath(joined)
    } else {
        MappedPath(format!("{}/{}", dir, joined))
    }
}

/// Splits the last segment into stem and the extension the file will carry
///
/// An existing extension is kept when it fits the kind; otherwise the kind's
/// canonical extension is added after the whole name, which the returned
/// flag reports.
fn split_extension(file: &str, kind: ResourceKind) -> (&str, Option<String>, bool) {
    let existing = path_extension(file);

    let keeps_existing = match (existing, kind) {
        (Some(ext), ResourceKind::Html) => is_html_extension(ext),
        (Some(_), _) => true,
        (None, _) => false,
    };

    match existing {
        Some(ext) if keeps_existing => (&file[..file.len() - ext.len() - 1], Some(ext.to_string()), false),
        _ => {
            let added = kind.canonical_extension().map(str::to_string);
            let appended = added.is_some();
            (file, added, appended)
        }
    }
}

fn is_html_extension(ext: &str) -> bool {
    ext.eq_ignore_ascii_case("html") || ext.eq_ignore_ascii_case("htm")
}

/// Decodes and sanitizes one path segment; the flag reports lossy changes
fn sanitize_segment(raw: &str) -> (String, bool) {
    let decoded = match urlencoding::decode(raw) {
        Ok(d) => d.into_owned(),
        Err(_) => {
            String::from_utf8_lossy(&urlencoding::decode_binary(raw.as_bytes())).into_owned()
        }
    };

    let mut changed = false;
    let mut out: String = decoded
        .chars()
        .map(|c| {
            if c.is_control() || UNSAFE_CHARS.contains(&c) {
                changed = true;
                '_'
            } else {
                c
            }
        })
        .collect();

    if out == "." || out == ".." {
        changed = true;
        out = "_".to_string();
    }

    if out.len() > MAX_SEGMENT_BYTES {
        changed = true;
        let mut cut = MAX_SEGMENT_BYTES;
        while !out.is_char_boundary(cut) {
            cut -= 1;
        }
        out.truncate(cut);
    }

    (out, changed)
}

fn url_hash(url: &CanonicalUrl) -> String {
    let digest = Sha256::digest(url.as_str().as_bytes());
    hex::encode(digest)[..HASH_CHARS].to_string()
}
