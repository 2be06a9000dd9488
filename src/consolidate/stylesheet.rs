//! The crawl-wide consolidated stylesheet

use crate::crawler::collect_class_tokens;
use crate::mirror::{MappedPath, MirrorWriter, WriteOutcome, STYLESHEET_PATH};
use crate::{RewriteError, WriteError};
use lol_html::html_content::ContentType;
use lol_html::{element, text, HtmlRewriter, Settings};
use std::cell::{Cell, RefCell};
use std::collections::HashSet;

const HEADER: &str = "/* Consolidated styles */";

/// Per-page consolidation state shared by the rewriter's handlers
struct PageStyles<'a> {
    prefix: &'a str,
    page: usize,
    next: usize,
    used: &'a mut HashSet<String>,
    blocks: Vec<String>,
    rules: Vec<String>,
    media: Option<String>,
    buffer: String,
}

impl PageStyles<'_> {
    /// Next selector name not already used as a class anywhere so far
    fn next_class(&mut self) -> String {
        loop {
            let candidate = format!("{}-{}-{}", self.prefix, self.page, self.next);
            self.next += 1;
            if self.used.insert(candidate.clone()) {
                return candidate;
            }
        }
    }

    fn push_block(&mut self, css: String) {
        let block = match self.media.take() {
            Some(media) => format!("@media {} {{\n{}\n}}", media, css),
            None => css,
        };
        self.blocks.push(block);
    }
}

/// Accumulates `<style>` blocks and inline styles of every page
///
/// Pages are consolidated one at a time in crawl order; the result is written
/// once with [`StyleConsolidator::flush`].
#[derive(Debug)]
pub struct StyleConsolidator {
    prefix: String,
    pages: usize,
    used_classes: HashSet<String>,
    blocks: Vec<String>,
    rules: Vec<String>,
}

impl StyleConsolidator {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            pages: 0,
            used_classes: HashSet::new(),
            blocks: Vec::new(),
            rules: Vec::new(),
        }
    }

    /// Pages consolidated so far
    pub fn pages(&self) -> usize {
        self.pages
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    /// Moves a page's styles into the stylesheet
    ///
    /// `<style>` blocks are removed and kept as units, every non-empty
    /// `style` attribute becomes a generated class, and a link to the
    /// stylesheet is added as the last child of `<head>`.
    ///
    /// # Arguments
    ///
    /// * `html` - Page markup whose embedded CSS is already relative to the stylesheet
    /// * `page_path` - Output file of the page
    ///
    /// # Returns
    ///
    /// * `Ok(String)` - The page without embedded CSS
    /// * `Err(RewriteError)` - The page is left out and nothing was accumulated
    pub fn consolidate(&mut self, html: &str, page_path: &MappedPath) -> Result<String, RewriteError> {
        let mut used = self.used_classes.clone();
        used.extend(collect_class_tokens(html));

        let href = MappedPath::new(STYLESHEET_PATH).relative_to(page_path);
        let link = format!(r#"<link rel="stylesheet" href="{}">"#, href);

        let state = RefCell::new(PageStyles {
            prefix: &self.prefix,
            page: self.pages,
            next: 0,
            used: &mut used,
            blocks: Vec::new(),
            rules: Vec::new(),
            media: None,
            buffer: String::new(),
        });
        let saw_head = Cell::new(false);
        let mut output = Vec::with_capacity(html.len());

        let mut rewriter = HtmlRewriter::new(
            Settings {
                element_content_handlers: vec![
                    element!("head", |el| {
                        saw_head.set(true);
                        el.append(&link, ContentType::Html);
                        Ok(())
                    }),
                    element!("style", |el| {
                        let media = el
                            .get_attribute("media")
                            .map(|m| m.trim().to_string())
                            .filter(|m| !m.is_empty() && !m.eq_ignore_ascii_case("all"));
                        state.borrow_mut().media = media;
                        el.remove_and_keep_content();
                        Ok(())
                    }),
                    text!("style", |t| {
                        let mut state = state.borrow_mut();
                        state.buffer.push_str(t.as_str());
                        t.remove();
                        if t.last_in_text_node() {
                            let css = std::mem::take(&mut state.buffer);
                            state.push_block(css);
                        }
                        Ok(())
                    }),
                    element!("[style]", |el| {
                        let Some(style) = el.get_attribute("style") else {
                            return Ok(());
                        };
                        el.remove_attribute("style");

                        let style = html_escape::decode_html_entities(&style);
                        let declarations = style.trim();
                        if declarations.trim_matches(|c: char| c == ';' || c.is_whitespace()).is_empty() {
                            return Ok(());
                        }

                        let mut state = state.borrow_mut();
                        let class = state.next_class();
                        state.rules.push(format!(".{}{{{}}}", class, declarations));

                        let classes = match el.get_attribute("class") {
                            Some(existing) if !existing.trim().is_empty() => {
                                format!("{} {}", existing.trim(), class)
                            }
                            _ => class,
                        };
                        el.set_attribute("class", &classes)?;
                        Ok(())
                    }),
                ],
                ..Settings::default()
            },
            |c: &[u8]| output.extend_from_slice(c),
        );

        rewriter
            .write(html.as_bytes())
            .and_then(|_| rewriter.end())
            .map_err(|e| RewriteError::Html(e.to_string()))?;

        let PageStyles { blocks, rules, .. } = state.into_inner();
        let mut page = String::from_utf8(output)
            .unwrap_or_else(|e| String::from_utf8_lossy(e.as_bytes()).into_owned());
        if !saw_head.get() {
            page.insert_str(0, &link);
        }

        self.used_classes = used;
        self.blocks.extend(blocks);
        self.rules.extend(rules);
        self.pages += 1;

        Ok(page)
    }

    /// The stylesheet text: header, then blocks, then generated rules
    pub fn render(&self) -> String {
        let mut css = String::from(HEADER);
        css.push('\n');
        for unit in self.blocks.iter().chain(self.rules.iter()) {
            css.push_str(unit);
            css.push('\n');
        }
        css
    }

    /// Writes the stylesheet to its reserved path
    pub fn flush(&self, writer: &dyn MirrorWriter) -> Result<WriteOutcome, WriteError> {
        tracing::info!(
            "Writing {} ({} blocks, {} rules)",
            STYLESHEET_PATH,
            self.blocks.len(),
            self.rules.len()
        );
        writer.write(&MappedPath::new(STYLESHEET_PATH), self.render().as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mirror::FsMirrorWriter;
    use tempfile::TempDir;

    #[test]
    fn test_inline_style_becomes_class() {
        let mut sheet = StyleConsolidator::new("wg-gen");
        let html = r#"<html><head><title>t</title></head><body><div style="color:red">x</div></body></html>"#;

        let out = sheet.consolidate(html, &MappedPath::new("index.html")).unwrap();

        assert!(out.contains(r#"<div class="wg-gen-0-0">x</div>"#), "{}", out);
        assert!(out.contains(r#"<link rel="stylesheet" href="css/styles.css"></head>"#));
        assert!(sheet.render().contains(".wg-gen-0-0{color:red}"));
    }

    #[test]
    fn test_inline_style_entities_decoded_in_rule() {
        let mut sheet = StyleConsolidator::new("wg-gen");
        let html = r#"<p style="font-family:&quot;Inter&quot;;content:&#39;a&amp;b&#39;">x</p>"#;

        sheet.consolidate(html, &MappedPath::new("index.html")).unwrap();

        assert!(sheet.render().contains(r#".wg-gen-0-0{font-family:"Inter";content:'a&b'}"#));
    }

    #[test]
    fn test_style_blocks_moved_in_order() {
        let mut sheet = StyleConsolidator::new("wg-gen");
        let html = r#"<head><style>a{color:blue}</style><style media="print">body{margin:0}</style></head>"#;

        let out = sheet.consolidate(html, &MappedPath::new("index.html")).unwrap();

        assert!(!out.contains("<style"));
        assert!(!out.contains("color:blue"));
        assert_eq!(sheet.block_count(), 2);

        let css = sheet.render();
        assert!(css.starts_with("/* Consolidated styles */\n"));
        let blue = css.find("a{color:blue}").unwrap();
        let print = css.find("@media print {").unwrap();
        assert!(blue < print);
    }

    #[test]
    fn test_existing_class_kept_and_empty_style_dropped() {
        let mut sheet = StyleConsolidator::new("wg-gen");
        let html = r#"<p class="lead" style="margin: 0;">a</p><p style=" ; ">b</p>"#;

        let out = sheet.consolidate(html, &MappedPath::new("a.html")).unwrap();

        assert!(out.contains(r#"class="lead wg-gen-0-0""#));
        assert!(out.contains("<p>b</p>"));
        assert_eq!(sheet.rule_count(), 1);
    }

    #[test]
    fn test_generated_names_skip_existing_classes() {
        let mut sheet = StyleConsolidator::new("wg-gen");
        let html = r#"<i class="wg-gen-0-0"></i><b style="color:red"></b>"#;

        sheet.consolidate(html, &MappedPath::new("a.html")).unwrap();

        assert!(sheet.render().contains(".wg-gen-0-1{color:red}"));
    }

    #[test]
    fn test_pages_numbered_and_rules_unique() {
        let mut sheet = StyleConsolidator::new("x");
        let page = r#"<b style="color:red"></b><b style="color:blue"></b>"#;

        sheet.consolidate(page, &MappedPath::new("a.html")).unwrap();
        sheet.consolidate(page, &MappedPath::new("b.html")).unwrap();

        let css = sheet.render();
        for name in [".x-0-0{", ".x-0-1{", ".x-1-0{", ".x-1-1{"] {
            assert_eq!(css.matches(name).count(), 1, "{}", name);
        }
        assert_eq!(sheet.pages(), 2);
    }

    #[test]
    fn test_generated_rules_after_blocks() {
        let mut sheet = StyleConsolidator::new("wg-gen");
        sheet
            .consolidate(r#"<b style="color:red"></b>"#, &MappedPath::new("a.html"))
            .unwrap();
        sheet
            .consolidate("<style>b{color:blue}</style>", &MappedPath::new("b.html"))
            .unwrap();

        let css = sheet.render();
        assert!(css.find("b{color:blue}").unwrap() < css.find(".wg-gen-0-0").unwrap());
    }

    #[test]
    fn test_link_prepended_without_head_and_relative_to_page() {
        let mut sheet = StyleConsolidator::new("wg-gen");
        let out = sheet
            .consolidate("<p>hi</p>", &MappedPath::new("docs/intro.html"))
            .unwrap();
        assert!(out.starts_with(r#"<link rel="stylesheet" href="../css/styles.css"><p>"#));
    }

    #[test]
    fn test_flush_writes_reserved_path() {
        let dir = TempDir::new().unwrap();
        let writer = FsMirrorWriter::new(dir.path()).unwrap();
        let mut sheet = StyleConsolidator::new("wg-gen");
        sheet
            .consolidate(r#"<b style="color:red"></b>"#, &MappedPath::new("a.html"))
            .unwrap();

        assert_eq!(sheet.flush(&writer).unwrap(), WriteOutcome::Written);
        assert_eq!(sheet.flush(&writer).unwrap(), WriteOutcome::Unchanged);

        let css = std::fs::read_to_string(dir.path().join("css/styles.css")).unwrap();
        assert_eq!(css, "/* Consolidated styles */\n.wg-gen-0-0{color:red}\n");
    }
}
