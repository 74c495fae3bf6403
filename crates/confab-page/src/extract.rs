//! Structure extraction: one HTML snapshot in, typed blocks out.
//!
//! `AnswerExtractor` walks the answer container in document order and
//! classifies what it finds into text, code, list, and table blocks. The
//! selector set is configurable because the surface's generated class names
//! rotate; the defaults match the markup captured at the time of writing.

use scraper::{ElementRef, Html, Selector};

use crate::block::ContentBlock;
use crate::error::{Error, Result};

/// Extracts content blocks from a rendered answer page.
///
/// Implementations must be pure over the HTML string: no network, no
/// stored state. `None` means nothing recognizable was found, which is
/// not the same as a recognizable-but-useless answer.
pub trait ContentExtractor: Send + Sync {
    fn extract(&self, html: &str) -> Option<Vec<ContentBlock>>;
}

/// Selector set for `AnswerExtractor`.
#[derive(Debug, Clone)]
pub struct ExtractorConfig {
    /// CSS selector for the answer container element.
    pub container: String,
    /// Class marking a prose region inside the container.
    pub text_class: String,
    /// Class marking a code block wrapper.
    pub code_class: String,
    /// Class marking the language label inside a code wrapper.
    pub language_class: String,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            container: "div.mZJni.Dn7Fzd".to_string(),
            text_class: "Y3BBE".to_string(),
            code_class: "r1PmQe".to_string(),
            language_class: "vVRw1d".to_string(),
        }
    }
}

/// Document-order extractor over the answer container.
pub struct AnswerExtractor {
    container: Selector,
    language: Selector,
    code_body: Selector,
    pre: Selector,
    item: Selector,
    row: Selector,
    cell: Selector,
    text_class: String,
    code_class: String,
}

impl AnswerExtractor {
    pub fn new(config: ExtractorConfig) -> Result<Self> {
        Ok(Self {
            container: parse_selector(&config.container)?,
            language: parse_selector(&format!(".{}", config.language_class))?,
            code_body: parse_selector("pre code")?,
            pre: parse_selector("pre")?,
            item: parse_selector("li")?,
            row: parse_selector("tr")?,
            cell: parse_selector("th, td")?,
            text_class: config.text_class,
            code_class: config.code_class,
        })
    }

    /// Walk `el`'s children in order. Inside a prose region (`in_prose`),
    /// loose text accumulates into `buf` until a structured child flushes it.
    fn walk(
        &self,
        el: ElementRef<'_>,
        blocks: &mut Vec<ContentBlock>,
        buf: &mut String,
        in_prose: bool,
    ) {
        for child in el.children() {
            if let Some(text) = child.value().as_text() {
                if in_prose {
                    buf.push_str(&text.text);
                }
                continue;
            }
            let Some(child_el) = ElementRef::wrap(child) else {
                continue;
            };
            let tag = child_el.value().name();
            if has_class(child_el, &self.code_class) {
                flush_text(buf, blocks);
                if let Some(block) = self.code_block(child_el) {
                    blocks.push(block);
                }
            } else if tag == "ul" || tag == "ol" {
                flush_text(buf, blocks);
                if let Some(block) = self.list_block(child_el) {
                    blocks.push(block);
                }
            } else if tag == "table" {
                flush_text(buf, blocks);
                if let Some(block) = self.table_block(child_el) {
                    blocks.push(block);
                }
            } else if !in_prose && has_class(child_el, &self.text_class) {
                self.walk(child_el, blocks, buf, true);
                flush_text(buf, blocks);
            } else {
                self.walk(child_el, blocks, buf, in_prose);
                if in_prose {
                    // word boundary between inline elements
                    buf.push(' ');
                }
            }
        }
    }

    fn code_block(&self, el: ElementRef<'_>) -> Option<ContentBlock> {
        let body_el = el
            .select(&self.code_body)
            .next()
            .or_else(|| el.select(&self.pre).next())?;
        let body = body_el.text().collect::<String>();
        let body = body.trim_matches('\n');
        if body.trim().is_empty() {
            return None;
        }
        let language = el
            .select(&self.language)
            .next()
            .map(|l| normalize_ws(&l.text().collect::<String>()).to_lowercase())
            .filter(|l| !l.is_empty());
        Some(ContentBlock::code(language, body))
    }

    fn list_block(&self, el: ElementRef<'_>) -> Option<ContentBlock> {
        let items: Vec<String> = el
            .select(&self.item)
            .map(|li| normalize_ws(&li.text().collect::<String>()))
            .filter(|item| !item.is_empty())
            .collect();
        if items.is_empty() {
            None
        } else {
            Some(ContentBlock::list(items))
        }
    }

    fn table_block(&self, el: ElementRef<'_>) -> Option<ContentBlock> {
        let rows: Vec<Vec<String>> = el
            .select(&self.row)
            .map(|tr| {
                tr.select(&self.cell)
                    .map(|cell| normalize_ws(&cell.text().collect::<String>()))
                    .collect::<Vec<String>>()
            })
            .filter(|cells| cells.iter().any(|c| !c.is_empty()))
            .collect();
        if rows.is_empty() {
            None
        } else {
            Some(ContentBlock::table(rows))
        }
    }
}

impl ContentExtractor for AnswerExtractor {
    fn extract(&self, html: &str) -> Option<Vec<ContentBlock>> {
        let doc = Html::parse_document(html);
        let container = doc.select(&self.container).next()?;
        let mut blocks = Vec::new();
        let mut buf = String::new();
        self.walk(container, &mut blocks, &mut buf, false);
        flush_text(&mut buf, &mut blocks);
        if blocks.is_empty() { None } else { Some(blocks) }
    }
}

fn parse_selector(s: &str) -> Result<Selector> {
    Selector::parse(s).map_err(|e| Error::Selector(format!("{s}: {e}")))
}

fn has_class(el: ElementRef<'_>, class: &str) -> bool {
    el.value().classes().any(|c| c == class)
}

/// Collapse whitespace runs to single spaces and trim the ends.
fn normalize_ws(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn flush_text(buf: &mut String, blocks: &mut Vec<ContentBlock>) {
    let text = normalize_ws(buf);
    buf.clear();
    if !text.is_empty() {
        blocks.push(ContentBlock::text(text));
    }
}
