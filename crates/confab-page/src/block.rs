//! Typed content blocks parsed out of an answer page.

use serde::{Deserialize, Serialize};

/// One unit of a parsed answer. A full answer is a `Vec<ContentBlock>` in
/// document order, and that order is preserved all the way to the terminal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    /// A paragraph of prose.
    Text { text: String },
    /// A code block with an optional language label.
    Code {
        language: Option<String>,
        body: String,
    },
    /// A bulleted or numbered list, one string per item.
    List { items: Vec<String> },
    /// A table as rows of cells.
    Table { rows: Vec<Vec<String>> },
}

impl ContentBlock {
    /// Create a text block.
    pub fn text(text: impl Into<String>) -> Self {
        ContentBlock::Text { text: text.into() }
    }

    /// Create a code block.
    pub fn code(language: Option<String>, body: impl Into<String>) -> Self {
        ContentBlock::Code {
            language,
            body: body.into(),
        }
    }

    /// Create a list block.
    pub fn list(items: Vec<String>) -> Self {
        ContentBlock::List { items }
    }

    /// Create a table block.
    pub fn table(rows: Vec<Vec<String>>) -> Self {
        ContentBlock::Table { rows }
    }

    /// Prose content of the block, if any. Side queries that expect a plain
    /// textual reply read only this.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            ContentBlock::Text { text } => Some(text),
            _ => None,
        }
    }
}
