//! Deciding whether an extraction result is worth showing.

use confab_page::ContentBlock;

/// Fragments of the surface's stock deflection answer. A lone text block
/// containing both (case-insensitive) carries no information.
const PLACEHOLDER_FRAGMENTS: [&str; 2] = ["web results", "exploring this topic"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// Extraction produced nothing.
    Empty,
    /// A recognizable placeholder that declined to answer.
    Useless,
    /// Worth rendering.
    Usable,
}

/// Classify an extraction result. Pure, no side effects.
pub fn classify(blocks: Option<&[ContentBlock]>) -> Classification {
    let Some(blocks) = blocks else {
        return Classification::Empty;
    };
    if blocks.is_empty() {
        return Classification::Empty;
    }
    if let [ContentBlock::Text { text }] = blocks {
        let lower = text.to_lowercase();
        if PLACEHOLDER_FRAGMENTS.iter().all(|f| lower.contains(f)) {
            return Classification::Useless;
        }
    }
    Classification::Usable
}
