//! Terminal rendering of content blocks.
//!
//! The rendered string is part of the engine's contract: the CLI prints it
//! verbatim, and short-mode memory captures a prefix of it.

use confab_page::ContentBlock;

/// Render blocks in document order into one displayable string. Every
/// block is followed by a blank line.
pub fn render_blocks(blocks: &[ContentBlock]) -> String {
    let mut out = String::new();
    for block in blocks {
        match block {
            ContentBlock::Text { text } => {
                out.push_str(text);
                out.push_str("\n\n");
            }
            ContentBlock::Code { language, body } => {
                out.push_str("```");
                if let Some(lang) = language {
                    out.push_str(lang);
                }
                out.push('\n');
                out.push_str(body.trim_end());
                out.push_str("\n```\n\n");
            }
            ContentBlock::List { items } => {
                for item in items {
                    out.push_str("- ");
                    out.push_str(item);
                    out.push('\n');
                }
                out.push('\n');
            }
            ContentBlock::Table { rows } => {
                for row in rows {
                    out.push_str(&row.join(" | "));
                    out.push('\n');
                }
                out.push('\n');
            }
        }
    }
    out
}
