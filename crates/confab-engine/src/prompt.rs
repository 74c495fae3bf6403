//! Outbound query composition.
//!
//! Formatting instructions are keyword-gated: a query that looks like it
//! wants code or step lists goes out untouched, so structured answers are
//! not coerced into prose.

/// Keywords suggesting the answer should contain code.
const CODE_KEYWORDS: &[&str] = &[
    "code", "function", "script", "program", "snippet", "syntax", "regex", "command", "implement",
    "example",
];

/// Keywords suggesting the answer should be a list of steps.
const LIST_KEYWORDS: &[&str] = &[
    "how to",
    "steps",
    "list",
    "ways to",
    "tips",
    "guide",
    "checklist",
    "instructions",
];

pub(crate) const SHORT_INSTRUCTION: &str = "Answer in one short paragraph of 3-5 sentences.";
pub(crate) const CONTEXTUAL_INSTRUCTION: &str =
    "Answer in 1-3 concise paragraphs of flowing prose, no lists.";
pub(crate) const FRESH_INSTRUCTION: &str =
    "Give a comprehensive answer in flowing prose paragraphs.";

/// Compose the outbound query. Short mode always wins; keyword-matched
/// queries pass through unmodified; otherwise a prose instruction is
/// appended, shorter when prior context rides along.
pub fn build(raw_query: &str, has_context: bool, short_mode: bool) -> String {
    if short_mode {
        return format!("{raw_query}. {SHORT_INSTRUCTION}");
    }
    if wants_structured_answer(raw_query) {
        return raw_query.to_string();
    }
    if has_context {
        format!("{raw_query}. {CONTEXTUAL_INSTRUCTION}")
    } else {
        format!("{raw_query}. {FRESH_INSTRUCTION}")
    }
}

fn wants_structured_answer(query: &str) -> bool {
    let lower = query.to_lowercase();
    CODE_KEYWORDS
        .iter()
        .chain(LIST_KEYWORDS)
        .any(|keyword| lower.contains(keyword))
}
