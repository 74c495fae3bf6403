//! Follow-up detection via a side query to the answer surface.
//!
//! The surface itself is asked to judge whether the new query continues
//! the conversation, replying in a fixed two-line format. Parsing is
//! deliberately forgiving and every failure mode collapses to "not
//! related", which only costs a fresh-context turn.

use std::sync::LazyLock;

use regex::Regex;

use crate::memory::MemoryStore;
use crate::surface::AnswerSurface;
use confab_page::ContentBlock;

static FOLLOW_UP_YES: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)follow[_\s-]?up\s*:\s*yes").expect("Invalid regex pattern")
});

static PROBABILITY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)probability\s*:\s*(\d+)").expect("Invalid regex pattern"));

/// Defaults when the probability line is missing from an otherwise
/// parseable reply.
const DEFAULT_PROBABILITY_YES: f64 = 0.8;
const DEFAULT_PROBABILITY_NO: f64 = 0.2;

/// Both signals from one relevance consult. Ephemeral, never stored.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RelevanceDecision {
    pub is_follow_up: bool,
    pub probability: f64,
}

impl RelevanceDecision {
    pub const UNRELATED: RelevanceDecision = RelevanceDecision {
        is_follow_up: false,
        probability: 0.0,
    };

    /// Composite accept test applied by the engine: both signals must agree.
    pub fn accepted(&self, threshold: f64) -> bool {
        self.is_follow_up && self.probability > threshold
    }
}

/// Judge whether `new_query` continues the conversation held in `memory`.
/// With empty memory this is a foregone conclusion and costs no network
/// call. Never fails: fetch or parse trouble falls back to unrelated.
pub async fn is_follow_up(
    surface: &AnswerSurface,
    new_query: &str,
    memory: &MemoryStore,
) -> RelevanceDecision {
    if memory.is_empty() {
        return RelevanceDecision::UNRELATED;
    }
    let prompt = judge_prompt(new_query, &memory.context_snapshot());
    match surface.ask(&prompt).await {
        Ok(Some(blocks)) => parse_decision(&blocks),
        Ok(None) => {
            tracing::debug!("relevance check returned no content, assuming unrelated");
            RelevanceDecision::UNRELATED
        }
        Err(e) => {
            tracing::debug!("relevance check failed ({e}), assuming unrelated");
            RelevanceDecision::UNRELATED
        }
    }
}

fn judge_prompt(new_query: &str, snapshot: &str) -> String {
    format!(
        "Here is a conversation so far:\n{snapshot}\nNew question: \"{new_query}\"\n\
         Does the new question continue the conversation above? \
         Reply in exactly this format and nothing else:\n\
         FOLLOW_UP: YES or NO\n\
         PROBABILITY: <number from 0 to 100>"
    )
}

/// Parse the two-line verdict out of the concatenated text blocks. The
/// surface often wraps the reply in extra prose, so this scans rather
/// than matching the whole string.
fn parse_decision(blocks: &[ContentBlock]) -> RelevanceDecision {
    let text = blocks
        .iter()
        .filter_map(ContentBlock::as_text)
        .collect::<Vec<_>>()
        .join(" ");
    let is_follow_up = FOLLOW_UP_YES.is_match(&text);
    let probability = PROBABILITY
        .captures(&text)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<f64>().ok())
        .map(|p| (p / 100.0).clamp(0.0, 1.0))
        .unwrap_or(if is_follow_up {
            DEFAULT_PROBABILITY_YES
        } else {
            DEFAULT_PROBABILITY_NO
        });
    RelevanceDecision {
        is_follow_up,
        probability,
    }
}
