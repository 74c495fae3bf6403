//! Bounded cross-turn memory: last query, rolling summary, short history.
//!
//! Owned exclusively by one `ConversationEngine`; never shared across
//! threads, so no interior mutability.

use std::collections::VecDeque;

/// Turns kept in the history ring.
const HISTORY_CAPACITY: usize = 3;
/// Stored rolling summary is cut to this many whitespace-delimited words.
const SUMMARY_WORD_LIMIT: usize = 100;

/// One completed turn. Immutable once stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationTurn {
    pub query: String,
    pub summary: String,
}

#[derive(Debug)]
pub struct MemoryStore {
    last_query: String,
    rolling_summary: String,
    history: VecDeque<ConversationTurn>,
    first_turn: bool,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            last_query: String::new(),
            rolling_summary: String::new(),
            history: VecDeque::with_capacity(HISTORY_CAPACITY),
            first_turn: true,
        }
    }

    /// Append a completed turn, evicting the oldest beyond capacity, and
    /// remember the query as the most recent one. Flips the first-turn
    /// flag: once anything is recorded, the conversation has begun.
    pub fn record_turn(&mut self, query: impl Into<String>, summary: impl Into<String>) {
        let query = query.into();
        self.history.push_back(ConversationTurn {
            query: query.clone(),
            summary: summary.into(),
        });
        while self.history.len() > HISTORY_CAPACITY {
            self.history.pop_front();
        }
        self.last_query = query;
        self.first_turn = false;
    }

    /// Overwrite the rolling summary with the first paragraph of `text`,
    /// cut to the first 100 words. An empty result leaves the prior
    /// summary untouched.
    pub fn update_rolling_summary(&mut self, text: &str) {
        let summary = truncate_words(first_paragraph(text), SUMMARY_WORD_LIMIT);
        if !summary.is_empty() {
            self.rolling_summary = summary;
        }
    }

    /// Drop all conversational state. The first-turn flag is left alone:
    /// clearing happens mid-conversation when a query changes subject.
    pub fn clear(&mut self) {
        self.last_query.clear();
        self.rolling_summary.clear();
        self.history.clear();
    }

    /// Full reset back to a brand-new conversation, flag included.
    pub fn reset(&mut self) {
        self.clear();
        self.first_turn = true;
    }

    pub fn is_empty(&self) -> bool {
        self.last_query.is_empty() && self.history.is_empty()
    }

    pub fn is_first_turn(&self) -> bool {
        self.first_turn
    }

    pub fn last_query(&self) -> &str {
        &self.last_query
    }

    pub fn rolling_summary(&self) -> &str {
        &self.rolling_summary
    }

    pub fn history(&self) -> impl Iterator<Item = &ConversationTurn> {
        self.history.iter()
    }

    /// Render the history as alternating lines, oldest first, for
    /// injection into prompts.
    pub fn context_snapshot(&self) -> String {
        let mut out = String::new();
        for turn in &self.history {
            out.push_str("User asked: ");
            out.push_str(&turn.query);
            out.push('\n');
            out.push_str("You answered: ");
            out.push_str(&turn.summary);
            out.push('\n');
        }
        out
    }
}

fn first_paragraph(text: &str) -> &str {
    text.trim_start().split("\n\n").next().unwrap_or("")
}

fn truncate_words(text: &str, limit: usize) -> String {
    text.split_whitespace()
        .take(limit)
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_history_evicts_oldest_beyond_capacity() {
        let mut memory = MemoryStore::new();
        for query in ["A", "B", "C", "D"] {
            memory.record_turn(query, format!("summary of {query}"));
        }
        let queries: Vec<&str> = memory.history().map(|t| t.query.as_str()).collect();
        assert_eq!(queries, vec!["B", "C", "D"]);
        assert_eq!(memory.last_query(), "D");
    }

    #[test]
    fn test_record_turn_flips_first_turn_flag() {
        let mut memory = MemoryStore::new();
        assert!(memory.is_first_turn());
        memory.record_turn("q", "s");
        assert!(!memory.is_first_turn());
    }

    #[test]
    fn test_rolling_summary_truncates_to_first_100_words() {
        let mut memory = MemoryStore::new();
        let words: Vec<String> = (0..150).map(|i| format!("w{i}")).collect();
        memory.update_rolling_summary(&words.join(" "));
        let stored: Vec<&str> = memory.rolling_summary().split(' ').collect();
        assert_eq!(stored.len(), 100);
        assert_eq!(stored[0], "w0");
        assert_eq!(stored[99], "w99");
    }

    #[test]
    fn test_rolling_summary_takes_first_paragraph_only() {
        let mut memory = MemoryStore::new();
        memory.update_rolling_summary("first paragraph here\n\nsecond paragraph ignored");
        assert_eq!(memory.rolling_summary(), "first paragraph here");
    }

    #[test]
    fn test_empty_summary_leaves_prior_untouched() {
        let mut memory = MemoryStore::new();
        memory.update_rolling_summary("something useful");
        memory.update_rolling_summary("   \n\n whatever");
        assert_eq!(memory.rolling_summary(), "something useful");
    }

    #[test]
    fn test_clear_keeps_first_turn_flag() {
        let mut memory = MemoryStore::new();
        memory.record_turn("q", "s");
        memory.clear();
        assert!(memory.is_empty());
        assert!(!memory.is_first_turn());
    }

    #[test]
    fn test_reset_restores_first_turn_flag() {
        let mut memory = MemoryStore::new();
        memory.record_turn("q", "s");
        memory.reset();
        assert!(memory.is_empty());
        assert!(memory.is_first_turn());
    }

    #[test]
    fn test_context_snapshot_format() {
        let mut memory = MemoryStore::new();
        memory.record_turn("what is a b-tree", "a balanced tree");
        memory.record_turn("how fast is insertion", "logarithmic");
        assert_eq!(
            memory.context_snapshot(),
            "User asked: what is a b-tree\nYou answered: a balanced tree\n\
             User asked: how fast is insertion\nYou answered: logarithmic\n"
        );
    }
}
