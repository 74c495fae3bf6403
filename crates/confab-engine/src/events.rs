//! Engine event types.
//!
//! Broadcast over a `tokio::sync::broadcast` channel so UI code can follow
//! a turn's lifecycle without borrowing the engine.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    /// A turn began for this raw user query.
    TurnStart { query: String },
    /// An attempt is fetching the answer page. Attempt 0 is the first try.
    Fetching { attempt: u32 },
    /// The fetched page was a bot-challenge interstitial.
    ChallengeDetected { attempt: u32 },
    /// The attempt failed and a retry is scheduled.
    Retrying { attempt: u32, reason: RetryReason },
    /// An accepted answer is being summarized into memory.
    Summarizing,
    /// The turn finished, with or without an accepted answer.
    TurnEnd { accepted: bool },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryReason {
    Challenge,
    EmptyAnswer,
    SessionLost,
}
