//! Error types for confab-engine.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors that escape a turn. Retryable trouble (challenge pages, useless
/// answers, dead sessions) never surfaces here; it is absorbed into
/// `TurnOutcome::Failed` after retries run out.
#[derive(Error, Debug)]
pub enum Error {
    /// The user interrupted the turn. Memory is left in its pre-turn state.
    #[error("interrupted")]
    Interrupted,
}
