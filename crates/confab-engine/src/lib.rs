//! The conversation-context engine.
//!
//! Drives one query turn end-to-end: decide whether prior context applies,
//! build the outbound prompt, fetch the rendered answer page, classify the
//! extraction, retry with a mutated query when the answer is a deflection,
//! render accepted blocks for the terminal, and fold the turn into bounded
//! memory. The page-level collaborators live in `confab-page`; the engine
//! only sees their trait contracts.

pub mod classify;
pub mod engine;
pub mod error;
pub mod events;
pub mod handle;
pub mod memory;
pub mod prompt;
pub mod relevance;
pub mod render;
pub mod surface;

pub use classify::{Classification, classify};
pub use engine::{ConversationEngine, EngineConfig, FailureReason, TurnOutcome};
pub use error::{Error, Result};
pub use events::{EngineEvent, RetryReason};
pub use handle::EngineHandle;
pub use memory::{ConversationTurn, MemoryStore};
pub use relevance::RelevanceDecision;
pub use render::render_blocks;
pub use surface::{AnswerSurface, is_challenge_page};
