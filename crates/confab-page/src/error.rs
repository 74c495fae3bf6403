//! Error types for confab-page.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("browser error: {0}")]
    Browser(String),

    #[error("browser session lost: {0}")]
    SessionLost(String),

    #[error("failed to launch browser: {0}")]
    Launch(String),

    #[error("page never settled within {0:?}")]
    ReadinessTimeout(std::time::Duration),

    #[error("invalid selector: {0}")]
    Selector(String),
}

impl Error {
    /// Whether the underlying fetch session is gone and worth re-creating.
    /// Covers a crashed or closed browser as well as an unreachable network.
    pub fn is_session_lost(&self) -> bool {
        match self {
            Error::SessionLost(_) => true,
            Error::Browser(msg) => is_session_lost_message(msg),
            Error::Http(e) => e.is_connect() || e.is_timeout(),
            _ => false,
        }
    }
}

/// Substring check over a CDP error message for a dead session.
pub(crate) fn is_session_lost_message(msg: &str) -> bool {
    let msg = msg.to_lowercase();
    const PATTERNS: &[&str] = &[
        "websocket",
        "connection closed",
        "channel closed",
        "browser closed",
        "session closed",
        "target crashed",
        "not connected",
    ];
    PATTERNS.iter().any(|p| msg.contains(p))
}
