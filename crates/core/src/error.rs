//! Error types for the Cadence domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each collaborator has its own error enum, folded into [`Error`].

use thiserror::Error;

/// The top-level error type for Cadence operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Collaborator errors ---
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("World adapter error: {0}")]
    World(#[from] WorldError),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, Error)]
pub enum SessionError {
    #[error("Prompt failed: {0}")]
    PromptFailed(String),

    #[error("Session closed: {0}")]
    Closed(String),

    #[error("Tool list rejected: {0}")]
    InvalidTools(String),
}

#[derive(Debug, Clone, Error)]
pub enum WorldError {
    #[error("World state unavailable: {0}")]
    Unavailable(String),

    #[error("Invalid world state: {0}")]
    InvalidState(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_error_displays_correctly() {
        let err = Error::Session(SessionError::PromptFailed("model overloaded".into()));
        assert!(err.to_string().contains("Session error"));
        assert!(err.to_string().contains("model overloaded"));
    }

    #[test]
    fn world_error_converts_into_top_level() {
        let err: Error = WorldError::Unavailable("indexer offline".into()).into();
        assert!(matches!(err, Error::World(_)));
        assert!(err.to_string().contains("indexer offline"));
    }
}
