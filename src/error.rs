//! Error types shared by the game, the engine bridge and the turn controller

use thiserror::Error;

use crate::turn::TurnState;

/// A move the rules refuse. Never fatal, the move is simply not applied.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("illegal move {notation}: {reason}")]
pub struct IllegalMoveError {
    pub notation: String,
    pub reason: String,
}

impl IllegalMoveError {
    pub fn new(notation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            notation: notation.into(),
            reason: reason.into(),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid position: {0}")]
pub struct InvalidPositionError(pub String);

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("engine is not ready")]
    NotReady,

    #[error("engine is busy with another search")]
    Busy,

    #[error("engine protocol error: {0}")]
    Protocol(String),

    #[error("engine transport error: {0}")]
    Transport(String),

    #[error("engine failed to initialize: {0}")]
    Initialization(String),

    #[error("engine timed out during {0}")]
    Timeout(&'static str),
}

impl EngineError {
    /// Errors after which the session can no longer be trusted.
    pub fn is_session_fatal(&self) -> bool {
        !matches!(self, EngineError::NotReady | EngineError::Busy)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TurnError {
    #[error("board is not accepting input while {0:?}")]
    NotAcceptingInput(TurnState),

    #[error("no promotion is pending")]
    NoPendingPromotion,

    #[error("game is over")]
    GameOver,

    #[error(transparent)]
    Illegal(#[from] IllegalMoveError),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid config value: {0}")]
    Invalid(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("malformed move notation: {0:?}")]
pub struct MoveNotationError(pub String);
