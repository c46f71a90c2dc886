//! Ladder-specific error types

use thiserror::Error;

/// Errors that can occur outside the slot event callbacks
///
/// Gateway callbacks never produce these: a slot either advances a transition
/// or ignores the event. Errors are reserved for configuration, feeds,
/// persistence and the runner.
#[derive(Error, Debug, Clone)]
pub enum LadderError {
    #[error("Invalid ladder configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid price levels: {0}")]
    InvalidLevels(String),

    #[error("Slot not found: {side} #{index}")]
    SlotNotFound { side: String, index: usize },

    #[error("Feed error: {0}")]
    Feed(String),

    #[error("Channel send error: {0}")]
    ChannelSend(String),

    #[error("Channel receive error: {0}")]
    ChannelRecv(String),

    #[error("JSON parse error: {0}")]
    JsonParse(String),

    #[error("Snapshot persistence error: {0}")]
    Persistence(String),

    #[error("Settings error: {0}")]
    Settings(String),
}

impl From<serde_json::Error> for LadderError {
    fn from(err: serde_json::Error) -> Self {
        LadderError::JsonParse(err.to_string())
    }
}

impl From<std::io::Error> for LadderError {
    fn from(err: std::io::Error) -> Self {
        LadderError::Persistence(err.to_string())
    }
}

impl From<config::ConfigError> for LadderError {
    fn from(err: config::ConfigError) -> Self {
        LadderError::Settings(err.to_string())
    }
}

/// Result type for ladder operations
pub type LadderResult<T> = std::result::Result<T, LadderError>;
