//! Error types for Recite

use thiserror::Error;

/// Result type alias using Recite's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// All possible errors in Recite
///
/// Alignment itself never fails: degenerate input is a no-op. These cover the
/// setup and transport edges around the engine.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Audio error: {0}")]
    Audio(String),

    #[error("Recognizer error: {0}")]
    Recognizer(String),

    #[error("Homonym table error: {0}")]
    Homonyms(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Event channel closed")]
    ChannelClosed,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
