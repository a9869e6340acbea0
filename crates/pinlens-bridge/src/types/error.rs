//! Error types for the bridge crate.

/// All errors that can occur in the bridge.
#[derive(thiserror::Error, Debug)]
pub enum BridgeError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Channel closed")]
    ChannelClosed,

    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Core(#[from] pinlens::StatsError),
}

/// Convenience result type.
pub type BridgeResult<T> = Result<T, BridgeError>;
