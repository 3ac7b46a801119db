//! Error types for the wisp pipeline.

/// Top-level error type for the voice assistant.
#[derive(Debug, thiserror::Error)]
pub enum WispError {
    /// Audio device or stream error.
    #[error("audio error: {0}")]
    Audio(String),

    /// Speech recognition error.
    #[error("recognition error: {0}")]
    Recognition(String),

    /// Text generation engine error.
    #[error("generation error: {0}")]
    Generation(String),

    /// Speech synthesis error.
    #[error("synthesis error: {0}")]
    Synthesis(String),

    /// Audio playback process error.
    #[error("playback error: {0}")]
    Playback(String),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// Context snapshot / trim error.
    #[error("context error: {0}")]
    Context(String),

    /// Tool execution error.
    #[error("tool error: {0}")]
    Tool(String),

    /// Channel send/receive error.
    #[error("channel error: {0}")]
    Channel(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, WispError>;
