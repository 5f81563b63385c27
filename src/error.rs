//! Error types for sayflow.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SayflowError {
    // Configuration errors
    #[error("Failed to parse configuration: {message}")]
    ConfigParse { message: String },

    #[error("Invalid configuration value for {key}: {message}")]
    ConfigInvalidValue { key: String, message: String },

    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    // Sentence segmentation errors
    #[error("Sentence segmentation failed: {message}")]
    Segmentation { message: String },

    // Synthesis errors
    #[error("Speech synthesis failed: {message}")]
    Synthesis { message: String },

    #[error("Speech synthesis timed out after {timeout_ms}ms")]
    SynthesisTimeout { timeout_ms: u64 },

    // Playback errors
    #[error("Playback failed: {message}")]
    Playback { message: String },

    // Artifact storage errors
    #[error("Audio artifact error for sentence {index}: {message}")]
    Artifact { index: u64, message: String },

    // Run lifecycle
    #[error("Speech pipeline has been stopped")]
    PipelineStopped,

    // General I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Generic error for cases not covered above
    #[error("{0}")]
    Other(String),
}

// Type alias for convenience
pub type Result<T> = std::result::Result<T, SayflowError>;
