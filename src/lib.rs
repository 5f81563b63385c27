//! sayflow - Speak streaming text sentence by sentence
//!
//! Splits incrementally arriving text (typically language-model output) into
//! sentences, synthesizes them concurrently and plays them back in order.

#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::let_underscore_must_use)]

#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod defaults;
pub mod error;
pub mod playback;
pub mod speech;
pub mod tts;

// Core traits (text → speech → speakers)
pub use playback::Player;
pub use speech::segmenter::SentenceSplitter;
pub use tts::Synthesizer;

// Pipeline
pub use speech::pipeline::{RunSummary, SpeechPipeline, SpeechPipelineConfig, SpeechPipelineHandle};

// Error handling
pub use error::{Result, SayflowError};

// Config
pub use config::Config;

// Station framework (for advanced users)
pub use speech::report::{ErrorReporter, PipelineFault};

/// Build version string with optional git commit hash.
///
/// Returns `"0.1.0+abc1234"` when git hash is available, `"0.1.0"` otherwise.
pub fn version_string() -> String {
    let version = env!("CARGO_PKG_VERSION");
    match option_env!("GIT_HASH") {
        Some(hash) if !hash.is_empty() => format!("{}+{}", version, hash),
        _ => version.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_string_starts_with_cargo_version() {
        let ver = version_string();
        assert!(
            ver.starts_with(env!("CARGO_PKG_VERSION")),
            "version_string should start with CARGO_PKG_VERSION, got: {}",
            ver
        );
    }

    #[test]
    fn version_string_appends_hash_when_present() {
        let ver = version_string();
        match option_env!("GIT_HASH") {
            Some(hash) if !hash.is_empty() => assert!(ver.ends_with(&format!("+{}", hash))),
            _ => assert_eq!(ver, env!("CARGO_PKG_VERSION")),
        }
    }
}
