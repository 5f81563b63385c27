//! Default configuration constants for sayflow.
//!
//! Shared by the config file layer, the CLI and the pipeline builders so the
//! three never drift apart.

use std::time::Duration;

/// Default synthesis service endpoint.
pub const API_URL: &str = "http://0.0.0.0:8848/api/v1/synthesise";

/// Default number of synthesis workers.
///
/// One worker keeps requests to the synthesis service strictly sequential.
/// Raise it when the service handles parallel requests well.
pub const WORKERS: usize = 1;

/// Default intake queue depth.
///
/// Sentences accepted but not yet synthesized. When full, segmentation (and
/// the token stream feeding it) waits.
pub const INTAKE_DEPTH: usize = 5;

/// Default per-call synthesis timeout in milliseconds.
pub const SYNTHESIS_TIMEOUT_MS: u64 = 30_000;

/// Extra time granted to in-flight synthesis after the final sentence count is
/// known, on top of the per-call timeout.
pub const COMPLETION_GRACE_MARGIN_MS: u64 = 5_000;

/// Default player program.
pub const PLAYER_COMMAND: &str = "ffplay";

/// Default player arguments (the artifact path is appended).
pub const PLAYER_ARGS: &[&str] = &["-nodisp", "-autoexit", "-hide_banner"];

/// Player input argument used when the payload is piped through stdin.
pub const PLAYER_STDIN_INPUT: &str = "pipe:0";

/// Default file extension for persisted artifacts.
pub const ARTIFACT_EXTENSION: &str = "opus";

/// Directory name under the system temp dir for persisted artifacts.
pub const ARTIFACT_DIR_NAME: &str = "sayflow";

/// Characters that may end a sentence. Boundary detection only runs when a
/// fragment contains one of them.
pub const SENTENCE_TERMINALS: &[char] = &['.', '!', '?', '…', '。', '！', '？'];

/// Per-call synthesis timeout as a [`Duration`].
pub fn synthesis_timeout() -> Duration {
    Duration::from_millis(SYNTHESIS_TIMEOUT_MS)
}

/// Default completion grace period for a given per-call timeout.
pub fn completion_grace(synthesis_timeout: Duration) -> Duration {
    synthesis_timeout + Duration::from_millis(COMPLETION_GRACE_MARGIN_MS)
}

/// Default artifact directory: `<temp>/sayflow`.
pub fn artifact_dir() -> std::path::PathBuf {
    std::env::temp_dir().join(ARTIFACT_DIR_NAME)
}

/// Default artifact file prefix, unique per process.
pub fn artifact_prefix() -> String {
    format!("sentence-{}", std::process::id())
}
