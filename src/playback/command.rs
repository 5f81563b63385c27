//! Playback through an external command-line player (ffplay by default).

use crate::defaults;
use crate::error::{Result, SayflowError};
use crate::playback::Player;
use crate::speech::artifact::{AudioArtifact, AudioPayload};
use async_trait::async_trait;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Runs `program args... <input>` once per artifact and waits for it to exit.
///
/// File payloads pass their path as `<input>`; in-memory payloads are piped
/// through stdin with `pipe:0` as `<input>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandPlayer {
    program: String,
    args: Vec<String>,
}

impl CommandPlayer {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// `ffplay -nodisp -autoexit -hide_banner`
    pub fn ffplay() -> Self {
        Self::new(
            defaults::PLAYER_COMMAND,
            defaults::PLAYER_ARGS.iter().map(|a| a.to_string()).collect(),
        )
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    fn base_command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        command
    }

    fn start_error(&self, e: std::io::Error) -> SayflowError {
        SayflowError::Playback {
            message: format!("failed to start {}: {}", self.program, e),
        }
    }
}

impl Default for CommandPlayer {
    fn default() -> Self {
        Self::ffplay()
    }
}

#[async_trait]
impl Player for CommandPlayer {
    async fn play(&self, artifact: &AudioArtifact) -> Result<()> {
        let mut command = self.base_command();

        let status = match artifact.payload() {
            AudioPayload::File(path) => {
                command.arg(path).stdin(Stdio::null());
                command.status().await.map_err(|e| self.start_error(e))?
            }
            AudioPayload::Memory(bytes) => {
                command
                    .arg(defaults::PLAYER_STDIN_INPUT)
                    .stdin(Stdio::piped());
                let mut child = command.spawn().map_err(|e| self.start_error(e))?;
                if let Some(mut stdin) = child.stdin.take() {
                    // A player may exit before reading everything; its exit
                    // status decides the outcome.
                    if let Err(e) = stdin.write_all(bytes).await {
                        tracing::debug!(index = artifact.index(), error = %e, "player closed stdin early");
                    }
                }
                child.wait().await.map_err(|e| SayflowError::Playback {
                    message: format!("failed to wait for {}: {}", self.program, e),
                })?
            }
        };

        if !status.success() {
            return Err(SayflowError::Playback {
                message: format!("{} exited with {}", self.program, status),
            });
        }
        Ok(())
    }

    fn name(&self) -> &str {
        &self.program
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::speech::artifact::ArtifactStore;
    use tempfile::TempDir;

    fn sh(script: &str) -> CommandPlayer {
        // `sh -c script sh <input>` makes <input> available as $1.
        CommandPlayer::new(
            "sh",
            vec!["-c".to_string(), script.to_string(), "sh".to_string()],
        )
    }

    #[test]
    fn test_ffplay_defaults() {
        let player = CommandPlayer::default();
        assert_eq!(player.program(), "ffplay");
        assert_eq!(player.args, vec!["-nodisp", "-autoexit", "-hide_banner"]);
    }

    #[tokio::test]
    async fn test_file_payload_passes_path() {
        let dir = TempDir::new().unwrap();
        let artifact = ArtifactStore::directory(dir.path(), "s", "opus")
            .persist(0, b"audio".to_vec())
            .await
            .unwrap();

        let player = sh(r#"test -s "$1""#);
        assert!(player.play(&artifact).await.is_ok());
    }

    #[tokio::test]
    async fn test_memory_payload_is_piped() {
        let artifact = AudioArtifact::in_memory(0, b"audio".to_vec());
        let player = sh(r#"test "$1" = pipe:0 && test "$(cat)" = audio"#);
        assert!(player.play(&artifact).await.is_ok());
    }

    #[tokio::test]
    async fn test_non_zero_exit_is_playback_error() {
        let artifact = AudioArtifact::in_memory(0, vec![]);
        match sh("exit 3").play(&artifact).await {
            Err(SayflowError::Playback { message }) => assert!(message.contains("sh exited")),
            other => panic!("Expected Playback error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_missing_program_is_playback_error() {
        let player = CommandPlayer::new("sayflow-no-such-player", vec![]);
        let artifact = AudioArtifact::in_memory(0, vec![]);
        match player.play(&artifact).await {
            Err(SayflowError::Playback { message }) => {
                assert!(message.contains("failed to start sayflow-no-such-player"));
            }
            other => panic!("Expected Playback error, got {:?}", other),
        }
    }
}
