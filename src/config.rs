use crate::defaults;
use crate::error::{Result, SayflowError};
use crate::playback::CommandPlayer;
use crate::speech::artifact::ArtifactStore;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct Config {
    pub synthesis: SynthesisConfig,
    pub playback: PlaybackConfig,
    pub artifacts: ArtifactsConfig,
    pub pipeline: PipelineConfig,
}

/// Synthesis service and worker pool configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SynthesisConfig {
    pub api_url: String,
    pub timeout_ms: u64,
    pub workers: usize,
    pub intake_depth: usize,
}

/// External player configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PlaybackConfig {
    pub command: String,
    pub args: Vec<String>,
}

/// Where synthesized audio waits for its turn
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ArtifactsConfig {
    pub in_memory: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub directory: Option<PathBuf>,
    pub extension: String,
}

/// Run-level settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct PipelineConfig {
    /// Defaults to `synthesis.timeout_ms` plus a fixed margin.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completion_grace_ms: Option<u64>,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            api_url: defaults::API_URL.to_string(),
            timeout_ms: defaults::SYNTHESIS_TIMEOUT_MS,
            workers: defaults::WORKERS,
            intake_depth: defaults::INTAKE_DEPTH,
        }
    }
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            command: defaults::PLAYER_COMMAND.to_string(),
            args: defaults::PLAYER_ARGS.iter().map(|a| a.to_string()).collect(),
        }
    }
}

impl Default for ArtifactsConfig {
    fn default() -> Self {
        Self {
            in_memory: false,
            directory: None,
            extension: defaults::ARTIFACT_EXTENSION.to_string(),
        }
    }
}

impl PlaybackConfig {
    /// Player described by this section.
    pub fn player(&self) -> CommandPlayer {
        CommandPlayer::new(self.command.clone(), self.args.clone())
    }
}

impl ArtifactsConfig {
    /// Artifact store described by this section.
    pub fn store(&self) -> ArtifactStore {
        if self.in_memory {
            return ArtifactStore::in_memory();
        }
        ArtifactStore::directory(
            self.directory.clone().unwrap_or_else(defaults::artifact_dir),
            defaults::artifact_prefix(),
            self.extension.clone(),
        )
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Returns an error if the file contains invalid TOML.
    /// Missing fields will use default values.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from a file or return defaults if file doesn't exist
    ///
    /// Invalid TOML is still an error.
    pub fn load_or_default(path: &Path) -> anyhow::Result<Self> {
        match Self::load(path) {
            Ok(config) => Ok(config),
            Err(e)
                if e.downcast_ref::<std::io::Error>()
                    .is_some_and(|io_err| io_err.kind() == std::io::ErrorKind::NotFound) =>
            {
                Ok(Self::default())
            }
            Err(e) => Err(e.context(format!("Failed to load config from {}", path.display()))),
        }
    }

    /// Apply environment variable overrides
    ///
    /// Supported environment variables:
    /// - SAYFLOW_API_URL → synthesis.api_url
    /// - SAYFLOW_WORKERS → synthesis.workers
    /// - SAYFLOW_PLAYER → playback.command
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(api_url) = std::env::var("SAYFLOW_API_URL")
            && !api_url.is_empty()
        {
            self.synthesis.api_url = api_url;
        }

        if let Ok(workers) = std::env::var("SAYFLOW_WORKERS")
            && !workers.is_empty()
        {
            match workers.parse() {
                Ok(workers) => self.synthesis.workers = workers,
                Err(_) => tracing::warn!(value = %workers, "ignoring invalid SAYFLOW_WORKERS"),
            }
        }

        if let Ok(player) = std::env::var("SAYFLOW_PLAYER")
            && !player.is_empty()
        {
            self.playback.command = player;
        }

        self
    }

    /// Rejects values the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        let invalid = |key: &str, message: &str| SayflowError::ConfigInvalidValue {
            key: key.to_string(),
            message: message.to_string(),
        };

        if self.synthesis.workers == 0 {
            return Err(invalid("synthesis.workers", "must be at least 1"));
        }
        if self.synthesis.intake_depth == 0 {
            return Err(invalid("synthesis.intake_depth", "must be at least 1"));
        }
        if self.synthesis.timeout_ms == 0 {
            return Err(invalid("synthesis.timeout_ms", "must be greater than 0"));
        }
        if self.synthesis.api_url.trim().is_empty() {
            return Err(invalid("synthesis.api_url", "must not be empty"));
        }
        if self.playback.command.trim().is_empty() {
            return Err(invalid("playback.command", "must not be empty"));
        }
        if self.pipeline.completion_grace_ms == Some(0) {
            return Err(invalid("pipeline.completion_grace_ms", "must be greater than 0"));
        }
        Ok(())
    }

    /// Renders the configuration as TOML.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| SayflowError::ConfigParse {
            message: e.to_string(),
        })
    }

    /// Get the default configuration file path
    ///
    /// Returns ~/.config/sayflow/config.toml on Linux
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("sayflow")
            .join("config.toml")
    }
}
