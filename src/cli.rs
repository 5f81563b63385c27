//! Command-line interface for sayflow
//!
//! Provides argument parsing using clap derive macros.

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;
use std::time::Duration;

/// Speak streaming text sentence by sentence
#[derive(Parser, Debug)]
#[command(
    name = "sayflow",
    version,
    about = "Speak streaming text sentence by sentence"
)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Text to speak (default: read from stdin)
    #[arg(value_name = "TEXT")]
    pub text: Option<String>,

    /// Path to configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Suppress output (quiet mode)
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Verbose output (-v: debug, -vv: trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Synthesis service URL
    #[arg(long, value_name = "URL")]
    pub api_url: Option<String>,

    /// Number of parallel synthesis requests
    #[arg(long, short = 'w', value_name = "N")]
    pub workers: Option<usize>,

    /// Sentences queued ahead of synthesis before reading pauses
    #[arg(long, value_name = "N")]
    pub intake_depth: Option<usize>,

    /// Per-sentence synthesis timeout. Examples: 30s, 1m, 500ms
    #[arg(long, short = 't', value_name = "DURATION", value_parser = parse_timeout)]
    pub timeout: Option<Duration>,

    /// Player program (the audio file or pipe:0 is appended to its arguments)
    #[arg(long, value_name = "CMD")]
    pub player: Option<String>,

    /// Keep synthesized audio in memory instead of temporary files
    #[arg(long)]
    pub in_memory: bool,
}

/// Parse a timeout string.
///
/// Supports any duration format accepted by `humantime`; bare numbers are
/// seconds.
fn parse_timeout(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    let duration = match s.parse::<u64>() {
        Ok(secs) => Duration::from_secs(secs),
        Err(_) => humantime::parse_duration(s).map_err(|e| e.to_string())?,
    };
    if duration.is_zero() {
        return Err("timeout must be greater than zero".to_string());
    }
    Ok(duration)
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// View configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: Shell,
    },
}

/// Configuration actions
#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum ConfigAction {
    /// Print the effective configuration as TOML
    Show,
    /// Print the configuration file path
    Path,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_default_command() {
        let cli = Cli::try_parse_from(["sayflow"]).unwrap();
        assert!(cli.command.is_none());
        assert!(cli.text.is_none());
        assert!(cli.api_url.is_none());
        assert!(cli.workers.is_none());
        assert!(cli.intake_depth.is_none());
        assert!(cli.timeout.is_none());
        assert!(cli.player.is_none());
        assert!(!cli.in_memory);
        assert!(!cli.quiet);
        assert_eq!(cli.verbose, 0);
        assert!(cli.config.is_none());
    }

    #[test]
    fn test_parse_text_argument() {
        let cli = Cli::try_parse_from(["sayflow", "Hello there. How are you?"]).unwrap();
        assert_eq!(cli.text.as_deref(), Some("Hello there. How are you?"));
        assert!(cli.command.is_none());
    }

    #[test]
    fn test_parse_verbose_double() {
        let cli = Cli::try_parse_from(["sayflow", "-vv"]).unwrap();
        assert_eq!(cli.verbose, 2);
    }

    #[test]
    fn test_quiet_conflicts_with_verbose() {
        assert!(Cli::try_parse_from(["sayflow", "-q", "-v"]).is_err());
    }

    #[test]
    fn test_parse_with_options() {
        let cli = Cli::try_parse_from([
            "sayflow",
            "--api-url",
            "http://localhost:9000/tts",
            "--workers",
            "3",
            "--intake-depth",
            "8",
            "--timeout",
            "45s",
            "--player",
            "mpv",
            "--in-memory",
        ])
        .unwrap();

        assert_eq!(cli.api_url.as_deref(), Some("http://localhost:9000/tts"));
        assert_eq!(cli.workers, Some(3));
        assert_eq!(cli.intake_depth, Some(8));
        assert_eq!(cli.timeout, Some(Duration::from_secs(45)));
        assert_eq!(cli.player.as_deref(), Some("mpv"));
        assert!(cli.in_memory);
    }

    #[test]
    fn test_parse_timeout_formats() {
        assert_eq!(parse_timeout("10"), Ok(Duration::from_secs(10)));
        assert_eq!(parse_timeout("500ms"), Ok(Duration::from_millis(500)));
        assert_eq!(parse_timeout("1m30s"), Ok(Duration::from_secs(90)));
        assert!(parse_timeout("0").is_err());
        assert!(parse_timeout("soon").is_err());
    }

    #[test]
    fn test_parse_config_show() {
        let cli = Cli::try_parse_from(["sayflow", "config", "show"]).unwrap();
        match cli.command {
            Some(Commands::Config { action }) => assert_eq!(action, ConfigAction::Show),
            _ => panic!("Expected Config command"),
        }
    }

    #[test]
    fn test_parse_global_config() {
        let cli =
            Cli::try_parse_from(["sayflow", "--config", "/path/to/config.toml", "config", "path"])
                .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/path/to/config.toml")));
        assert!(matches!(
            cli.command,
            Some(Commands::Config {
                action: ConfigAction::Path
            })
        ));
    }

    #[test]
    fn test_parse_completions() {
        let cli = Cli::try_parse_from(["sayflow", "completions", "bash"]).unwrap();
        assert!(matches!(
            cli.command,
            Some(Commands::Completions { shell: Shell::Bash })
        ));
    }

    #[test]
    fn test_invalid_workers_returns_error() {
        assert!(Cli::try_parse_from(["sayflow", "--workers", "many"]).is_err());
    }
}
