use anyhow::Result;
use clap::{CommandFactory, Parser};
use futures_util::StreamExt;
use futures_util::stream::{self, BoxStream};
use owo_colors::OwoColorize;
use sayflow::cli::{Cli, Commands, ConfigAction};
use sayflow::config::Config;
use sayflow::speech::{RunSummary, SequencerOutcome, SpeechPipeline, SpeechPipelineConfig};
use sayflow::tts::http::HttpSynthesizer;
use std::io::IsTerminal;
use std::sync::Arc;
use tokio::io::AsyncReadExt;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.quiet, cli.verbose);

    match cli.command {
        None => {
            let config = apply_cli_overrides(load_config(cli.config.as_deref())?, &cli);
            config.validate()?;

            let summary = speak(config, cli.text, cli.quiet).await?;
            if !cli.quiet {
                print_summary(&summary);
            }
            // A pending stdin read would otherwise keep the runtime alive.
            match summary.outcome {
                SequencerOutcome::Finished => {}
                SequencerOutcome::Stopped => std::process::exit(130),
                SequencerOutcome::Disconnected | SequencerOutcome::TimedOut => {
                    std::process::exit(1)
                }
            }
        }
        Some(Commands::Config { action }) => {
            handle_config_command(action, cli.config.as_deref())?;
        }
        Some(Commands::Completions { shell }) => {
            clap_complete::generate(shell, &mut Cli::command(), "sayflow", &mut std::io::stdout());
        }
    }

    Ok(())
}

fn init_tracing(quiet: bool, verbose: u8) {
    use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

    let default_directive = match (quiet, verbose) {
        (true, _) => "sayflow=warn",
        (false, 0) => "sayflow=info",
        (false, 1) => "sayflow=debug",
        (false, _) => "sayflow=trace",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

    if let Err(e) = tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .try_init()
    {
        eprintln!("Failed to initialize logging: {}", e);
    }
}

/// Load configuration from file with environment overrides.
fn load_config(custom_path: Option<&std::path::Path>) -> Result<Config> {
    let config = if let Some(path) = custom_path {
        // Load from custom path
        Config::load(path)?
    } else {
        // Try default path, fall back to defaults
        Config::load_or_default(&Config::default_path())?
    };

    // Apply environment variable overrides
    Ok(config.with_env_overrides())
}

/// Command-line flags win over the file and the environment.
fn apply_cli_overrides(mut config: Config, cli: &Cli) -> Config {
    if let Some(api_url) = &cli.api_url {
        config.synthesis.api_url = api_url.clone();
    }
    if let Some(workers) = cli.workers {
        config.synthesis.workers = workers;
    }
    if let Some(depth) = cli.intake_depth {
        config.synthesis.intake_depth = depth;
    }
    if let Some(timeout) = cli.timeout {
        config.synthesis.timeout_ms = timeout.as_millis() as u64;
    }
    if let Some(player) = &cli.player {
        config.playback.command = player.clone();
    }
    if cli.in_memory {
        config.artifacts.in_memory = true;
    }
    config
}

async fn speak(config: Config, text: Option<String>, quiet: bool) -> Result<RunSummary> {
    let fragments = match text {
        Some(text) => text_fragments(text),
        None => {
            if std::io::stdin().is_terminal() && !quiet {
                eprintln!("{}", "Reading text from stdin (Ctrl-D to finish)".dimmed());
            }
            stdin_fragments()
        }
    };

    tracing::debug!(
        version = %sayflow::version_string(),
        api_url = %config.synthesis.api_url,
        workers = config.synthesis.workers,
        player = %config.playback.command,
        "starting speech pipeline"
    );

    let synthesizer = Arc::new(HttpSynthesizer::new(config.synthesis.api_url.clone()));
    let player = Arc::new(config.playback.player());
    let handle = SpeechPipeline::with_config(SpeechPipelineConfig::from_config(&config))
        .with_artifact_store(config.artifacts.store())
        .start(fragments, synthesizer, player);

    let stop = handle.stop_signal();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupted, stopping");
            stop.stop();
        }
    });

    Ok(handle.wait().await?)
}

/// Splits literal text into word-sized fragments, the way a model streams tokens.
fn text_fragments(text: String) -> BoxStream<'static, String> {
    let words: Vec<String> = text.split_inclusive(' ').map(str::to_string).collect();
    stream::iter(words).boxed()
}

/// Bytes requested from stdin per read.
const STDIN_CHUNK: usize = 4096;

/// Streams stdin as it arrives, without waiting for newlines.
fn stdin_fragments() -> BoxStream<'static, String> {
    stream::unfold(
        (tokio::io::stdin(), Vec::new()),
        |(mut stdin, mut pending)| async move {
            loop {
                pending.reserve(STDIN_CHUNK);
                match stdin.read_buf(&mut pending).await {
                    Ok(0) if pending.is_empty() => return None,
                    Ok(0) => {
                        let rest = String::from_utf8_lossy(&pending).into_owned();
                        return Some((rest, (stdin, Vec::new())));
                    }
                    Ok(_) => {
                        let text = take_utf8_prefix(&mut pending);
                        if !text.is_empty() {
                            return Some((text, (stdin, pending)));
                        }
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "failed to read stdin");
                        return None;
                    }
                }
            }
        },
    )
    .boxed()
}

/// Takes the decodable front of `pending`, leaving a split multi-byte
/// character behind for the next read. Invalid bytes decode lossily.
fn take_utf8_prefix(pending: &mut Vec<u8>) -> String {
    let valid = match std::str::from_utf8(pending) {
        Ok(_) => pending.len(),
        Err(e) if e.error_len().is_none() => e.valid_up_to(),
        Err(_) => {
            let text = String::from_utf8_lossy(pending).into_owned();
            pending.clear();
            return text;
        }
    };
    let rest = pending.split_off(valid);
    let bytes = std::mem::replace(pending, rest);
    String::from_utf8(bytes)
        .unwrap_or_else(|e| String::from_utf8_lossy(e.as_bytes()).into_owned())
}

fn print_summary(summary: &RunSummary) {
    let status = match summary.outcome {
        SequencerOutcome::Finished => "done".green().bold().to_string(),
        SequencerOutcome::Stopped => "stopped".yellow().bold().to_string(),
        SequencerOutcome::Disconnected => "incomplete".red().bold().to_string(),
        SequencerOutcome::TimedOut => "timed out".red().bold().to_string(),
    };

    eprintln!(
        "{} {} sentences, {} played, {} skipped",
        status, summary.sentences, summary.played, summary.skipped
    );
    if summary.abandoned > 0 {
        eprintln!("  {} {}", summary.abandoned, "unplayed sentences released".dimmed());
    }
    if summary.violations > 0 {
        eprintln!(
            "  {} {}",
            summary.violations,
            "out-of-protocol messages discarded".yellow()
        );
    }
}

/// Handle configuration subcommands.
fn handle_config_command(
    action: ConfigAction,
    config_path: Option<&std::path::Path>,
) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let config = load_config(config_path)?;
            print!("{}", config.to_toml()?);
        }
        ConfigAction::Path => {
            let path = config_path
                .map(std::path::Path::to_path_buf)
                .unwrap_or_else(Config::default_path);
            println!("{}", path.display());
        }
    }
    Ok(())
}
