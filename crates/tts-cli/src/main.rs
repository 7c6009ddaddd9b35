//! Speech synthesis command-line interface.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use runtime::logging::LogFormat;
use std::path::PathBuf;
use tracing::info;

mod commands;

const DEFAULT_LOG_LEVEL: &str = "warn";

/// Speech synthesis CLI
#[derive(Debug, Parser)]
#[command(name = "tts")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Log level [default: warn]; without this and --log-format the
    /// RUST_LOG, LOG_FORMAT and LOG_FILE variables are used
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    /// Log format (json or text) [default: text]
    #[arg(long, global = true)]
    log_format: Option<LogFormatArg>,

    /// Configuration file (same format as the server's)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormatArg {
    Json,
    Text,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Synthesize text to a WAV file
    Synth {
        /// Input text or file path (use @file.txt for file input)
        input: String,

        /// Output file path (WAV format)
        #[arg(short, long)]
        output: PathBuf,

        /// Language (ru, en, de); the catalog default when omitted
        #[arg(long)]
        lang: Option<String>,

        /// Model id; the language's first model when omitted
        #[arg(short, long)]
        model: Option<String>,

        /// Speaker name, or "random"
        #[arg(short, long)]
        speaker: Option<String>,

        /// Skip noise reduction
        #[arg(long)]
        no_enhance: bool,
    },

    /// Normalize text and markup without synthesis (dry run)
    Normalize {
        /// Input text
        input: String,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },

    /// List languages, models and speakers
    Voices,

    /// Show version and configuration info
    Info,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match (cli.log_level.as_deref(), cli.log_format) {
        (None, None) => runtime::logging::init_logging_from_env(DEFAULT_LOG_LEVEL),
        (level, format) => {
            let format = match format {
                Some(LogFormatArg::Json) => LogFormat::Json,
                Some(LogFormatArg::Text) | None => LogFormat::Text,
            };
            runtime::logging::init_logging(level.unwrap_or(DEFAULT_LOG_LEVEL), format, None)
        }
    }
    .context("failed to initialize logging")?;

    info!(version = env!("CARGO_PKG_VERSION"), "Starting TTS CLI");

    let config = commands::load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Synth {
            input,
            output,
            lang,
            model,
            speaker,
            no_enhance,
        } => {
            let options = commands::synth::SynthOptions {
                input,
                output,
                lang,
                model,
                speaker,
                enhance: !no_enhance,
            };
            commands::synth::run(&config, options).context("synthesis failed")?;
        }
        Commands::Normalize { input, json } => {
            commands::normalize::run(&input, json).context("normalization failed")?;
        }
        Commands::Voices => {
            commands::voices::run(&config).context("cannot list voices")?;
        }
        Commands::Info => {
            commands::info::run(&config);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_flags_are_optional() {
        let cli = Cli::try_parse_from(["tts", "voices"]).unwrap();
        assert!(cli.log_level.is_none());
        assert!(cli.log_format.is_none());

        let cli = Cli::try_parse_from(["tts", "info", "--log-level", "debug", "--log-format", "json"])
            .unwrap();
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
        assert!(matches!(cli.log_format, Some(LogFormatArg::Json)));
    }
}
