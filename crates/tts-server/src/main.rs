//! Speech synthesis HTTP server.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use runtime::logging::{LogFormat, init_logging};
use tts_core::ServerConfig;
use tts_server::TtsServer;

/// Speech synthesis HTTP server
#[derive(Debug, Parser)]
#[command(name = "tts-server")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file path (JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Bind host
    #[arg(long)]
    host: Option<String>,

    /// Listen port
    #[arg(short, long)]
    port: Option<u16>,

    /// Directory for generated audio
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Maximum concurrent synthesis jobs
    #[arg(long)]
    workers: Option<usize>,

    /// Log level
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Enable JSON logging
    #[arg(long)]
    json_logs: bool,

    /// Also write logs to this file
    #[arg(long, default_value = "tts_server.log")]
    log_file: Option<PathBuf>,
}

impl Args {
    fn server_config(&self) -> Result<ServerConfig> {
        let mut config = match &self.config {
            Some(path) => ServerConfig::from_json_file(path)
                .with_context(|| format!("Failed to load config from {}", path.display()))?,
            None => ServerConfig::default(),
        };

        if let Some(host) = &self.host {
            config.host = host.clone();
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(dir) = &self.output_dir {
            config.output_dir = dir.clone();
        }
        if let Some(workers) = self.workers {
            config.max_workers = workers;
        }

        config.validate().context("Invalid configuration")?;
        Ok(config)
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();

    let format = if args.json_logs {
        LogFormat::Json
    } else {
        LogFormat::Text
    };
    init_logging(&args.log_level, format, args.log_file.as_deref())
        .context("Failed to initialize logging")?;

    let config = args.server_config()?;
    info!(
        version = env!("CARGO_PKG_VERSION"),
        addr = %config.bind_addr(),
        workers = config.max_workers,
        "Starting speech server"
    );

    let server = TtsServer::new_mock(config).context("Failed to create server")?;
    server.run().await.context("Server failed")?;

    info!("Server shutdown complete");
    Ok(())
}
