//! HTTP server hosting one pystudio session for a browser-based editor.

use anyhow::Result;
use clap::Parser;
use log::LevelFilter;
use pystudio_core::{ConfigLoader, Engine, Studio};
use pystudio_server::{shutdown_signal, ServerConfig, StudioServer};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[clap(author, version, about = "pystudio server - run Python lessons over HTTP")]
struct Cli {
    /// YAML configuration file (defaults to ./pystudio.yaml when present)
    #[clap(long, short)]
    config: Option<PathBuf>,

    #[clap(long, default_value = "127.0.0.1:3000")]
    bind_addr: String,

    /// Overrides the level from the configuration file
    #[clap(long, short)]
    log_level: Option<String>,

    #[clap(long, help = "Allowed CORS origin (repeatable); any origin when omitted")]
    cors_origin: Vec<String>,

    #[clap(long, help = "Do not boot the interpreter until the first request")]
    lazy: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = ConfigLoader::from_optional_file(cli.config.as_deref()).await?;

    let level = cli.log_level.as_deref().unwrap_or(&config.logging.level);
    let log_level_filter = level.parse().unwrap_or(LevelFilter::Info);
    env_logger::Builder::new()
        .filter_level(log_level_filter)
        .init();

    let engine = Engine::from_config(&config);
    let studio = Arc::new(Studio::new(Arc::new(engine)));

    let mut server_config = ServerConfig::default()
        .with_bind_addr_str(&cli.bind_addr)?
        .with_logging(true)
        .with_warm_up(!cli.lazy);
    if !cli.cors_origin.is_empty() {
        server_config = server_config.with_cors_origins(cli.cors_origin);
    }

    log::info!("Starting pystudio server on {}...", server_config.bind_addr);
    let server = StudioServer::with_config(studio, server_config);

    if let Err(e) = server.serve_with_shutdown(shutdown_signal()).await {
        log::error!("Server failed: {}", e);
        return Err(e.into());
    }

    Ok(())
}
