mod config;
mod fallback;
mod http_server;
mod library;
mod logging;
mod matcher;
mod models;
mod ports;
mod services;
mod slskd;
mod store;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use color_eyre::{Result, eyre::Context};
use tokio_util::sync::CancellationToken;

use crate::{
    config::Config,
    fallback::MetubeFallback,
    http_server::state::AppState,
    library::Library,
    services::acquisition::{
        AcquisitionService,
        background_task::{
            AcquisitionOrchestrator, OrchestratorSettings, spawn_acquisition_orchestrator,
        },
    },
    slskd::SlskdClient,
    store::PendingStore,
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// The config file to use
    #[arg(short, long, global = true, env = "MUSIC_ACQUIRER_CONFIG")]
    config: Option<PathBuf>,

    /// Log filter, overrides the config file (e.g. `debug`, `music_acquirer=trace`)
    #[arg(long, global = true, env = "LOG_LEVEL")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the acquisition loop and the HTTP server
    Serve {
        /// The port to run the server on, overrides the config file
        #[arg(short, long, env = "MUSIC_ACQUIRER_HTTP_PORT")]
        port: Option<u16>,
    },
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(Subcommand, Debug)]
enum ConfigCommands {
    /// Create a default config file, if it doesn't exist
    CreateDefault,
    /// Print the path to the config file
    Path,
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let args = Args::parse();

    match args.command {
        Commands::Config(config_commands) => match config_commands {
            ConfigCommands::CreateDefault => {
                let written = match &args.config {
                    Some(path) => Config::create_default_at(path)?,
                    None => Config::create_default()?,
                };
                if written {
                    println!("Default config created");
                } else {
                    println!("Config file already exists");
                }
            }
            ConfigCommands::Path => match args.config.or_else(Config::config_path) {
                Some(path) => println!("{}", path.display()),
                None => println!("No default config path found"),
            },
        },
        Commands::Serve { port } => {
            let config = match &args.config {
                Some(path) => Config::from_file(path),
                None => Config::load(),
            }
            .wrap_err("Failed to load music-acquirer config")?;

            let level = args
                .log_level
                .clone()
                .unwrap_or_else(|| config.logging.level.clone());
            let _tracing_guard = logging::init_tracing(
                env!("CARGO_PKG_NAME"),
                config.logging.otlp_endpoint.as_deref(),
                &level,
            )?;

            serve(config, port).await?;
        }
    }

    Ok(())
}

async fn serve(config: Config, port: Option<u16>) -> Result<()> {
    let port = port.unwrap_or(config.http.port);
    let store = Arc::new(PendingStore::new());
    let peer = Arc::new(SlskdClient::new(&config.slskd));
    let fallback = config.metube.as_ref().map(MetubeFallback::new);
    if fallback.is_none() {
        tracing::info!("No MeTube configured, requests without peer matches will be dropped");
    }

    let orchestrator = AcquisitionOrchestrator::new(
        store.clone(),
        peer.clone(),
        fallback,
        Library::new(config.library_path()),
        OrchestratorSettings {
            poll_interval: config.poll_interval,
            peer_download_dir: config.slskd_download_path(),
            fallback_download_dir: config.metube_download_path(),
        },
    );

    let cancel = CancellationToken::new();
    let orchestrator_handle = spawn_acquisition_orchestrator(orchestrator, cancel.clone());

    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {}", e);
                return;
            }
            tracing::info!("Shutdown requested");
            cancel.cancel();
        });
    }

    let app_state = Arc::new(AppState {
        acquisition: AcquisitionService::new(store, peer),
    });
    let server_result = http_server::app::start(port, app_state, cancel.clone()).await;

    // Stop the orchestrator even if the server failed to start.
    cancel.cancel();
    orchestrator_handle
        .await
        .wrap_err("Acquisition orchestrator panicked")?;

    server_result
}
