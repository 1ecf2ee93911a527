//! sqpatch backend server.

use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing::info;

use sqpatch::{
    config::{Config, ConfigOverrides},
    create_app,
    logging::init_logging,
    state::AppState,
};

/// sqpatch - preamp patching and sync service for SQ mixers
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// HTTP port to listen on
    #[arg(short, long)]
    port: Option<u16>,

    /// Mixer address used when no settings file exists yet
    #[arg(long)]
    sq_ip: Option<String>,

    /// Mixer control port
    #[arg(long)]
    sq_port: Option<u16>,

    /// Settings file holding the mixer address and data directory
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Default data directory for channel state and shows
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Log level (overridden by RUST_LOG)
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = Config::from_figment(ConfigOverrides {
        port: args.port,
        mixer_ip: args.sq_ip,
        mixer_port: args.sq_port,
        settings_path: args.settings,
        data_dir: args.data_dir,
        log_level: args.log_level,
    })?;

    // Keep the guard alive so file logs are flushed on exit
    let _log_guard = init_logging(config.log_level.as_deref(), config.log_file.as_deref())?;

    info!("Starting sqpatch {}", env!("CARGO_PKG_VERSION"));
    info!(
        "Layout: {} local sockets (line inputs {:?}), pacing {:?}, gain debounce {:?}",
        config.mixer.layout.local_max,
        config.mixer.layout.line_preamp_ids,
        config.mixer.pace,
        config.mixer.gain_debounce
    );

    let port = config.port;
    let gain_debounce = config.mixer.gain_debounce;
    let command_timeout = config.mixer.command_timeout;
    let state = AppState::with_tcp_mixer(config).await?;
    let app = create_app(state.clone());

    // Bind to 0.0.0.0 to be reachable from the network
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("Server listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    let shutdown_signal = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Received Ctrl+C, shutting down gracefully...");
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await?;

    // Let pending gain changes reach storage and the mixer
    let pending = state.channels().pending_gain_updates();
    if pending > 0 {
        info!("Flushing {} pending gain changes", pending);
        let deadline = gain_debounce + command_timeout * 4;
        if !state.channels().wait_for_gain_flushes(deadline).await {
            tracing::warn!(
                "{} gain changes still unsent after {:?}",
                state.channels().pending_gain_updates(),
                deadline
            );
        }
    }

    info!("Server stopped");
    Ok(())
}
