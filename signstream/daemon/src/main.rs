//! Signstream Daemon - Voice-to-ISL Translation Server
//!
//! Serves the translation API over HTTP and streams avatar animations to
//! WebSocket clients.
//!
//! # Usage
//!
//! ```bash
//! # Start with defaults (0.0.0.0:8000)
//! signstream-daemon
//!
//! # Custom listen address and public stream URL
//! signstream-daemon --bind 127.0.0.1:9000 --stream-base-url wss://avatar.example/avatar/stream
//!
//! # With config file
//! signstream-daemon --config /etc/signstream/signstream.toml
//!
//! # Verbose logging
//! RUST_LOG=debug signstream-daemon
//! ```
//!
//! # Signals
//!
//! - `SIGTERM` / `SIGINT`: Graceful shutdown

mod server;
mod ws;

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use signstream_core::config::default_config_path;
use signstream_core::{
    load_config_from_path, ConfigOverrides, ServiceConfig, StreamManager, TranslationService,
};

use server::AppState;

/// Signstream Daemon - text to Indian Sign Language avatar streaming
#[derive(Parser, Debug)]
#[command(name = "signstream-daemon")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Address to listen on
    #[arg(short = 'b', long, value_name = "ADDR")]
    bind: Option<SocketAddr>,

    /// Base URL returned to clients for avatar streams
    #[arg(long, value_name = "URL")]
    stream_base_url: Option<String>,

    /// Animation playback rate
    #[arg(long, value_name = "FPS")]
    fps: Option<u32>,

    /// Configuration file path
    #[arg(short = 'c', long, env = "SIGNSTREAM_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, env = "SIGNSTREAM_LOG_LEVEL", default_value = "info")]
    log_level: String,
}

impl Args {
    fn overrides(&self) -> ConfigOverrides {
        let mut overrides = ConfigOverrides::new();
        if let Some(addr) = self.bind {
            overrides = overrides.with_bind_address(addr);
        }
        if let Some(ref url) = self.stream_base_url {
            overrides = overrides.with_stream_base_url(url.clone());
        }
        if let Some(fps) = self.fps {
            overrides = overrides.with_fps(fps);
        }
        overrides
    }
}

/// Initialize logging with the specified level
fn init_logging(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(format!(
            "signstream_daemon={level},signstream_core={level}"
        ))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();
}

/// Load the config file, environment and CLI flags in priority order
fn build_config(args: &Args) -> Result<ServiceConfig> {
    let path = args.config.clone().or_else(default_config_path);
    let mut config = load_config_from_path(path.clone())
        .with_context(|| format!("Failed to load configuration from {path:?}"))?;
    args.overrides()
        .apply(&mut config)
        .context("Invalid command-line override")?;
    Ok(config)
}

/// Resolve on Ctrl-C or SIGTERM, then stop the stream manager
async fn shutdown_signal(streams: StreamManager) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl-C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received SIGINT, initiating shutdown"),
        () = terminate => info!("Received SIGTERM, initiating shutdown"),
    }

    let active = streams.active_connections();
    if active > 0 {
        info!(active, "Closing active avatar streams");
    }
    streams.shutdown().await;
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args.log_level);

    info!("Signstream daemon starting");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let config = build_config(&args)?;
    info!(
        source = %config.source(),
        config_file = ?config.config_file_path,
        bind = %config.bind_address,
        fps = config.fps,
        "Configuration loaded"
    );

    let streams = StreamManager::new(config.stream.clone());
    streams.start();

    let service = TranslationService::from_config(&config, streams.clone());
    let app = server::router(AppState::new(service));

    let listener = TcpListener::bind(config.bind_address)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind_address))?;
    info!(address = %config.bind_address, "Listening for connections");

    let result = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal(streams.clone()))
    .await;

    match result {
        Ok(()) => {
            info!("Signstream daemon stopped cleanly");
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "Server stopped with error");
            streams.shutdown().await;
            Err(e).context("HTTP server failed")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn args(extra: &[&str]) -> Args {
        let mut argv = vec!["signstream-daemon"];
        argv.extend_from_slice(extra);
        Args::parse_from(argv)
    }

    #[test]
    fn test_cli_overrides_config_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[animation]\nfps = 24\n\n[server]\nbind_address = \"127.0.0.1:7000\"").unwrap();
        let path = file.path().to_str().unwrap().to_string();

        let config = build_config(&args(&["--config", &path, "--fps", "60"])).unwrap();
        assert_eq!(config.fps, 60);
        assert_eq!(config.bind_address, "127.0.0.1:7000".parse::<SocketAddr>().unwrap());
        assert_eq!(config.config_file_path.as_deref(), Some(file.path()));
    }

    #[test]
    fn test_out_of_range_override_is_rejected() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let path = file.path().to_str().unwrap().to_string();

        assert!(build_config(&args(&["--config", &path, "--fps", "0"])).is_err());
    }

    #[test]
    fn test_malformed_config_file_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[animation\nfps = ").unwrap();
        let path = file.path().to_str().unwrap().to_string();

        assert!(build_config(&args(&["--config", &path])).is_err());
    }
}
