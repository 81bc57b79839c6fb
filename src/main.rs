//! roomcast: room-based WebSocket message router.

#![deny(unsafe_code)]

mod telemetry;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use roomcast_core::TracingEventSink;
use roomcast_server::{
    ConfigFn, RoomcastServer, ServerConfig, with_host, with_path, with_port,
    with_send_queue_capacity, with_send_timeout, with_session_cookie, with_shutdown_timeout,
};
use roomcast_settings::{RoomcastSettings, ServerSettings};

#[derive(Debug, Parser)]
#[command(name = "roomcast", version, about = "Room-based WebSocket message router")]
struct Args {
    /// Settings file (default `~/.roomcast/settings.json`).
    #[arg(long)]
    config: Option<PathBuf>,
    /// Bind host.
    #[arg(long)]
    host: Option<String>,
    /// Bind port.
    #[arg(long)]
    port: Option<u16>,
    /// WebSocket endpoint path.
    #[arg(long)]
    path: Option<String>,
    /// Cookie carrying the session id.
    #[arg(long)]
    session_cookie: Option<String>,
}

/// Settings first, then command-line flags.
fn server_configs(settings: &ServerSettings, args: &Args) -> Vec<ConfigFn> {
    let max_message_size = settings.max_message_size;
    let ping_interval_secs = settings.ping_interval_secs;
    let mut configs = vec![
        with_host(settings.host.clone()),
        with_port(settings.port),
        with_path(settings.path.clone()),
        with_send_timeout(Duration::from_millis(settings.send_timeout_ms)),
        with_send_queue_capacity(settings.send_queue_capacity),
        with_shutdown_timeout(Duration::from_millis(settings.shutdown_timeout_ms)),
        Box::new(move |c: &mut ServerConfig| {
            c.max_message_size = max_message_size;
            c.ping_interval_secs = ping_interval_secs;
        }),
    ];
    if let Some(cookie) = &settings.session_cookie {
        configs.push(with_session_cookie(cookie.clone()));
    }

    if let Some(host) = &args.host {
        configs.push(with_host(host.clone()));
    }
    if let Some(port) = args.port {
        configs.push(with_port(port));
    }
    if let Some(path) = &args.path {
        configs.push(with_path(path.clone()));
    }
    if let Some(cookie) = &args.session_cookie {
        configs.push(with_session_cookie(cookie.clone()));
    }
    configs
}

fn load(args: &Args) -> anyhow::Result<RoomcastSettings> {
    let settings = match &args.config {
        Some(path) => roomcast_settings::load_settings_from_path(path)
            .with_context(|| format!("loading settings from {}", path.display()))?,
        None => roomcast_settings::load_settings().context("loading settings")?,
    };
    Ok(settings)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let settings = load(&args)?;

    telemetry::init_logging(&settings.logging.level, settings.logging.json)
        .context("initializing logging")?;
    tracing::info!("starting roomcast");

    let server = RoomcastServer::new(
        Arc::new(TracingEventSink),
        server_configs(&settings.server, &args),
    )?;
    let server = match roomcast_server::metrics::install_recorder() {
        Ok(handle) => server.with_metrics(handle),
        Err(error) => {
            tracing::warn!(error = %error, "metrics recorder unavailable, /metrics disabled");
            server
        }
    };
    let server = Arc::new(server);

    let (addr, handle) = server.listen().await?;
    tracing::info!(addr = %addr, "roomcast ready");

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result.context("listening for ctrl-c")?;
            tracing::info!("shutting down");
            server.stop().await?;
        }
        joined = handle => {
            joined.context("server task panicked")??;
        }
    }
    Ok(())
}
