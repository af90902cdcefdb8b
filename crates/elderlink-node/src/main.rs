use anyhow::{Context, Result};
use clap::Parser;
use elderlink::client::resolve_socket_path;
use elderlink_core::state_dir::StateDir;
use elderlink_core::transport::{ConnectionManager, RelayConfig};
use elderlink_node::device::SysfsBattery;
use elderlink_node::handler::ElderState;
use elderlink_node::monitor::{MonitorConfig, MonitoringService};
use elderlink_node::shell::LogShell;
use elderlink_node::socket;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about = "elderlink guardian relay daemon")]
struct Args {
    /// Path to the Unix control socket.
    #[arg(long)]
    socket: Option<PathBuf>,

    /// State directory for elder data.
    #[arg(long)]
    state_dir: Option<PathBuf>,

    /// Relay WebSocket URL (ws:// or wss://).
    #[arg(long, default_value = elderlink::DEFAULT_RELAY_URL)]
    relay_url: String,

    /// Seconds between battery checks.
    #[arg(long, default_value_t = 30 * 60)]
    battery_interval_secs: u64,

    /// Elder's display name, stored in the profile.
    #[arg(long)]
    elder_name: Option<String>,

    /// Elder's age, stored in the profile.
    #[arg(long)]
    elder_age: Option<u32>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "elderlink_node=info,elderlink_core=info".into()),
        )
        .init();

    let args = Args::parse();

    let state_dir = StateDir::locate(args.state_dir).context("failed to determine state directory")?;
    let socket_path = resolve_socket_path(args.socket);

    let state = ElderState::open(
        &state_dir,
        Arc::new(SysfsBattery::discover()),
        Arc::new(LogShell),
    )?;
    if args.elder_name.is_some() || args.elder_age.is_some() {
        state
            .profile
            .lock()
            .await
            .update(args.elder_name, args.elder_age)
            .context("failed to update profile")?;
    }
    tracing::info!(elder_id = %state.elder_id(), "elder identity loaded");

    let connection = ConnectionManager::new(RelayConfig::new(&args.relay_url, state.elder_id()))
        .context("invalid relay configuration")?;
    let config = MonitorConfig {
        battery_check_interval: Duration::from_secs(args.battery_interval_secs.max(1)),
        ..MonitorConfig::default()
    };
    let monitor = MonitoringService::new(state, connection, config);
    monitor.start();

    tokio::select! {
        result = socket::serve(monitor.clone(), &socket_path) => {
            result.context("socket server failed")?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("received SIGINT, shutting down");
        }
        _ = monitor.stopped() => {
            tracing::info!("monitoring ended, shutting down");
        }
    }

    let flushed = monitor.settle_fanout().await;
    tracing::debug!(flushed, "pending medication pushes settled");
    monitor.stop();
    std::fs::remove_file(&socket_path).ok();
    tracing::info!("elderlink-node shut down");
    Ok(())
}
