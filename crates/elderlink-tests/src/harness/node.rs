use anyhow::{Context, Result};
use elderlink_core::transport::{ConnectionManager, ReconnectPolicy, RelayConfig};
use elderlink_node::device::ManualBattery;
use elderlink_node::handler::ElderState;
use elderlink_node::monitor::{MonitorConfig, MonitoringService};
use elderlink_node::shell::LogShell;
use elderlink_node::socket;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::oneshot;

/// Relay timings short enough for tests.
pub fn fast_relay_config(relay_url: &str, elder_id: &str) -> RelayConfig {
    RelayConfig {
        reconnect: ReconnectPolicy {
            initial: Duration::from_millis(50),
            multiplier: 2,
            max: Duration::from_millis(400),
        },
        ping_interval: Duration::from_secs(1),
        liveness_timeout: Duration::from_secs(10),
        ..RelayConfig::new(relay_url, elder_id)
    }
}

/// Battery checks stay out of the way unless a test asks for them.
pub fn quiet_monitor_config() -> MonitorConfig {
    MonitorConfig {
        battery_check_interval: Duration::from_secs(3600),
        ..MonitorConfig::default()
    }
}

/// An elder daemon with temp state, a hand-set battery and a control socket.
pub struct TestNode {
    pub monitor: Arc<MonitoringService>,
    pub state: Arc<ElderState>,
    pub battery: Arc<ManualBattery>,
    pub socket_path: PathBuf,
    pub elder_id: String,
    shutdown_tx: Option<oneshot::Sender<()>>,
    _state_dir: TempDir,
    _socket_dir: TempDir,
}

impl TestNode {
    /// Spawn a node connected to `relay_url` with battery checks effectively off.
    pub async fn spawn(relay_url: &str) -> Result<Self> {
        Self::spawn_with(relay_url, Some(80), quiet_monitor_config()).await
    }

    pub async fn spawn_with(
        relay_url: &str,
        battery_level: Option<u8>,
        config: MonitorConfig,
    ) -> Result<Self> {
        let state_dir = TempDir::new()?;
        let socket_dir = TempDir::new()?;
        let socket_path = socket_dir.path().join("elderlink.sock");

        let battery = Arc::new(ManualBattery::new(battery_level));
        let state = ElderState::open(state_dir.path(), battery.clone(), Arc::new(LogShell))
            .context("failed to open elder state")?;
        let elder_id = state.elder_id().to_string();

        let connection = ConnectionManager::new(fast_relay_config(relay_url, &elder_id))?;
        let monitor = MonitoringService::new(state.clone(), connection, config);
        monitor.start();

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let monitor_for_socket = monitor.clone();
        let socket_path_clone = socket_path.clone();
        tokio::spawn(async move {
            tokio::select! {
                result = socket::serve(monitor_for_socket, &socket_path_clone) => {
                    if let Err(e) = result {
                        tracing::debug!(err = %e, "socket server stopped");
                    }
                }
                _ = shutdown_rx => {
                    tracing::debug!("node shutdown signal received");
                }
            }
        });

        for _ in 0..50 {
            if socket_path.exists() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        Ok(Self {
            monitor,
            state,
            battery,
            socket_path,
            elder_id,
            shutdown_tx: Some(shutdown_tx),
            _state_dir: state_dir,
            _socket_dir: socket_dir,
        })
    }
}

impl Drop for TestNode {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        self.monitor.stop();
        std::fs::remove_file(&self.socket_path).ok();
    }
}
