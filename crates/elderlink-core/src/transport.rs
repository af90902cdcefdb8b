use anyhow::{Context, Result, bail};
use elderlink::wire::Envelope;
use futures_util::{SinkExt, StreamExt};
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Exponential backoff between reconnect attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub initial: Duration,
    pub multiplier: u32,
    pub max: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(5),
            multiplier: 2,
            max: Duration::from_secs(300),
        }
    }
}

impl ReconnectPolicy {
    /// `min(initial * multiplier^attempt, max)`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.multiplier
            .checked_pow(attempt)
            .and_then(|factor| self.initial.checked_mul(factor))
            .map_or(self.max, |d| d.min(self.max))
    }
}

/// Configuration for the relay connection.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub relay_url: String,
    pub elder_id: String,
    pub reconnect: ReconnectPolicy,
    pub ping_interval: Duration,
    /// Session fails if nothing at all arrives for this long.
    pub liveness_timeout: Duration,
}

impl RelayConfig {
    pub fn new(relay_url: impl Into<String>, elder_id: impl Into<String>) -> Self {
        let ping_interval = Duration::from_secs(30);
        Self {
            relay_url: relay_url.into(),
            elder_id: elder_id.into(),
            reconnect: ReconnectPolicy::default(),
            ping_interval,
            liveness_timeout: ping_interval * 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Reconnecting => "reconnecting",
        };
        f.write_str(s)
    }
}

/// Anything that can put an envelope on the relay.
pub trait EnvelopeSink: Send + Sync {
    /// Queue an envelope for sending. Returns false if it cannot be sent now.
    fn send(&self, envelope: &Envelope) -> bool;

    fn is_connected(&self) -> bool;
}

/// Build `<relay_url>?deviceId=<elder_id>&type=elder`.
pub fn relay_endpoint(relay_url: &str, elder_id: &str) -> Result<Url> {
    let mut url =
        Url::parse(relay_url).with_context(|| format!("invalid relay url: {relay_url}"))?;
    if !matches!(url.scheme(), "ws" | "wss") {
        bail!("relay url must use ws:// or wss://, got {relay_url}");
    }
    url.query_pairs_mut()
        .append_pair("deviceId", elder_id)
        .append_pair("type", "elder");
    Ok(url)
}

enum SessionEnd {
    /// Deliberate disconnect or the inbound consumer went away.
    Shutdown,
    /// The relay closed the socket.
    Closed,
}

/// Owns the single WebSocket to the relay.
///
/// Inbound text frames from every session are merged into `incoming`.
/// Outbound sends only succeed while connected and are never buffered
/// across reconnects.
pub struct ConnectionManager {
    config: RelayConfig,
    endpoint: Url,
    state_tx: watch::Sender<ConnectionState>,
    /// Sender into the current session's writer, present only while connected.
    outbound: Mutex<Option<mpsc::Sender<String>>>,
    /// Cancellation for the running connection loop, if any.
    session: Mutex<Option<CancellationToken>>,
    incoming_tx: mpsc::Sender<String>,
    /// Receiver for raw inbound text frames.
    pub incoming: tokio::sync::Mutex<mpsc::Receiver<String>>,
}

impl ConnectionManager {
    pub fn new(config: RelayConfig) -> Result<Arc<Self>> {
        let endpoint = relay_endpoint(&config.relay_url, &config.elder_id)?;
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        let (incoming_tx, incoming_rx) = mpsc::channel(256);
        Ok(Arc::new(Self {
            config,
            endpoint,
            state_tx,
            outbound: Mutex::new(None),
            session: Mutex::new(None),
            incoming_tx,
            incoming: tokio::sync::Mutex::new(incoming_rx),
        }))
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    pub fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    /// Connection-state signal. The current value is observable immediately.
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    /// Start the connection loop. No-op while a loop is already running.
    pub fn connect(self: &Arc<Self>) {
        let mut session = lock(&self.session);
        if session.as_ref().is_some_and(|t| !t.is_cancelled()) {
            tracing::debug!("relay connection already active");
            return;
        }
        let token = CancellationToken::new();
        *session = Some(token.clone());
        drop(session);

        self.set_state(&token, ConnectionState::Connecting);
        tokio::spawn(connection_loop(self.clone(), token));
    }

    /// Close deliberately and stop reconnecting.
    pub fn disconnect(&self) {
        if let Some(token) = lock(&self.session).take() {
            token.cancel();
        }
        lock(&self.outbound).take();
        self.state_tx.send_replace(ConnectionState::Disconnected);
        tracing::info!("relay connection closed by request");
    }

    /// Hand an encoded envelope to the current session.
    pub fn send_text(&self, text: String) -> bool {
        if self.state() != ConnectionState::Connected {
            return false;
        }
        match lock(&self.outbound).as_ref() {
            Some(tx) => tx.try_send(text).is_ok(),
            None => false,
        }
    }

    /// Update the state unless this loop has been superseded by a disconnect.
    fn set_state(&self, token: &CancellationToken, state: ConnectionState) {
        if token.is_cancelled() {
            return;
        }
        let previous = self.state_tx.send_replace(state);
        if previous != state {
            tracing::debug!(from = %previous, to = %state, "relay connection state");
        }
    }
}

impl EnvelopeSink for ConnectionManager {
    fn send(&self, envelope: &Envelope) -> bool {
        match envelope.encode() {
            Ok(text) => self.send_text(text),
            Err(e) => {
                tracing::warn!(kind = %envelope.kind, err = %e, "failed to encode envelope");
                false
            }
        }
    }

    fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

async fn connection_loop(manager: Arc<ConnectionManager>, token: CancellationToken) {
    let mut attempt: u32 = 0;
    loop {
        manager.set_state(&token, ConnectionState::Connecting);
        let result = run_session(&manager, &token, &mut attempt).await;
        lock(&manager.outbound).take();

        match result {
            Ok(SessionEnd::Shutdown) => break,
            Ok(SessionEnd::Closed) => {
                tracing::warn!(url = %manager.config.relay_url, "relay closed the connection");
            }
            Err(e) => {
                tracing::warn!(url = %manager.config.relay_url, err = %e, "relay session failed");
            }
        }
        if token.is_cancelled() {
            break;
        }

        let delay = manager.config.reconnect.delay_for(attempt);
        attempt = attempt.saturating_add(1);
        manager.set_state(&token, ConnectionState::Reconnecting);
        tracing::info!(attempt, delay_ms = delay.as_millis() as u64, "scheduling relay reconnect");

        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = token.cancelled() => break,
        }
    }
    // Natural exits leave the state settled and let a later connect() start over.
    manager.set_state(&token, ConnectionState::Disconnected);
    token.cancel();
    tracing::debug!("relay connection loop stopped");
}

async fn run_session(
    manager: &ConnectionManager,
    token: &CancellationToken,
    attempt: &mut u32,
) -> Result<SessionEnd> {
    let config = &manager.config;

    let ws = tokio::select! {
        r = tokio_tungstenite::connect_async(manager.endpoint.as_str()) => {
            r.context("connect to relay")?.0
        }
        _ = token.cancelled() => return Ok(SessionEnd::Shutdown),
    };
    let (mut sink, mut stream) = ws.split();

    // Fresh channel per session so nothing queued earlier leaks into this one.
    let (send_tx, mut send_rx) = mpsc::channel::<String>(256);
    *lock(&manager.outbound) = Some(send_tx);
    *attempt = 0;
    manager.set_state(token, ConnectionState::Connected);
    tracing::info!(url = %config.relay_url, elder_id = %config.elder_id, "connected to relay");

    let mut ping = tokio::time::interval_at(
        Instant::now() + config.ping_interval,
        config.ping_interval,
    );
    let mut last_seen = Instant::now();

    loop {
        tokio::select! {
            _ = token.cancelled() => {
                let frame = CloseFrame {
                    code: CloseCode::Normal,
                    reason: "client disconnect".into(),
                };
                let _ = sink.send(Message::Close(Some(frame))).await;
                return Ok(SessionEnd::Shutdown);
            }
            _ = ping.tick() => {
                sink.send(Message::Ping(Vec::new())).await.context("send ping")?;
            }
            _ = tokio::time::sleep_until(last_seen + config.liveness_timeout) => {
                bail!("no frames from relay for {:?}", config.liveness_timeout);
            }
            frame = stream.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        last_seen = Instant::now();
                        if manager.incoming_tx.send(text).await.is_err() {
                            return Ok(SessionEnd::Shutdown);
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        tracing::debug!(?frame, "relay sent close");
                        return Ok(SessionEnd::Closed);
                    }
                    Some(Ok(_)) => last_seen = Instant::now(),
                    Some(Err(e)) => bail!("relay stream error: {e}"),
                    None => return Ok(SessionEnd::Closed),
                }
            }
            Some(text) = send_rx.recv() => {
                sink.send(Message::Text(text)).await.context("write frame")?;
            }
        }
    }
}
