use anyhow::{Context, Result, bail};
use elderlink::wire::{Envelope, MessageType};
use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};

#[derive(Default)]
struct Shared {
    connections: usize,
    last_query: Option<String>,
    to_elder: Option<mpsc::UnboundedSender<Message>>,
}

/// A relay stand-in on a random port. It accepts the elder's WebSocket, plays
/// the guardian side, and records everything the elder sends.
pub struct MockRelay {
    pub addr: SocketAddr,
    shared: Arc<Mutex<Shared>>,
    from_elder: tokio::sync::Mutex<mpsc::UnboundedReceiver<String>>,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl MockRelay {
    pub async fn spawn() -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let shared = Arc::new(Mutex::new(Shared::default()));
        let (from_tx, from_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();

        let accept_shared = shared.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    accepted = listener.accept() => {
                        let Ok((stream, _)) = accepted else { break };
                        tokio::spawn(serve_elder(stream, accept_shared.clone(), from_tx.clone()));
                    }
                    _ = &mut shutdown_rx => {
                        tracing::debug!("mock relay shutting down");
                        break;
                    }
                }
            }
        });

        Ok(Self {
            addr,
            shared,
            from_elder: tokio::sync::Mutex::new(from_rx),
            shutdown_tx: Some(shutdown_tx),
        })
    }

    /// URL the elder should be configured with.
    pub fn url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    /// Number of WebSocket handshakes accepted so far.
    pub fn connections(&self) -> usize {
        self.shared.lock().unwrap().connections
    }

    /// Query string of the most recent handshake.
    pub fn last_query(&self) -> Option<String> {
        self.shared.lock().unwrap().last_query.clone()
    }

    /// Wait until at least `count` handshakes have been accepted.
    pub async fn wait_for_connections(&self, count: usize, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        while self.connections() < count {
            if Instant::now() >= deadline {
                bail!("expected {count} connections, saw {}", self.connections());
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        Ok(())
    }

    /// Deliver an envelope to the elder as if a guardian sent it.
    pub fn send_to_elder(&self, envelope: &Envelope) -> Result<()> {
        self.send_raw(envelope.encode()?)
    }

    /// Deliver a raw text frame to the elder.
    pub fn send_raw(&self, text: impl Into<String>) -> Result<()> {
        let shared = self.shared.lock().unwrap();
        let tx = shared.to_elder.as_ref().context("no elder connected")?;
        tx.send(Message::Text(text.into()))
            .map_err(|_| anyhow::anyhow!("elder connection closed"))
    }

    /// Close the elder's socket from the relay side.
    pub fn drop_elder(&self) -> Result<()> {
        let tx = self
            .shared
            .lock()
            .unwrap()
            .to_elder
            .take()
            .context("no elder connected")?;
        tx.send(Message::Close(None))
            .map_err(|_| anyhow::anyhow!("elder connection already closed"))
    }

    /// Next envelope the elder sent, whatever its type.
    pub async fn next_from_elder(&self, timeout: Duration) -> Result<Envelope> {
        let mut rx = self.from_elder.lock().await;
        let text = tokio::time::timeout(timeout, rx.recv())
            .await
            .context("timed out waiting for a frame from the elder")?
            .context("relay stopped")?;
        Envelope::decode(&text).with_context(|| format!("elder sent an invalid frame: {text}"))
    }

    /// Next envelope of `kind`, discarding anything else on the way.
    pub async fn next_of_type(&self, kind: MessageType, timeout: Duration) -> Result<Envelope> {
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let env = self
                .next_from_elder(remaining)
                .await
                .with_context(|| format!("waiting for {kind}"))?;
            if env.message_type() == Some(kind) {
                return Ok(env);
            }
        }
    }

    /// Send a guardian request and wait for the reply carrying its request id.
    /// Pushes that arrive in between are discarded.
    pub async fn ask(&self, request: &Envelope, timeout: Duration) -> Result<Envelope> {
        self.send_to_elder(request)?;
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let env = self
                .next_from_elder(remaining)
                .await
                .with_context(|| format!("waiting for reply to {}", request.request_id))?;
            if env.request_id == request.request_id {
                return Ok(env);
            }
        }
    }

    /// Everything the elder sends during `window`.
    pub async fn collect_for(&self, window: Duration) -> Vec<Envelope> {
        let deadline = Instant::now() + window;
        let mut rx = self.from_elder.lock().await;
        let mut out = Vec::new();
        while let Ok(Some(text)) = tokio::time::timeout_at(deadline, rx.recv()).await {
            if let Ok(env) = Envelope::decode(&text) {
                out.push(env);
            }
        }
        out
    }
}

impl Drop for MockRelay {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(tx) = self.shared.lock().unwrap().to_elder.take() {
            let _ = tx.send(Message::Close(None));
        }
    }
}

async fn serve_elder(
    stream: TcpStream,
    shared: Arc<Mutex<Shared>>,
    from_elder: mpsc::UnboundedSender<String>,
) {
    let handshake_shared = shared.clone();
    let callback = move |req: &Request, resp: Response| {
        handshake_shared.lock().unwrap().last_query = req.uri().query().map(str::to_string);
        Ok::<Response, ErrorResponse>(resp)
    };
    let ws = match tokio_tungstenite::accept_hdr_async(stream, callback).await {
        Ok(ws) => ws,
        Err(e) => {
            tracing::debug!(err = %e, "mock relay handshake failed");
            return;
        }
    };
    let (mut sink, mut stream) = ws.split();

    let (tx, mut rx) = mpsc::unbounded_channel();
    {
        let mut shared = shared.lock().unwrap();
        shared.connections += 1;
        shared.to_elder = Some(tx);
    }

    let ack = Envelope::new(MessageType::ConnectionAck, "relay", "", "", None);
    if let Ok(text) = ack.encode() {
        let _ = sink.send(Message::Text(text)).await;
    }

    loop {
        tokio::select! {
            out = rx.recv() => {
                let Some(msg) = out else { break };
                let closing = matches!(msg, Message::Close(_));
                if sink.send(msg).await.is_err() || closing {
                    break;
                }
            }
            frame = stream.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    let _ = from_elder.send(text);
                }
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }
    tracing::debug!("mock relay connection closed");
}
