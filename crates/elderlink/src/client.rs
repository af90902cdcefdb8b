use crate::protocol::{
    AlertRaisedInfo, Event, MAX_LINE_BYTES, MedicationNotice, Request, Response, StatusInfo,
};
use anyhow::{Context, Result, anyhow, bail};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::net::UnixStream;
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec};

const SOCKET_ENV: &str = "ELDERLINK_SOCKET";

/// The daemon answered with `Response::Error`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message} ({code})")]
pub struct DaemonError {
    pub code: String,
    pub message: String,
}

#[derive(Deserialize)]
struct DoseRecorded {
    dose_id: i64,
}

#[derive(Deserialize)]
struct CheckInRecorded {
    check_in_id: i64,
}

/// Line-delimited JSON connection to the elder daemon's control socket.
///
/// Events the daemon pushes between replies are skipped by the typed calls;
/// use [`ElderClient::next_event`] to wait for one.
pub struct ElderClient {
    lines_in: FramedRead<OwnedReadHalf, LinesCodec>,
    lines_out: FramedWrite<OwnedWriteHalf, LinesCodec>,
    elder_id: String,
}

impl ElderClient {
    /// Connect and wait for the daemon's `Hello`.
    pub async fn connect(socket_path: &Path) -> Result<Self> {
        let stream = UnixStream::connect(socket_path)
            .await
            .with_context(|| format!("failed to connect to {}", socket_path.display()))?;
        let (r, w) = stream.into_split();
        let mut client = Self {
            lines_in: FramedRead::new(r, LinesCodec::new_with_max_length(MAX_LINE_BYTES)),
            lines_out: FramedWrite::new(w, LinesCodec::new_with_max_length(MAX_LINE_BYTES)),
            elder_id: String::new(),
        };
        match client.next_response().await? {
            Response::Hello { elder_id, .. } => client.elder_id = elder_id,
            other => bail!("daemon greeted with {other:?} instead of hello"),
        }
        Ok(client)
    }

    pub fn elder_id(&self) -> &str {
        &self.elder_id
    }

    pub async fn send(&mut self, req: &Request) -> Result<()> {
        let line = serde_json::to_string(req)?;
        self.lines_out.send(line).await?;
        Ok(())
    }

    /// Next line from the daemon, reply or event.
    pub async fn next_response(&mut self) -> Result<Response> {
        let Some(line) = self.lines_in.next().await else {
            bail!("daemon disconnected");
        };
        Ok(serde_json::from_str(&line?)?)
    }

    /// Send `req` and return its `Ok` or `Error` reply.
    pub async fn round_trip(&mut self, req: &Request) -> Result<Response> {
        self.send(req).await?;
        loop {
            match self.next_response().await? {
                Response::Hello { .. } | Response::Event { .. } => continue,
                reply => return Ok(reply),
            }
        }
    }

    /// Send `req` and return the data of an `Ok` reply. An `Error` reply
    /// becomes a [`DaemonError`].
    pub async fn call(&mut self, req: &Request) -> Result<Option<serde_json::Value>> {
        match self.round_trip(req).await? {
            Response::Ok { data } => Ok(data),
            Response::Error { code, message } => Err(DaemonError { code, message }.into()),
            other => Err(anyhow!("unexpected reply {other:?}")),
        }
    }

    async fn call_for<T: DeserializeOwned>(&mut self, req: &Request) -> Result<T> {
        let data = self.call(req).await?.context("reply carried no data")?;
        Ok(serde_json::from_value(data)?)
    }

    pub async fn status(&mut self) -> Result<StatusInfo> {
        self.call_for(&Request::Status).await
    }

    /// Raise any of the `Trigger*` alerts.
    pub async fn raise(&mut self, trigger: &Request) -> Result<AlertRaisedInfo> {
        self.call_for(trigger).await
    }

    pub async fn resolve_alert(&mut self, alert_id: i64) -> Result<()> {
        self.call(&Request::ResolveAlert { alert_id }).await?;
        Ok(())
    }

    /// Add, update or announce a medication; the reply says how many
    /// guardians were told.
    pub async fn edit_medication(&mut self, edit: &Request) -> Result<MedicationNotice> {
        self.call_for(edit).await
    }

    /// Returns the new dose log id.
    pub async fn record_dose(&mut self, dose: &Request) -> Result<i64> {
        let recorded: DoseRecorded = self.call_for(dose).await?;
        Ok(recorded.dose_id)
    }

    /// Returns the new check-in id.
    pub async fn record_check_in(&mut self, check_in: &Request) -> Result<i64> {
        let recorded: CheckInRecorded = self.call_for(check_in).await?;
        Ok(recorded.check_in_id)
    }

    /// Wait up to `timeout` for an event matching `pred`, dropping others.
    pub async fn next_event<F>(&mut self, timeout: Duration, mut pred: F) -> Result<Event>
    where
        F: FnMut(&Event) -> bool,
    {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            match tokio::time::timeout_at(deadline, self.next_response()).await {
                Ok(Ok(Response::Event { event })) if pred(&event) => return Ok(event),
                Ok(Ok(_)) => continue,
                Ok(Err(e)) => return Err(e),
                Err(_) => bail!("no matching event within {timeout:?}"),
            }
        }
    }
}

/// Control socket location: `explicit` if given, then `$ELDERLINK_SOCKET`,
/// then `$XDG_RUNTIME_DIR/elderlink/elderlink.sock`, then a per-user dir in `/tmp`.
pub fn resolve_socket_path(explicit: Option<PathBuf>) -> PathBuf {
    if let Some(path) = explicit {
        return path;
    }
    if let Some(path) = std::env::var_os(SOCKET_ENV) {
        return PathBuf::from(path);
    }
    match std::env::var_os("XDG_RUNTIME_DIR") {
        Some(runtime) => PathBuf::from(runtime).join("elderlink/elderlink.sock"),
        None => {
            let uid = unsafe { libc::getuid() };
            PathBuf::from(format!("/tmp/elderlink-{uid}/elderlink.sock"))
        }
    }
}
