pub mod contacts;
pub mod control;
pub mod medication;
pub mod notification;
pub mod pairing;
pub mod queries;
pub mod views;

use crate::device::DeviceStatus;
use crate::error::CommandError;
use crate::shell::{Notification, UiShell};
use anyhow::{Context, Result};
use elderlink::protocol::{Event, Response};
use elderlink::wire::{Envelope, MessageType, build_response};
use elderlink_core::alerts::AlertLog;
use elderlink_core::checkins::CheckInStore;
use elderlink_core::contacts::ContactStore;
use elderlink_core::guardians::GuardianStore;
use elderlink_core::identity::ElderIdentity;
use elderlink_core::medications::MedicationStore;
use elderlink_core::profile::ProfileStore;
use elderlink_core::state_dir::StateDir;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::{Mutex, broadcast};

pub use control::handle_request;
pub use elderlink_core::time::now_ms;

/// Shared elder-side state used by relay handlers and local socket clients.
pub struct ElderState {
    pub identity: ElderIdentity,
    pub guardians: Mutex<GuardianStore>,
    pub alerts: Mutex<AlertLog>,
    pub medications: Mutex<MedicationStore>,
    pub contacts: Mutex<ContactStore>,
    pub checkins: Mutex<CheckInStore>,
    pub profile: Mutex<ProfileStore>,
    pub device: Arc<dyn DeviceStatus>,
    pub shell: Arc<dyn UiShell>,
    pub event_tx: broadcast::Sender<Event>,
}

impl ElderState {
    /// Prepare `state_dir`, then load identity and every store from it.
    pub fn open(
        state_dir: &Path,
        device: Arc<dyn DeviceStatus>,
        shell: Arc<dyn UiShell>,
    ) -> Result<Arc<Self>> {
        let dir = StateDir::open(state_dir)?;
        let state_dir = dir.path();
        let identity = ElderIdentity::load_or_create(&dir).context("failed to load identity")?;
        let (event_tx, _) = broadcast::channel(256);
        Ok(Arc::new(Self {
            identity,
            guardians: Mutex::new(
                GuardianStore::load(state_dir).context("failed to load guardians")?,
            ),
            alerts: Mutex::new(AlertLog::load(state_dir).context("failed to load alerts")?),
            medications: Mutex::new(
                MedicationStore::load(state_dir).context("failed to load medications")?,
            ),
            contacts: Mutex::new(
                ContactStore::load(state_dir).context("failed to load emergency contacts")?,
            ),
            checkins: Mutex::new(
                CheckInStore::load(state_dir).context("failed to load check-ins")?,
            ),
            profile: Mutex::new(ProfileStore::load(state_dir).context("failed to load profile")?),
            device,
            shell,
            event_tx,
        }))
    }

    pub fn elder_id(&self) -> &str {
        &self.identity.elder_id
    }

    /// Show a notification on the device and tell local clients about it.
    pub fn notify(&self, notification: Notification) {
        self.shell.show_notification(&notification);
        let _ = self.event_tx.send(Event::Notification {
            title: notification.title,
            body: notification.body,
            importance: notification.importance,
            requires_acknowledgment: notification.requires_acknowledgment,
        });
    }

    /// Publish an event to local socket clients. No subscribers is fine.
    pub fn publish(&self, event: Event) {
        let _ = self.event_tx.send(event);
    }
}

/// Turn a handler outcome into the single correlated reply.
pub fn reply<T: Serialize>(
    state: &ElderState,
    original: &Envelope,
    success_type: MessageType,
    outcome: Result<T, CommandError>,
) -> Envelope {
    let outcome = outcome
        .map_err(|e| e.to_string())
        .and_then(|payload| serde_json::to_value(payload).map_err(|e| e.to_string()));
    if let Err(message) = &outcome {
        tracing::info!(
            kind = %original.kind,
            request_id = %original.request_id,
            from = %original.from,
            err = %message,
            "guardian request refused"
        );
    }
    build_response(state.elder_id(), original, success_type, outcome)
}

pub fn ok_response(data: Option<serde_json::Value>) -> Response {
    Response::Ok { data }
}

pub fn error_response(code: &str, message: &str) -> Response {
    Response::Error {
        code: code.to_string(),
        message: message.to_string(),
    }
}
