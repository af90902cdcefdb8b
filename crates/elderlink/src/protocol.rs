//! Local control API spoken over the daemon's Unix socket.
//!
//! Other on-device subsystems (fall detector, launcher UI, intent classifier)
//! use this to raise alerts and report medication changes without touching
//! the relay connection themselves.

use crate::payloads::{AlertKind, DoseAction, MedicationAction, MedicationSchedulePayload};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Maximum size of a JSON-lines frame on the Unix socket (64 KiB).
pub const MAX_LINE_BYTES: usize = 64 * 1024;

// ---------------------------------------------------------------------------
// Request
// ---------------------------------------------------------------------------

/// A request sent from a local subsystem to the daemon over the Unix socket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    /// Identity, connection state and paired guardians.
    Status,

    // -- Alerts --
    TriggerSos {
        #[serde(default)]
        latitude: Option<f64>,
        #[serde(default)]
        longitude: Option<f64>,
    },
    TriggerFall {
        #[serde(default)]
        latitude: Option<f64>,
        #[serde(default)]
        longitude: Option<f64>,
    },
    TriggerMissedMedication {
        medication_name: String,
        scheduled_time: String,
    },
    TriggerLowBattery {
        battery_level: i32,
    },
    TriggerInactivity {
        hours: u32,
    },
    ResolveAlert {
        alert_id: i64,
    },

    // -- Medications --
    /// Log what happened to a scheduled dose.
    RecordDose {
        medication_id: i64,
        #[serde(default)]
        schedule_id: Option<i64>,
        action: DoseAction,
        #[serde(default)]
        scheduled_at_ms: Option<u64>,
    },
    /// Create a medication from the local UI and tell guardians. Schedules
    /// have the relay's shape: `time`, `daysOfWeek` (0 = Sunday), `enabled`.
    AddMedication {
        name: String,
        #[serde(default)]
        dosage: String,
        #[serde(default)]
        instructions: String,
        schedules: Vec<MedicationSchedulePayload>,
    },
    /// Edit a medication from the local UI. Omitted fields are kept.
    UpdateMedication {
        medication_id: i64,
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        dosage: Option<String>,
        #[serde(default)]
        instructions: Option<String>,
        #[serde(default)]
        schedules: Option<Vec<MedicationSchedulePayload>>,
    },
    /// A medication was changed through the local UI; tell guardians.
    MedicationChanged {
        medication_id: i64,
        action: MedicationAction,
    },

    // -- Health --
    /// Store the elder's daily check-in. `date` defaults to today.
    RecordCheckIn {
        #[serde(default)]
        date: Option<NaiveDate>,
        #[serde(default)]
        mood: Option<u8>,
        #[serde(default)]
        pain_level: Option<u8>,
        #[serde(default)]
        sleep_quality: Option<u8>,
        #[serde(default)]
        symptoms: Vec<String>,
        #[serde(default)]
        notes: String,
    },

    /// Stop the daemon.
    Shutdown,
}

// ---------------------------------------------------------------------------
// Response
// ---------------------------------------------------------------------------

/// A response sent from the daemon to a local client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    /// Connection established.
    Hello { elder_id: String, version: String },
    /// Request succeeded with optional data.
    Ok { data: Option<serde_json::Value> },
    /// Request failed.
    Error { code: String, message: String },
    /// Asynchronous event.
    Event { event: Event },
}

// ---------------------------------------------------------------------------
// Event
// ---------------------------------------------------------------------------

/// How insistently the shell should surface a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Importance {
    Max,
    High,
    Default,
    Low,
}

/// Asynchronous events pushed to connected clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Event {
    /// A guardian asked for something to be shown on the device.
    Notification {
        title: String,
        body: String,
        importance: Importance,
        requires_acknowledgment: bool,
    },
    /// An alert was recorded and pushed.
    AlertRaised {
        alert_id: i64,
        alert_kind: AlertKind,
        delivered: usize,
    },
    /// The relay connection changed state.
    ConnectionChanged { state: String },
    /// The last guardian unpaired; relay monitoring has stopped.
    MonitoringStopped,
}

// ---------------------------------------------------------------------------
// Data types returned in Ok.data
// ---------------------------------------------------------------------------

/// Returned by the `Status` request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusInfo {
    pub elder_id: String,
    pub connection: String,
    pub monitoring: bool,
    pub guardians: Vec<GuardianInfo>,
    /// In display order.
    pub emergency_contacts: Vec<ContactInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContactInfo {
    pub contact_id: i64,
    pub name: String,
    pub phone_number: String,
    pub relationship: String,
    pub is_primary: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardianInfo {
    pub guardian_id: String,
    pub guardian_name: String,
    pub paired_at_ms: u64,
}

/// Returned by the local medication edits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MedicationNotice {
    pub medication_id: i64,
    /// Guardians the `medication_updated` push went to.
    pub notified: usize,
}

/// Returned by the alert trigger requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertRaisedInfo {
    pub alert_id: i64,
    pub delivered: usize,
}
