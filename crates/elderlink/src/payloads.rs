//! Typed payloads carried inside [`crate::wire::Envelope`].
//!
//! Field names are camelCase on the wire. Record ids travel as strings.

use crate::days::ALL_WIRE_DAYS;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// ---------------------------------------------------------------------------
// Shared enums
// ---------------------------------------------------------------------------

/// The closed set of alert kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertKind {
    Sos,
    Fall,
    MissedMed,
    LowBattery,
    Inactivity,
}

impl fmt::Display for AlertKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AlertKind::Sos => "SOS",
            AlertKind::Fall => "FALL",
            AlertKind::MissedMed => "MISSED_MED",
            AlertKind::LowBattery => "LOW_BATTERY",
            AlertKind::Inactivity => "INACTIVITY",
        };
        f.write_str(s)
    }
}

/// What happened to a scheduled dose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DoseAction {
    Taken,
    Skipped,
    Snoozed,
    Missed,
}

impl fmt::Display for DoseAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DoseAction::Taken => "taken",
            DoseAction::Skipped => "skipped",
            DoseAction::Snoozed => "snoozed",
            DoseAction::Missed => "missed",
        };
        f.write_str(s)
    }
}

/// Change reported in a `medication_updated` push.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MedicationAction {
    Added,
    Updated,
    Deleted,
}

// ---------------------------------------------------------------------------
// Query responses
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateResponsePayload {
    pub elder: ElderInfo,
    pub recent_alerts: Vec<AlertInfo>,
    pub medication_summary: MedicationSummary,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElderInfo {
    pub name: String,
    pub age: Option<u32>,
    pub battery_level: i32,
    pub last_heartbeat: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LocationInfo {
    pub latitude: f64,
    pub longitude: f64,
}

/// One alert as guardians see it. Also the payload of `alert_event`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertInfo {
    pub id: String,
    pub elder_id: String,
    #[serde(rename = "type")]
    pub kind: AlertKind,
    pub triggered_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<LocationInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub battery_level: Option<i32>,
    pub resolved: bool,
    pub notes: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MedicationSummary {
    pub today_total: u32,
    pub taken_today: u32,
    pub missed_today: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MedicationsResponsePayload {
    pub medications: Vec<MedicationInfo>,
    pub schedules: Vec<ScheduleInfo>,
    pub logs: Vec<MedicationLogInfo>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MedicationInfo {
    pub id: String,
    pub name: String,
    pub dosage: String,
    pub instructions: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleInfo {
    pub id: String,
    pub medication_id: String,
    /// `HH:MM`, zero padded.
    pub time: String,
    /// 0 = Sunday .. 6 = Saturday.
    pub days_of_week: Vec<i32>,
    pub enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MedicationLogInfo {
    pub id: String,
    pub medication_id: String,
    pub schedule_id: String,
    pub scheduled_time: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub taken_at: Option<String>,
    pub status: DoseAction,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertHistoryResponsePayload {
    pub alerts: Vec<AlertInfo>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthHistoryResponsePayload {
    pub check_ins: Vec<HealthCheckInInfo>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthCheckInInfo {
    pub id: String,
    pub elder_id: String,
    /// `YYYY-MM-DD`.
    pub date: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mood: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pain_level: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sleep_quality: Option<u8>,
    pub symptoms: Vec<String>,
    pub notes: String,
}

// ---------------------------------------------------------------------------
// Pushes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MedicationUpdatedPayload {
    pub elder_id: String,
    pub action: MedicationAction,
    pub medication: MedicationInfo,
    #[serde(default)]
    pub schedules: Vec<ScheduleInfo>,
}

// ---------------------------------------------------------------------------
// Pairing events
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GuardianPairedPayload {
    pub guardian_id: String,
    pub guardian_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GuardianUnpairedPayload {
    pub guardian_id: String,
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MedicationSchedulePayload {
    /// `HH:MM`. Unparsable components read as 0.
    pub time: String,
    #[serde(default = "all_wire_days")]
    pub days_of_week: Vec<i32>,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddMedicationPayload {
    pub name: String,
    pub dosage: String,
    pub instructions: String,
    #[serde(default)]
    pub schedules: Vec<MedicationSchedulePayload>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateMedicationPayload {
    #[serde(deserialize_with = "string_or_number")]
    pub medication_id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub dosage: Option<String>,
    #[serde(default)]
    pub instructions: Option<String>,
    #[serde(default)]
    pub schedules: Option<Vec<MedicationSchedulePayload>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteMedicationPayload {
    #[serde(deserialize_with = "string_or_number")]
    pub medication_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateEmergencyContactPayload {
    #[serde(default, deserialize_with = "opt_string_or_number")]
    pub contact_id: Option<String>,
    pub name: String,
    pub phone_number: String,
    #[serde(default)]
    pub relationship: String,
    #[serde(default)]
    pub is_primary: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteEmergencyContactPayload {
    #[serde(deserialize_with = "string_or_number")]
    pub contact_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendReminderPayload {
    pub title: String,
    pub message: String,
    #[serde(default = "default_priority")]
    pub priority: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessagePayload {
    pub guardian_name: String,
    pub message: String,
    #[serde(default)]
    pub requires_acknowledgment: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSuccessPayload {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<BTreeMap<String, String>>,
}

impl CommandSuccessPayload {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            data: None,
        }
    }

    pub fn with(mut self, key: &str, value: impl ToString) -> Self {
        self.data
            .get_or_insert_with(BTreeMap::new)
            .insert(key.to_string(), value.to_string());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandErrorPayload {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

// ---------------------------------------------------------------------------
// serde helpers
// ---------------------------------------------------------------------------

fn all_wire_days() -> Vec<i32> {
    ALL_WIRE_DAYS.to_vec()
}

fn default_true() -> bool {
    true
}

fn default_priority() -> String {
    "normal".to_string()
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StringOrNumber {
    String(String),
    Int(i64),
}

impl From<StringOrNumber> for String {
    fn from(v: StringOrNumber) -> Self {
        match v {
            StringOrNumber::String(s) => s,
            StringOrNumber::Int(n) => n.to_string(),
        }
    }
}

/// Guardians send ids as strings; tolerate bare integers too.
fn string_or_number<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    StringOrNumber::deserialize(d).map(String::from)
}

fn opt_string_or_number<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    Option::<StringOrNumber>::deserialize(d).map(|v| v.map(String::from))
}
