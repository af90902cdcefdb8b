use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Every message type carried between the elder device, the relay and guardians.
///
/// Types are emitted as lowercase snake_case and matched case-insensitively on
/// the way in, so `GET_STATE` and `get_state` name the same type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    // -- Queries and their responses --
    GetState,
    StateResponse,
    GetMedications,
    MedicationsResponse,
    GetAlertHistory,
    AlertHistoryResponse,
    GetHealthHistory,
    HealthHistoryResponse,

    // -- Pairing events --
    GuardianPaired,
    GuardianUnpaired,

    // -- Commands --
    AddMedication,
    UpdateMedication,
    DeleteMedication,
    UpdateEmergencyContact,
    DeleteEmergencyContact,
    SendReminder,
    SendMessage,
    CommandSuccess,
    CommandError,

    // -- Pushes --
    AlertEvent,
    MedicationUpdated,

    /// Sent by the relay once the elder socket is registered.
    ConnectionAck,
}

impl MessageType {
    pub const ALL: [MessageType; 22] = [
        MessageType::GetState,
        MessageType::StateResponse,
        MessageType::GetMedications,
        MessageType::MedicationsResponse,
        MessageType::GetAlertHistory,
        MessageType::AlertHistoryResponse,
        MessageType::GetHealthHistory,
        MessageType::HealthHistoryResponse,
        MessageType::GuardianPaired,
        MessageType::GuardianUnpaired,
        MessageType::AddMedication,
        MessageType::UpdateMedication,
        MessageType::DeleteMedication,
        MessageType::UpdateEmergencyContact,
        MessageType::DeleteEmergencyContact,
        MessageType::SendReminder,
        MessageType::SendMessage,
        MessageType::CommandSuccess,
        MessageType::CommandError,
        MessageType::AlertEvent,
        MessageType::MedicationUpdated,
        MessageType::ConnectionAck,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            MessageType::GetState => "get_state",
            MessageType::StateResponse => "state_response",
            MessageType::GetMedications => "get_medications",
            MessageType::MedicationsResponse => "medications_response",
            MessageType::GetAlertHistory => "get_alert_history",
            MessageType::AlertHistoryResponse => "alert_history_response",
            MessageType::GetHealthHistory => "get_health_history",
            MessageType::HealthHistoryResponse => "health_history_response",
            MessageType::GuardianPaired => "guardian_paired",
            MessageType::GuardianUnpaired => "guardian_unpaired",
            MessageType::AddMedication => "add_medication",
            MessageType::UpdateMedication => "update_medication",
            MessageType::DeleteMedication => "delete_medication",
            MessageType::UpdateEmergencyContact => "update_emergency_contact",
            MessageType::DeleteEmergencyContact => "delete_emergency_contact",
            MessageType::SendReminder => "send_reminder",
            MessageType::SendMessage => "send_message",
            MessageType::CommandSuccess => "command_success",
            MessageType::CommandError => "command_error",
            MessageType::AlertEvent => "alert_event",
            MessageType::MedicationUpdated => "medication_updated",
            MessageType::ConnectionAck => "connection_ack",
        }
    }

    /// Parse a wire type string, ignoring ASCII case.
    pub fn from_wire(s: &str) -> Option<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.as_str().eq_ignore_ascii_case(s.trim()))
    }

    /// Whether a guardian expects exactly one correlated reply to this type.
    pub fn expects_response(self) -> bool {
        matches!(
            self,
            MessageType::GetState
                | MessageType::GetMedications
                | MessageType::GetAlertHistory
                | MessageType::GetHealthHistory
                | MessageType::AddMedication
                | MessageType::UpdateMedication
                | MessageType::DeleteMedication
                | MessageType::UpdateEmergencyContact
                | MessageType::DeleteEmergencyContact
                | MessageType::SendReminder
                | MessageType::SendMessage
        )
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The JSON text frame exchanged through the relay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    /// Raw type string as received. Use [`Envelope::message_type`] to interpret it.
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub from: String,
    #[serde(default)]
    pub to: String,
    #[serde(default)]
    pub request_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    #[serde(default)]
    pub timestamp: String,
}

impl Envelope {
    pub fn new(
        kind: MessageType,
        from: &str,
        to: &str,
        request_id: &str,
        payload: Option<Value>,
    ) -> Self {
        Self {
            kind: kind.as_str().to_string(),
            from: from.to_string(),
            to: to.to_string(),
            request_id: request_id.to_string(),
            payload,
            timestamp: now_iso(),
        }
    }

    /// An unsolicited push with a freshly generated request id.
    pub fn push(kind: MessageType, from: &str, to: &str, payload: Value) -> Self {
        let request_id = uuid::Uuid::new_v4().to_string();
        Self::new(kind, from, to, &request_id, Some(payload))
    }

    pub fn decode(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }

    pub fn encode(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn message_type(&self) -> Option<MessageType> {
        MessageType::from_wire(&self.kind)
    }

    /// Decode the payload into a typed struct. A missing payload decodes as `null`.
    pub fn payload_as<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_value(self.payload.clone().unwrap_or(Value::Null))
    }
}

/// Build the single reply to `original`.
///
/// `Ok(payload)` becomes a `success_type` envelope; `Err(message)` becomes a
/// `command_error` with `{ "error": message }`. Either way the reply is
/// addressed to the original sender and carries its request id.
pub fn build_response(
    from: &str,
    original: &Envelope,
    success_type: MessageType,
    outcome: Result<Value, String>,
) -> Envelope {
    match outcome {
        Ok(payload) => Envelope::new(
            success_type,
            from,
            &original.from,
            &original.request_id,
            Some(payload),
        ),
        Err(error) => build_error(from, original, error),
    }
}

/// A `command_error` reply to `original` carrying `{ "error": message }`.
pub fn build_error(from: &str, original: &Envelope, message: impl Into<String>) -> Envelope {
    Envelope::new(
        MessageType::CommandError,
        from,
        &original.from,
        &original.request_id,
        Some(serde_json::json!({ "error": message.into() })),
    )
}

/// Current UTC time as an RFC 3339 string with millisecond precision.
pub fn now_iso() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

/// Render epoch milliseconds as an RFC 3339 UTC string.
pub fn ms_to_iso(ms: u64) -> String {
    chrono::DateTime::from_timestamp_millis(ms as i64)
        .unwrap_or_default()
        .to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn message_type_matches_any_case() {
        assert_eq!(
            MessageType::from_wire("GET_STATE"),
            Some(MessageType::GetState)
        );
        assert_eq!(
            MessageType::from_wire("get_state"),
            Some(MessageType::GetState)
        );
        assert_eq!(
            MessageType::from_wire("Connection_Ack"),
            Some(MessageType::ConnectionAck)
        );
        assert_eq!(MessageType::from_wire("launch_rockets"), None);
    }

    #[test]
    fn every_type_round_trips_through_its_wire_name() {
        for t in MessageType::ALL {
            assert_eq!(MessageType::from_wire(t.as_str()), Some(t));
        }
    }

    #[test]
    fn decode_tolerates_missing_optional_fields() {
        let env = Envelope::decode(r#"{"type":"GET_STATE","from":"g1","requestId":"r1"}"#)
            .unwrap();
        assert_eq!(env.message_type(), Some(MessageType::GetState));
        assert_eq!(env.to, "");
        assert!(env.payload.is_none());
    }

    #[test]
    fn decode_rejects_frame_without_type() {
        assert!(Envelope::decode(r#"{"from":"g1"}"#).is_err());
        assert!(Envelope::decode("not json").is_err());
    }

    #[test]
    fn encoded_envelope_uses_camel_case() {
        let env = Envelope::new(
            MessageType::StateResponse,
            "elder_1",
            "g1",
            "r1",
            Some(json!({"a": 1})),
        );
        let v: Value = serde_json::from_str(&env.encode().unwrap()).unwrap();
        assert_eq!(v["type"], "state_response");
        assert_eq!(v["requestId"], "r1");
        assert_eq!(v["from"], "elder_1");
        assert_eq!(v["to"], "g1");
        assert!(v["timestamp"].as_str().unwrap().ends_with('Z'));
    }

    #[test]
    fn build_response_correlates_success_and_error() {
        let req = Envelope::new(MessageType::DeleteMedication, "g1", "elder_1", "req-9", None);

        let ok = build_response(
            "elder_1",
            &req,
            MessageType::CommandSuccess,
            Ok(json!({"message": "done"})),
        );
        assert_eq!(ok.message_type(), Some(MessageType::CommandSuccess));
        assert_eq!(ok.request_id, "req-9");
        assert_eq!(ok.to, "g1");

        let err = build_response(
            "elder_1",
            &req,
            MessageType::CommandSuccess,
            Err("Medication not found".into()),
        );
        assert_eq!(err.message_type(), Some(MessageType::CommandError));
        assert_eq!(err.request_id, "req-9");
        assert_eq!(err.payload.unwrap()["error"], "Medication not found");
    }

    #[test]
    fn build_error_needs_no_success_type() {
        let original = Envelope::new(MessageType::GetState, "guardian-1", "", "req-9", None);
        let reply = build_error("elder_1", &original, "Internal error handling get_state");
        assert_eq!(reply.message_type(), Some(MessageType::CommandError));
        assert_eq!(reply.to, "guardian-1");
        assert_eq!(reply.request_id, "req-9");
        assert_eq!(
            reply.payload,
            Some(json!({ "error": "Internal error handling get_state" }))
        );
    }

    #[test]
    fn pushes_get_distinct_request_ids() {
        let a = Envelope::push(MessageType::AlertEvent, "e", "g1", json!({}));
        let b = Envelope::push(MessageType::AlertEvent, "e", "g1", json!({}));
        assert_ne!(a.request_id, b.request_id);
        assert!(!a.request_id.is_empty());
    }

    #[test]
    fn ms_to_iso_formats_epoch() {
        assert_eq!(ms_to_iso(0), "1970-01-01T00:00:00.000Z");
    }
}
