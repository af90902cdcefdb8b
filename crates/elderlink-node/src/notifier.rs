use crate::handler::ElderState;
use crate::handler::medication::MedicationChange;
use crate::handler::views::{medication_info, schedule_info};
use elderlink::payloads::MedicationUpdatedPayload;
use elderlink::wire::{Envelope, MessageType};
use elderlink_core::transport::EnvelopeSink;
use std::sync::Arc;

/// Pushes `medication_updated` to every paired guardian.
pub struct MedicationNotifier {
    state: Arc<ElderState>,
    sink: Arc<dyn EnvelopeSink>,
}

impl MedicationNotifier {
    pub fn new(state: Arc<ElderState>, sink: Arc<dyn EnvelopeSink>) -> Self {
        Self { state, sink }
    }

    /// Fan a change out. Returns the number of envelopes the connection accepted.
    pub async fn notify(&self, change: &MedicationChange) -> usize {
        let guardian_ids = self.state.guardians.lock().await.ids();
        if guardian_ids.is_empty() {
            return 0;
        }

        let elder_id = self.state.elder_id();
        let payload = MedicationUpdatedPayload {
            elder_id: elder_id.to_string(),
            action: change.action,
            medication: medication_info(&change.medication),
            schedules: change.schedules.iter().map(schedule_info).collect(),
        };
        let payload = match serde_json::to_value(&payload) {
            Ok(v) => v,
            Err(e) => {
                tracing::error!(err = %e, "failed to encode medication_updated payload");
                return 0;
            }
        };

        let delivered = guardian_ids
            .iter()
            .filter(|gid| {
                let env =
                    Envelope::push(MessageType::MedicationUpdated, elder_id, gid, payload.clone());
                self.sink.send(&env)
            })
            .count();
        tracing::debug!(
            medication_id = change.medication.id,
            action = ?change.action,
            guardians = guardian_ids.len(),
            delivered,
            "medication change pushed"
        );
        delivered
    }
}
