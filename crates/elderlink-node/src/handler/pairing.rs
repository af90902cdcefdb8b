use super::{ElderState, now_ms};
use elderlink::payloads::{GuardianPairedPayload, GuardianUnpairedPayload};
use elderlink::wire::Envelope;
use elderlink_core::guardians::PairedGuardian;

/// Record a newly paired guardian. Events get no reply.
pub async fn handle_guardian_paired(state: &ElderState, env: &Envelope) {
    let p: GuardianPairedPayload = match env.payload_as() {
        Ok(p) => p,
        Err(e) => {
            tracing::warn!(err = %e, "dropping malformed guardian_paired event");
            return;
        }
    };
    if p.guardian_id.trim().is_empty() {
        tracing::warn!("dropping guardian_paired event without a guardian id");
        return;
    }
    let record = PairedGuardian {
        guardian_id: p.guardian_id.clone(),
        guardian_name: p.guardian_name,
        paired_at_ms: now_ms(),
    };
    match state.guardians.lock().await.pair(record) {
        Ok(()) => tracing::info!(guardian_id = %p.guardian_id, "guardian paired"),
        Err(e) => tracing::error!(guardian_id = %p.guardian_id, err = %e, "failed to persist guardian"),
    }
}

/// Forget a guardian. Returns the number of guardians still paired after a
/// removal, or `None` if nothing was removed.
pub async fn handle_guardian_unpaired(state: &ElderState, env: &Envelope) -> Option<usize> {
    let p: GuardianUnpairedPayload = match env.payload_as() {
        Ok(p) => p,
        Err(e) => {
            tracing::warn!(err = %e, "dropping malformed guardian_unpaired event");
            return None;
        }
    };
    let mut guardians = state.guardians.lock().await;
    match guardians.unpair(&p.guardian_id) {
        Ok(true) => tracing::info!(guardian_id = %p.guardian_id, "guardian unpaired"),
        Ok(false) => {
            tracing::debug!(guardian_id = %p.guardian_id, "unpair for unknown guardian");
            return None;
        }
        Err(e) => {
            tracing::error!(guardian_id = %p.guardian_id, err = %e, "failed to persist unpair");
            return None;
        }
    }
    Some(guardians.len())
}
