use super::{ElderState, now_ms, reply};
use crate::error::CommandError;
use elderlink::days::wire_days_to_local;
use elderlink::payloads::{
    AddMedicationPayload, CommandSuccessPayload, DeleteMedicationPayload, MedicationAction,
    MedicationSchedulePayload, UpdateMedicationPayload,
};
use elderlink::wire::{Envelope, MessageType};
use elderlink_core::medications::{Medication, MedicationPatch, NewSchedule, Schedule};

/// A medication change that guardians should hear about.
#[derive(Debug, Clone)]
pub struct MedicationChange {
    pub action: MedicationAction,
    pub medication: Medication,
    pub schedules: Vec<Schedule>,
}

type Outcome = Result<(CommandSuccessPayload, MedicationChange), CommandError>;

/// Parse `HH:MM` leniently. Unparsable parts read as 0, then both are clamped.
pub fn parse_time(time: &str) -> (u8, u8) {
    let mut parts = time.split(':');
    let mut next = |max: i64| {
        parts
            .next()
            .and_then(|p| p.trim().parse::<i64>().ok())
            .unwrap_or(0)
            .clamp(0, max) as u8
    };
    let hour = next(23);
    let minute = next(59);
    (hour, minute)
}

pub fn new_schedules(payloads: &[MedicationSchedulePayload]) -> Vec<NewSchedule> {
    payloads
        .iter()
        .map(|p| {
            let (hour, minute) = parse_time(&p.time);
            NewSchedule {
                hour,
                minute,
                days_of_week: wire_days_to_local(&p.days_of_week),
                enabled: p.enabled,
            }
        })
        .collect()
}

/// Parse a positive record id sent as a string.
pub fn parse_id(raw: &str, invalid: &'static str) -> Result<i64, CommandError> {
    raw.trim()
        .parse::<i64>()
        .ok()
        .filter(|id| *id > 0)
        .ok_or(CommandError::Invalid(invalid))
}

fn finish(
    state: &ElderState,
    env: &Envelope,
    outcome: Outcome,
) -> (Envelope, Option<MedicationChange>) {
    match outcome {
        Ok((payload, change)) => (
            reply(state, env, MessageType::CommandSuccess, Ok(payload)),
            Some(change),
        ),
        Err(e) => (
            reply::<()>(state, env, MessageType::CommandSuccess, Err(e)),
            None,
        ),
    }
}

pub async fn handle_add_medication(
    state: &ElderState,
    env: &Envelope,
) -> (Envelope, Option<MedicationChange>) {
    let outcome = add_medication(state, env).await;
    finish(state, env, outcome)
}

async fn add_medication(state: &ElderState, env: &Envelope) -> Outcome {
    let p: AddMedicationPayload = env.payload_as()?;
    let draft = MedicationDraft {
        name: p.name,
        dosage: p.dosage,
        instructions: p.instructions,
        schedules: new_schedules(&p.schedules),
    };
    let change = create_medication(state, draft, &env.from).await?;
    let payload = CommandSuccessPayload::new("Medication added successfully")
        .with("medicationId", change.medication.id);
    Ok((payload, change))
}

/// A medication to create, before validation.
#[derive(Debug, Clone)]
pub struct MedicationDraft {
    pub name: String,
    pub dosage: String,
    pub instructions: String,
    pub schedules: Vec<NewSchedule>,
}

/// Validate and store a new medication. `source` names who asked, for the log.
pub async fn create_medication(
    state: &ElderState,
    draft: MedicationDraft,
    source: &str,
) -> Result<MedicationChange, CommandError> {
    let name = draft.name.trim();
    if name.is_empty() {
        return Err(CommandError::Invalid("Medication name cannot be empty"));
    }
    if draft.schedules.is_empty() {
        return Err(CommandError::Invalid("At least one schedule is required"));
    }

    let mut store = state.medications.lock().await;
    let medication = store
        .add(
            name.to_string(),
            draft.dosage,
            draft.instructions,
            draft.schedules,
            now_ms(),
        )
        .map_err(CommandError::storage("Failed to add medication"))?;
    let schedules = store.schedules_for(medication.id);
    tracing::info!(medication_id = medication.id, from = %source, "medication added");
    Ok(MedicationChange {
        action: MedicationAction::Added,
        medication,
        schedules,
    })
}

pub async fn handle_update_medication(
    state: &ElderState,
    env: &Envelope,
) -> (Envelope, Option<MedicationChange>) {
    let outcome = update_medication(state, env).await;
    finish(state, env, outcome)
}

async fn update_medication(state: &ElderState, env: &Envelope) -> Outcome {
    let p: UpdateMedicationPayload = env.payload_as()?;
    let id = parse_id(&p.medication_id, "Invalid medication ID")?;
    let patch = MedicationPatch {
        name: p.name,
        dosage: p.dosage,
        instructions: p.instructions,
    };
    let schedules = p.schedules.as_deref().map(new_schedules);
    let change = change_medication(state, id, patch, schedules, &env.from).await?;
    let payload =
        CommandSuccessPayload::new("Medication updated successfully").with("medicationId", id);
    Ok((payload, change))
}

/// Patch a stored medication. Supplied schedules replace all existing ones.
pub async fn change_medication(
    state: &ElderState,
    id: i64,
    mut patch: MedicationPatch,
    schedules: Option<Vec<NewSchedule>>,
    source: &str,
) -> Result<MedicationChange, CommandError> {
    if let Some(name) = patch.name.take() {
        let name = name.trim();
        if name.is_empty() {
            return Err(CommandError::Invalid("Medication name cannot be empty"));
        }
        patch.name = Some(name.to_string());
    }

    let mut store = state.medications.lock().await;
    let medication = store
        .update(id, patch, schedules, now_ms())
        .map_err(CommandError::storage("Failed to update medication"))?
        .ok_or(CommandError::NotFound("Medication not found"))?;
    let schedules = store.schedules_for(id);
    tracing::info!(medication_id = id, from = %source, "medication updated");
    Ok(MedicationChange {
        action: MedicationAction::Updated,
        medication,
        schedules,
    })
}

pub async fn handle_delete_medication(
    state: &ElderState,
    env: &Envelope,
) -> (Envelope, Option<MedicationChange>) {
    let outcome = delete_medication(state, env).await;
    finish(state, env, outcome)
}

async fn delete_medication(state: &ElderState, env: &Envelope) -> Outcome {
    let p: DeleteMedicationPayload = env.payload_as()?;
    let id = parse_id(&p.medication_id, "Invalid medication ID")?;

    let mut store = state.medications.lock().await;
    let schedules = store.schedules_for(id);
    let medication = store
        .delete(id)
        .map_err(CommandError::storage("Failed to delete medication"))?
        .ok_or(CommandError::NotFound("Medication not found"))?;
    tracing::info!(medication_id = id, from = %env.from, "medication deleted by guardian");

    let payload =
        CommandSuccessPayload::new("Medication deleted successfully").with("medicationId", id);
    Ok((
        payload,
        MedicationChange {
            action: MedicationAction::Deleted,
            medication,
            schedules,
        },
    ))
}
