use super::medication::parse_id;
use super::{ElderState, reply};
use crate::error::CommandError;
use elderlink::payloads::{
    CommandSuccessPayload, DeleteEmergencyContactPayload, UpdateEmergencyContactPayload,
};
use elderlink::wire::{Envelope, MessageType};
use elderlink_core::contacts::ContactDetails;

/// Create a contact, or update one when `contactId` is present.
pub async fn handle_update_emergency_contact(state: &ElderState, env: &Envelope) -> Envelope {
    let outcome = upsert_contact(state, env).await;
    reply(state, env, MessageType::CommandSuccess, outcome)
}

async fn upsert_contact(
    state: &ElderState,
    env: &Envelope,
) -> Result<CommandSuccessPayload, CommandError> {
    let p: UpdateEmergencyContactPayload = env.payload_as()?;
    if p.name.trim().is_empty() {
        return Err(CommandError::Invalid("Contact name cannot be empty"));
    }
    if p.phone_number.trim().is_empty() {
        return Err(CommandError::Invalid("Phone number cannot be empty"));
    }
    let existing_id = p
        .contact_id
        .as_deref()
        .filter(|raw| !raw.trim().is_empty())
        .map(|raw| parse_id(raw, "Invalid contact ID"))
        .transpose()?;

    let details = ContactDetails {
        name: p.name.trim().to_string(),
        phone_number: p.phone_number.trim().to_string(),
        relationship: p.relationship.trim().to_string(),
    };

    let (failure, message) = match existing_id {
        Some(_) => ("Failed to update contact", "Emergency contact updated successfully"),
        None => ("Failed to add contact", "Emergency contact added successfully"),
    };
    let contact = state
        .contacts
        .lock()
        .await
        .upsert(existing_id, details, p.is_primary == Some(true))
        .map_err(CommandError::storage(failure))?
        .ok_or(CommandError::NotFound("Contact not found"))?;
    tracing::info!(contact_id = contact.id, from = %env.from, "emergency contact saved by guardian");

    Ok(CommandSuccessPayload::new(message).with("contactId", contact.id))
}

pub async fn handle_delete_emergency_contact(state: &ElderState, env: &Envelope) -> Envelope {
    let outcome = delete_contact(state, env).await;
    reply(state, env, MessageType::CommandSuccess, outcome)
}

async fn delete_contact(
    state: &ElderState,
    env: &Envelope,
) -> Result<CommandSuccessPayload, CommandError> {
    let p: DeleteEmergencyContactPayload = env.payload_as()?;
    let id = parse_id(&p.contact_id, "Invalid contact ID")?;

    let deleted = state
        .contacts
        .lock()
        .await
        .delete(id)
        .map_err(CommandError::storage("Failed to delete contact"))?;
    if !deleted {
        return Err(CommandError::NotFound("Contact not found"));
    }
    tracing::info!(contact_id = id, from = %env.from, "emergency contact deleted by guardian");
    Ok(CommandSuccessPayload::new("Emergency contact deleted successfully").with("contactId", id))
}
