use super::{ElderState, reply};
use crate::error::CommandError;
use crate::shell::Notification;
use elderlink::payloads::{CommandSuccessPayload, SendMessagePayload, SendReminderPayload};
use elderlink::protocol::Importance;
use elderlink::wire::{Envelope, MessageType};

/// Map a guardian-supplied priority onto notification importance.
/// Unrecognised values, including the legacy "normal", are `Default`.
pub fn importance_for(priority: &str) -> Importance {
    match priority.trim().to_ascii_lowercase().as_str() {
        "urgent" => Importance::Max,
        "high" => Importance::High,
        "low" => Importance::Low,
        _ => Importance::Default,
    }
}

pub async fn handle_send_reminder(state: &ElderState, env: &Envelope) -> Envelope {
    let outcome = send_reminder(state, env);
    reply(state, env, MessageType::CommandSuccess, outcome)
}

fn send_reminder(state: &ElderState, env: &Envelope) -> Result<CommandSuccessPayload, CommandError> {
    let p: SendReminderPayload = env.payload_as()?;
    if p.title.trim().is_empty() || p.message.trim().is_empty() {
        return Err(CommandError::Invalid("Title and message cannot be empty"));
    }
    state.notify(Notification {
        title: p.title,
        body: p.message,
        importance: importance_for(&p.priority),
        requires_acknowledgment: false,
    });
    Ok(CommandSuccessPayload::new("Reminder sent successfully"))
}

pub async fn handle_send_message(state: &ElderState, env: &Envelope) -> Envelope {
    let outcome = send_message(state, env);
    reply(state, env, MessageType::CommandSuccess, outcome)
}

fn send_message(state: &ElderState, env: &Envelope) -> Result<CommandSuccessPayload, CommandError> {
    let p: SendMessagePayload = env.payload_as()?;
    if p.message.trim().is_empty() {
        return Err(CommandError::Invalid("Message cannot be empty"));
    }
    let sender = match p.guardian_name.trim() {
        "" => "your guardian",
        name => name,
    };
    state.notify(Notification {
        title: format!("Message from {sender}"),
        body: p.message,
        importance: Importance::High,
        requires_acknowledgment: p.requires_acknowledgment,
    });
    Ok(CommandSuccessPayload::new("Message sent successfully"))
}
