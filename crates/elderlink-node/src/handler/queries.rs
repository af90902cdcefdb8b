use super::views::{alert_info, checkin_info, dose_info, medication_info, schedule_info};
use super::{ElderState, reply};
use crate::error::CommandError;
use chrono::{DateTime, Datelike, Local};
use elderlink::payloads::{
    AlertHistoryResponsePayload, DoseAction, ElderInfo, HealthHistoryResponsePayload,
    MedicationSummary, MedicationsResponsePayload, StateResponsePayload,
};
use elderlink::wire::{Envelope, MessageType, now_iso};
use elderlink_core::medications::MedicationStore;
use elderlink_core::time::{days_ago_ms, local_date};

const RECENT_ALERT_COUNT: usize = 5;
const MEDICATION_LOG_DAYS: i64 = 7;

/// Battery level reported when the device cannot read it.
pub const UNKNOWN_BATTERY: i32 = -1;

pub async fn handle_get_state(state: &ElderState, env: &Envelope) -> Envelope {
    let now = Local::now();
    let profile = state.profile.lock().await.get().clone();
    let recent_alerts = state
        .alerts
        .lock()
        .await
        .recent(RECENT_ALERT_COUNT)
        .iter()
        .map(|a| alert_info(state.elder_id(), a))
        .collect();
    let medication_summary = medication_summary(&*state.medications.lock().await, now);

    let payload = StateResponsePayload {
        elder: ElderInfo {
            name: profile.name,
            age: profile.age,
            battery_level: state
                .device
                .battery_level()
                .map_or(UNKNOWN_BATTERY, i32::from),
            last_heartbeat: now_iso(),
        },
        recent_alerts,
        medication_summary,
    };
    reply(state, env, MessageType::StateResponse, Ok::<_, CommandError>(payload))
}

/// Today's counts in the device's local calendar.
///
/// Total is the enabled schedules of active medications that fall on today.
/// Taken counts TAKEN logs acted on today; missed counts MISSED and SKIPPED.
pub fn medication_summary(store: &MedicationStore, now: DateTime<Local>) -> MedicationSummary {
    let today = now.date_naive();
    let weekday = now.weekday().number_from_sunday() as u8;

    let today_total = store
        .active()
        .iter()
        .flat_map(|m| store.schedules_for(m.id))
        .filter(|s| s.enabled && s.runs_on(weekday))
        .count() as u32;

    let mut summary = MedicationSummary {
        today_total,
        ..Default::default()
    };
    for dose in store
        .doses_since(days_ago_ms(now, 1))
        .iter()
        .filter(|d| local_date(d.action_at_ms) == today)
    {
        match dose.action {
            DoseAction::Taken => summary.taken_today += 1,
            DoseAction::Missed | DoseAction::Skipped => summary.missed_today += 1,
            DoseAction::Snoozed => {}
        }
    }
    summary
}

pub async fn handle_get_medications(state: &ElderState, env: &Envelope) -> Envelope {
    let payload = {
        let store = state.medications.lock().await;
        let active = store.active();
        MedicationsResponsePayload {
            medications: active.iter().map(medication_info).collect(),
            schedules: active
                .iter()
                .flat_map(|m| store.schedules_for(m.id))
                .map(|s| schedule_info(&s))
                .collect(),
            logs: store
                .doses_since(days_ago_ms(Local::now(), MEDICATION_LOG_DAYS))
                .iter()
                .map(dose_info)
                .collect(),
        }
    };
    reply(state, env, MessageType::MedicationsResponse, Ok::<_, CommandError>(payload))
}

pub async fn handle_get_alert_history(state: &ElderState, env: &Envelope) -> Envelope {
    let alerts = state
        .alerts
        .lock()
        .await
        .all()
        .iter()
        .map(|a| alert_info(state.elder_id(), a))
        .collect();
    let payload = AlertHistoryResponsePayload { alerts };
    reply(state, env, MessageType::AlertHistoryResponse, Ok::<_, CommandError>(payload))
}

pub async fn handle_get_health_history(state: &ElderState, env: &Envelope) -> Envelope {
    let check_ins = state
        .checkins
        .lock()
        .await
        .all()
        .iter()
        .map(|c| checkin_info(state.elder_id(), c))
        .collect();
    let payload = HealthHistoryResponsePayload { check_ins };
    reply(state, env, MessageType::HealthHistoryResponse, Ok::<_, CommandError>(payload))
}
