use super::medication::{
    MedicationChange, MedicationDraft, change_medication, create_medication, new_schedules,
};
use super::{error_response, now_ms, ok_response};
use crate::alerts::AlertDispatch;
use crate::error::CommandError;
use crate::monitor::MonitoringService;
use elderlink::payloads::{DoseAction, LocationInfo, MedicationAction};
use elderlink::protocol::{
    AlertRaisedInfo, ContactInfo, GuardianInfo, MedicationNotice, Request, Response, StatusInfo,
};
use elderlink_core::checkins::NewCheckIn;
use elderlink_core::medications::{MedicationPatch, NewDose};
use elderlink_core::time::local_date;
use std::sync::Arc;

/// Log source for changes made on the device itself.
const LOCAL_UI: &str = "local-ui";

/// Handle a request from a local client on the Unix socket.
pub async fn handle_request(monitor: &Arc<MonitoringService>, req: Request) -> Response {
    match req {
        Request::Status => handle_status(monitor).await,

        // Alerts
        Request::TriggerSos {
            latitude,
            longitude,
        } => {
            let location = location(latitude, longitude);
            alert_response(monitor.alerts().trigger_sos_alert(location).await)
        }
        Request::TriggerFall {
            latitude,
            longitude,
        } => {
            let location = location(latitude, longitude);
            alert_response(monitor.alerts().trigger_fall_alert(location).await)
        }
        Request::TriggerMissedMedication {
            medication_name,
            scheduled_time,
        } => alert_response(
            monitor
                .alerts()
                .trigger_missed_medication_alert(&medication_name, &scheduled_time)
                .await,
        ),
        Request::TriggerLowBattery { battery_level } => {
            alert_response(monitor.alerts().trigger_low_battery_alert(battery_level).await)
        }
        Request::TriggerInactivity { hours } => {
            alert_response(monitor.alerts().trigger_inactivity_alert(hours).await)
        }
        Request::ResolveAlert { alert_id } => match monitor.alerts().resolve_alert(alert_id).await {
            Ok(true) => ok_response(None),
            Ok(false) => error_response("not_found", &format!("no alert with id {alert_id}")),
            Err(e) => error_response("storage_error", &format!("{e:#}")),
        },

        // Medications
        Request::RecordDose {
            medication_id,
            schedule_id,
            action,
            scheduled_at_ms,
        } => handle_record_dose(monitor, medication_id, schedule_id, action, scheduled_at_ms).await,
        Request::AddMedication {
            name,
            dosage,
            instructions,
            schedules,
        } => {
            let draft = MedicationDraft {
                name,
                dosage,
                instructions,
                schedules: new_schedules(&schedules),
            };
            announce(monitor, create_medication(monitor.state(), draft, LOCAL_UI).await).await
        }
        Request::UpdateMedication {
            medication_id,
            name,
            dosage,
            instructions,
            schedules,
        } => {
            let patch = MedicationPatch {
                name,
                dosage,
                instructions,
            };
            let schedules = schedules.as_deref().map(new_schedules);
            let result =
                change_medication(monitor.state(), medication_id, patch, schedules, LOCAL_UI).await;
            announce(monitor, result).await
        }
        Request::MedicationChanged {
            medication_id,
            action,
        } => handle_medication_changed(monitor, medication_id, action).await,

        // Health
        Request::RecordCheckIn {
            date,
            mood,
            pain_level,
            sleep_quality,
            symptoms,
            notes,
        } => {
            let now = now_ms();
            let checkin = NewCheckIn {
                date: date.unwrap_or_else(|| local_date(now)),
                mood,
                pain_level,
                sleep_quality,
                symptoms,
                notes,
                created_at_ms: now,
            };
            handle_record_check_in(monitor, checkin).await
        }

        Request::Shutdown => ok_response(None),
    }
}

fn location(latitude: Option<f64>, longitude: Option<f64>) -> Option<LocationInfo> {
    Some(LocationInfo {
        latitude: latitude?,
        longitude: longitude?,
    })
}

fn alert_response(result: anyhow::Result<AlertDispatch>) -> Response {
    match result {
        Ok(dispatch) => {
            let info = AlertRaisedInfo {
                alert_id: dispatch.alert.id,
                delivered: dispatch.delivered,
            };
            match serde_json::to_value(info) {
                Ok(v) => ok_response(Some(v)),
                Err(e) => error_response("internal", &e.to_string()),
            }
        }
        Err(e) => error_response("alert_failed", &format!("{e:#}")),
    }
}

async fn handle_status(monitor: &Arc<MonitoringService>) -> Response {
    let state = monitor.state();
    let guardians = state
        .guardians
        .lock()
        .await
        .list()
        .into_iter()
        .map(|g| GuardianInfo {
            guardian_id: g.guardian_id,
            guardian_name: g.guardian_name,
            paired_at_ms: g.paired_at_ms,
        })
        .collect();
    let emergency_contacts = state
        .contacts
        .lock()
        .await
        .list()
        .into_iter()
        .map(|c| ContactInfo {
            contact_id: c.id,
            name: c.name,
            phone_number: c.phone_number,
            relationship: c.relationship,
            is_primary: c.is_primary,
        })
        .collect();
    let info = StatusInfo {
        elder_id: state.elder_id().to_string(),
        connection: monitor.connection().state().to_string(),
        monitoring: monitor.is_running(),
        guardians,
        emergency_contacts,
    };
    match serde_json::to_value(info) {
        Ok(v) => ok_response(Some(v)),
        Err(e) => error_response("internal", &e.to_string()),
    }
}

async fn handle_record_dose(
    monitor: &Arc<MonitoringService>,
    medication_id: i64,
    schedule_id: Option<i64>,
    action: DoseAction,
    scheduled_at_ms: Option<u64>,
) -> Response {
    let mut store = monitor.state().medications.lock().await;
    if store.get(medication_id).is_none() {
        return error_response("not_found", &format!("no medication with id {medication_id}"));
    }
    let now = now_ms();
    let dose = NewDose {
        medication_id,
        schedule_id,
        scheduled_at_ms: scheduled_at_ms.unwrap_or(now),
        action_at_ms: now,
        action,
        notes: String::new(),
    };
    match store.record_dose(dose) {
        Ok(entry) => {
            tracing::info!(medication_id, action = %action, dose_id = entry.id, "dose recorded");
            ok_response(Some(serde_json::json!({ "dose_id": entry.id })))
        }
        Err(e) => error_response("storage_error", &format!("{e:#}")),
    }
}

/// The local UI changed a medication; tell guardians about it.
async fn handle_medication_changed(
    monitor: &Arc<MonitoringService>,
    medication_id: i64,
    action: MedicationAction,
) -> Response {
    let change = {
        let mut store = monitor.state().medications.lock().await;
        let schedules = store.schedules_for(medication_id);
        let medication = match action {
            MedicationAction::Added | MedicationAction::Updated => {
                store.get(medication_id).cloned()
            }
            MedicationAction::Deleted => match store.delete(medication_id) {
                Ok(found) => found,
                Err(e) => return error_response("storage_error", &format!("{e:#}")),
            },
        };
        let Some(medication) = medication else {
            return error_response("not_found", &format!("no medication with id {medication_id}"));
        };
        MedicationChange {
            action,
            medication,
            schedules,
        }
    };

    announce(monitor, Ok(change)).await
}

/// Tell guardians about a local medication change and report how many heard.
async fn announce(
    monitor: &Arc<MonitoringService>,
    result: Result<MedicationChange, CommandError>,
) -> Response {
    match result {
        Ok(change) => {
            let notice = MedicationNotice {
                medication_id: change.medication.id,
                notified: monitor.notifier().notify(&change).await,
            };
            match serde_json::to_value(notice) {
                Ok(v) => ok_response(Some(v)),
                Err(e) => error_response("internal", &e.to_string()),
            }
        }
        Err(e) => error_response(e.code(), &e.to_string()),
    }
}

async fn handle_record_check_in(monitor: &Arc<MonitoringService>, checkin: NewCheckIn) -> Response {
    match monitor.state().checkins.lock().await.record(checkin) {
        Ok(entry) => {
            tracing::info!(check_in_id = entry.id, date = %entry.date, "health check-in recorded");
            ok_response(Some(serde_json::json!({ "check_in_id": entry.id })))
        }
        Err(e) => error_response("storage_error", &format!("{e:#}")),
    }
}
