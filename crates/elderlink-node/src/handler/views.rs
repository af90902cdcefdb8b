//! Store records rendered as wire payloads.

use elderlink::days::local_days_to_wire;
use elderlink::payloads::{
    AlertInfo, HealthCheckInInfo, MedicationInfo, MedicationLogInfo, ScheduleInfo,
};
use elderlink::wire::ms_to_iso;
use elderlink_core::alerts::Alert;
use elderlink_core::checkins::HealthCheckIn;
use elderlink_core::medications::{DoseLog, Medication, Schedule};

pub fn alert_info(elder_id: &str, alert: &Alert) -> AlertInfo {
    AlertInfo {
        id: alert.id.to_string(),
        elder_id: elder_id.to_string(),
        kind: alert.kind,
        triggered_at: ms_to_iso(alert.triggered_at_ms),
        location: alert.location,
        battery_level: alert.battery_level,
        resolved: alert.resolved,
        notes: alert.notes.clone(),
    }
}

pub fn medication_info(medication: &Medication) -> MedicationInfo {
    MedicationInfo {
        id: medication.id.to_string(),
        name: medication.name.clone(),
        dosage: medication.dosage.clone(),
        instructions: medication.instructions.clone(),
    }
}

/// Days leave in the 0..=6 wire convention.
pub fn schedule_info(schedule: &Schedule) -> ScheduleInfo {
    ScheduleInfo {
        id: schedule.id.to_string(),
        medication_id: schedule.medication_id.to_string(),
        time: schedule.time_label(),
        days_of_week: local_days_to_wire(&schedule.days_of_week),
        enabled: schedule.enabled,
    }
}

pub fn dose_info(dose: &DoseLog) -> MedicationLogInfo {
    let taken_at = matches!(dose.action, elderlink::payloads::DoseAction::Taken)
        .then(|| ms_to_iso(dose.action_at_ms));
    MedicationLogInfo {
        id: dose.id.to_string(),
        medication_id: dose.medication_id.to_string(),
        schedule_id: dose.schedule_id.map(|id| id.to_string()).unwrap_or_default(),
        scheduled_time: ms_to_iso(dose.scheduled_at_ms),
        taken_at,
        status: dose.action,
    }
}

pub fn checkin_info(elder_id: &str, checkin: &HealthCheckIn) -> HealthCheckInInfo {
    HealthCheckInInfo {
        id: checkin.id.to_string(),
        elder_id: elder_id.to_string(),
        date: checkin.date.format("%Y-%m-%d").to_string(),
        mood: checkin.mood,
        pain_level: checkin.pain_level,
        sleep_quality: checkin.sleep_quality,
        symptoms: checkin.symptoms.clone(),
        notes: checkin.notes.clone(),
    }
}
