use crate::handler::views::alert_info;
use crate::handler::{ElderState, now_ms};
use anyhow::{Context, Result};
use elderlink::payloads::{AlertKind, LocationInfo};
use elderlink::protocol::Event;
use elderlink::wire::{Envelope, MessageType};
use elderlink_core::alerts::{Alert, NewAlert};
use elderlink_core::transport::EnvelopeSink;
use std::sync::Arc;
use std::time::Duration;

/// Result of raising an alert.
#[derive(Debug, Clone)]
pub struct AlertDispatch {
    pub alert: Alert,
    /// Guardians paired at the time the alert was raised.
    pub guardians: usize,
    /// Envelopes accepted by the connection.
    pub delivered: usize,
}

/// The only way alerts get raised. Each alert is persisted first, then
/// pushed as one `alert_event` per paired guardian.
pub struct AlertManager {
    state: Arc<ElderState>,
    sink: Arc<dyn EnvelopeSink>,
}

impl AlertManager {
    pub fn new(state: Arc<ElderState>, sink: Arc<dyn EnvelopeSink>) -> Self {
        Self { state, sink }
    }

    pub async fn trigger_sos_alert(&self, location: Option<LocationInfo>) -> Result<AlertDispatch> {
        self.raise(
            AlertKind::Sos,
            location,
            None,
            "SOS emergency button activated".to_string(),
        )
        .await
    }

    pub async fn trigger_fall_alert(&self, location: Option<LocationInfo>) -> Result<AlertDispatch> {
        self.raise(
            AlertKind::Fall,
            location,
            None,
            "Potential fall detected".to_string(),
        )
        .await
    }

    pub async fn trigger_missed_medication_alert(
        &self,
        medication_name: &str,
        scheduled_time: &str,
    ) -> Result<AlertDispatch> {
        self.raise(
            AlertKind::MissedMed,
            None,
            None,
            format!("Missed {medication_name} scheduled at {scheduled_time}"),
        )
        .await
    }

    pub async fn trigger_low_battery_alert(&self, battery_level: i32) -> Result<AlertDispatch> {
        self.raise(
            AlertKind::LowBattery,
            None,
            Some(battery_level),
            format!("Device battery is low: {battery_level}%"),
        )
        .await
    }

    pub async fn trigger_inactivity_alert(&self, hours: u32) -> Result<AlertDispatch> {
        self.raise(
            AlertKind::Inactivity,
            None,
            None,
            format!("No activity detected for {hours} hours"),
        )
        .await
    }

    /// Whether an alert of `kind` was raised within the last `window`.
    pub async fn has_recent_alert(&self, kind: AlertKind, window: Duration) -> bool {
        let since = now_ms().saturating_sub(window.as_millis() as u64);
        self.state.alerts.lock().await.has_since(kind, since)
    }

    /// Mark an alert resolved. Returns false if it does not exist.
    pub async fn resolve_alert(&self, alert_id: i64) -> Result<bool> {
        let resolved = self
            .state
            .alerts
            .lock()
            .await
            .resolve(alert_id, now_ms())
            .context("failed to resolve alert")?;
        if resolved {
            tracing::info!(alert_id, "alert resolved");
        }
        Ok(resolved)
    }

    async fn raise(
        &self,
        kind: AlertKind,
        location: Option<LocationInfo>,
        battery_level: Option<i32>,
        notes: String,
    ) -> Result<AlertDispatch> {
        let battery_level =
            battery_level.or_else(|| self.state.device.battery_level().map(i32::from));
        let alert = self
            .state
            .alerts
            .lock()
            .await
            .record(NewAlert {
                kind,
                triggered_at_ms: now_ms(),
                location,
                battery_level,
                notes,
            })
            .with_context(|| format!("failed to persist {kind} alert"))?;

        let guardian_ids = self.state.guardians.lock().await.ids();
        let elder_id = self.state.elder_id();
        let payload = serde_json::to_value(alert_info(elder_id, &alert))?;

        let delivered = guardian_ids
            .iter()
            .filter(|gid| {
                let env = Envelope::push(MessageType::AlertEvent, elder_id, gid, payload.clone());
                self.sink.send(&env)
            })
            .count();

        if delivered < guardian_ids.len() {
            tracing::warn!(
                alert_id = alert.id,
                kind = %kind,
                guardians = guardian_ids.len(),
                delivered,
                "alert recorded but not pushed to every guardian"
            );
        } else {
            tracing::info!(alert_id = alert.id, kind = %kind, delivered, "alert raised");
        }

        self.state.publish(Event::AlertRaised {
            alert_id: alert.id,
            alert_kind: kind,
            delivered,
        });

        Ok(AlertDispatch {
            alert,
            guardians: guardian_ids.len(),
            delivered,
        })
    }
}
