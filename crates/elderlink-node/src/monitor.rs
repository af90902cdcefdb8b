use crate::alerts::{AlertDispatch, AlertManager};
use crate::handler::medication::MedicationChange;
use crate::handler::{self, ElderState};
use crate::notifier::MedicationNotifier;
use crate::router::MessageRouter;
use anyhow::Result;
use elderlink::payloads::AlertKind;
use elderlink::protocol::Event;
use elderlink::wire::{Envelope, MessageType};
use elderlink_core::transport::{ConnectionManager, EnvelopeSink};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;

/// Periodic self-check tunables.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub battery_check_interval: Duration,
    /// Levels at or below this raise LOW_BATTERY.
    pub low_battery_threshold: i32,
    /// No second LOW_BATTERY alert inside this window.
    pub low_battery_cooldown: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            battery_check_interval: Duration::from_secs(30 * 60),
            low_battery_threshold: 20,
            low_battery_cooldown: Duration::from_secs(4 * 60 * 60),
        }
    }
}

/// Owns the relay connection for the life of the daemon.
///
/// Wires inbound frames through the router, runs the battery check, and
/// stops itself once the last guardian unpairs. Stopping is final: a
/// stopped service cannot be started again.
pub struct MonitoringService {
    state: Arc<ElderState>,
    connection: Arc<ConnectionManager>,
    sink: Arc<dyn EnvelopeSink>,
    alerts: Arc<AlertManager>,
    notifier: Arc<MedicationNotifier>,
    router: Arc<MessageRouter>,
    config: MonitorConfig,
    shutdown: CancellationToken,
    started: AtomicBool,
    /// `medication_updated` pushes still in flight.
    fanout: Mutex<JoinSet<usize>>,
}

impl MonitoringService {
    pub fn new(
        state: Arc<ElderState>,
        connection: Arc<ConnectionManager>,
        config: MonitorConfig,
    ) -> Arc<Self> {
        let sink: Arc<dyn EnvelopeSink> = connection.clone();
        Self::with_sink(state, connection, sink, config)
    }

    /// Like [`MonitoringService::new`] but pushes go to `sink` instead of the
    /// connection.
    pub fn with_sink(
        state: Arc<ElderState>,
        connection: Arc<ConnectionManager>,
        sink: Arc<dyn EnvelopeSink>,
        config: MonitorConfig,
    ) -> Arc<Self> {
        let alerts = Arc::new(AlertManager::new(state.clone(), sink.clone()));
        let notifier = Arc::new(MedicationNotifier::new(state.clone(), sink.clone()));
        Arc::new_cyclic(|weak: &Weak<Self>| {
            let router = build_router(state.clone(), weak.clone());
            Self {
                state,
                connection,
                sink,
                alerts,
                notifier,
                router: Arc::new(router),
                config,
                shutdown: CancellationToken::new(),
                started: AtomicBool::new(false),
                fanout: Mutex::new(JoinSet::new()),
            }
        })
    }

    pub fn state(&self) -> &Arc<ElderState> {
        &self.state
    }

    pub fn connection(&self) -> &Arc<ConnectionManager> {
        &self.connection
    }

    pub fn alerts(&self) -> &Arc<AlertManager> {
        &self.alerts
    }

    pub fn notifier(&self) -> &Arc<MedicationNotifier> {
        &self.notifier
    }

    pub fn router(&self) -> &Arc<MessageRouter> {
        &self.router
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    pub fn is_running(&self) -> bool {
        self.started.load(Ordering::SeqCst) && !self.shutdown.is_cancelled()
    }

    /// Resolves once the service has stopped.
    pub async fn stopped(&self) {
        self.shutdown.cancelled().await
    }

    /// Connect and spawn the inbound loop, the battery check and the
    /// connection-state forwarder. Calling it again is a no-op.
    pub fn start(self: &Arc<Self>) {
        if self.shutdown.is_cancelled() {
            tracing::warn!("monitoring already stopped, not restarting");
            return;
        }
        if self.started.swap(true, Ordering::SeqCst) {
            return;
        }
        tracing::info!(
            elder_id = %self.state.elder_id(),
            relay = %self.connection.endpoint(),
            "monitoring started"
        );
        self.connection.connect();

        tokio::spawn(inbound_loop(self.clone()));
        tokio::spawn(battery_loop(self.clone()));
        tokio::spawn(forward_connection_state(self.clone()));
    }

    /// Disconnect and cancel every background task. Idempotent.
    pub fn stop(&self) {
        if self.shutdown.is_cancelled() {
            return;
        }
        self.shutdown.cancel();
        self.fanout().abort_all();
        self.connection.disconnect();
        self.state.publish(Event::MonitoringStopped);
        tracing::info!("monitoring stopped");
    }

    /// Raise LOW_BATTERY if the level is at or below the threshold and no
    /// such alert was raised within the cooldown.
    pub async fn check_battery(&self) -> Result<Option<AlertDispatch>> {
        let Some(level) = self.state.device.battery_level() else {
            tracing::debug!("battery level unknown, skipping check");
            return Ok(None);
        };
        let level = i32::from(level);
        if level > self.config.low_battery_threshold {
            return Ok(None);
        }
        if self
            .alerts
            .has_recent_alert(AlertKind::LowBattery, self.config.low_battery_cooldown)
            .await
        {
            tracing::debug!(level, "low battery already reported within cooldown");
            return Ok(None);
        }
        self.alerts.trigger_low_battery_alert(level).await.map(Some)
    }

    /// Push `change` to every guardian on a tracked task so the caller's
    /// reply is not held up. Finished pushes are reaped here.
    pub fn spawn_fanout(&self, change: MedicationChange) {
        let notifier = self.notifier.clone();
        let mut tasks = self.fanout();
        while let Some(done) = tasks.try_join_next() {
            reap_fanout(done);
        }
        tasks.spawn(async move { notifier.notify(&change).await });
    }

    /// Wait for every push started so far. Returns how many envelopes went out.
    pub async fn settle_fanout(&self) -> usize {
        let mut tasks = std::mem::take(&mut *self.fanout());
        let mut delivered = 0;
        while let Some(done) = tasks.join_next().await {
            delivered += reap_fanout(done);
        }
        delivered
    }

    fn fanout(&self) -> MutexGuard<'_, JoinSet<usize>> {
        self.fanout.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn send_reply(&self, reply: Envelope) {
        if !self.sink.send(&reply) {
            tracing::warn!(
                kind = %reply.kind,
                request_id = %reply.request_id,
                to = %reply.to,
                "reply dropped, relay not connected"
            );
        }
    }
}

fn reap_fanout(done: Result<usize, JoinError>) -> usize {
    match done {
        Ok(delivered) => delivered,
        Err(e) if e.is_cancelled() => 0,
        Err(e) => {
            tracing::error!(err = %e, "medication push task failed");
            0
        }
    }
}

fn build_router(state: Arc<ElderState>, service: Weak<MonitoringService>) -> MessageRouter {
    use handler::contacts::{handle_delete_emergency_contact, handle_update_emergency_contact};
    use handler::medication::{
        handle_add_medication, handle_delete_medication, handle_update_medication,
    };
    use handler::notification::{handle_send_message, handle_send_reminder};
    use handler::pairing::{handle_guardian_paired, handle_guardian_unpaired};
    use handler::queries::{
        handle_get_alert_history, handle_get_health_history, handle_get_medications,
        handle_get_state,
    };

    let mut router = MessageRouter::new(state.elder_id());

    macro_rules! reply_with {
        ($kind:expr, $handler:ident) => {{
            let state = state.clone();
            router.register($kind, move |env: Envelope| {
                let state = state.clone();
                async move { Some($handler(&state, &env).await) }
            });
        }};
    }

    macro_rules! medication_command {
        ($kind:expr, $handler:ident) => {{
            let state = state.clone();
            let service = service.clone();
            router.register($kind, move |env: Envelope| {
                let state = state.clone();
                let service = service.clone();
                async move {
                    let (reply, change) = $handler(&state, &env).await;
                    if let (Some(change), Some(service)) = (change, service.upgrade()) {
                        service.spawn_fanout(change);
                    }
                    Some(reply)
                }
            });
        }};
    }

    reply_with!(MessageType::GetState, handle_get_state);
    reply_with!(MessageType::GetMedications, handle_get_medications);
    reply_with!(MessageType::GetAlertHistory, handle_get_alert_history);
    reply_with!(MessageType::GetHealthHistory, handle_get_health_history);

    medication_command!(MessageType::AddMedication, handle_add_medication);
    medication_command!(MessageType::UpdateMedication, handle_update_medication);
    medication_command!(MessageType::DeleteMedication, handle_delete_medication);

    reply_with!(MessageType::UpdateEmergencyContact, handle_update_emergency_contact);
    reply_with!(MessageType::DeleteEmergencyContact, handle_delete_emergency_contact);
    reply_with!(MessageType::SendReminder, handle_send_reminder);
    reply_with!(MessageType::SendMessage, handle_send_message);

    {
        let state = state.clone();
        router.register(MessageType::GuardianPaired, move |env: Envelope| {
            let state = state.clone();
            async move {
                handle_guardian_paired(&state, &env).await;
                None
            }
        });
    }
    router.register(MessageType::GuardianUnpaired, move |env: Envelope| {
        let state = state.clone();
        let service = service.clone();
        async move {
            if handle_guardian_unpaired(&state, &env).await == Some(0) {
                tracing::info!("no guardians left, stopping monitoring");
                if let Some(service) = service.upgrade() {
                    service.stop();
                }
            }
            None
        }
    });

    router
}

/// Drain inbound frames, one task per frame.
async fn inbound_loop(service: Arc<MonitoringService>) {
    let mut incoming = service.connection.incoming.lock().await;
    let mut tasks = JoinSet::new();
    loop {
        tokio::select! {
            _ = service.shutdown.cancelled() => break,
            frame = incoming.recv() => {
                let Some(text) = frame else { break };
                let svc = service.clone();
                tasks.spawn(async move {
                    if let Some(reply) = svc.router.route(&text).await {
                        svc.send_reply(reply);
                    }
                });
            }
            Some(joined) = tasks.join_next() => {
                if let Err(e) = joined {
                    tracing::error!(err = %e, "inbound handler task failed");
                }
            }
        }
    }
    tasks.abort_all();
    while let Some(joined) = tasks.join_next().await {
        if let Err(e) = joined
            && !e.is_cancelled()
        {
            tracing::error!(err = %e, "inbound handler task failed");
        }
    }
    tracing::debug!("inbound loop stopped");
}

async fn battery_loop(service: Arc<MonitoringService>) {
    let mut tick = tokio::time::interval(service.config.battery_check_interval);
    tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = service.shutdown.cancelled() => break,
            _ = tick.tick() => {
                match service.check_battery().await {
                    Ok(Some(dispatch)) => tracing::info!(
                        alert_id = dispatch.alert.id,
                        delivered = dispatch.delivered,
                        "low battery reported"
                    ),
                    Ok(None) => {}
                    Err(e) => tracing::error!(err = %e, "battery check failed"),
                }
            }
        }
    }
}

async fn forward_connection_state(service: Arc<MonitoringService>) {
    let mut rx = service.connection.subscribe_state();
    loop {
        tokio::select! {
            _ = service.shutdown.cancelled() => break,
            changed = rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = rx.borrow_and_update().to_string();
                service.state.publish(Event::ConnectionChanged { state });
            }
        }
    }
}
