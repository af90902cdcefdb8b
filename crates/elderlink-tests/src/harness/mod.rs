pub mod node;
pub mod relay;

use elderlink::protocol::Response;
use elderlink::wire::{Envelope, MessageType};
use elderlink_node::handler::ElderState;
use std::time::Duration;

/// Guardian id used by single-guardian scenarios.
pub const GUARDIAN: &str = "guardian-ana";

/// A guardian-originated envelope addressed to `elder_id`.
pub fn guardian_request(
    from: &str,
    elder_id: &str,
    kind: MessageType,
    request_id: &str,
    payload: serde_json::Value,
) -> Envelope {
    Envelope::new(kind, from, elder_id, request_id, Some(payload))
}

/// The relay's `guardian_paired` event for `guardian_id`.
pub fn paired_event(elder_id: &str, guardian_id: &str, guardian_name: &str) -> Envelope {
    Envelope::push(
        MessageType::GuardianPaired,
        "relay",
        elder_id,
        serde_json::json!({ "guardianId": guardian_id, "guardianName": guardian_name }),
    )
}

/// The relay's `guardian_unpaired` event for `guardian_id`.
pub fn unpaired_event(elder_id: &str, guardian_id: &str) -> Envelope {
    Envelope::push(
        MessageType::GuardianUnpaired,
        "relay",
        elder_id,
        serde_json::json!({ "guardianId": guardian_id }),
    )
}

/// Poll `check` until it returns true, or timeout. Returns the final result.
pub async fn poll_until<F>(mut check: F, timeout: Duration) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if check() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

/// Wait until exactly `count` guardians are paired.
pub async fn wait_for_guardians(state: &ElderState, count: usize, timeout: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if state.guardians.lock().await.len() == count {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

/// Initialize tracing for tests (only once per process).
pub fn init_tracing() {
    use std::sync::Once;
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter("elderlink_node=debug,elderlink_core=debug,elderlink_tests=debug")
            .with_test_writer()
            .try_init()
            .ok();
    });
}

/// Extract data from an Ok response, or panic.
pub fn unwrap_ok_data(resp: Response) -> Option<serde_json::Value> {
    match resp {
        Response::Ok { data } => data,
        Response::Error { code, message } => panic!("expected Ok, got Error({code}): {message}"),
        other => panic!("expected Ok, got {other:?}"),
    }
}
