use elderlink::client::{DaemonError, ElderClient};
use elderlink::payloads::{AlertInfo, AlertKind};
use elderlink::protocol::Request;
use elderlink::wire::MessageType;
use elderlink_node::monitor::MonitorConfig;
use elderlink_tests::harness::{
    GUARDIAN, init_tracing, node::TestNode, paired_event, relay::MockRelay, wait_for_guardians,
};
use std::time::Duration;

const WAIT: Duration = Duration::from_secs(5);

#[tokio::test]
async fn sos_from_local_ui_reaches_guardian() {
    init_tracing();
    let relay = MockRelay::spawn().await.unwrap();
    let node = TestNode::spawn(&relay.url()).await.unwrap();
    relay.wait_for_connections(1, WAIT).await.unwrap();
    relay.send_to_elder(&paired_event(&node.elder_id, GUARDIAN, "Ana")).unwrap();
    assert!(wait_for_guardians(&node.state, 1, WAIT).await);

    let mut client = ElderClient::connect(&node.socket_path).await.unwrap();
    let raised = client
        .raise(&Request::TriggerSos {
            latitude: Some(51.5),
            longitude: Some(-0.12),
        })
        .await
        .unwrap();
    assert_eq!(raised.delivered, 1);

    let push = relay.next_of_type(MessageType::AlertEvent, WAIT).await.unwrap();
    assert_eq!(push.to, GUARDIAN);
    assert_eq!(push.from, node.elder_id);
    assert!(!push.request_id.is_empty());
    let alert: AlertInfo = push.payload_as().unwrap();
    assert_eq!(alert.kind, AlertKind::Sos);
    assert_eq!(alert.id, raised.alert_id.to_string());
    assert_eq!(alert.elder_id, node.elder_id);
    assert_eq!(alert.location.unwrap().longitude, -0.12);
    let raw = push.payload.unwrap();
    assert_eq!(raw["type"], "SOS");
}

#[tokio::test]
async fn alert_without_guardians_stays_local() {
    init_tracing();
    let relay = MockRelay::spawn().await.unwrap();
    let node = TestNode::spawn(&relay.url()).await.unwrap();
    relay.wait_for_connections(1, WAIT).await.unwrap();

    let mut client = ElderClient::connect(&node.socket_path).await.unwrap();
    let raised = client.raise(&Request::TriggerFall { latitude: None, longitude: None }).await.unwrap();
    assert_eq!(raised.delivered, 0);

    let frames = relay.collect_for(Duration::from_millis(300)).await;
    assert!(frames.is_empty(), "unexpected frames: {frames:?}");
    assert_eq!(node.state.alerts.lock().await.all().len(), 1);
}

#[tokio::test]
async fn low_battery_is_reported_once_after_pairing() {
    init_tracing();
    let relay = MockRelay::spawn().await.unwrap();
    let config = MonitorConfig {
        battery_check_interval: Duration::from_millis(100),
        ..MonitorConfig::default()
    };
    let node = TestNode::spawn_with(&relay.url(), Some(80), config).await.unwrap();
    relay.wait_for_connections(1, WAIT).await.unwrap();

    let mut client = ElderClient::connect(&node.socket_path).await.unwrap();
    client.raise(&Request::TriggerFall { latitude: None, longitude: None }).await.unwrap();

    relay.send_to_elder(&paired_event(&node.elder_id, GUARDIAN, "Ana")).unwrap();
    assert!(wait_for_guardians(&node.state, 1, WAIT).await);
    node.battery.set(Some(15));

    // Several check intervals pass; the cooldown keeps it to one alert.
    let frames = relay.collect_for(Duration::from_millis(800)).await;
    let alerts: Vec<AlertInfo> = frames
        .iter()
        .filter(|e| e.message_type() == Some(MessageType::AlertEvent))
        .map(|e| e.payload_as().unwrap())
        .collect();
    assert_eq!(alerts.len(), 1, "frames: {frames:?}");
    assert_eq!(alerts[0].kind, AlertKind::LowBattery);
    assert_eq!(alerts[0].battery_level, Some(15));
}

#[tokio::test]
async fn resolve_alert_over_control_socket() {
    init_tracing();
    let relay = MockRelay::spawn().await.unwrap();
    let node = TestNode::spawn(&relay.url()).await.unwrap();
    let mut client = ElderClient::connect(&node.socket_path).await.unwrap();

    let raised = client.raise(&Request::TriggerInactivity { hours: 6 }).await.unwrap();
    client.resolve_alert(raised.alert_id).await.unwrap();

    let alerts = node.state.alerts.lock().await;
    let alert = alerts.get(raised.alert_id).unwrap();
    assert!(alert.resolved);
    assert!(alert.resolved_at_ms.is_some());
    drop(alerts);

    let err = client.resolve_alert(4242).await.unwrap_err();
    let err = err.downcast_ref::<DaemonError>().unwrap();
    assert_eq!(err.code, "not_found");
    assert!(err.message.contains("4242"));
}
