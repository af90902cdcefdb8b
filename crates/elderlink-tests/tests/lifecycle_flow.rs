use elderlink::client::ElderClient;
use elderlink::protocol::{Event, Request};
use elderlink::wire::MessageType;
use elderlink_core::transport::ConnectionState;
use elderlink_tests::harness::{
    GUARDIAN, guardian_request, init_tracing, node::TestNode, paired_event, poll_until,
    relay::MockRelay, unpaired_event, unwrap_ok_data, wait_for_guardians,
};
use serde_json::json;
use std::time::Duration;

const WAIT: Duration = Duration::from_secs(5);

#[tokio::test]
async fn reconnects_after_relay_drops_the_socket() {
    init_tracing();
    let relay = MockRelay::spawn().await.unwrap();
    let node = TestNode::spawn(&relay.url()).await.unwrap();
    relay.wait_for_connections(1, WAIT).await.unwrap();

    relay.drop_elder().unwrap();
    relay.wait_for_connections(2, WAIT).await.unwrap();
    let connection = node.monitor.connection().clone();
    assert!(poll_until(|| connection.state() == ConnectionState::Connected, WAIT).await);

    let request = guardian_request(GUARDIAN, &node.elder_id, MessageType::GetState, "after-reconnect", json!({}));
    let reply = relay.ask(&request, WAIT).await.unwrap();
    assert_eq!(reply.message_type(), Some(MessageType::StateResponse));
}

#[tokio::test]
async fn status_reports_connection_and_guardians() {
    init_tracing();
    let relay = MockRelay::spawn().await.unwrap();
    let node = TestNode::spawn(&relay.url()).await.unwrap();
    relay.wait_for_connections(1, WAIT).await.unwrap();
    relay.send_to_elder(&paired_event(&node.elder_id, GUARDIAN, "Ana")).unwrap();
    assert!(wait_for_guardians(&node.state, 1, WAIT).await);

    let mut client = ElderClient::connect(&node.socket_path).await.unwrap();
    let connection = node.monitor.connection().clone();
    assert!(poll_until(|| connection.state() == ConnectionState::Connected, WAIT).await);
    let status = client.status().await.unwrap();
    assert_eq!(status.elder_id, node.elder_id);
    assert_eq!(status.connection, "connected");
    assert!(status.monitoring);
    assert_eq!(status.guardians.len(), 1);
    assert_eq!(status.guardians[0].guardian_id, GUARDIAN);
}

#[tokio::test]
async fn last_unpair_stops_monitoring() {
    init_tracing();
    let relay = MockRelay::spawn().await.unwrap();
    let node = TestNode::spawn(&relay.url()).await.unwrap();
    relay.wait_for_connections(1, WAIT).await.unwrap();
    relay.send_to_elder(&paired_event(&node.elder_id, GUARDIAN, "Ana")).unwrap();
    assert!(wait_for_guardians(&node.state, 1, WAIT).await);

    let mut client = ElderClient::connect(&node.socket_path).await.unwrap();
    relay.send_to_elder(&unpaired_event(&node.elder_id, GUARDIAN)).unwrap();

    client
        .next_event(WAIT, |e| matches!(e, Event::MonitoringStopped))
        .await
        .unwrap();
    tokio::time::timeout(WAIT, node.monitor.stopped()).await.unwrap();
    assert!(!node.monitor.is_running());
    assert_eq!(node.monitor.connection().state(), ConnectionState::Disconnected);

    // No reconnect, and local alerts no longer go anywhere.
    let raised = client
        .raise(&Request::TriggerSos { latitude: None, longitude: None })
        .await
        .unwrap();
    assert_eq!(raised.delivered, 0);
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(relay.connections(), 1);
}

#[tokio::test]
async fn shutdown_request_stops_the_daemon() {
    init_tracing();
    let relay = MockRelay::spawn().await.unwrap();
    let node = TestNode::spawn(&relay.url()).await.unwrap();
    let mut client = ElderClient::connect(&node.socket_path).await.unwrap();

    let data = unwrap_ok_data(client.round_trip(&Request::Shutdown).await.unwrap());
    assert!(data.is_none());
    tokio::time::timeout(WAIT, node.monitor.stopped()).await.unwrap();
}
