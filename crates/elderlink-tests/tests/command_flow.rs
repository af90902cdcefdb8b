use elderlink::client::{DaemonError, ElderClient};
use elderlink::payloads::{
    MedicationAction, MedicationSchedulePayload, MedicationUpdatedPayload,
    MedicationsResponsePayload,
};
use elderlink::protocol::{Event, Importance, Request};
use elderlink::wire::MessageType;
use elderlink_tests::harness::{
    GUARDIAN, guardian_request, init_tracing, node::TestNode, paired_event, relay::MockRelay,
    wait_for_guardians,
};
use elderlink_tests::{extract_array, extract_str};
use serde_json::json;
use std::collections::HashSet;
use std::time::Duration;

const WAIT: Duration = Duration::from_secs(5);

#[tokio::test]
async fn add_medication_replies_then_notifies_every_guardian() {
    init_tracing();
    let relay = MockRelay::spawn().await.unwrap();
    let node = TestNode::spawn(&relay.url()).await.unwrap();
    relay.wait_for_connections(1, WAIT).await.unwrap();

    relay.send_to_elder(&paired_event(&node.elder_id, GUARDIAN, "Ana")).unwrap();
    relay.send_to_elder(&paired_event(&node.elder_id, "guardian-ben", "Ben")).unwrap();
    assert!(wait_for_guardians(&node.state, 2, WAIT).await);

    let add = guardian_request(
        GUARDIAN,
        &node.elder_id,
        MessageType::AddMedication,
        "req-add",
        json!({
            "name": "Metformin",
            "dosage": "500mg",
            "instructions": "with breakfast",
            "schedules": [{"time": "08:00", "daysOfWeek": [1, 2, 3, 4, 5]}]
        }),
    );
    relay.send_to_elder(&add).unwrap();

    let mut reply = None;
    let mut pushed_to = HashSet::new();
    while reply.is_none() || pushed_to.len() < 2 {
        let env = relay.next_from_elder(WAIT).await.unwrap();
        match env.message_type() {
            Some(MessageType::CommandSuccess) => reply = Some(env),
            Some(MessageType::MedicationUpdated) => {
                let payload: MedicationUpdatedPayload = env.payload_as().unwrap();
                assert_eq!(payload.action, MedicationAction::Added);
                assert_eq!(payload.medication.name, "Metformin");
                assert_eq!(payload.schedules[0].days_of_week, vec![1, 2, 3, 4, 5]);
                pushed_to.insert(env.to);
            }
            other => panic!("unexpected frame {other:?}"),
        }
    }
    let reply = reply.unwrap();
    assert_eq!(reply.request_id, "req-add");
    assert_eq!(reply.to, GUARDIAN);
    let medication_id = extract_str(&reply.payload, &["data", "medicationId"]);
    assert_eq!(
        pushed_to,
        HashSet::from([GUARDIAN.to_string(), "guardian-ben".to_string()])
    );

    let list = guardian_request(GUARDIAN, &node.elder_id, MessageType::GetMedications, "req-list", json!({}));
    let reply = relay.ask(&list, WAIT).await.unwrap();
    let meds: MedicationsResponsePayload = reply.payload_as().unwrap();
    assert_eq!(meds.medications.len(), 1);
    assert_eq!(meds.medications[0].id, medication_id);
    assert_eq!(meds.schedules[0].time, "08:00");
}

#[tokio::test]
async fn duplicate_delete_is_refused() {
    init_tracing();
    let relay = MockRelay::spawn().await.unwrap();
    let node = TestNode::spawn(&relay.url()).await.unwrap();
    relay.wait_for_connections(1, WAIT).await.unwrap();

    let add = guardian_request(
        GUARDIAN,
        &node.elder_id,
        MessageType::AddMedication,
        "req-add",
        json!({"name": "Aspirin", "dosage": "81mg", "instructions": "", "schedules": [{"time": "09:00"}]}),
    );
    let reply = relay.ask(&add, WAIT).await.unwrap();
    let id = reply.payload.unwrap()["data"]["medicationId"].clone();

    let delete = |rid: &str| {
        guardian_request(
            GUARDIAN,
            &node.elder_id,
            MessageType::DeleteMedication,
            rid,
            json!({"medicationId": id}),
        )
    };
    let first = relay.ask(&delete("del-1"), WAIT).await.unwrap();
    assert_eq!(first.message_type(), Some(MessageType::CommandSuccess));

    let second = relay.ask(&delete("del-2"), WAIT).await.unwrap();
    assert_eq!(second.message_type(), Some(MessageType::CommandError));
    assert_eq!(second.payload.unwrap()["error"], "Medication not found");
}

#[tokio::test]
async fn guardian_message_reaches_local_shell() {
    init_tracing();
    let relay = MockRelay::spawn().await.unwrap();
    let node = TestNode::spawn(&relay.url()).await.unwrap();
    relay.wait_for_connections(1, WAIT).await.unwrap();
    let mut client = ElderClient::connect(&node.socket_path).await.unwrap();
    assert_eq!(client.elder_id(), node.elder_id);

    let msg = guardian_request(
        GUARDIAN,
        &node.elder_id,
        MessageType::SendMessage,
        "req-msg",
        json!({"guardianName": "Ana", "message": "Dinner at six"}),
    );
    let reply = relay.ask(&msg, WAIT).await.unwrap();
    assert_eq!(reply.payload.unwrap()["message"], "Message sent successfully");

    let event = client
        .next_event(WAIT, |e| matches!(e, Event::Notification { .. }))
        .await
        .unwrap();
    let Event::Notification {
        title,
        body,
        importance,
        ..
    } = event
    else {
        unreachable!()
    };
    assert_eq!(title, "Message from Ana");
    assert_eq!(body, "Dinner at six");
    assert_eq!(importance, Importance::High);
}

#[tokio::test]
async fn contact_update_round_trip() {
    init_tracing();
    let relay = MockRelay::spawn().await.unwrap();
    let node = TestNode::spawn(&relay.url()).await.unwrap();
    relay.wait_for_connections(1, WAIT).await.unwrap();

    let add = guardian_request(
        GUARDIAN,
        &node.elder_id,
        MessageType::UpdateEmergencyContact,
        "req-contact",
        json!({"name": "Dana", "phoneNumber": "555-0100", "relationship": "daughter", "isPrimary": true}),
    );
    let reply = relay.ask(&add, WAIT).await.unwrap();
    assert_eq!(reply.message_type(), Some(MessageType::CommandSuccess));

    let mut client = ElderClient::connect(&node.socket_path).await.unwrap();
    let status = client.status().await.unwrap();
    assert_eq!(status.emergency_contacts.len(), 1);
    let primary = &status.emergency_contacts[0];
    assert!(primary.is_primary);
    assert_eq!(primary.name, "Dana");
    assert_eq!(primary.relationship, "daughter");
}

#[tokio::test]
async fn local_medication_change_is_announced() {
    init_tracing();
    let relay = MockRelay::spawn().await.unwrap();
    let node = TestNode::spawn(&relay.url()).await.unwrap();
    relay.wait_for_connections(1, WAIT).await.unwrap();

    let add = guardian_request(
        GUARDIAN,
        &node.elder_id,
        MessageType::AddMedication,
        "req-add",
        json!({"name": "Lisinopril", "dosage": "10mg", "instructions": "", "schedules": [{"time": "07:30"}]}),
    );
    let reply = relay.ask(&add, WAIT).await.unwrap();
    let medication_id: i64 = extract_str(&reply.payload, &["data", "medicationId"]).parse().unwrap();

    relay.send_to_elder(&paired_event(&node.elder_id, GUARDIAN, "Ana")).unwrap();
    assert!(wait_for_guardians(&node.state, 1, WAIT).await);

    let mut client = ElderClient::connect(&node.socket_path).await.unwrap();
    let notice = client
        .edit_medication(&Request::MedicationChanged {
            medication_id,
            action: MedicationAction::Updated,
        })
        .await
        .unwrap();
    assert_eq!(notice.notified, 1);

    let (push, payload) = loop {
        let push = relay.next_of_type(MessageType::MedicationUpdated, WAIT).await.unwrap();
        let payload: MedicationUpdatedPayload = push.payload_as().unwrap();
        if payload.action == MedicationAction::Updated {
            break (push, payload);
        }
    };
    assert_eq!(push.to, GUARDIAN);
    assert_eq!(payload.medication.id, medication_id.to_string());
    assert_eq!(payload.schedules[0].time, "07:30");
}

#[tokio::test]
async fn medication_added_on_device_is_served_to_guardians() {
    init_tracing();
    let relay = MockRelay::spawn().await.unwrap();
    let node = TestNode::spawn(&relay.url()).await.unwrap();
    relay.wait_for_connections(1, WAIT).await.unwrap();
    relay.send_to_elder(&paired_event(&node.elder_id, GUARDIAN, "Ana")).unwrap();
    assert!(wait_for_guardians(&node.state, 1, WAIT).await);

    let mut client = ElderClient::connect(&node.socket_path).await.unwrap();
    let notice = client
        .edit_medication(&Request::AddMedication {
            name: "Warfarin".into(),
            dosage: "2mg".into(),
            instructions: String::new(),
            schedules: vec![MedicationSchedulePayload {
                time: "18:00".into(),
                days_of_week: vec![1, 3, 5],
                enabled: true,
            }],
        })
        .await
        .unwrap();
    assert_eq!(notice.notified, 1);

    let push = relay.next_of_type(MessageType::MedicationUpdated, WAIT).await.unwrap();
    let payload: MedicationUpdatedPayload = push.payload_as().unwrap();
    assert_eq!(payload.action, MedicationAction::Added);
    assert_eq!(payload.medication.id, notice.medication_id.to_string());

    let list = guardian_request(
        GUARDIAN,
        &node.elder_id,
        MessageType::GetMedications,
        "req-list",
        json!({}),
    );
    let reply = relay.ask(&list, WAIT).await.unwrap();
    let meds: MedicationsResponsePayload = reply.payload_as().unwrap();
    assert_eq!(meds.medications.len(), 1);
    assert_eq!(meds.schedules[0].days_of_week, vec![1, 3, 5]);

    let err = client
        .edit_medication(&Request::UpdateMedication {
            medication_id: notice.medication_id,
            name: Some("   ".into()),
            dosage: None,
            instructions: None,
            schedules: None,
        })
        .await
        .unwrap_err();
    assert_eq!(err.downcast_ref::<DaemonError>().unwrap().code, "invalid_request");
}

#[tokio::test]
async fn check_in_from_device_appears_in_health_history() {
    init_tracing();
    let relay = MockRelay::spawn().await.unwrap();
    let node = TestNode::spawn(&relay.url()).await.unwrap();
    relay.wait_for_connections(1, WAIT).await.unwrap();

    let mut client = ElderClient::connect(&node.socket_path).await.unwrap();
    let id = client
        .record_check_in(&Request::RecordCheckIn {
            date: None,
            mood: Some(5),
            pain_level: Some(1),
            sleep_quality: Some(4),
            symptoms: Vec::new(),
            notes: "slept well".into(),
        })
        .await
        .unwrap();

    let history = guardian_request(
        GUARDIAN,
        &node.elder_id,
        MessageType::GetHealthHistory,
        "req-health",
        json!({}),
    );
    let reply = relay.ask(&history, WAIT).await.unwrap();
    let check_ins = extract_array(&reply.payload, &["checkIns"]);
    assert_eq!(check_ins.len(), 1);
    assert_eq!(check_ins[0]["id"], id.to_string());
    assert_eq!(check_ins[0]["notes"], "slept well");
}
