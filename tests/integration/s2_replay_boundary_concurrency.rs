//! S2 — replay boundary under concurrency (spec §8 scenario S2, testable
//! property 3 "replay boundary").
//!
//! `replay_until` is frozen at the instant of the handshake. Events
//! committed after that instant must never appear in the replay phase,
//! regardless of how long replay takes; they must appear in the live phase
//! instead.

use hub_test_utils::TestHub;
use serde_json::Value;
use std::time::Duration;

async fn create_channel(client: &reqwest::Client, hub: &TestHub, name: &str) -> i64 {
    let body: Value = client
        .post(format!("{}/channels", hub.http_base()))
        .bearer_auth(&hub.auth_token)
        .json(&serde_json::json!({ "name": name }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    body["id"].as_i64().unwrap()
}

async fn create_topic(client: &reqwest::Client, hub: &TestHub, channel_id: i64, title: &str) -> i64 {
    let body: Value = client
        .post(format!("{}/channels/{channel_id}/topics", hub.http_base()))
        .bearer_auth(&hub.auth_token)
        .json(&serde_json::json!({ "title": title }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    body["id"].as_i64().unwrap()
}

async fn send_message(client: &reqwest::Client, hub: &TestHub, topic_id: i64, sender: &str, content: &str) -> i64 {
    let body: Value = client
        .post(format!("{}/topics/{topic_id}/messages", hub.http_base()))
        .bearer_auth(&hub.auth_token)
        .json(&serde_json::json!({ "sender": sender, "content_raw": content }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    body["event_id"].as_i64().unwrap()
}

#[tokio::test]
async fn replay_boundary_is_frozen_at_handshake() {
    let hub = TestHub::spawn().await;
    let client = reqwest::Client::new();

    let channel_id = create_channel(&client, &hub, "general").await;
    let topic_id = create_topic(&client, &hub, channel_id, "firehose").await;

    // Commit 100 events (channel.created + topic.created + 98 messages).
    for i in 0..98 {
        send_message(&client, &hub, topic_id, "alice", &format!("msg {i}")).await;
    }

    let mut ws = hub_test_utils::RawWsClient::connect(&hub.ws_url(), &hub.auth_token)
        .await
        .unwrap();
    ws.send_hello(0, None).await.unwrap();
    let replay_until = match ws.recv().await.unwrap() {
        hub_protocol::ServerMessage::HelloOk(ok) => ok.replay_until,
        other => panic!("expected hello_ok, got {other:?}"),
    };
    assert_eq!(replay_until, 100);

    // Drain the first half of the replay, then commit 10 more events while
    // replay is still in flight.
    let mut seen = Vec::new();
    for _ in 0..50 {
        seen.push(ws.recv_event().await.unwrap().event_id);
    }

    for i in 0..10 {
        send_message(&client, &hub, topic_id, "bob", &format!("late {i}")).await;
    }

    for _ in 50..100 {
        seen.push(ws.recv_event().await.unwrap().event_id);
    }

    assert_eq!(seen, (1..=100).collect::<Vec<i64>>());
    assert!(
        seen.iter().all(|id| *id <= replay_until),
        "no event with id > replay_until may appear in the replay phase"
    );

    // The ten concurrently-committed events must arrive in the live phase,
    // with ids strictly greater than replay_until.
    let mut live = Vec::new();
    for _ in 0..10 {
        let event = tokio::time::timeout(Duration::from_secs(3), ws.recv_event())
            .await
            .expect("live event should arrive")
            .unwrap();
        assert!(event.event_id > replay_until);
        live.push(event.event_id);
    }
    assert_eq!(live, (101..=110).collect::<Vec<i64>>());
}
