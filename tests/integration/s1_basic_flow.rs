//! S1 — basic flow (spec §8 scenario S1).
//!
//! createChannel -> createTopic -> sendMessage each append one event in
//! strictly increasing order; a fresh WS session with `after_event_id=0`
//! replays exactly those three events, in order, then blocks (no further
//! frames arrive until something new is published).

use hub_test_utils::TestHub;
use serde_json::Value;
use std::time::Duration;

#[tokio::test]
async fn s1_basic_flow_replays_exactly_three_events_then_blocks() {
    let hub = TestHub::spawn().await;
    let client = reqwest::Client::new();

    let channel: Value = client
        .post(format!("{}/channels", hub.http_base()))
        .bearer_auth(&hub.auth_token)
        .json(&serde_json::json!({ "name": "general" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let e1 = channel["event_id"].as_i64().unwrap();
    let channel_id = channel["id"].as_i64().unwrap();

    let topic: Value = client
        .post(format!("{}/channels/{channel_id}/topics", hub.http_base()))
        .bearer_auth(&hub.auth_token)
        .json(&serde_json::json!({ "title": "Intro" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let e2 = topic["event_id"].as_i64().unwrap();
    let topic_id = topic["id"].as_i64().unwrap();
    assert_eq!(e2, e1 + 1);

    let message: Value = client
        .post(format!("{}/topics/{topic_id}/messages", hub.http_base()))
        .bearer_auth(&hub.auth_token)
        .json(&serde_json::json!({ "sender": "alice", "content_raw": "hi" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let e3 = message["event_id"].as_i64().unwrap();
    assert_eq!(e3, e2 + 1);
    assert_eq!(message["version"], 1);

    let mut ws = hub_test_utils::RawWsClient::connect(&hub.ws_url(), &hub.auth_token)
        .await
        .unwrap();
    ws.send_hello(0, None).await.unwrap();
    match ws.recv().await.unwrap() {
        hub_protocol::ServerMessage::HelloOk(ok) => assert_eq!(ok.replay_until, e3),
        other => panic!("expected hello_ok, got {other:?}"),
    }

    let first = ws.recv_event().await.unwrap();
    let second = ws.recv_event().await.unwrap();
    let third = ws.recv_event().await.unwrap();
    assert_eq!(
        vec![first.event_id, second.event_id, third.event_id],
        vec![e1, e2, e3]
    );
    assert_eq!(first.name, "channel.created");
    assert_eq!(second.name, "topic.created");
    assert_eq!(third.name, "message.created");

    // No fourth frame should show up; the session is now blocked in the live
    // phase with nothing new committed.
    let blocked = tokio::time::timeout(Duration::from_millis(300), ws.recv_event()).await;
    assert!(blocked.is_err(), "session should block with no new events");
}
