//! S6 — reconnect resume (spec §8 scenario S6, §4.5).
//!
//! A client consumes events up to some cursor K, the connection is closed
//! (simulated here by closing the `ClientHandle` and starting a fresh one
//! seeded with `after_event_id=K`, since the reconnect engine's own
//! transport-level retry is already covered by its unit tests), two more
//! events are committed while no client is attached, and the new client
//! resumes from K and receives exactly those two events, in order, with no
//! gap and no duplicate.

use hub_client::{ClientConfig, ClientHandle};
use hub_test_utils::TestHub;
use serde_json::Value;
use std::time::Duration;

#[tokio::test]
async fn client_resumes_from_cursor_with_no_gap_or_duplicate() {
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
    let topic_id = topic["id"].as_i64().unwrap();

    for i in 0..3 {
        client
            .post(format!("{}/topics/{topic_id}/messages", hub.http_base()))
            .bearer_auth(&hub.auth_token)
            .json(&serde_json::json!({ "sender": "alice", "content_raw": format!("msg {i}") }))
            .send()
            .await
            .unwrap();
    }

    let mut first_session = ClientHandle::connect(ClientConfig {
        url: hub.ws_url(),
        token: hub.auth_token.clone(),
        ..Default::default()
    });

    let mut cursor = 0;
    for _ in 0..5 {
        let event = tokio::time::timeout(Duration::from_secs(3), first_session.next_event())
            .await
            .expect("event should arrive")
            .expect("stream should not end");
        cursor = event.event_id;
    }
    assert_eq!(cursor, first_session.last_event_id());
    first_session.close();
    drop(first_session);

    // Two more events committed while nobody is connected.
    let mut late_event_ids = Vec::new();
    for i in 0..2 {
        let body: Value = client
            .post(format!("{}/topics/{topic_id}/messages", hub.http_base()))
            .bearer_auth(&hub.auth_token)
            .json(&serde_json::json!({ "sender": "bob", "content_raw": format!("late {i}") }))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        late_event_ids.push(body["event_id"].as_i64().unwrap());
    }

    let mut resumed = ClientHandle::connect(ClientConfig {
        url: hub.ws_url(),
        token: hub.auth_token.clone(),
        after_event_id: cursor,
        ..Default::default()
    });

    let mut received = Vec::new();
    for _ in 0..2 {
        let event = tokio::time::timeout(Duration::from_secs(3), resumed.next_event())
            .await
            .expect("resumed event should arrive")
            .expect("stream should not end");
        received.push(event.event_id);
    }

    assert_eq!(received, late_event_ids);
    assert!(received.iter().all(|id| *id > cursor));
}
