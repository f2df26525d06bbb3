//! S5 — retopic `later` mode (spec §8 scenario S5).
//!
//! Five messages sent in order; a `later` retopic anchored at the third
//! moves it and everything after it (3 of 5) to a sibling topic in the same
//! channel. Exactly 3 `message.moved_topic` events are emitted, and a
//! subscriber filtered to either topic sees all three (I8: `moved_topic`
//! populates both `topic_id` and `topic_id2`).

use hub_test_utils::TestHub;
use hub_protocol::Subscriptions;
use serde_json::Value;

#[tokio::test]
async fn later_mode_moves_anchor_and_successors_to_sibling_topic() {
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

    let source_topic: Value = client
        .post(format!("{}/channels/{channel_id}/topics", hub.http_base()))
        .bearer_auth(&hub.auth_token)
        .json(&serde_json::json!({ "title": "source" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let source_topic_id = source_topic["id"].as_i64().unwrap();

    let dest_topic: Value = client
        .post(format!("{}/channels/{channel_id}/topics", hub.http_base()))
        .bearer_auth(&hub.auth_token)
        .json(&serde_json::json!({ "title": "dest" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let dest_topic_id = dest_topic["id"].as_i64().unwrap();

    let mut message_ids = Vec::new();
    for i in 0..5 {
        let message: Value = client
            .post(format!("{}/topics/{source_topic_id}/messages", hub.http_base()))
            .bearer_auth(&hub.auth_token)
            .json(&serde_json::json!({ "sender": "alice", "content_raw": format!("msg {i}") }))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        message_ids.push(message["id"].as_i64().unwrap());
    }
    let anchor_message_id = message_ids[2];

    let retopic: Value = client
        .post(format!("{}/messages/{anchor_message_id}/retopic", hub.http_base()))
        .bearer_auth(&hub.auth_token)
        .json(&serde_json::json!({ "to_topic_id": dest_topic_id, "mode": "later" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(retopic["affected_count"], 3);
    let event_ids: Vec<i64> = retopic["event_ids"]
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_i64().unwrap())
        .collect();
    assert_eq!(event_ids.len(), 3);

    // A subscriber filtered to only the source topic should still see all
    // three moved_topic events (I8: scope.topic_id == source topic).
    let mut ws_source = hub_test_utils::RawWsClient::connect(&hub.ws_url(), &hub.auth_token)
        .await
        .unwrap();
    ws_source
        .send_hello(
            0,
            Some(Subscriptions {
                channels: vec![],
                topics: vec![source_topic_id],
            }),
        )
        .await
        .unwrap();
    let replay_until = match ws_source.recv().await.unwrap() {
        hub_protocol::ServerMessage::HelloOk(ok) => ok.replay_until,
        other => panic!("expected hello_ok, got {other:?}"),
    };

    let mut moved_events = Vec::new();
    loop {
        let event = ws_source.recv_event().await.unwrap();
        let at_boundary = event.event_id >= replay_until;
        if event.name == "message.moved_topic" {
            moved_events.push(event.event_id);
        }
        if at_boundary {
            break;
        }
    }
    assert_eq!(moved_events, event_ids);

    // A subscriber filtered to only the destination topic sees the same
    // three events (topic_id2 match).
    let mut ws_dest = hub_test_utils::RawWsClient::connect(&hub.ws_url(), &hub.auth_token)
        .await
        .unwrap();
    ws_dest
        .send_hello(
            0,
            Some(Subscriptions {
                channels: vec![],
                topics: vec![dest_topic_id],
            }),
        )
        .await
        .unwrap();
    let replay_until_dest = match ws_dest.recv().await.unwrap() {
        hub_protocol::ServerMessage::HelloOk(ok) => ok.replay_until,
        other => panic!("expected hello_ok, got {other:?}"),
    };
    let mut moved_events_dest = Vec::new();
    loop {
        let event = ws_dest.recv_event().await.unwrap();
        let at_boundary = event.event_id >= replay_until_dest;
        if event.name == "message.moved_topic" {
            moved_events_dest.push(event.event_id);
        }
        if at_boundary {
            break;
        }
    }
    assert_eq!(moved_events_dest, event_ids);

    // Messages 1, 2 stayed in the source topic; 3, 4, 5 moved to dest.
    let source_messages: Vec<Value> = client
        .get(format!("{}/topics/{source_topic_id}/messages", hub.http_base()))
        .bearer_auth(&hub.auth_token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(source_messages.len(), 2);

    let dest_messages: Vec<Value> = client
        .get(format!("{}/topics/{dest_topic_id}/messages", hub.http_base()))
        .bearer_auth(&hub.auth_token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(dest_messages.len(), 3);
}
