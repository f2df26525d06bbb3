//! S3 — version conflict, and S4 — idempotent delete (spec §8).
//!
//! S3: two concurrent `editMessage` calls racing on the same
//! `expected_version` — exactly one wins; the other gets `version-conflict`
//! with `current_version` reflecting the winner's new version.
//!
//! S4: `deleteMessage` called twice — the second call is a no-op returning
//! `event_id: null`, and only one `message.deleted` event is ever recorded.

use hub_test_utils::TestHub;
use serde_json::Value;

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

async fn send_message(client: &reqwest::Client, hub: &TestHub, topic_id: i64) -> Value {
    client
        .post(format!("{}/topics/{topic_id}/messages", hub.http_base()))
        .bearer_auth(&hub.auth_token)
        .json(&serde_json::json!({ "sender": "alice", "content_raw": "hi" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap()
}

#[tokio::test]
async fn concurrent_edits_with_same_expected_version_one_wins_one_conflicts() {
    let hub = TestHub::spawn().await;
    let client = reqwest::Client::new();

    let channel_id = create_channel(&client, &hub, "general").await;
    let topic_id = create_topic(&client, &hub, channel_id, "Intro").await;
    let message = send_message(&client, &hub, topic_id).await;
    let message_id = message["id"].as_i64().unwrap();
    assert_eq!(message["version"], 1);

    let edit_a = client
        .patch(format!("{}/messages/{message_id}", hub.http_base()))
        .bearer_auth(&hub.auth_token)
        .json(&serde_json::json!({ "new_content": "edit a", "expected_version": 1 }))
        .send()
        .await
        .unwrap();
    let edit_b = client
        .patch(format!("{}/messages/{message_id}", hub.http_base()))
        .bearer_auth(&hub.auth_token)
        .json(&serde_json::json!({ "new_content": "edit b", "expected_version": 1 }))
        .send()
        .await
        .unwrap();

    let statuses = [edit_a.status(), edit_b.status()];
    let ok_count = statuses.iter().filter(|s| s.is_success()).count();
    let conflict_count = statuses.iter().filter(|s| s.as_u16() == 409).count();
    assert_eq!(ok_count, 1, "exactly one of the two racing edits must succeed");
    assert_eq!(conflict_count, 1, "the other must fail with a conflict");

    let (winner, loser) = if statuses[0].is_success() {
        (edit_a, edit_b)
    } else {
        (edit_b, edit_a)
    };
    let winner_body: Value = winner.json().await.unwrap();
    assert_eq!(winner_body["version"], 2);

    let loser_body: Value = loser.json().await.unwrap();
    assert_eq!(loser_body["code"], "version-conflict");
    assert_eq!(loser_body["details"]["current_version"], 2);
}

#[tokio::test]
async fn repeated_delete_is_idempotent_and_emits_one_event() {
    let hub = TestHub::spawn().await;
    let client = reqwest::Client::new();

    let channel_id = create_channel(&client, &hub, "general").await;
    let topic_id = create_topic(&client, &hub, channel_id, "Intro").await;
    let message = send_message(&client, &hub, topic_id).await;
    let message_id = message["id"].as_i64().unwrap();

    let first = client
        .delete(format!("{}/messages/{message_id}", hub.http_base()))
        .bearer_auth(&hub.auth_token)
        .json(&serde_json::json!({ "actor": "alice" }))
        .send()
        .await
        .unwrap();
    assert!(first.status().is_success());
    let first_body: Value = first.json().await.unwrap();
    let first_event_id = first_body["event_id"].as_i64().unwrap();
    assert_eq!(first_body["version"], 2);

    let second = client
        .delete(format!("{}/messages/{message_id}", hub.http_base()))
        .bearer_auth(&hub.auth_token)
        .json(&serde_json::json!({ "actor": "bob" }))
        .send()
        .await
        .unwrap();
    assert!(second.status().is_success());
    let second_body: Value = second.json().await.unwrap();
    assert!(second_body["event_id"].is_null(), "a repeat delete must not mint a new event");
    // The message itself is unchanged by the no-op second call — still
    // attributed to whoever deleted it first.
    assert_eq!(second_body["version"], 2);
    assert_eq!(second_body["deleted_by"], "alice");

    // Only one `message.deleted` event should ever have been recorded: a
    // fresh WS session replaying from the start sees exactly one.
    let mut ws = hub_test_utils::RawWsClient::connect(&hub.ws_url(), &hub.auth_token)
        .await
        .unwrap();
    ws.send_hello(0, None).await.unwrap();
    match ws.recv().await.unwrap() {
        hub_protocol::ServerMessage::HelloOk(ok) => assert_eq!(ok.replay_until, first_event_id),
        other => panic!("expected hello_ok, got {other:?}"),
    }
    let mut deleted_count = 0;
    for _ in 0..first_event_id {
        let event = ws.recv_event().await.unwrap();
        if event.name == "message.deleted" {
            deleted_count += 1;
        }
    }
    assert_eq!(deleted_count, 1);
}
