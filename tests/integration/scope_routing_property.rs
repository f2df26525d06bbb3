//! Property 5 — scope routing (§4.4, I8): a session with subscription
//! filters `{channels, topics}` receives an event iff the filter matches the
//! event's scope; a session with no filters at all receives everything.

use hub_test_utils::TestHub;
use hub_protocol::Subscriptions;
use serde_json::Value;

#[tokio::test]
async fn channel_filter_excludes_events_from_other_channels() {
    let hub = TestHub::spawn().await;
    let client = reqwest::Client::new();

    let channel_a: Value = client
        .post(format!("{}/channels", hub.http_base()))
        .bearer_auth(&hub.auth_token)
        .json(&serde_json::json!({ "name": "channel-a" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let channel_a_id = channel_a["id"].as_i64().unwrap();

    let channel_b: Value = client
        .post(format!("{}/channels", hub.http_base()))
        .bearer_auth(&hub.auth_token)
        .json(&serde_json::json!({ "name": "channel-b" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let channel_b_id = channel_b["id"].as_i64().unwrap();

    let topic_a: Value = client
        .post(format!("{}/channels/{channel_a_id}/topics", hub.http_base()))
        .bearer_auth(&hub.auth_token)
        .json(&serde_json::json!({ "title": "topic-a" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let topic_a_id = topic_a["id"].as_i64().unwrap();

    let topic_b: Value = client
        .post(format!("{}/channels/{channel_b_id}/topics", hub.http_base()))
        .bearer_auth(&hub.auth_token)
        .json(&serde_json::json!({ "title": "topic-b" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let topic_b_id = topic_b["id"].as_i64().unwrap();

    client
        .post(format!("{}/topics/{topic_a_id}/messages", hub.http_base()))
        .bearer_auth(&hub.auth_token)
        .json(&serde_json::json!({ "sender": "alice", "content_raw": "in a" }))
        .send()
        .await
        .unwrap();
    client
        .post(format!("{}/topics/{topic_b_id}/messages", hub.http_base()))
        .bearer_auth(&hub.auth_token)
        .json(&serde_json::json!({ "sender": "bob", "content_raw": "in b" }))
        .send()
        .await
        .unwrap();

    // A session subscribed only to channel A sees channel.created(A) and
    // topic.created(A) and message.created(A), never anything from B.
    let mut ws = hub_test_utils::RawWsClient::connect(&hub.ws_url(), &hub.auth_token)
        .await
        .unwrap();
    ws.send_hello(
        0,
        Some(Subscriptions {
            channels: vec![channel_a_id],
            topics: vec![],
        }),
    )
    .await
    .unwrap();
    let replay_until = match ws.recv().await.unwrap() {
        hub_protocol::ServerMessage::HelloOk(ok) => ok.replay_until,
        other => panic!("expected hello_ok, got {other:?}"),
    };

    let mut seen_names = Vec::new();
    loop {
        let event = ws.recv_event().await.unwrap();
        assert_eq!(
            event.scope.channel_id,
            Some(channel_a_id),
            "event {event:?} leaked across the channel filter"
        );
        seen_names.push(event.name.clone());
        if event.event_id >= replay_until {
            break;
        }
    }
    assert_eq!(seen_names, vec!["channel.created", "topic.created", "message.created"]);
}

#[tokio::test]
async fn empty_subscription_receives_every_event() {
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
    client
        .post(format!("{}/topics/{topic_id}/messages", hub.http_base()))
        .bearer_auth(&hub.auth_token)
        .json(&serde_json::json!({ "sender": "alice", "content_raw": "hi" }))
        .send()
        .await
        .unwrap();

    let mut ws = hub_test_utils::RawWsClient::connect(&hub.ws_url(), &hub.auth_token)
        .await
        .unwrap();
    ws.send_hello(0, None).await.unwrap();
    let replay_until = match ws.recv().await.unwrap() {
        hub_protocol::ServerMessage::HelloOk(ok) => ok.replay_until,
        other => panic!("expected hello_ok, got {other:?}"),
    };
    assert_eq!(replay_until, 3);

    let mut count = 0;
    loop {
        let event = ws.recv_event().await.unwrap();
        count += 1;
        if event.event_id >= replay_until {
            break;
        }
    }
    assert_eq!(count, 3, "an empty subscription filter must receive every event");
}
