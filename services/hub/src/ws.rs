//! The `/ws` endpoint: handshake, replay phase, live phase (§4.4).
//!
//! Generalises the teacher's `ws_forwarder.rs` / `ws_receiver.rs` into one
//! handler, since this system has a single peer role rather than
//! forwarder+receiver. The auth check happens after the HTTP upgrade
//! completes, matching §6: "On auth failure the upgrade closes with a
//! dedicated close code ... and never becomes a session" — the socket is
//! accepted, then closed with `4401` before any session state is created.

use crate::auth::token_matches;
use crate::envelope::to_envelope;
use crate::state::AppState;
use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use hub_protocol::{
    close_codes, ClientMessage, EventEnvelope, HelloOkMessage, ServerMessage, Subscriptions,
};
use hub_store::ReplayQuery;
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{info, warn};

/// Bound on how long the hub waits for the `hello` frame after upgrade,
/// mirroring the teacher's `SESSION_TIMEOUT` symmetry note (§5: "server
/// side closes idle handshakes symmetrically").
const HELLO_TIMEOUT: Duration = Duration::from_secs(10);
/// Page size for the replay phase (§4.4: "in batches (bounded by an
/// internal page size)").
const REPLAY_PAGE_SIZE: i64 = 200;
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    #[serde(default)]
    pub token: String,
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, query.token))
}

async fn handle_socket(mut socket: WebSocket, state: AppState, token: String) {
    if !token_matches(&state.auth_token, &token) {
        close_with(&mut socket, close_codes::UNAUTHORIZED, "unauthorised").await;
        return;
    }

    // Subscribe before computing `replay_until` so no event committed after
    // this instant is ever missed between the replay and live phases (§4.4
    // transition invariant).
    let mut live_rx = state.events_tx.subscribe();

    let hello = match recv_hello(&mut socket).await {
        Ok(hello) => hello,
        Err(reason) => {
            close_with(&mut socket, close_codes::POLICY_VIOLATION, reason).await;
            return;
        }
    };
    let subscriptions = hello.subscriptions.unwrap_or_default();

    let replay_until = {
        let store = state.store.lock().await;
        match store.max_event_id() {
            Ok(id) => id,
            Err(e) => {
                warn!(error = %e, "failed to read max event id");
                close_with(&mut socket, close_codes::INTERNAL_ERROR, "store error").await;
                return;
            }
        }
    };

    let hello_ok = ServerMessage::HelloOk(HelloOkMessage {
        replay_until,
        instance_id: state.instance_id.clone(),
    });
    if send_frame(&mut socket, &hello_ok).await.is_err() {
        return;
    }
    info!(
        after_event_id = hello.after_event_id,
        replay_until, "hub session established"
    );

    if let Err(reason) = run_replay_phase(
        &mut socket,
        &state,
        hello.after_event_id,
        replay_until,
        &subscriptions,
    )
    .await
    {
        close_with(&mut socket, close_codes::INTERNAL_ERROR, reason).await;
        return;
    }

    run_live_phase(&mut socket, &mut live_rx, replay_until, &subscriptions).await;
}

async fn recv_hello(socket: &mut WebSocket) -> Result<hub_protocol::HelloMessage, &'static str> {
    let msg = match tokio::time::timeout(HELLO_TIMEOUT, socket.recv()).await {
        Ok(Some(Ok(Message::Text(text)))) => text,
        Ok(Some(Ok(Message::Close(_)))) | Ok(None) => return Err("closed before hello"),
        Ok(Some(Err(_))) => return Err("transport error before hello"),
        Ok(Some(Ok(_))) => return Err("expected a text hello frame"),
        Err(_) => return Err("timed out waiting for hello"),
    };
    match serde_json::from_str::<ClientMessage>(&msg) {
        Ok(ClientMessage::Hello(hello)) => Ok(hello),
        Err(_) => Err("invalid hello JSON"),
    }
}

/// Streams every matching event with `after_event_id < event_id <=
/// replay_until` in ascending id order, paged (§4.4 step 4).
async fn run_replay_phase(
    socket: &mut WebSocket,
    state: &AppState,
    after_event_id: i64,
    replay_until: i64,
    subscriptions: &Subscriptions,
) -> Result<(), &'static str> {
    let mut cursor = after_event_id;
    while cursor < replay_until {
        let page = {
            let store = state.store.lock().await;
            store
                .replay(ReplayQuery {
                    after_event_id: cursor,
                    replay_until,
                    channel_ids: subscriptions.channels.clone(),
                    topic_ids: subscriptions.topics.clone(),
                    limit: REPLAY_PAGE_SIZE,
                })
                .map_err(|_| "replay query failed")?
        };
        if page.is_empty() {
            break;
        }
        cursor = page.last().map(|r| r.event_id).unwrap_or(cursor).max(cursor);
        // Determinism (§4.2) only bounds rows in [after, replay_until];
        // if a page hits the limit before exhausting the window, the next
        // page must resume from the id-ordered boundary, not just the
        // filtered count, so `cursor` advances to the last scanned row's id.
        let reached_window_end = page.len() < REPLAY_PAGE_SIZE as usize;
        for row in page {
            let envelope = to_envelope(row);
            let frame = ServerMessage::Event(envelope);
            if send_frame(socket, &frame).await.is_err() {
                return Err("failed to send replay frame");
            }
        }
        if reached_window_end {
            break;
        }
    }
    Ok(())
}

/// Delivers events with `event_id > replay_until` as they are published,
/// filtered by the session's subscription (§4.4 step 5, §4.4 transition
/// invariant).
async fn run_live_phase(
    socket: &mut WebSocket,
    live_rx: &mut broadcast::Receiver<EventEnvelope>,
    replay_until: i64,
    subscriptions: &Subscriptions,
) {
    let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
    heartbeat.tick().await;
    loop {
        tokio::select! {
            event = live_rx.recv() => {
                match event {
                    Ok(envelope) => {
                        if envelope.event_id <= replay_until {
                            continue;
                        }
                        if !subscriptions.matches(&envelope.scope) {
                            continue;
                        }
                        let frame = ServerMessage::Event(envelope);
                        if send_frame(socket, &frame).await.is_err() {
                            return;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(_)) => {
                        // The session fell behind the distributor's bounded
                        // buffer; §4.4 backpressure policy is to close
                        // rather than grow memory — the client reconnects
                        // and resumes from its last acknowledged id.
                        close_with(socket, close_codes::POLICY_VIOLATION, "backpressure").await;
                        return;
                    }
                    Err(broadcast::error::RecvError::Closed) => return,
                }
            }
            _ = heartbeat.tick() => {
                let frame = ServerMessage::Heartbeat(hub_protocol::HeartbeatMessage {});
                if send_frame(socket, &frame).await.is_err() {
                    return;
                }
            }
            incoming = socket.recv() => {
                match incoming {
                    None | Some(Ok(Message::Close(_))) => return,
                    Some(Ok(Message::Ping(data))) => {
                        let _ = socket.send(Message::Pong(data)).await;
                    }
                    Some(Err(_)) => return,
                    _ => {}
                }
            }
        }
    }
}

async fn send_frame(socket: &mut WebSocket, frame: &ServerMessage) -> Result<(), axum::Error> {
    let json = serde_json::to_string(frame).expect("server frames always serialise");
    socket.send(Message::Text(json.into())).await
}

async fn close_with(socket: &mut WebSocket, code: u16, reason: &'static str) {
    let _ = socket
        .send(Message::Close(Some(CloseFrame {
            code,
            reason: reason.into(),
        })))
        .await;
}
