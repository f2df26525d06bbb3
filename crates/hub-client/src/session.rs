//! Client reconnect engine (§4.5).
//!
//! Hides transport failures behind a pull-style event stream. One background
//! task owns the transport and the dedup/cursor state; `wait_for` subscribes
//! a second receiver off the same broadcast so it never steals frames from
//! the main consumer, mirroring the teacher's `LocalProxy` per-consumer
//! `broadcast::Receiver` fan-out.

use futures_util::{SinkExt, StreamExt};
use hub_protocol::{ClientMessage, EventEnvelope, HelloMessage, ServerMessage, Subscriptions, close_codes};
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio_tungstenite::tungstenite::protocol::Message;
use tracing::{debug, info, warn};

/// Bound on the reconnect engine's event-id dedup set (§4.5: N ≈ 1000).
const DEDUP_CAPACITY: usize = 1000;
/// Give up after this many consecutive failed handshakes (§4.5).
const MAX_CONSECUTIVE_FAILURES: u32 = 5;
const EVENT_CHANNEL_CAPACITY: usize = 1024;

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub url: String,
    pub token: String,
    pub after_event_id: i64,
    pub subscriptions: Option<Subscriptions>,
    pub reconnect_delay: Duration,
    pub max_reconnect_delay: Duration,
    pub open_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            token: String::new(),
            after_event_id: 0,
            subscriptions: None,
            reconnect_delay: Duration::from_millis(200),
            max_reconnect_delay: Duration::from_secs(30),
            open_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, thiserror::Error, Clone)]
pub enum ClientError {
    #[error("connection closed normally")]
    ConnectionClosed,
    #[error("timed out waiting for a matching event")]
    WaitTimeout,
    #[error("unauthorised: token rejected by the hub")]
    Unauthorized,
    #[error("gave up after {0} consecutive handshake failures")]
    GaveUp(u32),
}

/// A running reconnect session. Drop or call [`ClientHandle::close`] to stop it.
pub struct ClientHandle {
    events_tx: broadcast::Sender<EventEnvelope>,
    main_rx: broadcast::Receiver<EventEnvelope>,
    last_event_id: Arc<AtomicI64>,
    close_tx: watch::Sender<bool>,
    final_error: Arc<Mutex<Option<ClientError>>>,
    _task: tokio::task::JoinHandle<()>,
}

impl ClientHandle {
    pub fn connect(config: ClientConfig) -> Self {
        let (events_tx, main_rx) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let last_event_id = Arc::new(AtomicI64::new(config.after_event_id));
        let (close_tx, close_rx) = watch::channel(false);
        let final_error = Arc::new(Mutex::new(None));

        let task = tokio::spawn(run_reconnect_loop(
            config,
            events_tx.clone(),
            last_event_id.clone(),
            close_rx,
            final_error.clone(),
        ));

        Self {
            events_tx,
            main_rx,
            last_event_id,
            close_tx,
            final_error,
            _task: task,
        }
    }

    /// The highest `event_id` delivered so far (forward-progress cursor).
    pub fn last_event_id(&self) -> i64 {
        self.last_event_id.load(Ordering::SeqCst)
    }

    /// Pull the next event for the main consumer.
    pub async fn next_event(&mut self) -> Option<EventEnvelope> {
        loop {
            match self.main_rx.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(skipped = n, "consumer lagged behind the reconnect engine's buffer");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Wait for an event matching `predicate` without disturbing the main
    /// consumer's stream (§4.5 expansion: a one-shot internal subscriber).
    pub async fn wait_for<F>(&self, mut predicate: F, timeout: Duration) -> Result<EventEnvelope, ClientError>
    where
        F: FnMut(&EventEnvelope) -> bool,
    {
        let mut rx = self.events_tx.subscribe();
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                return Err(ClientError::WaitTimeout);
            }
            match tokio::time::timeout(remaining, rx.recv()).await {
                Ok(Ok(event)) if predicate(&event) => return Ok(event),
                Ok(Ok(_)) => continue,
                Ok(Err(broadcast::error::RecvError::Lagged(_))) => continue,
                Ok(Err(broadcast::error::RecvError::Closed)) => {
                    return Err(self.take_final_error().unwrap_or(ClientError::ConnectionClosed));
                }
                Err(_) => return Err(ClientError::WaitTimeout),
            }
        }
    }

    /// The terminal error recorded when the reconnect loop gave up or the
    /// hub closed the session with an unclassified-as-retryable code.
    pub fn take_final_error(&self) -> Option<ClientError> {
        self.final_error.lock().unwrap().clone()
    }

    pub fn close(&self) {
        let _ = self.close_tx.send(true);
    }
}

enum ConnectionOutcome {
    /// Peer sent close code 1000; the stream ends, no reconnect.
    NormalClose,
    /// Peer sent close code 4401; the stream ends with an error.
    Unauthorized,
    /// Any other close, or a transport error; caller should reconnect.
    Retryable,
    /// The caller asked us to stop.
    RequestedClose,
}

async fn run_reconnect_loop(
    config: ClientConfig,
    events_tx: broadcast::Sender<EventEnvelope>,
    last_event_id: Arc<AtomicI64>,
    mut close_rx: watch::Receiver<bool>,
    final_error: Arc<Mutex<Option<ClientError>>>,
) {
    let mut seen_order: VecDeque<i64> = VecDeque::with_capacity(DEDUP_CAPACITY);
    let mut seen_set: HashSet<i64> = HashSet::with_capacity(DEDUP_CAPACITY);
    let mut consecutive_failures: u32 = 0;
    let mut delay = config.reconnect_delay;

    loop {
        if *close_rx.borrow() {
            return;
        }

        let cursor = last_event_id.load(Ordering::SeqCst);
        let mut handshake_ok = false;
        let outcome = run_single_connection(
            &config,
            cursor,
            &mut seen_order,
            &mut seen_set,
            &events_tx,
            &last_event_id,
            &mut close_rx,
            &mut handshake_ok,
        )
        .await;

        // A handshake that made it past hello_ok resets the backoff state
        // even if the connection is later retryable (§4.5: "on successful
        // handshake reset backoff and failure counter") — only outright
        // connect/handshake failures accumulate toward the give-up limit.
        if handshake_ok {
            consecutive_failures = 0;
            delay = config.reconnect_delay;
        }

        match outcome {
            ConnectionOutcome::NormalClose => return,
            ConnectionOutcome::RequestedClose => return,
            ConnectionOutcome::Unauthorized => {
                *final_error.lock().unwrap() = Some(ClientError::Unauthorized);
                return;
            }
            ConnectionOutcome::Retryable => {
                consecutive_failures += 1;
                if consecutive_failures >= MAX_CONSECUTIVE_FAILURES {
                    *final_error.lock().unwrap() =
                        Some(ClientError::GaveUp(consecutive_failures));
                    return;
                }
                let jitter = Duration::from_millis(rand::random::<u64>() % 50);
                tokio::select! {
                    _ = tokio::time::sleep(delay + jitter) => {}
                    _ = close_rx.changed() => { if *close_rx.borrow() { return; } }
                }
                delay = (delay * 2).min(config.max_reconnect_delay);
            }
        }
    }
}

async fn run_single_connection(
    config: &ClientConfig,
    cursor: i64,
    seen_order: &mut VecDeque<i64>,
    seen_set: &mut HashSet<i64>,
    events_tx: &broadcast::Sender<EventEnvelope>,
    last_event_id: &Arc<AtomicI64>,
    close_rx: &mut watch::Receiver<bool>,
    handshake_ok: &mut bool,
) -> ConnectionOutcome {
    use tokio_tungstenite::connect_async;

    let url = match build_ws_url(&config.url, &config.token) {
        Ok(url) => url,
        Err(e) => {
            warn!(error = %e, "malformed hub url");
            return ConnectionOutcome::Retryable;
        }
    };

    let connect_result =
        tokio::time::timeout(config.open_timeout, connect_async(url.as_str())).await;
    let mut ws = match connect_result {
        Ok(Ok((ws, _response))) => ws,
        Ok(Err(e)) => {
            warn!(error = %e, "hub connection failed");
            return ConnectionOutcome::Retryable;
        }
        Err(_) => {
            warn!("timed out opening connection to hub");
            return ConnectionOutcome::Retryable;
        }
    };

    let hello = ClientMessage::Hello(HelloMessage {
        after_event_id: cursor,
        subscriptions: config.subscriptions.clone(),
    });
    let hello_json = match serde_json::to_string(&hello) {
        Ok(j) => j,
        Err(e) => {
            warn!(error = %e, "failed to serialise hello");
            return ConnectionOutcome::Retryable;
        }
    };
    if ws.send(Message::Text(hello_json.into())).await.is_err() {
        return ConnectionOutcome::Retryable;
    }

    let hello_ok = match tokio::time::timeout(config.open_timeout, ws.next()).await {
        Ok(Some(Ok(Message::Text(text)))) => match serde_json::from_str::<ServerMessage>(&text) {
            Ok(ServerMessage::HelloOk(ok)) => ok,
            Ok(other) => {
                warn!(?other, "expected hello_ok, got something else");
                return ConnectionOutcome::Retryable;
            }
            Err(e) => {
                warn!(error = %e, "invalid hello_ok JSON");
                return ConnectionOutcome::Retryable;
            }
        },
        Ok(Some(Ok(Message::Close(frame)))) => {
            return classify_close(frame.map(|f| f.code.into()));
        }
        _ => {
            warn!("timed out waiting for hello_ok");
            return ConnectionOutcome::Retryable;
        }
    };
    info!(replay_until = hello_ok.replay_until, instance_id = %hello_ok.instance_id, "hub session established");
    *handshake_ok = true;

    loop {
        tokio::select! {
            _ = close_rx.changed() => {
                if *close_rx.borrow() {
                    let _ = ws.send(Message::Close(None)).await;
                    return ConnectionOutcome::RequestedClose;
                }
            }
            msg = ws.next() => {
                match msg {
                    None => return ConnectionOutcome::Retryable,
                    Some(Err(e)) => {
                        warn!(error = %e, "websocket transport error");
                        return ConnectionOutcome::Retryable;
                    }
                    Some(Ok(Message::Close(frame))) => {
                        return classify_close(frame.map(|f| f.code.into()));
                    }
                    Some(Ok(Message::Ping(data))) => {
                        let _ = ws.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<ServerMessage>(&text) {
                            Ok(ServerMessage::Event(event)) => {
                                deliver(event, seen_order, seen_set, events_tx, last_event_id);
                            }
                            Ok(ServerMessage::Heartbeat(_)) => {}
                            Ok(ServerMessage::HelloOk(_)) | Ok(ServerMessage::Unknown) => {
                                debug!("ignoring unexpected server frame");
                            }
                            Err(e) => warn!(error = %e, "failed to parse server frame"),
                        }
                    }
                    Some(Ok(_)) => {}
                }
            }
        }
    }
}

fn deliver(
    event: EventEnvelope,
    seen_order: &mut VecDeque<i64>,
    seen_set: &mut HashSet<i64>,
    events_tx: &broadcast::Sender<EventEnvelope>,
    last_event_id: &Arc<AtomicI64>,
) {
    if seen_set.contains(&event.event_id) {
        return;
    }
    seen_set.insert(event.event_id);
    seen_order.push_back(event.event_id);
    if seen_order.len() > DEDUP_CAPACITY {
        // Evict the older half on overflow (§4.5).
        let evict = seen_order.len() / 2;
        for _ in 0..evict {
            if let Some(id) = seen_order.pop_front() {
                seen_set.remove(&id);
            }
        }
    }
    last_event_id.store(event.event_id, Ordering::SeqCst);
    let _ = events_tx.send(event);
}

fn classify_close(code: Option<u16>) -> ConnectionOutcome {
    match code {
        Some(close_codes::NORMAL) => ConnectionOutcome::NormalClose,
        Some(close_codes::UNAUTHORIZED) => ConnectionOutcome::Unauthorized,
        _ => ConnectionOutcome::Retryable,
    }
}

fn build_ws_url(base: &str, token: &str) -> Result<url::Url, url::ParseError> {
    let mut url = url::Url::parse(base)?;
    url.query_pairs_mut().append_pair("token", token);
    Ok(url)
}
