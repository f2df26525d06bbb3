use hub_protocol::EventEnvelope;
use hub_store::Store;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{broadcast, Mutex};

/// Bound on the fan-out broadcast channel. A session whose consumer falls this
/// far behind is closed with a policy-violation close code rather than
/// letting the channel grow without limit (§4.4 backpressure).
const BROADCAST_CAPACITY: usize = 4096;

/// Shared hub state: the single-writer store plus the committed-events
/// broadcaster every WebSocket session's live phase subscribes to. Mirrors
/// the teacher's `AppState` — one `PgPool` + one `broadcast::Sender` per
/// stream there; here one `Store` + one `broadcast::Sender` for the whole
/// log, since scope filtering happens per-session rather than per-channel
/// registry (I8 routing is evaluated client-side per subscription).
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<Mutex<Store>>,
    pub events_tx: broadcast::Sender<EventEnvelope>,
    pub instance_id: String,
    pub db_id: String,
    pub schema_version: i64,
    pub auth_token: String,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(store: Store, instance_id: String, auth_token: String) -> std::io::Result<Self> {
        let (events_tx, _rx) = broadcast::channel(BROADCAST_CAPACITY);
        let db_id = store
            .db_id()
            .map_err(|e| std::io::Error::other(e.to_string()))?;
        let schema_version = store
            .schema_version()
            .map_err(|e| std::io::Error::other(e.to_string()))?;
        Ok(Self {
            store: Arc::new(Mutex::new(store)),
            events_tx,
            instance_id,
            db_id,
            schema_version,
            auth_token,
            started_at: Instant::now(),
        })
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }

    /// Publishes one committed event to every live-phase subscriber. Called
    /// once per `event_id` returned by a successful mutation, after the
    /// transaction that produced it has committed (§4.4: "after each
    /// mutation transaction commits, the kernel publishes the freshly
    /// inserted event ids to an in-process distributor").
    pub fn publish(&self, envelope: EventEnvelope) {
        // `send` only errors when there are no receivers; an idle hub with no
        // open sessions is the normal case, not a failure worth logging.
        let _ = self.events_tx.send(envelope);
    }
}
