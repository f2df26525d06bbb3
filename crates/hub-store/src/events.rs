use crate::error::KernelError;
use hub_protocol::{EntityRef, Scope, required_scope};
use rusqlite::{Connection, Row};

/// Input to the event log writer (§4.1). `name` outside the known-event
/// catalog is accepted without a scope check.
#[derive(Debug, Clone)]
pub struct NewEvent {
    pub name: String,
    pub scope: Scope,
    pub entity: EntityRef,
    pub data: serde_json::Value,
}

/// A committed event row, decoded back into wire shapes.
#[derive(Debug, Clone, PartialEq)]
pub struct EventRow {
    pub event_id: i64,
    pub ts: String,
    pub name: String,
    pub scope: Scope,
    pub entity: EntityRef,
    pub data: serde_json::Value,
}

/// Scope-filtered, bounded, ordered replay window (§4.2).
#[derive(Debug, Clone)]
pub struct ReplayQuery {
    pub after_event_id: i64,
    pub replay_until: i64,
    pub channel_ids: Vec<i64>,
    pub topic_ids: Vec<i64>,
    pub limit: i64,
}

/// The *single* entry point that appends one event to the log.
///
/// Must be called from inside the same transaction that made the paired
/// state change (I4). `conn` here is a live `rusqlite::Transaction`
/// borrowed as a `&Connection` — SQLite transactions in `rusqlite` are plain
/// connections with an open `BEGIN`, so the writer takes the narrowest type
/// that lets it run one `INSERT` and nothing else.
pub fn insert_event(conn: &Connection, event: NewEvent) -> Result<i64, KernelError> {
    if event.name.trim().is_empty() {
        return Err(KernelError::InvalidInput("event name must not be empty".into()));
    }
    if event.entity.kind.trim().is_empty() || event.entity.id.trim().is_empty() {
        return Err(KernelError::InvalidInput(
            "event entity type and id must not be empty".into(),
        ));
    }
    if !event.data.is_object() {
        return Err(KernelError::InvalidInput(
            "event data must be a JSON object".into(),
        ));
    }
    if let Some(required) = required_scope(&event.name) {
        if required.channel_id && event.scope.channel_id.is_none() {
            return Err(KernelError::InvalidInput(format!(
                "event '{}' requires scope.channel_id",
                event.name
            )));
        }
        if required.topic_id && event.scope.topic_id.is_none() {
            return Err(KernelError::InvalidInput(format!(
                "event '{}' requires scope.topic_id",
                event.name
            )));
        }
        if required.topic_id2 && event.scope.topic_id2.is_none() {
            return Err(KernelError::InvalidInput(format!(
                "event '{}' requires scope.topic_id2",
                event.name
            )));
        }
    }

    let data_text = serde_json::to_string(&event.data)
        .map_err(|e| KernelError::InvalidInput(format!("event data not serialisable: {e}")))?;
    let ts = chrono::Utc::now().to_rfc3339();

    conn.execute(
        "INSERT INTO events (ts, name, channel_id, topic_id, topic_id2, entity_type, entity_id, data)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        rusqlite::params![
            ts,
            event.name,
            event.scope.channel_id,
            event.scope.topic_id,
            event.scope.topic_id2,
            event.entity.kind,
            event.entity.id,
            data_text,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

fn row_to_event(row: &Row<'_>) -> rusqlite::Result<EventRow> {
    let data_text: String = row.get("data")?;
    let data: serde_json::Value = serde_json::from_str(&data_text).unwrap_or(serde_json::Value::Null);
    Ok(EventRow {
        event_id: row.get("event_id")?,
        ts: row.get("ts")?,
        name: row.get("name")?,
        scope: Scope {
            channel_id: row.get("channel_id")?,
            topic_id: row.get("topic_id")?,
            topic_id2: row.get("topic_id2")?,
        },
        entity: EntityRef {
            kind: row.get("entity_type")?,
            id: row.get("entity_id")?,
        },
        data,
    })
}

/// Scope-filtered, bounded, ordered read over the log (§4.2).
///
/// Determinism: for fixed inputs and a fixed set of committed rows in
/// `[after_event_id, replay_until]`, the output is byte-identical across
/// calls; new appends past `replay_until` never appear.
pub fn replay(conn: &Connection, query: ReplayQuery) -> Result<Vec<EventRow>, KernelError> {
    if query.after_event_id < 0 {
        return Err(KernelError::InvalidInput(
            "after_event_id must be >= 0".into(),
        ));
    }
    if query.replay_until < query.after_event_id {
        return Err(KernelError::InvalidInput(
            "replay_until must be >= after_event_id".into(),
        ));
    }
    if query.limit <= 0 {
        return Err(KernelError::InvalidInput("limit must be > 0".into()));
    }

    let scoped = !query.channel_ids.is_empty() || !query.topic_ids.is_empty();

    // The bundled rusqlite build does not compile in the `carray`/`rarray`
    // table-valued function, so an IN-list scope filter can't be pushed into
    // SQL directly. Scope matching instead runs in Rust over the id-ordered
    // window; each call is already bounded by `replay_until - after_event_id`
    // rows, which is small relative to the hub's working set.
    let mut stmt = conn.prepare(
        "SELECT event_id, ts, name, channel_id, topic_id, topic_id2, entity_type, entity_id, data
         FROM events
         WHERE event_id > ?1 AND event_id <= ?2
         ORDER BY event_id ASC",
    )?;
    let all = stmt
        .query_map(
            rusqlite::params![query.after_event_id, query.replay_until],
            row_to_event,
        )?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let rows: Vec<EventRow> = if scoped {
        all.into_iter()
            .filter(|e| {
                e.scope
                    .channel_id
                    .is_some_and(|c| query.channel_ids.contains(&c))
                    || e.scope
                        .topic_id
                        .is_some_and(|t| query.topic_ids.contains(&t))
                    || e.scope
                        .topic_id2
                        .is_some_and(|t| query.topic_ids.contains(&t))
            })
            .take(query.limit as usize)
            .collect()
    } else {
        all.into_iter().take(query.limit as usize).collect()
    };
    Ok(rows)
}

pub fn max_event_id(conn: &Connection) -> Result<i64, KernelError> {
    let max: Option<i64> = conn.query_row("SELECT MAX(event_id) FROM events", [], |row| row.get(0))?;
    Ok(max.unwrap_or(0))
}

impl crate::db::Store {
    /// Scope-filtered, bounded, ordered read over the log (§4.2), exposed as
    /// a method so callers outside this crate never need a raw connection.
    pub fn replay(&self, query: ReplayQuery) -> Result<Vec<EventRow>, KernelError> {
        replay(&self.conn, query)
    }

    /// The highest committed `event_id`, or `0` if the log is empty. Used to
    /// freeze a session's `replay_until` at handshake time (§4.4).
    pub fn max_event_id(&self) -> Result<i64, KernelError> {
        max_event_id(&self.conn)
    }

    /// Re-reads a single just-committed event by id, for the post-commit
    /// publish step (§4.4).
    pub fn get_event(&self, event_id: i64) -> Result<Option<EventRow>, KernelError> {
        Ok(replay(
            &self.conn,
            ReplayQuery {
                after_event_id: event_id - 1,
                replay_until: event_id,
                channel_ids: Vec::new(),
                topic_ids: Vec::new(),
                limit: 1,
            },
        )?
        .into_iter()
        .next())
    }
}
