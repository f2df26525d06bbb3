// hub-protocol: wire types for the agent-hub HTTP + WebSocket surface.
//
// All WebSocket frames use a top-level `type` field for discriminated
// deserialization. Unknown top-level fields and unknown event `name`s must
// round-trip for forward compatibility with additive protocol changes.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Scope / entity / event envelope
// ---------------------------------------------------------------------------

/// Routing scope attached to every event.
///
/// A subscriber matches an event when any of its declared channel ids equals
/// `channel_id`, or any of its declared topic ids equals `topic_id` or
/// `topic_id2`. `message.moved_topic` is the only event name that populates
/// both `topic_id` (the source topic) and `topic_id2` (the destination).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scope {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic_id2: Option<i64>,
}

impl Scope {
    pub fn channel(channel_id: i64) -> Self {
        Self {
            channel_id: Some(channel_id),
            topic_id: None,
            topic_id2: None,
        }
    }

    pub fn channel_topic(channel_id: i64, topic_id: i64) -> Self {
        Self {
            channel_id: Some(channel_id),
            topic_id: Some(topic_id),
            topic_id2: None,
        }
    }

    pub fn topic_move(channel_id: i64, old_topic_id: i64, new_topic_id: i64) -> Self {
        Self {
            channel_id: Some(channel_id),
            topic_id: Some(old_topic_id),
            topic_id2: Some(new_topic_id),
        }
    }
}

/// The entity an event concerns. Advisory for clients; routing uses `Scope`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRef {
    #[serde(rename = "type")]
    pub kind: String,
    pub id: String,
}

/// A single committed, immutable event as delivered over the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub event_id: i64,
    pub ts: String,
    pub name: String,
    pub scope: Scope,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity: Option<EntityRef>,
    pub data: serde_json::Value,
}

// ---------------------------------------------------------------------------
// Client -> server
// ---------------------------------------------------------------------------

/// Subscription filters declared in a `hello`. Omitting both lists (or
/// omitting `subscriptions` entirely) means "all events".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscriptions {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub channels: Vec<i64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub topics: Vec<i64>,
}

impl Subscriptions {
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty() && self.topics.is_empty()
    }

    /// Scope-routing match rule (I8): empty subscription matches everything.
    pub fn matches(&self, scope: &Scope) -> bool {
        if self.is_empty() {
            return true;
        }
        if let Some(cid) = scope.channel_id {
            if self.channels.contains(&cid) {
                return true;
            }
        }
        if let Some(tid) = scope.topic_id {
            if self.topics.contains(&tid) {
                return true;
            }
        }
        if let Some(tid2) = scope.topic_id2 {
            if self.topics.contains(&tid2) {
                return true;
            }
        }
        false
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HelloMessage {
    pub after_event_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscriptions: Option<Subscriptions>,
}

/// All client -> server frame kinds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
#[serde(rename_all = "snake_case")]
pub enum ClientMessage {
    Hello(HelloMessage),
}

// ---------------------------------------------------------------------------
// Server -> client
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HelloOkMessage {
    pub replay_until: i64,
    pub instance_id: String,
}

/// Idle-connection keepalive; carries no cursor-relevant information.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeartbeatMessage {}

/// All server -> client frame kinds.
///
/// Deserializing consumers must tolerate unknown `type` values (additive
/// protocol evolution) by falling back to an opaque variant rather than
/// failing the parse.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
#[serde(rename_all = "snake_case")]
pub enum ServerMessage {
    HelloOk(HelloOkMessage),
    Event(EventEnvelope),
    Heartbeat(HeartbeatMessage),
    #[serde(other)]
    Unknown,
}

// ---------------------------------------------------------------------------
// Close codes (§6)
// ---------------------------------------------------------------------------

pub mod close_codes {
    /// Normal close. Client must not reconnect.
    pub const NORMAL: u16 = 1000;
    /// Server going away. Client should reconnect.
    pub const GOING_AWAY: u16 = 1001;
    /// Policy violation (e.g. backpressure). Client should reconnect.
    pub const POLICY_VIOLATION: u16 = 1008;
    /// Unclassified server-side failure. Client should reconnect.
    pub const INTERNAL_ERROR: u16 = 1011;
    /// Unauthorised. Client must not reconnect.
    pub const UNAUTHORIZED: u16 = 4401;
}

// ---------------------------------------------------------------------------
// Known event catalog (§4.1)
// ---------------------------------------------------------------------------

pub mod event_names {
    pub const CHANNEL_CREATED: &str = "channel.created";
    pub const TOPIC_CREATED: &str = "topic.created";
    pub const TOPIC_RENAMED: &str = "topic.renamed";
    pub const TOPIC_ATTACHMENT_ADDED: &str = "topic.attachment_added";
    pub const MESSAGE_CREATED: &str = "message.created";
    pub const MESSAGE_EDITED: &str = "message.edited";
    pub const MESSAGE_DELETED: &str = "message.deleted";
    pub const MESSAGE_ENRICHED: &str = "message.enriched";
    pub const MESSAGE_MOVED_TOPIC: &str = "message.moved_topic";
}

/// Which scope fields a known event name requires (§4.1 table). Names
/// outside this catalog are accepted by the event writer without a scope
/// check, so plugins can append new event kinds additively.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequiredScope {
    pub channel_id: bool,
    pub topic_id: bool,
    pub topic_id2: bool,
}

pub fn required_scope(name: &str) -> Option<RequiredScope> {
    use event_names::*;
    let (channel_id, topic_id, topic_id2) = match name {
        CHANNEL_CREATED => (true, false, false),
        TOPIC_CREATED | TOPIC_RENAMED | TOPIC_ATTACHMENT_ADDED => (true, true, false),
        MESSAGE_CREATED | MESSAGE_EDITED | MESSAGE_DELETED | MESSAGE_ENRICHED => {
            (true, true, false)
        }
        MESSAGE_MOVED_TOPIC => (true, true, true),
        _ => return None,
    };
    Some(RequiredScope {
        channel_id,
        topic_id,
        topic_id2,
    })
}

// ---------------------------------------------------------------------------
// HTTP surface (§6 / §7)
// ---------------------------------------------------------------------------

/// Frozen HTTP error envelope used by all non-2xx responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpErrorEnvelope {
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// `GET /health` response body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub instance_id: String,
    pub db_id: String,
    pub schema_version: i64,
    pub protocol_version: u32,
    pub pid: u32,
    pub uptime_seconds: u64,
}

/// The current, frozen wire protocol version (§6 `server.json.protocol_version`).
pub const PROTOCOL_VERSION: u32 = 1;
/// The current store schema version (§3 meta table).
pub const SCHEMA_VERSION: i64 = 1;
