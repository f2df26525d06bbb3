//! Entity shapes persisted by the store (§3). Field semantics only;
//! encoding (column types, JSON text vs. native) is the store's concern.

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Channel {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topic {
    pub id: i64,
    pub channel_id: i64,
    pub title: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub id: i64,
    pub topic_id: i64,
    pub channel_id: i64,
    pub sender: String,
    pub content_raw: String,
    pub version: i64,
    pub created_at: String,
    pub edited_at: Option<String>,
    pub deleted_at: Option<String>,
    pub deleted_by: Option<String>,
}

impl Message {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TopicAttachment {
    pub id: i64,
    pub topic_id: i64,
    pub kind: String,
    pub key: Option<String>,
    pub value_json: serde_json::Value,
    pub dedupe_key: String,
    pub source_message_id: Option<i64>,
    pub created_at: String,
}
