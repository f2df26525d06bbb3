use crate::db::Store;
use crate::error::KernelError;
use crate::events::{insert_event, NewEvent};
use crate::model::{Channel, Message, Topic, TopicAttachment};
use hub_protocol::{EntityRef, Scope, event_names};
use rusqlite::{OptionalExtension, TransactionBehavior};

/// Upper bound on `Message::content_raw` (§3).
pub const MAX_CONTENT_RAW_BYTES: usize = 64 * 1024;
/// Upper bound on `TopicAttachment::value_json`'s serialised size (§3).
pub const MAX_ATTACHMENT_VALUE_BYTES: usize = 16 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetopicMode {
    One,
    Later,
    All,
}

pub struct CreateChannelResult {
    pub channel: Channel,
    pub event_id: i64,
}

pub struct CreateTopicResult {
    pub topic: Topic,
    pub event_id: i64,
}

pub struct RenameTopicResult {
    pub topic: Topic,
    pub event_id: i64,
}

pub struct SendMessageResult {
    pub message: Message,
    pub event_id: i64,
}

pub struct EditMessageResult {
    pub message: Message,
    pub event_id: i64,
}

pub struct DeleteMessageResult {
    pub message: Message,
    pub event_id: Option<i64>,
}

pub struct RetopicResult {
    pub affected_count: i64,
    pub event_ids: Vec<i64>,
}

pub struct AddAttachmentResult {
    pub attachment: TopicAttachment,
    pub event_id: Option<i64>,
    pub deduplicated: bool,
}

impl Store {
    /// `createChannel` (§4.3). Rejects a duplicate name with `invalid-input`;
    /// the store's own `UNIQUE(name)` is the backstop if two writers somehow
    /// raced past this check (the single-writer discipline means they can't).
    pub fn create_channel(&mut self, name: &str) -> Result<CreateChannelResult, KernelError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(KernelError::InvalidInput("channel name must not be empty".into()));
        }
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let exists: bool = tx.query_row(
            "SELECT EXISTS(SELECT 1 FROM channels WHERE name = ?1)",
            [name],
            |row| row.get(0),
        )?;
        if exists {
            return Err(KernelError::InvalidInput(format!(
                "channel '{name}' already exists"
            )));
        }
        let created_at = chrono::Utc::now().to_rfc3339();
        tx.execute(
            "INSERT INTO channels (name, description, created_at) VALUES (?1, NULL, ?2)",
            rusqlite::params![name, created_at],
        )?;
        let channel_id = tx.last_insert_rowid();
        let event_id = insert_event(
            &tx,
            NewEvent {
                name: event_names::CHANNEL_CREATED.to_string(),
                scope: Scope::channel(channel_id),
                entity: EntityRef {
                    kind: "channel".into(),
                    id: channel_id.to_string(),
                },
                data: serde_json::json!({ "channel_id": channel_id, "name": name }),
            },
        )?;
        tx.commit()?;
        Ok(CreateChannelResult {
            channel: Channel {
                id: channel_id,
                name: name.to_string(),
                description: None,
                created_at,
            },
            event_id,
        })
    }

    /// `createTopic` (§4.3). Rejects a duplicate `(channel_id, title)`.
    pub fn create_topic(
        &mut self,
        channel_id: i64,
        title: &str,
    ) -> Result<CreateTopicResult, KernelError> {
        let title = title.trim();
        if title.is_empty() {
            return Err(KernelError::InvalidInput("topic title must not be empty".into()));
        }
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        channel_exists_or_not_found(&tx, channel_id)?;
        let exists: bool = tx.query_row(
            "SELECT EXISTS(SELECT 1 FROM topics WHERE channel_id = ?1 AND title = ?2)",
            rusqlite::params![channel_id, title],
            |row| row.get(0),
        )?;
        if exists {
            return Err(KernelError::InvalidInput(format!(
                "topic '{title}' already exists in channel {channel_id}"
            )));
        }
        let now = chrono::Utc::now().to_rfc3339();
        tx.execute(
            "INSERT INTO topics (channel_id, title, created_at, updated_at) VALUES (?1, ?2, ?3, ?3)",
            rusqlite::params![channel_id, title, now],
        )?;
        let topic_id = tx.last_insert_rowid();
        let event_id = insert_event(
            &tx,
            NewEvent {
                name: event_names::TOPIC_CREATED.to_string(),
                scope: Scope::channel_topic(channel_id, topic_id),
                entity: EntityRef {
                    kind: "topic".into(),
                    id: topic_id.to_string(),
                },
                data: serde_json::json!({ "topic_id": topic_id, "channel_id": channel_id, "title": title }),
            },
        )?;
        tx.commit()?;
        Ok(CreateTopicResult {
            topic: Topic {
                id: topic_id,
                channel_id,
                title: title.to_string(),
                created_at: now.clone(),
                updated_at: now,
            },
            event_id,
        })
    }

    /// `renameTopic` (§4.3). Emits `topic.renamed` with old/new title.
    pub fn rename_topic(
        &mut self,
        topic_id: i64,
        new_title: &str,
    ) -> Result<RenameTopicResult, KernelError> {
        let new_title = new_title.trim();
        if new_title.is_empty() {
            return Err(KernelError::InvalidInput("topic title must not be empty".into()));
        }
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let (channel_id, old_title, created_at): (i64, String, String) = tx
            .query_row(
                "SELECT channel_id, title, created_at FROM topics WHERE id = ?1",
                [topic_id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?
            .ok_or_else(|| KernelError::NotFound(format!("topic {topic_id} not found")))?;
        let now = chrono::Utc::now().to_rfc3339();
        tx.execute(
            "UPDATE topics SET title = ?1, updated_at = ?2 WHERE id = ?3",
            rusqlite::params![new_title, now, topic_id],
        )?;
        let event_id = insert_event(
            &tx,
            NewEvent {
                name: event_names::TOPIC_RENAMED.to_string(),
                scope: Scope::channel_topic(channel_id, topic_id),
                entity: EntityRef {
                    kind: "topic".into(),
                    id: topic_id.to_string(),
                },
                data: serde_json::json!({
                    "topic_id": topic_id,
                    "old_title": old_title,
                    "new_title": new_title,
                }),
            },
        )?;
        tx.commit()?;
        Ok(RenameTopicResult {
            topic: Topic {
                id: topic_id,
                channel_id,
                title: new_title.to_string(),
                created_at,
                updated_at: now,
            },
            event_id,
        })
    }

    /// `sendMessage` (§4.3). Rejects content over 64 KiB and unknown topics.
    pub fn send_message(
        &mut self,
        topic_id: i64,
        sender: &str,
        content_raw: &str,
    ) -> Result<SendMessageResult, KernelError> {
        if sender.trim().is_empty() {
            return Err(KernelError::InvalidInput("sender must not be empty".into()));
        }
        if content_raw.len() > MAX_CONTENT_RAW_BYTES {
            return Err(KernelError::ContentTooLarge(format!(
                "content_raw exceeds {MAX_CONTENT_RAW_BYTES} bytes"
            )));
        }
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let channel_id: i64 = tx
            .query_row("SELECT channel_id FROM topics WHERE id = ?1", [topic_id], |row| {
                row.get(0)
            })
            .optional()?
            .ok_or_else(|| KernelError::NotFound(format!("topic {topic_id} not found")))?;
        let created_at = chrono::Utc::now().to_rfc3339();
        tx.execute(
            "INSERT INTO messages (topic_id, channel_id, sender, content_raw, version, created_at)
             VALUES (?1, ?2, ?3, ?4, 1, ?5)",
            rusqlite::params![topic_id, channel_id, sender, content_raw, created_at],
        )?;
        let message_id = tx.last_insert_rowid();
        let event_id = insert_event(
            &tx,
            NewEvent {
                name: event_names::MESSAGE_CREATED.to_string(),
                scope: Scope::channel_topic(channel_id, topic_id),
                entity: EntityRef {
                    kind: "message".into(),
                    id: message_id.to_string(),
                },
                data: serde_json::json!({
                    "message_id": message_id,
                    "sender": sender,
                    "content_raw": content_raw,
                    "version": 1,
                }),
            },
        )?;
        tx.commit()?;
        Ok(SendMessageResult {
            message: Message {
                id: message_id,
                topic_id,
                channel_id,
                sender: sender.to_string(),
                content_raw: content_raw.to_string(),
                version: 1,
                created_at,
                edited_at: None,
                deleted_at: None,
                deleted_by: None,
            },
            event_id,
        })
    }

    /// `editMessage` (§4.3). `expected_version`, if given, must match the
    /// current row or the call fails with `version-conflict`.
    pub fn edit_message(
        &mut self,
        message_id: i64,
        new_content: &str,
        expected_version: Option<i64>,
    ) -> Result<EditMessageResult, KernelError> {
        if new_content.len() > MAX_CONTENT_RAW_BYTES {
            return Err(KernelError::ContentTooLarge(format!(
                "content_raw exceeds {MAX_CONTENT_RAW_BYTES} bytes"
            )));
        }
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let mut message = fetch_message(&tx, message_id)?;
        if let Some(expected) = expected_version {
            if expected != message.version {
                return Err(KernelError::VersionConflict {
                    current_version: message.version,
                });
            }
        }
        let old_content = message.content_raw.clone();
        let new_version = message.version + 1;
        let now = chrono::Utc::now().to_rfc3339();
        tx.execute(
            "UPDATE messages SET content_raw = ?1, version = ?2, edited_at = ?3 WHERE id = ?4",
            rusqlite::params![new_content, new_version, now, message_id],
        )?;
        let event_id = insert_event(
            &tx,
            NewEvent {
                name: event_names::MESSAGE_EDITED.to_string(),
                scope: Scope::channel_topic(message.channel_id, message.topic_id),
                entity: EntityRef {
                    kind: "message".into(),
                    id: message_id.to_string(),
                },
                data: serde_json::json!({
                    "message_id": message_id,
                    "old_content": old_content,
                    "new_content": new_content,
                    "version": new_version,
                }),
            },
        )?;
        tx.commit()?;
        message.content_raw = new_content.to_string();
        message.version = new_version;
        message.edited_at = Some(now);
        Ok(EditMessageResult { message, event_id })
    }

    /// `deleteMessage` (§4.3). Idempotent: a second delete is a no-op that
    /// returns `event_id: None` (I6).
    pub fn delete_message(
        &mut self,
        message_id: i64,
        actor: &str,
        expected_version: Option<i64>,
    ) -> Result<DeleteMessageResult, KernelError> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let mut message = fetch_message(&tx, message_id)?;
        if message.deleted_at.is_some() {
            tx.commit()?;
            return Ok(DeleteMessageResult {
                message,
                event_id: None,
            });
        }
        if let Some(expected) = expected_version {
            if expected != message.version {
                return Err(KernelError::VersionConflict {
                    current_version: message.version,
                });
            }
        }
        let new_version = message.version + 1;
        let now = chrono::Utc::now().to_rfc3339();
        tx.execute(
            "UPDATE messages
             SET content_raw = '[deleted]', version = ?1, deleted_at = ?2, deleted_by = ?3, edited_at = ?2
             WHERE id = ?4",
            rusqlite::params![new_version, now, actor, message_id],
        )?;
        let event_id = insert_event(
            &tx,
            NewEvent {
                name: event_names::MESSAGE_DELETED.to_string(),
                scope: Scope::channel_topic(message.channel_id, message.topic_id),
                entity: EntityRef {
                    kind: "message".into(),
                    id: message_id.to_string(),
                },
                data: serde_json::json!({
                    "message_id": message_id,
                    "deleted_by": actor,
                    "version": new_version,
                }),
            },
        )?;
        tx.commit()?;
        message.content_raw = "[deleted]".to_string();
        message.version = new_version;
        message.deleted_at = Some(now.clone());
        message.deleted_by = Some(actor.to_string());
        message.edited_at = Some(now);
        Ok(DeleteMessageResult {
            message,
            event_id: Some(event_id),
        })
    }

    /// `retopicMessage` (§4.3). `mode` selects the affected set relative to
    /// `anchor_message_id`; idempotent when the source topic already equals
    /// `to_topic_id`.
    pub fn retopic_message(
        &mut self,
        anchor_message_id: i64,
        to_topic_id: i64,
        mode: RetopicMode,
        expected_version: Option<i64>,
    ) -> Result<RetopicResult, KernelError> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let anchor = fetch_message(&tx, anchor_message_id)?;
        if let Some(expected) = expected_version {
            if expected != anchor.version {
                return Err(KernelError::VersionConflict {
                    current_version: anchor.version,
                });
            }
        }
        let target_channel_id: i64 = tx
            .query_row(
                "SELECT channel_id FROM topics WHERE id = ?1",
                [to_topic_id],
                |row| row.get(0),
            )
            .optional()?
            .ok_or_else(|| KernelError::NotFound(format!("topic {to_topic_id} not found")))?;
        if target_channel_id != anchor.channel_id {
            return Err(KernelError::CrossChannelMove);
        }
        if to_topic_id == anchor.topic_id {
            tx.commit()?;
            return Ok(RetopicResult {
                affected_count: 0,
                event_ids: Vec::new(),
            });
        }

        let source_topic_id = anchor.topic_id;
        let ids: Vec<i64> = match mode {
            RetopicMode::One => vec![anchor_message_id],
            RetopicMode::Later => {
                let mut stmt = tx.prepare(
                    "SELECT id FROM messages WHERE topic_id = ?1 AND id >= ?2 ORDER BY id ASC",
                )?;
                stmt.query_map(rusqlite::params![source_topic_id, anchor_message_id], |row| {
                    row.get(0)
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?
            }
            RetopicMode::All => {
                let mut stmt =
                    tx.prepare("SELECT id FROM messages WHERE topic_id = ?1 ORDER BY id ASC")?;
                stmt.query_map([source_topic_id], |row| row.get(0))?
                    .collect::<rusqlite::Result<Vec<_>>>()?
            }
        };

        let mode_str = match mode {
            RetopicMode::One => "one",
            RetopicMode::Later => "later",
            RetopicMode::All => "all",
        };
        let mut event_ids = Vec::with_capacity(ids.len());
        for message_id in &ids {
            let current_version: i64 = tx.query_row(
                "SELECT version FROM messages WHERE id = ?1",
                [message_id],
                |row| row.get(0),
            )?;
            let new_version = current_version + 1;
            tx.execute(
                "UPDATE messages SET topic_id = ?1, version = ?2 WHERE id = ?3",
                rusqlite::params![to_topic_id, new_version, message_id],
            )?;
            let event_id = insert_event(
                &tx,
                NewEvent {
                    name: event_names::MESSAGE_MOVED_TOPIC.to_string(),
                    scope: Scope::topic_move(target_channel_id, source_topic_id, to_topic_id),
                    entity: EntityRef {
                        kind: "message".into(),
                        id: message_id.to_string(),
                    },
                    data: serde_json::json!({
                        "message_id": message_id,
                        "old_topic_id": source_topic_id,
                        "new_topic_id": to_topic_id,
                        "channel_id": target_channel_id,
                        "mode": mode_str,
                        "version": new_version,
                    }),
                },
            )?;
            event_ids.push(event_id);
        }
        tx.commit()?;
        Ok(RetopicResult {
            affected_count: event_ids.len() as i64,
            event_ids,
        })
    }

    /// `addAttachment` (§4.3). A repeated `(topic_id, kind, key, dedupe_key)`
    /// returns the existing row with `event_id: None, deduplicated: true`
    /// (I10) instead of failing.
    pub fn add_attachment(
        &mut self,
        topic_id: i64,
        kind: &str,
        key: Option<&str>,
        value_json: serde_json::Value,
        dedupe_key: &str,
        source_message_id: Option<i64>,
    ) -> Result<AddAttachmentResult, KernelError> {
        let value_text = serde_json::to_string(&value_json)
            .map_err(|e| KernelError::InvalidInput(format!("value_json not serialisable: {e}")))?;
        if value_text.len() > MAX_ATTACHMENT_VALUE_BYTES {
            return Err(KernelError::ContentTooLarge(format!(
                "value_json exceeds {MAX_ATTACHMENT_VALUE_BYTES} bytes"
            )));
        }
        let key_column = key.unwrap_or("");
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let channel_id: i64 = tx
            .query_row("SELECT channel_id FROM topics WHERE id = ?1", [topic_id], |row| {
                row.get(0)
            })
            .optional()?
            .ok_or_else(|| KernelError::NotFound(format!("topic {topic_id} not found")))?;

        if let Some(existing) = tx
            .query_row(
                "SELECT id, topic_id, kind, key, value_json, dedupe_key, source_message_id, created_at
                 FROM topic_attachments
                 WHERE topic_id = ?1 AND kind = ?2 AND key = ?3 AND dedupe_key = ?4",
                rusqlite::params![topic_id, kind, key_column, dedupe_key],
                row_to_attachment,
            )
            .optional()?
        {
            tx.commit()?;
            return Ok(AddAttachmentResult {
                attachment: existing,
                event_id: None,
                deduplicated: true,
            });
        }

        let created_at = chrono::Utc::now().to_rfc3339();
        tx.execute(
            "INSERT INTO topic_attachments
                (topic_id, kind, key, value_json, dedupe_key, source_message_id, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            rusqlite::params![
                topic_id,
                kind,
                key_column,
                value_text,
                dedupe_key,
                source_message_id,
                created_at,
            ],
        )?;
        let attachment_id = tx.last_insert_rowid();
        let event_id = insert_event(
            &tx,
            NewEvent {
                name: event_names::TOPIC_ATTACHMENT_ADDED.to_string(),
                scope: Scope::channel_topic(channel_id, topic_id),
                entity: EntityRef {
                    kind: "topic_attachment".into(),
                    id: attachment_id.to_string(),
                },
                data: serde_json::json!({
                    "attachment_id": attachment_id,
                    "topic_id": topic_id,
                    "kind": kind,
                    "key": key,
                    "dedupe_key": dedupe_key,
                }),
            },
        )?;
        tx.commit()?;
        Ok(AddAttachmentResult {
            attachment: TopicAttachment {
                id: attachment_id,
                topic_id,
                kind: kind.to_string(),
                key: key.map(|k| k.to_string()),
                value_json,
                dedupe_key: dedupe_key.to_string(),
                source_message_id,
                created_at,
            },
            event_id: Some(event_id),
            deduplicated: false,
        })
    }

    // -- Read-only listing operations (expansion, §4.3) ---------------------

    pub fn get_channel(&self, channel_id: i64) -> Result<Channel, KernelError> {
        self.conn
            .query_row(
                "SELECT id, name, description, created_at FROM channels WHERE id = ?1",
                [channel_id],
                row_to_channel,
            )
            .optional()?
            .ok_or_else(|| KernelError::NotFound(format!("channel {channel_id} not found")))
    }

    pub fn list_channels(&self) -> Result<Vec<Channel>, KernelError> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name, description, created_at FROM channels ORDER BY id ASC")?;
        Ok(stmt
            .query_map([], row_to_channel)?
            .collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn get_topic(&self, topic_id: i64) -> Result<Topic, KernelError> {
        self.conn
            .query_row(
                "SELECT id, channel_id, title, created_at, updated_at FROM topics WHERE id = ?1",
                [topic_id],
                row_to_topic,
            )
            .optional()?
            .ok_or_else(|| KernelError::NotFound(format!("topic {topic_id} not found")))
    }

    pub fn list_topics(&self, channel_id: i64) -> Result<Vec<Topic>, KernelError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, channel_id, title, created_at, updated_at FROM topics
             WHERE channel_id = ?1 ORDER BY id ASC",
        )?;
        Ok(stmt
            .query_map([channel_id], row_to_topic)?
            .collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn get_message(&self, message_id: i64) -> Result<Message, KernelError> {
        fetch_message(&self.conn, message_id)
    }

    pub fn list_messages(
        &self,
        topic_id: i64,
        include_deleted: bool,
    ) -> Result<Vec<Message>, KernelError> {
        let sql = if include_deleted {
            "SELECT id, topic_id, channel_id, sender, content_raw, version, created_at,
                    edited_at, deleted_at, deleted_by
             FROM messages WHERE topic_id = ?1 ORDER BY id ASC"
        } else {
            "SELECT id, topic_id, channel_id, sender, content_raw, version, created_at,
                    edited_at, deleted_at, deleted_by
             FROM messages WHERE topic_id = ?1 AND deleted_at IS NULL ORDER BY id ASC"
        };
        let mut stmt = self.conn.prepare(sql)?;
        Ok(stmt
            .query_map([topic_id], row_to_message)?
            .collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn list_attachments(&self, topic_id: i64) -> Result<Vec<TopicAttachment>, KernelError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, topic_id, kind, key, value_json, dedupe_key, source_message_id, created_at
             FROM topic_attachments WHERE topic_id = ?1 ORDER BY id ASC",
        )?;
        Ok(stmt
            .query_map([topic_id], row_to_attachment)?
            .collect::<rusqlite::Result<Vec<_>>>()?)
    }
}

fn channel_exists_or_not_found(
    conn: &rusqlite::Connection,
    channel_id: i64,
) -> Result<(), KernelError> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM channels WHERE id = ?1)",
        [channel_id],
        |row| row.get(0),
    )?;
    if exists {
        Ok(())
    } else {
        Err(KernelError::NotFound(format!("channel {channel_id} not found")))
    }
}

fn fetch_message(conn: &rusqlite::Connection, message_id: i64) -> Result<Message, KernelError> {
    conn.query_row(
        "SELECT id, topic_id, channel_id, sender, content_raw, version, created_at,
                edited_at, deleted_at, deleted_by
         FROM messages WHERE id = ?1",
        [message_id],
        row_to_message,
    )
    .optional()?
    .ok_or_else(|| KernelError::NotFound(format!("message {message_id} not found")))
}

fn row_to_channel(row: &rusqlite::Row<'_>) -> rusqlite::Result<Channel> {
    Ok(Channel {
        id: row.get("id")?,
        name: row.get("name")?,
        description: row.get("description")?,
        created_at: row.get("created_at")?,
    })
}

fn row_to_topic(row: &rusqlite::Row<'_>) -> rusqlite::Result<Topic> {
    Ok(Topic {
        id: row.get("id")?,
        channel_id: row.get("channel_id")?,
        title: row.get("title")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<Message> {
    Ok(Message {
        id: row.get("id")?,
        topic_id: row.get("topic_id")?,
        channel_id: row.get("channel_id")?,
        sender: row.get("sender")?,
        content_raw: row.get("content_raw")?,
        version: row.get("version")?,
        created_at: row.get("created_at")?,
        edited_at: row.get("edited_at")?,
        deleted_at: row.get("deleted_at")?,
        deleted_by: row.get("deleted_by")?,
    })
}

fn row_to_attachment(row: &rusqlite::Row<'_>) -> rusqlite::Result<TopicAttachment> {
    let key: String = row.get("key")?;
    let value_text: String = row.get("value_json")?;
    let value_json = serde_json::from_str(&value_text).unwrap_or(serde_json::Value::Null);
    Ok(TopicAttachment {
        id: row.get("id")?,
        topic_id: row.get("topic_id")?,
        kind: row.get("kind")?,
        key: if key.is_empty() { None } else { Some(key) },
        value_json,
        dedupe_key: row.get("dedupe_key")?,
        source_message_id: row.get("source_message_id")?,
        created_at: row.get("created_at")?,
    })
}
