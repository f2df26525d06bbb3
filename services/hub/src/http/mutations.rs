//! HTTP mutation surface: a thin adapter mapping mutation requests onto
//! `hub_store::Store` kernel calls (§4.3, §6). The JSON request/response
//! shapes below are this service's own concern — the hub contract only
//! requires that each call lands in exactly one event-emitting transaction,
//! which the kernel itself guarantees.

use crate::auth::{extract_bearer, token_matches};
use crate::envelope::to_envelope;
use crate::http::response::{bad_request, invalid_auth, kernel_error, missing_auth, HttpResult};
use crate::state::AppState;
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;
use hub_store::{Channel, Message, RetopicMode, Store, Topic, TopicAttachment};
use serde::{Deserialize, Serialize};

fn require_auth(headers: &HeaderMap, state: &AppState) -> Result<(), axum::response::Response> {
    let token = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(extract_bearer)
        .ok_or_else(missing_auth)?;
    if token_matches(&state.auth_token, token) {
        Ok(())
    } else {
        Err(invalid_auth())
    }
}

// ---------------------------------------------------------------------------
// Channels
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct CreateChannelRequest {
    pub name: String,
}

#[derive(Debug, Serialize)]
pub struct ChannelResponse {
    #[serde(flatten)]
    pub channel: ChannelDto,
    pub event_id: i64,
}

#[derive(Debug, Serialize)]
pub struct ChannelDto {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub created_at: String,
}

impl From<Channel> for ChannelDto {
    fn from(c: Channel) -> Self {
        Self {
            id: c.id,
            name: c.name,
            description: c.description,
            created_at: c.created_at,
        }
    }
}

pub async fn create_channel(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<CreateChannelRequest>,
) -> HttpResult<ChannelResponse> {
    require_auth(&headers, &state)?;
    let mut store = state.store.lock().await;
    let result = store.create_channel(&req.name).map_err(kernel_error)?;
    publish_known(&state, &store, result.event_id);
    drop(store);
    Ok(Json(ChannelResponse {
        channel: result.channel.into(),
        event_id: result.event_id,
    }))
}

pub async fn list_channels(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> HttpResult<Vec<ChannelDto>> {
    require_auth(&headers, &state)?;
    let store = state.store.lock().await;
    let channels = store.list_channels().map_err(kernel_error)?;
    Ok(Json(channels.into_iter().map(ChannelDto::from).collect()))
}

// ---------------------------------------------------------------------------
// Topics
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct CreateTopicRequest {
    pub title: String,
}

#[derive(Debug, Deserialize)]
pub struct RenameTopicRequest {
    pub new_title: String,
}

#[derive(Debug, Serialize)]
pub struct TopicDto {
    pub id: i64,
    pub channel_id: i64,
    pub title: String,
    pub created_at: String,
    pub updated_at: String,
}

impl From<Topic> for TopicDto {
    fn from(t: Topic) -> Self {
        Self {
            id: t.id,
            channel_id: t.channel_id,
            title: t.title,
            created_at: t.created_at,
            updated_at: t.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TopicResponse {
    #[serde(flatten)]
    pub topic: TopicDto,
    pub event_id: i64,
}

pub async fn create_topic(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(channel_id): Path<i64>,
    Json(req): Json<CreateTopicRequest>,
) -> HttpResult<TopicResponse> {
    require_auth(&headers, &state)?;
    let mut store = state.store.lock().await;
    let result = store
        .create_topic(channel_id, &req.title)
        .map_err(kernel_error)?;
    publish_known(&state, &store, result.event_id);
    drop(store);
    Ok(Json(TopicResponse {
        topic: result.topic.into(),
        event_id: result.event_id,
    }))
}

pub async fn rename_topic(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(topic_id): Path<i64>,
    Json(req): Json<RenameTopicRequest>,
) -> HttpResult<TopicResponse> {
    require_auth(&headers, &state)?;
    let mut store = state.store.lock().await;
    let result = store
        .rename_topic(topic_id, &req.new_title)
        .map_err(kernel_error)?;
    publish_known(&state, &store, result.event_id);
    drop(store);
    Ok(Json(TopicResponse {
        topic: result.topic.into(),
        event_id: result.event_id,
    }))
}

pub async fn list_topics(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(channel_id): Path<i64>,
) -> HttpResult<Vec<TopicDto>> {
    require_auth(&headers, &state)?;
    let store = state.store.lock().await;
    let topics = store.list_topics(channel_id).map_err(kernel_error)?;
    Ok(Json(topics.into_iter().map(TopicDto::from).collect()))
}

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub sender: String,
    pub content_raw: String,
}

#[derive(Debug, Deserialize)]
pub struct EditMessageRequest {
    pub new_content: String,
    #[serde(default)]
    pub expected_version: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct DeleteMessageRequest {
    pub actor: String,
    #[serde(default)]
    pub expected_version: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct MessageDto {
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

impl From<Message> for MessageDto {
    fn from(m: Message) -> Self {
        Self {
            id: m.id,
            topic_id: m.topic_id,
            channel_id: m.channel_id,
            sender: m.sender,
            content_raw: m.content_raw,
            version: m.version,
            created_at: m.created_at,
            edited_at: m.edited_at,
            deleted_at: m.deleted_at,
            deleted_by: m.deleted_by,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    #[serde(flatten)]
    pub message: MessageDto,
    pub event_id: Option<i64>,
}

pub async fn send_message(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(topic_id): Path<i64>,
    Json(req): Json<SendMessageRequest>,
) -> HttpResult<MessageResponse> {
    require_auth(&headers, &state)?;
    let mut store = state.store.lock().await;
    let result = store
        .send_message(topic_id, &req.sender, &req.content_raw)
        .map_err(kernel_error)?;
    publish_known(&state, &store, result.event_id);
    drop(store);
    Ok(Json(MessageResponse {
        message: result.message.into(),
        event_id: Some(result.event_id),
    }))
}

pub async fn edit_message(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(message_id): Path<i64>,
    Json(req): Json<EditMessageRequest>,
) -> HttpResult<MessageResponse> {
    require_auth(&headers, &state)?;
    let mut store = state.store.lock().await;
    let result = store
        .edit_message(message_id, &req.new_content, req.expected_version)
        .map_err(kernel_error)?;
    publish_known(&state, &store, result.event_id);
    drop(store);
    Ok(Json(MessageResponse {
        message: result.message.into(),
        event_id: Some(result.event_id),
    }))
}

pub async fn delete_message(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(message_id): Path<i64>,
    Json(req): Json<DeleteMessageRequest>,
) -> HttpResult<MessageResponse> {
    require_auth(&headers, &state)?;
    let mut store = state.store.lock().await;
    let result = store
        .delete_message(message_id, &req.actor, req.expected_version)
        .map_err(kernel_error)?;
    if let Some(event_id) = result.event_id {
        publish_known(&state, &store, event_id);
    }
    drop(store);
    Ok(Json(MessageResponse {
        message: result.message.into(),
        event_id: result.event_id,
    }))
}

pub async fn list_messages(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(topic_id): Path<i64>,
) -> HttpResult<Vec<MessageDto>> {
    require_auth(&headers, &state)?;
    let store = state.store.lock().await;
    let messages = store.list_messages(topic_id, true).map_err(kernel_error)?;
    Ok(Json(messages.into_iter().map(MessageDto::from).collect()))
}

// ---------------------------------------------------------------------------
// Retopic
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct RetopicRequest {
    pub to_topic_id: i64,
    pub mode: RetopicModeDto,
    #[serde(default)]
    pub expected_version: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetopicModeDto {
    One,
    Later,
    All,
}

impl From<RetopicModeDto> for RetopicMode {
    fn from(dto: RetopicModeDto) -> Self {
        match dto {
            RetopicModeDto::One => RetopicMode::One,
            RetopicModeDto::Later => RetopicMode::Later,
            RetopicModeDto::All => RetopicMode::All,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RetopicResponse {
    pub affected_count: i64,
    pub event_ids: Vec<i64>,
}

pub async fn retopic_message(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(anchor_message_id): Path<i64>,
    Json(req): Json<RetopicRequest>,
) -> HttpResult<RetopicResponse> {
    require_auth(&headers, &state)?;
    let mut store = state.store.lock().await;
    let result = store
        .retopic_message(
            anchor_message_id,
            req.to_topic_id,
            req.mode.into(),
            req.expected_version,
        )
        .map_err(kernel_error)?;
    for event_id in &result.event_ids {
        publish_known(&state, &store, *event_id);
    }
    drop(store);
    Ok(Json(RetopicResponse {
        affected_count: result.affected_count,
        event_ids: result.event_ids,
    }))
}

// ---------------------------------------------------------------------------
// Attachments
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct AddAttachmentRequest {
    pub kind: String,
    #[serde(default)]
    pub key: Option<String>,
    pub value_json: serde_json::Value,
    pub dedupe_key: String,
    #[serde(default)]
    pub source_message_id: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct AttachmentDto {
    pub id: i64,
    pub topic_id: i64,
    pub kind: String,
    pub key: Option<String>,
    pub value_json: serde_json::Value,
    pub dedupe_key: String,
    pub source_message_id: Option<i64>,
    pub created_at: String,
}

impl From<TopicAttachment> for AttachmentDto {
    fn from(a: TopicAttachment) -> Self {
        Self {
            id: a.id,
            topic_id: a.topic_id,
            kind: a.kind,
            key: a.key,
            value_json: a.value_json,
            dedupe_key: a.dedupe_key,
            source_message_id: a.source_message_id,
            created_at: a.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AttachmentResponse {
    #[serde(flatten)]
    pub attachment: AttachmentDto,
    pub event_id: Option<i64>,
    pub deduplicated: bool,
}

pub async fn add_attachment(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(topic_id): Path<i64>,
    Json(req): Json<AddAttachmentRequest>,
) -> HttpResult<AttachmentResponse> {
    require_auth(&headers, &state)?;
    if req.kind.trim().is_empty() {
        return Err(bad_request("kind must not be empty"));
    }
    let mut store = state.store.lock().await;
    let result = store
        .add_attachment(
            topic_id,
            &req.kind,
            req.key.as_deref(),
            req.value_json,
            &req.dedupe_key,
            req.source_message_id,
        )
        .map_err(kernel_error)?;
    if let Some(event_id) = result.event_id {
        publish_known(&state, &store, event_id);
    }
    drop(store);
    Ok(Json(AttachmentResponse {
        attachment: result.attachment.into(),
        event_id: result.event_id,
        deduplicated: result.deduplicated,
    }))
}

pub async fn list_attachments(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(topic_id): Path<i64>,
) -> HttpResult<Vec<AttachmentDto>> {
    require_auth(&headers, &state)?;
    let store = state.store.lock().await;
    let attachments = store.list_attachments(topic_id).map_err(kernel_error)?;
    Ok(Json(attachments.into_iter().map(AttachmentDto::from).collect()))
}

/// Re-reads the just-committed event row and republishes it to the
/// distributor (§4.4: the kernel's post-commit hook).
///
/// Takes the still-held store guard rather than re-acquiring the mutex, so
/// that two concurrent requests can never interleave their publishes out of
/// commit order: the lock that serializes the writes also serializes the
/// broadcasts, the same way the teacher's `handle_event_batch` publishes
/// before releasing its own upsert lock.
fn publish_known(state: &AppState, store: &Store, event_id: i64) {
    if let Ok(Some(row)) = store.get_event(event_id) {
        state.publish(to_envelope(row));
    }
}
