//! Embedded SQLite store for the hub: event log, replay query, and the
//! mutation kernel that pairs every state change with an event (§3-4.3).

mod db;
mod error;
mod events;
mod kernel;
mod model;

pub use db::{Store, StoreResult};
pub use error::{KernelError, StoreError};
pub use events::{insert_event, max_event_id, replay, EventRow, NewEvent, ReplayQuery};
pub use kernel::{
    AddAttachmentResult, CreateChannelResult, CreateTopicResult, DeleteMessageResult,
    EditMessageResult, RenameTopicResult, RetopicMode, RetopicResult, SendMessageResult,
    MAX_ATTACHMENT_VALUE_BYTES, MAX_CONTENT_RAW_BYTES,
};
pub use model::{Channel, Message, Topic, TopicAttachment};
