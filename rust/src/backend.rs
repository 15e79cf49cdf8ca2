use std::fmt;
use std::sync::{Arc, RwLock};

use crate::model::{ChatRoom, Message, MessageType, Reaction, ReceiptStatus, User};

#[derive(uniffi::Enum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum BackendErrorKind {
    Network,
    Rejected,
    NotFound,
    Unauthorized,
    Unavailable,
    Other,
}

#[derive(uniffi::Record, Clone, Debug, PartialEq, Eq)]
pub struct BackendError {
    pub kind: BackendErrorKind,
    pub message: String,
}

impl BackendError {
    pub fn unavailable() -> Self {
        Self {
            kind: BackendErrorKind::Unavailable,
            message: "chat backend unavailable".into(),
        }
    }
}

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

impl std::error::Error for BackendError {}

#[derive(uniffi::Record, Clone, Debug)]
pub struct RoomPage {
    pub rooms: Vec<ChatRoom>,
    pub next_cursor: Option<String>,
    pub has_more: bool,
}

#[derive(uniffi::Record, Clone, Debug)]
pub struct MessagePage {
    /// Chronological (oldest first).
    pub messages: Vec<Message>,
    pub has_more: bool,
}

#[derive(uniffi::Record, Clone, Debug)]
pub struct SearchPage {
    pub results: Vec<Message>,
    pub has_more: bool,
}

#[derive(uniffi::Record, Clone, Debug)]
pub struct OutgoingMessage {
    pub content: String,
    pub message_type: MessageType,
    pub reply_to_id: Option<String>,
    /// Engine-local id of the optimistic entry, usable as an idempotency key.
    pub client_id: String,
}

#[derive(uniffi::Record, Clone, Debug)]
pub struct RoomPageResult {
    pub page: Option<RoomPage>,
    pub error: Option<BackendError>,
}

#[derive(uniffi::Record, Clone, Debug)]
pub struct MessagePageResult {
    pub page: Option<MessagePage>,
    pub error: Option<BackendError>,
}

#[derive(uniffi::Record, Clone, Debug)]
pub struct SearchPageResult {
    pub page: Option<SearchPage>,
    pub error: Option<BackendError>,
}

#[derive(uniffi::Record, Clone, Debug)]
pub struct MessageResult {
    pub message: Option<Message>,
    pub error: Option<BackendError>,
}

#[derive(uniffi::Record, Clone, Debug)]
pub struct RoomResult {
    pub room: Option<ChatRoom>,
    pub error: Option<BackendError>,
}

#[derive(uniffi::Record, Clone, Debug)]
pub struct AckResult {
    pub error: Option<BackendError>,
}

impl AckResult {
    pub fn ok() -> Self {
        Self { error: None }
    }
}

/// The platform-side API client. Calls block; the core never invokes them on
/// its actor thread.
#[uniffi::export(callback_interface)]
pub trait ChatBackend: Send + Sync + 'static {
    fn fetch_room_page(&self, cursor: Option<String>) -> RoomPageResult;
    fn fetch_message_page(
        &self,
        room_id: String,
        before_cursor: Option<String>,
        limit: u32,
    ) -> MessagePageResult;
    fn search_messages(
        &self,
        room_id: String,
        query: String,
        offset: u32,
        limit: u32,
    ) -> SearchPageResult;
    fn send_message(&self, room_id: String, payload: OutgoingMessage) -> MessageResult;
    fn react_to_message(
        &self,
        room_id: String,
        message_id: String,
        emoji: String,
        add: bool,
    ) -> AckResult;
    fn delete_for_me(&self, room_id: String, message_ids: Vec<String>) -> AckResult;
    fn delete_for_everyone(&self, room_id: String, message_ids: Vec<String>) -> AckResult;
    /// `muted_until = None` mutes indefinitely.
    fn set_mute(&self, room_id: String, muted_until: Option<i64>) -> AckResult;
    fn unmute(&self, room_id: String) -> AckResult;
    fn set_pinned(&self, room_id: String, pinned: bool) -> AckResult;
    fn mark_read(&self, room_id: String) -> AckResult;
    fn send_typing(&self, room_id: String, is_typing: bool) -> AckResult;
    fn create_room(&self, peer: User) -> RoomResult;
    fn create_group(&self, name: String, description: Option<String>, members: Vec<User>)
        -> RoomResult;
    fn add_group_members(&self, room_id: String, members: Vec<User>) -> RoomResult;
}

pub type SharedChatBackend = Arc<RwLock<Option<Arc<dyn ChatBackend>>>>;

pub(crate) fn current_backend(slot: &SharedChatBackend) -> Option<Arc<dyn ChatBackend>> {
    match slot.read() {
        Ok(g) => g.clone(),
        Err(poison) => poison.into_inner().clone(),
    }
}

/// Realtime events pushed by the platform transport.
#[derive(uniffi::Enum, Clone, Debug)]
pub enum LiveEvent {
    NewMessage {
        message: Message,
    },
    MessageEdited {
        room_id: String,
        message_id: String,
        content: String,
    },
    MessageDeleted {
        room_id: String,
        message_id: String,
    },
    ReactionChanged {
        room_id: String,
        message_id: String,
        reactions: Vec<Reaction>,
    },
    Receipt {
        room_id: String,
        message_id: String,
        status: ReceiptStatus,
    },
    Typing {
        room_id: String,
        user: User,
        is_typing: bool,
    },
    RoomUpdated {
        room: ChatRoom,
    },
}

impl LiveEvent {
    pub fn tag(&self) -> &'static str {
        match self {
            LiveEvent::NewMessage { .. } => "NewMessage",
            LiveEvent::MessageEdited { .. } => "MessageEdited",
            LiveEvent::MessageDeleted { .. } => "MessageDeleted",
            LiveEvent::ReactionChanged { .. } => "ReactionChanged",
            LiveEvent::Receipt { .. } => "Receipt",
            LiveEvent::Typing { .. } => "Typing",
            LiveEvent::RoomUpdated { .. } => "RoomUpdated",
        }
    }

    pub fn room_id(&self) -> &str {
        match self {
            LiveEvent::NewMessage { message } => &message.room_id,
            LiveEvent::RoomUpdated { room } => &room.id,
            LiveEvent::MessageEdited { room_id, .. }
            | LiveEvent::MessageDeleted { room_id, .. }
            | LiveEvent::ReactionChanged { room_id, .. }
            | LiveEvent::Receipt { room_id, .. }
            | LiveEvent::Typing { room_id, .. } => room_id,
        }
    }
}

pub(crate) fn into_result<T>(value: Option<T>, error: Option<BackendError>) -> Result<T, BackendError> {
    match (value, error) {
        (_, Some(e)) => Err(e),
        (Some(v), None) => Ok(v),
        (None, None) => Err(BackendError {
            kind: BackendErrorKind::Other,
            message: "empty backend response".into(),
        }),
    }
}

impl RoomPageResult {
    pub fn into_result(self) -> Result<RoomPage, BackendError> {
        into_result(self.page, self.error)
    }
}

impl MessagePageResult {
    pub fn into_result(self) -> Result<MessagePage, BackendError> {
        into_result(self.page, self.error)
    }
}

impl SearchPageResult {
    pub fn into_result(self) -> Result<SearchPage, BackendError> {
        into_result(self.page, self.error)
    }
}

impl MessageResult {
    pub fn into_result(self) -> Result<Message, BackendError> {
        into_result(self.message, self.error)
    }
}

impl RoomResult {
    pub fn into_result(self) -> Result<ChatRoom, BackendError> {
        into_result(self.room, self.error)
    }
}

impl AckResult {
    pub fn into_result(self) -> Result<(), BackendError> {
        match self.error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
