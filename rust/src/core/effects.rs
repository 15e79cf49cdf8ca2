// Side effects the conversation controller asks the actor to perform, and the
// completions that re-enter the actor once a backend call returns.

use std::time::Duration;

use super::pagination::PageRequest;
use crate::backend::{BackendError, ChatBackend, MessagePage, OutgoingMessage, RoomPage, SearchPage};
use crate::model::{ChatRoom, Message, User};

#[derive(Debug, Clone)]
pub enum Effect {
    Request(Request),
    Schedule { timer: Timer, after: Duration },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timer {
    /// Carries the open room's context so a timer armed in a previous room
    /// can never fire into the next one.
    SearchDebounce { context: u64, generation: u64 },
    TypingIdle { generation: u64 },
}

#[derive(Debug, Clone)]
pub enum Request {
    FetchRooms {
        token: u64,
        cursor: Option<String>,
    },
    FetchMessages {
        token: u64,
        room_id: String,
        before: Option<String>,
        limit: u32,
    },
    Search {
        room_id: String,
        page: PageRequest,
    },
    Send {
        room_id: String,
        local_id: String,
        payload: OutgoingMessage,
    },
    React {
        room_id: String,
        message_id: String,
        emoji: String,
        add: bool,
    },
    DeleteForMe {
        room_id: String,
        message_ids: Vec<String>,
    },
    DeleteForEveryone {
        room_id: String,
        message_ids: Vec<String>,
    },
    SetMute {
        room_id: String,
        muted_until: Option<i64>,
    },
    Unmute {
        room_id: String,
    },
    SetPinned {
        room_id: String,
        pinned: bool,
    },
    MarkRead {
        room_id: String,
    },
    Typing {
        room_id: String,
        is_typing: bool,
    },
    CreateRoom {
        peer: User,
    },
    CreateGroup {
        name: String,
        description: Option<String>,
        members: Vec<User>,
    },
    AddMembers {
        room_id: String,
        members: Vec<User>,
    },
}

impl Request {
    /// Log-safe tag (never includes message content).
    pub fn tag(&self) -> &'static str {
        match self {
            Request::FetchRooms { .. } => "fetch_room_page",
            Request::FetchMessages { .. } => "fetch_message_page",
            Request::Search { .. } => "search_messages",
            Request::Send { .. } => "send_message",
            Request::React { .. } => "react_to_message",
            Request::DeleteForMe { .. } => "delete_for_me",
            Request::DeleteForEveryone { .. } => "delete_for_everyone",
            Request::SetMute { .. } => "set_mute",
            Request::Unmute { .. } => "unmute",
            Request::SetPinned { .. } => "set_pinned",
            Request::MarkRead { .. } => "mark_read",
            Request::Typing { .. } => "send_typing",
            Request::CreateRoom { .. } => "create_room",
            Request::CreateGroup { .. } => "create_group",
            Request::AddMembers { .. } => "add_group_members",
        }
    }
}

#[derive(Debug, Clone)]
pub enum Completion {
    Rooms {
        token: u64,
        cursor: Option<String>,
        result: Result<RoomPage, BackendError>,
    },
    Messages {
        token: u64,
        room_id: String,
        before: Option<String>,
        result: Result<MessagePage, BackendError>,
    },
    Search {
        token: u64,
        room_id: String,
        query: String,
        result: Result<SearchPage, BackendError>,
    },
    Sent {
        room_id: String,
        local_id: String,
        result: Result<Message, BackendError>,
    },
    Reacted {
        room_id: String,
        message_id: String,
        emoji: String,
        add: bool,
        result: Result<(), BackendError>,
    },
    DeletedForMe {
        room_id: String,
        result: Result<(), BackendError>,
    },
    DeletedForEveryone {
        room_id: String,
        message_ids: Vec<String>,
        result: Result<(), BackendError>,
    },
    MuteSet {
        room_id: String,
        muted_until: Option<i64>,
        result: Result<(), BackendError>,
    },
    Unmuted {
        room_id: String,
        result: Result<(), BackendError>,
    },
    PinSet {
        room_id: String,
        pinned: bool,
        result: Result<(), BackendError>,
    },
    /// Fire-and-forget acknowledgements (read markers, typing).
    Acked {
        what: &'static str,
        room_id: String,
        result: Result<(), BackendError>,
    },
    RoomCreated {
        result: Result<ChatRoom, BackendError>,
    },
    MembersAdded {
        room_id: String,
        result: Result<ChatRoom, BackendError>,
    },
}

/// Runs one request against the platform backend. Blocking; the actor calls
/// this from `spawn_blocking`, never on its own thread.
pub(crate) fn execute(backend: Option<&dyn ChatBackend>, request: Request) -> Completion {
    let Some(b) = backend else {
        return failed(request, BackendError::unavailable());
    };
    match request {
        Request::FetchRooms { token, cursor } => Completion::Rooms {
            token,
            result: b.fetch_room_page(cursor.clone()).into_result(),
            cursor,
        },
        Request::FetchMessages {
            token,
            room_id,
            before,
            limit,
        } => Completion::Messages {
            token,
            result: b
                .fetch_message_page(room_id.clone(), before.clone(), limit)
                .into_result(),
            room_id,
            before,
        },
        Request::Search { room_id, page } => Completion::Search {
            token: page.token,
            result: b
                .search_messages(room_id.clone(), page.query.clone(), page.offset, page.limit)
                .into_result(),
            room_id,
            query: page.query,
        },
        Request::Send {
            room_id,
            local_id,
            payload,
        } => Completion::Sent {
            result: b.send_message(room_id.clone(), payload).into_result(),
            room_id,
            local_id,
        },
        Request::React {
            room_id,
            message_id,
            emoji,
            add,
        } => Completion::Reacted {
            result: b
                .react_to_message(room_id.clone(), message_id.clone(), emoji.clone(), add)
                .into_result(),
            room_id,
            message_id,
            emoji,
            add,
        },
        Request::DeleteForMe {
            room_id,
            message_ids,
        } => Completion::DeletedForMe {
            result: b.delete_for_me(room_id.clone(), message_ids).into_result(),
            room_id,
        },
        Request::DeleteForEveryone {
            room_id,
            message_ids,
        } => Completion::DeletedForEveryone {
            result: b
                .delete_for_everyone(room_id.clone(), message_ids.clone())
                .into_result(),
            room_id,
            message_ids,
        },
        Request::SetMute {
            room_id,
            muted_until,
        } => Completion::MuteSet {
            result: b.set_mute(room_id.clone(), muted_until).into_result(),
            room_id,
            muted_until,
        },
        Request::Unmute { room_id } => Completion::Unmuted {
            result: b.unmute(room_id.clone()).into_result(),
            room_id,
        },
        Request::SetPinned { room_id, pinned } => Completion::PinSet {
            result: b.set_pinned(room_id.clone(), pinned).into_result(),
            room_id,
            pinned,
        },
        Request::MarkRead { room_id } => Completion::Acked {
            what: "mark_read",
            result: b.mark_read(room_id.clone()).into_result(),
            room_id,
        },
        Request::Typing { room_id, is_typing } => Completion::Acked {
            what: "send_typing",
            result: b.send_typing(room_id.clone(), is_typing).into_result(),
            room_id,
        },
        Request::CreateRoom { peer } => Completion::RoomCreated {
            result: b.create_room(peer).into_result(),
        },
        Request::CreateGroup {
            name,
            description,
            members,
        } => Completion::RoomCreated {
            result: b.create_group(name, description, members).into_result(),
        },
        Request::AddMembers { room_id, members } => Completion::MembersAdded {
            result: b.add_group_members(room_id.clone(), members).into_result(),
            room_id,
        },
    }
}

/// The completion a request produces when it never reached the backend.
pub(crate) fn failed(request: Request, error: BackendError) -> Completion {
    match request {
        Request::FetchRooms { token, cursor } => Completion::Rooms {
            token,
            cursor,
            result: Err(error),
        },
        Request::FetchMessages {
            token,
            room_id,
            before,
            ..
        } => Completion::Messages {
            token,
            room_id,
            before,
            result: Err(error),
        },
        Request::Search { room_id, page } => Completion::Search {
            token: page.token,
            room_id,
            query: page.query,
            result: Err(error),
        },
        Request::Send {
            room_id, local_id, ..
        } => Completion::Sent {
            room_id,
            local_id,
            result: Err(error),
        },
        Request::React {
            room_id,
            message_id,
            emoji,
            add,
        } => Completion::Reacted {
            room_id,
            message_id,
            emoji,
            add,
            result: Err(error),
        },
        Request::DeleteForMe { room_id, .. } => Completion::DeletedForMe {
            room_id,
            result: Err(error),
        },
        Request::DeleteForEveryone {
            room_id,
            message_ids,
        } => Completion::DeletedForEveryone {
            room_id,
            message_ids,
            result: Err(error),
        },
        Request::SetMute {
            room_id,
            muted_until,
        } => Completion::MuteSet {
            room_id,
            muted_until,
            result: Err(error),
        },
        Request::Unmute { room_id } => Completion::Unmuted {
            room_id,
            result: Err(error),
        },
        Request::SetPinned { room_id, pinned } => Completion::PinSet {
            room_id,
            pinned,
            result: Err(error),
        },
        Request::MarkRead { room_id } => Completion::Acked {
            what: "mark_read",
            room_id,
            result: Err(error),
        },
        Request::Typing { room_id, .. } => Completion::Acked {
            what: "send_typing",
            room_id,
            result: Err(error),
        },
        Request::CreateRoom { .. } | Request::CreateGroup { .. } => {
            Completion::RoomCreated { result: Err(error) }
        }
        Request::AddMembers { room_id, .. } => Completion::MembersAdded {
            room_id,
            result: Err(error),
        },
    }
}
