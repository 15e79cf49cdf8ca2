use crate::core::MuteDuration;
use crate::model::{MessageType, User};
use crate::state::RoomFilter;

#[derive(uniffi::Enum, Debug, Clone)]
pub enum AppAction {
    // Session
    Login {
        user: User,
    },
    Logout,

    // Room list
    RefreshRooms,
    LoadMoreRooms,
    SetRoomFilter {
        filter: RoomFilter,
    },

    // Conversation
    OpenRoom {
        room_id: String,
    },
    CloseRoom,
    LoadOlderMessages,
    SendMessage {
        room_id: String,
        content: String,
        message_type: MessageType,
    },
    RetryMessage {
        message_id: String,
    },
    DiscardMessage {
        message_id: String,
    },
    ToggleReaction {
        room_id: String,
        message_id: String,
        emoji: String,
    },
    DeleteForMe {
        room_id: String,
        message_id: String,
    },
    DeleteForEveryone {
        room_id: String,
        message_id: String,
    },
    ComposerInput,

    // Selection
    LongPressMessage {
        message_id: String,
    },
    TapMessage {
        message_id: String,
    },
    ClearSelection,
    DismissQuickReaction,
    ReactToSelection {
        emoji: String,
    },
    DeleteSelectedForMe,
    DeleteSelectedForEveryone,
    ReplyToSelection,
    SetReplyTarget {
        message_id: String,
    },
    ClearReplyTarget,

    // Search
    SearchQueryChanged {
        query: String,
    },
    SearchLoadMore,
    CloseSearch,

    // Room settings
    MuteRoom {
        room_id: String,
        duration: MuteDuration,
    },
    UnmuteRoom {
        room_id: String,
    },
    SetRoomPinned {
        room_id: String,
        pinned: bool,
    },

    // Rooms and groups
    CreateRoom {
        peer: User,
    },
    CreateGroup {
        name: String,
        description: Option<String>,
        members: Vec<User>,
    },
    AddGroupMembers {
        room_id: String,
        members: Vec<User>,
    },

    // UI
    ClearToast,

    // Lifecycle
    Foregrounded,
}

impl AppAction {
    /// Log-safe action tag (never includes message content or search text).
    pub fn tag(&self) -> &'static str {
        match self {
            // Session
            AppAction::Login { .. } => "Login",
            AppAction::Logout => "Logout",

            // Room list
            AppAction::RefreshRooms => "RefreshRooms",
            AppAction::LoadMoreRooms => "LoadMoreRooms",
            AppAction::SetRoomFilter { .. } => "SetRoomFilter",

            // Conversation
            AppAction::OpenRoom { .. } => "OpenRoom",
            AppAction::CloseRoom => "CloseRoom",
            AppAction::LoadOlderMessages => "LoadOlderMessages",
            AppAction::SendMessage { .. } => "SendMessage",
            AppAction::RetryMessage { .. } => "RetryMessage",
            AppAction::DiscardMessage { .. } => "DiscardMessage",
            AppAction::ToggleReaction { .. } => "ToggleReaction",
            AppAction::DeleteForMe { .. } => "DeleteForMe",
            AppAction::DeleteForEveryone { .. } => "DeleteForEveryone",
            AppAction::ComposerInput => "ComposerInput",

            // Selection
            AppAction::LongPressMessage { .. } => "LongPressMessage",
            AppAction::TapMessage { .. } => "TapMessage",
            AppAction::ClearSelection => "ClearSelection",
            AppAction::DismissQuickReaction => "DismissQuickReaction",
            AppAction::ReactToSelection { .. } => "ReactToSelection",
            AppAction::DeleteSelectedForMe => "DeleteSelectedForMe",
            AppAction::DeleteSelectedForEveryone => "DeleteSelectedForEveryone",
            AppAction::ReplyToSelection => "ReplyToSelection",
            AppAction::SetReplyTarget { .. } => "SetReplyTarget",
            AppAction::ClearReplyTarget => "ClearReplyTarget",

            // Search
            AppAction::SearchQueryChanged { .. } => "SearchQueryChanged",
            AppAction::SearchLoadMore => "SearchLoadMore",
            AppAction::CloseSearch => "CloseSearch",

            // Room settings
            AppAction::MuteRoom { .. } => "MuteRoom",
            AppAction::UnmuteRoom { .. } => "UnmuteRoom",
            AppAction::SetRoomPinned { .. } => "SetRoomPinned",

            // Rooms and groups
            AppAction::CreateRoom { .. } => "CreateRoom",
            AppAction::CreateGroup { .. } => "CreateGroup",
            AppAction::AddGroupMembers { .. } => "AddGroupMembers",

            // UI
            AppAction::ClearToast => "ClearToast",

            // Lifecycle
            AppAction::Foregrounded => "Foregrounded",
        }
    }
}
