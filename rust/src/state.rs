use crate::model::{MessageType, ParentRef, Reaction, ReceiptStatus, User};

#[derive(uniffi::Record, Clone, Debug)]
pub struct AppState {
    pub rev: u64,
    pub current_user: Option<User>,
    pub busy: BusyState,
    pub room_filter: RoomFilter,
    pub room_list: Vec<RoomSummary>,
    pub can_load_more_rooms: bool,
    pub current_room: Option<RoomViewState>,
    pub toast: Option<String>,
}

impl AppState {
    pub fn empty() -> Self {
        Self {
            rev: 0,
            current_user: None,
            busy: BusyState::idle(),
            room_filter: RoomFilter::All,
            room_list: vec![],
            can_load_more_rooms: false,
            current_room: None,
            toast: None,
        }
    }
}

/// "In flight" flags for long-ish operations that the UI should reflect.
#[derive(uniffi::Record, Clone, Debug, PartialEq, Eq)]
pub struct BusyState {
    pub loading_rooms: bool,
    pub creating_room: bool,
    pub updating_members: bool,
}

impl BusyState {
    pub fn idle() -> Self {
        Self {
            loading_rooms: false,
            creating_room: false,
            updating_members: false,
        }
    }
}

#[derive(uniffi::Enum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum RoomFilter {
    All,
    Unread,
    Groups,
}

#[derive(uniffi::Enum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnreadTone {
    Active,
    Muted,
}

#[derive(uniffi::Record, Clone, Debug)]
pub struct RoomSummary {
    pub room_id: String,
    pub title: String,
    pub is_group: bool,
    pub avatar_url: Option<String>,
    pub members: Vec<User>,
    pub is_pinned: bool,
    pub show_mute_badge: bool,
    pub unread_count: u32,
    pub unread_tone: UnreadTone,
    pub preview_text: Option<String>,
    pub last_message_at: i64,
}

#[derive(uniffi::Record, Clone, Debug)]
pub struct RoomViewState {
    pub room_id: String,
    pub title: String,
    pub is_group: bool,
    pub description: Option<String>,
    pub members: Vec<User>,
    pub messages: Vec<ChatMessage>,
    pub can_load_older: bool,
    pub loading_older: bool,
    pub selection: SelectionView,
    pub bulk_actions: BulkActions,
    pub reply_target: Option<ParentRef>,
    pub search: Option<SearchView>,
    pub typing_users: Vec<User>,
}

#[derive(uniffi::Record, Clone, Debug)]
pub struct ChatMessage {
    pub id: String,
    pub sender: User,
    pub sender_name: String,
    pub is_mine: bool,
    pub content: String,
    pub message_type: MessageType,
    pub created_at: i64,
    pub is_edited: bool,
    pub is_deleted: bool,
    pub is_forwarded: bool,
    pub parent: Option<ParentRef>,
    pub reactions: Vec<ReactionSummary>,
    pub delivery: MessageDeliveryState,
    pub receipt: ReceiptStatus,
    pub is_selected: bool,
}

#[derive(uniffi::Record, Clone, Debug, PartialEq, Eq)]
pub struct ReactionSummary {
    pub emoji: String,
    pub count: u32,
    pub user_names: Vec<String>,
    pub reacted_by_me: bool,
}

#[derive(uniffi::Enum, Clone, Debug, PartialEq, Eq)]
pub enum MessageDeliveryState {
    Pending,
    Sent,
    Failed,
}

#[derive(uniffi::Enum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum SelectionMode {
    Idle,
    Selecting,
}

#[derive(uniffi::Record, Clone, Debug, PartialEq, Eq)]
pub struct SelectionView {
    pub mode: SelectionMode,
    pub selected_ids: Vec<String>,
    /// Message the quick-reaction bar is anchored to, if shown.
    pub quick_reaction_for: Option<String>,
}

impl SelectionView {
    pub fn idle() -> Self {
        Self {
            mode: SelectionMode::Idle,
            selected_ids: vec![],
            quick_reaction_for: None,
        }
    }
}

#[derive(uniffi::Record, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BulkActions {
    pub delete_for_me: bool,
    pub delete_for_everyone: bool,
    pub reply: bool,
    pub react: bool,
    pub share: bool,
}

#[derive(uniffi::Record, Clone, Debug)]
pub struct SearchView {
    pub query: String,
    pub results: Vec<ChatMessage>,
    pub has_more: bool,
    pub loading: bool,
}

pub fn now_seconds() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

/// Groups a flat reaction list by emoji, in first-seen order. Recomputed on
/// every read; the stored list stays flat so each pair can be toggled.
pub fn group_reactions(reactions: &[Reaction], me: Option<&User>) -> Vec<ReactionSummary> {
    let mut out: Vec<ReactionSummary> = Vec::new();
    let mut seen: Vec<Vec<String>> = Vec::new();
    for r in reactions {
        let key = r.user.key();
        let mine = me.map(|m| r.user.matches(m)).unwrap_or(false);
        match out.iter().position(|s| s.emoji == r.emoji) {
            Some(idx) => {
                if !seen[idx].contains(&key) {
                    seen[idx].push(key);
                    out[idx].user_names.push(r.user.display_name());
                    out[idx].count += 1;
                }
                out[idx].reacted_by_me |= mine;
            }
            None => {
                seen.push(vec![key]);
                out.push(ReactionSummary {
                    emoji: r.emoji.clone(),
                    count: 1,
                    user_names: vec![r.user.display_name()],
                    reacted_by_me: mine,
                });
            }
        }
    }
    out
}
