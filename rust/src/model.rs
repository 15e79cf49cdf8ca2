//! Domain records shared with the platform layer.
//!
//! These are the shapes the backend speaks. The engine never mutates a `User`;
//! rooms and messages are mutated in place by the conversation controller.

#[derive(uniffi::Record, Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct User {
    pub id: Option<i64>,
    pub employee_code: Option<String>,
    pub first_name: String,
    pub last_name: Option<String>,
    pub avatar_url: Option<String>,
}

impl User {
    /// Canonical comparison key. Numeric ids win over employee codes.
    pub fn key(&self) -> String {
        if let Some(id) = self.id {
            return format!("id:{id}");
        }
        match self.employee_code.as_deref().map(normalize_employee_code) {
            Some(code) if !code.is_empty() => format!("code:{code}"),
            _ => format!("name:{}", self.display_name().to_lowercase()),
        }
    }

    /// Two users are the same person when any key they both carry agrees.
    pub fn matches(&self, other: &User) -> bool {
        if let (Some(a), Some(b)) = (self.id, other.id) {
            return a == b;
        }
        match (
            self.employee_code.as_deref().map(normalize_employee_code),
            other.employee_code.as_deref().map(normalize_employee_code),
        ) {
            (Some(a), Some(b)) if !a.is_empty() => a == b,
            _ => self.key() == other.key(),
        }
    }

    pub fn display_name(&self) -> String {
        match self.last_name.as_deref().map(str::trim) {
            Some(last) if !last.is_empty() => format!("{} {}", self.first_name.trim(), last),
            _ => self.first_name.trim().to_string(),
        }
    }
}

impl PartialEq for User {
    fn eq(&self, other: &Self) -> bool {
        self.matches(other)
    }
}

pub fn normalize_employee_code(code: &str) -> String {
    code.trim().to_ascii_uppercase()
}

/// Group members arrive either bare or wrapped in a membership record.
#[derive(uniffi::Enum, Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(untagged)]
pub enum UserRef {
    Wrapped { user: User },
    Direct(User),
}

impl UserRef {
    pub fn into_user(self) -> User {
        match self {
            UserRef::Direct(user) => user,
            UserRef::Wrapped { user } => user,
        }
    }
}

#[derive(uniffi::Enum, Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoomKind {
    Direct,
    Group,
}

#[derive(uniffi::Enum, Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    Text,
    Image,
    File,
    Audio,
    Video,
}

impl MessageType {
    /// Placeholder shown instead of raw content in previews.
    pub fn preview_label(&self) -> Option<&'static str> {
        match self {
            MessageType::Text => None,
            MessageType::Image => Some("[Photo]"),
            MessageType::File => Some("[File]"),
            MessageType::Audio => Some("[Audio]"),
            MessageType::Video => Some("[Video]"),
        }
    }
}

#[derive(
    uniffi::Enum, Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, serde::Serialize,
    serde::Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum ReceiptStatus {
    #[default]
    None,
    Delivered,
    Read,
}

/// Shallow reply reference: who said it and a truncated excerpt.
#[derive(uniffi::Record, Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ParentRef {
    pub message_id: String,
    pub sender: User,
    pub excerpt: String,
    pub message_type: MessageType,
}

const PARENT_EXCERPT_CHARS: usize = 80;

impl ParentRef {
    pub fn of(message: &Message) -> Self {
        Self {
            message_id: message.id.clone(),
            sender: message.sender.clone(),
            excerpt: message.content.chars().take(PARENT_EXCERPT_CHARS).collect(),
            message_type: message.message_type,
        }
    }
}

#[derive(uniffi::Record, Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Reaction {
    pub user: User,
    pub emoji: String,
}

#[derive(uniffi::Record, Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Message {
    pub id: String,
    pub room_id: String,
    pub sender: User,
    pub content: String,
    pub message_type: MessageType,
    pub created_at: i64,
    pub is_edited: bool,
    pub is_deleted: bool,
    pub is_forwarded: bool,
    pub parent: Option<ParentRef>,
    pub reactions: Vec<Reaction>,
    #[serde(default)]
    pub receipt: ReceiptStatus,
}

impl Message {
    /// Soft delete: keeps id, position and timestamp, drops everything renderable.
    pub fn mark_deleted(&mut self) {
        self.is_deleted = true;
        self.content.clear();
        self.reactions.clear();
        self.parent = None;
    }

    pub fn has_reaction(&self, user: &User, emoji: &str) -> bool {
        self.reactions
            .iter()
            .any(|r| r.emoji == emoji && r.user.matches(user))
    }

    /// Adds or removes `(user, emoji)`. Returns `true` when the pair was added.
    pub fn toggle_reaction(&mut self, user: &User, emoji: &str) -> bool {
        if self.has_reaction(user, emoji) {
            self.reactions
                .retain(|r| !(r.emoji == emoji && r.user.matches(user)));
            false
        } else {
            self.reactions.push(Reaction {
                user: user.clone(),
                emoji: emoji.to_string(),
            });
            true
        }
    }
}

/// Denormalized preview of a room's newest message.
#[derive(uniffi::Record, Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct LastMessage {
    pub message_id: String,
    pub sender: User,
    pub content: String,
    pub message_type: MessageType,
    pub created_at: i64,
    pub is_deleted: bool,
}

impl LastMessage {
    pub fn of(message: &Message) -> Self {
        Self {
            message_id: message.id.clone(),
            sender: message.sender.clone(),
            content: message.content.clone(),
            message_type: message.message_type,
            created_at: message.created_at,
            is_deleted: message.is_deleted,
        }
    }
}

#[derive(uniffi::Record, Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ChatRoom {
    pub id: String,
    pub kind: RoomKind,
    pub name: Option<String>,
    pub description: Option<String>,
    pub members: Vec<UserRef>,
    pub last_message_at: i64,
    pub is_pinned: bool,
    pub is_muted: bool,
    pub muted_until: Option<i64>,
    pub unread_count: u32,
    pub last_message: Option<LastMessage>,
}

impl ChatRoom {
    /// Replaces every member with its canonical `UserRef::Direct` form.
    pub fn canonicalize_members(&mut self) {
        let members = std::mem::take(&mut self.members);
        self.members = members
            .into_iter()
            .map(|m| UserRef::Direct(m.into_user()))
            .collect();
    }

    pub fn member_users(&self) -> Vec<User> {
        self.members.iter().cloned().map(UserRef::into_user).collect()
    }

    pub fn is_group(&self) -> bool {
        self.kind == RoomKind::Group
    }

    /// Group name, or the other participant's name for direct rooms.
    pub fn title(&self, me: &User) -> String {
        if let Some(name) = self.name.as_deref().filter(|n| !n.trim().is_empty()) {
            return name.to_string();
        }
        self.member_users()
            .into_iter()
            .find(|u| !u.matches(me))
            .map(|u| u.display_name())
            .unwrap_or_else(|| me.display_name())
    }

    /// Applies a newly arrived message to the denormalized preview fields.
    pub fn apply_new_message(&mut self, message: &Message) {
        if message.created_at >= self.last_message_at || self.last_message.is_none() {
            self.last_message_at = message.created_at;
            self.last_message = Some(LastMessage::of(message));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(id: Option<i64>, code: Option<&str>, name: &str) -> User {
        User {
            id,
            employee_code: code.map(str::to_string),
            first_name: name.to_string(),
            last_name: None,
            avatar_url: None,
        }
    }

    #[test]
    fn user_key_prefers_numeric_id() {
        assert_eq!(user(Some(7), Some("e-1"), "A").key(), "id:7");
        assert_eq!(user(None, Some(" e-1 "), "A").key(), "code:E-1");
    }

    #[test]
    fn users_match_on_either_key() {
        let a = user(Some(7), None, "Asha");
        let b = user(Some(7), Some("EMP9"), "Asha K");
        assert!(a.matches(&b));

        let c = user(None, Some("emp9"), "Asha");
        let d = user(Some(12), Some("EMP9"), "Asha");
        assert!(c.matches(&d));

        assert!(!user(Some(1), None, "x").matches(&user(Some(2), None, "x")));
    }

    #[test]
    fn wrapped_and_direct_members_canonicalize_to_same_user() {
        let raw = serde_json::json!([
            { "id": 1, "employee_code": null, "first_name": "Ravi", "last_name": null, "avatar_url": null },
            { "user": { "id": 2, "employee_code": "E2", "first_name": "Meena", "last_name": "S", "avatar_url": null } }
        ]);
        let refs: Vec<UserRef> = serde_json::from_value(raw).unwrap();
        let users: Vec<User> = refs.into_iter().map(UserRef::into_user).collect();
        assert_eq!(users[0].id, Some(1));
        assert_eq!(users[1].id, Some(2));
        assert_eq!(users[1].display_name(), "Meena S");
    }

    #[test]
    fn toggle_reaction_adds_then_removes_only_own_pair() {
        let me = user(Some(1), None, "Me");
        let other = user(Some(2), None, "Other");
        let mut msg = Message {
            id: "m1".into(),
            room_id: "r".into(),
            sender: other.clone(),
            content: "hi".into(),
            message_type: MessageType::Text,
            created_at: 0,
            is_edited: false,
            is_deleted: false,
            is_forwarded: false,
            parent: None,
            reactions: vec![Reaction {
                user: other.clone(),
                emoji: "👍".into(),
            }],
            receipt: ReceiptStatus::None,
        };
        assert!(msg.toggle_reaction(&me, "👍"));
        assert_eq!(msg.reactions.len(), 2);
        assert!(!msg.toggle_reaction(&me, "👍"));
        assert_eq!(msg.reactions.len(), 1);
        assert!(msg.has_reaction(&other, "👍"));
    }
}
