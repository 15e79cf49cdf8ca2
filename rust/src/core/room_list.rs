// Room collection plus the derived, annotated room-list view.

use super::mute::is_effectively_muted;
use crate::model::{ChatRoom, LastMessage, RoomKind, User};
use crate::state::{RoomFilter, RoomSummary, UnreadTone};

const DELETED_PREVIEW: &str = "This message was deleted";

/// The authoritative room collection. Filters and ordering never mutate it.
#[derive(Debug, Default)]
pub struct RoomDirectory {
    rooms: Vec<ChatRoom>,
}

impl RoomDirectory {
    pub fn rooms(&self) -> &[ChatRoom] {
        &self.rooms
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }

    pub fn get(&self, room_id: &str) -> Option<&ChatRoom> {
        self.rooms.iter().find(|r| r.id == room_id)
    }

    pub fn get_mut(&mut self, room_id: &str) -> Option<&mut ChatRoom> {
        self.rooms.iter_mut().find(|r| r.id == room_id)
    }

    /// Inserts or replaces by id. Members are canonicalized on the way in.
    pub fn upsert(&mut self, mut room: ChatRoom) {
        room.canonicalize_members();
        match self.get_mut(&room.id) {
            Some(existing) => *existing = room,
            None => self.rooms.push(room),
        }
    }

    pub fn replace_all(&mut self, rooms: Vec<ChatRoom>) {
        self.rooms.clear();
        for room in rooms {
            self.upsert(room);
        }
    }

    pub fn remove(&mut self, room_id: &str) -> Option<ChatRoom> {
        let idx = self.rooms.iter().position(|r| r.id == room_id)?;
        Some(self.rooms.remove(idx))
    }

    pub fn clear(&mut self) {
        self.rooms.clear();
    }
}

/// Pinned rooms first, then newest activity first within each partition.
pub fn ordered<'a>(rooms: impl IntoIterator<Item = &'a ChatRoom>) -> Vec<&'a ChatRoom> {
    let mut out: Vec<&ChatRoom> = rooms.into_iter().collect();
    out.sort_by(|a, b| {
        b.is_pinned
            .cmp(&a.is_pinned)
            .then_with(|| b.last_message_at.cmp(&a.last_message_at))
            .then_with(|| a.id.cmp(&b.id))
    });
    out
}

pub fn passes_filter(room: &ChatRoom, filter: RoomFilter) -> bool {
    match filter {
        RoomFilter::All => true,
        RoomFilter::Unread => room.unread_count > 0,
        RoomFilter::Groups => room.kind == RoomKind::Group,
    }
}

pub fn aggregate(rooms: &[ChatRoom], filter: RoomFilter, me: &User, now: i64) -> Vec<RoomSummary> {
    ordered(rooms.iter().filter(|r| passes_filter(r, filter)))
        .into_iter()
        .map(|r| annotate(r, me, now))
        .collect()
}

pub fn annotate(room: &ChatRoom, me: &User, now: i64) -> RoomSummary {
    let show_mute_badge = is_effectively_muted(room, now);
    let members = room.member_users();
    let avatar_url = match room.kind {
        RoomKind::Group => None,
        RoomKind::Direct => members
            .iter()
            .find(|u| !u.matches(me))
            .and_then(|u| u.avatar_url.clone()),
    };
    RoomSummary {
        room_id: room.id.clone(),
        title: room.title(me),
        is_group: room.is_group(),
        avatar_url,
        members,
        is_pinned: room.is_pinned,
        show_mute_badge,
        unread_count: room.unread_count,
        unread_tone: if show_mute_badge {
            UnreadTone::Muted
        } else {
            UnreadTone::Active
        },
        preview_text: room
            .last_message
            .as_ref()
            .map(|m| preview_text(m, room.kind, me)),
        last_message_at: room.last_message_at,
    }
}

pub fn preview_text(last: &LastMessage, kind: RoomKind, me: &User) -> String {
    let body = if last.is_deleted {
        DELETED_PREVIEW.to_string()
    } else {
        match last.message_type.preview_label() {
            Some(label) => label.to_string(),
            None => last.content.lines().next().unwrap_or_default().to_string(),
        }
    };
    if last.sender.matches(me) {
        return format!("You: {body}");
    }
    match (kind, last.message_type.preview_label()) {
        (RoomKind::Group, _) | (RoomKind::Direct, Some(_)) => {
            format!("{}: {body}", last.sender.first_name.trim())
        }
        (RoomKind::Direct, None) => body,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{MessageType, UserRef};

    fn user(id: i64, name: &str) -> User {
        User {
            id: Some(id),
            employee_code: None,
            first_name: name.into(),
            last_name: None,
            avatar_url: Some(format!("https://cdn/{id}.png")),
        }
    }

    fn room(id: &str, kind: RoomKind, at: i64, pinned: bool) -> ChatRoom {
        ChatRoom {
            id: id.into(),
            kind,
            name: (kind == RoomKind::Group).then(|| format!("Group {id}")),
            description: None,
            members: vec![
                UserRef::Direct(user(1, "Me")),
                UserRef::Wrapped { user: user(2, "Kiran") },
            ],
            last_message_at: at,
            is_pinned: pinned,
            is_muted: false,
            muted_until: None,
            unread_count: 0,
            last_message: None,
        }
    }

    fn last(sender: User, ty: MessageType, content: &str) -> LastMessage {
        LastMessage {
            message_id: "m".into(),
            sender,
            content: content.into(),
            message_type: ty,
            created_at: 0,
            is_deleted: false,
        }
    }

    #[test]
    fn pinned_rooms_precede_unpinned_regardless_of_recency() {
        let rooms = vec![
            room("a", RoomKind::Direct, 500, false),
            room("b", RoomKind::Direct, 100, true),
            room("c", RoomKind::Group, 900, false),
            room("d", RoomKind::Group, 300, true),
        ];
        let ids: Vec<&str> = ordered(&rooms).iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["d", "b", "c", "a"]);
    }

    #[test]
    fn ordering_holds_for_generated_sets() {
        let mut rooms = Vec::new();
        for i in 0..40i64 {
            let at = (i * 7919) % 101;
            rooms.push(room(&format!("r{i}"), RoomKind::Direct, at, i % 3 == 0));
        }
        let out = ordered(&rooms);
        let first_unpinned = out.iter().position(|r| !r.is_pinned).unwrap();
        assert!(out[first_unpinned..].iter().all(|r| !r.is_pinned));
        for pair in out[..first_unpinned].windows(2) {
            assert!(pair[0].last_message_at >= pair[1].last_message_at);
        }
        for pair in out[first_unpinned..].windows(2) {
            assert!(pair[0].last_message_at >= pair[1].last_message_at);
        }
    }

    #[test]
    fn muted_room_keeps_unread_but_tones_it_down() {
        let me = user(1, "Me");
        let mut r = room("a", RoomKind::Direct, 10, false);
        r.is_muted = true;
        r.muted_until = Some(2_000);
        r.unread_count = 4;

        let s = annotate(&r, &me, 1_000);
        assert!(s.show_mute_badge);
        assert_eq!(s.unread_tone, UnreadTone::Muted);
        assert_eq!(s.unread_count, 4);

        let later = annotate(&r, &me, 2_000);
        assert!(!later.show_mute_badge);
        assert_eq!(later.unread_tone, UnreadTone::Active);
    }

    #[test]
    fn filters_are_views() {
        let me = user(1, "Me");
        let mut unread = room("u", RoomKind::Direct, 5, false);
        unread.unread_count = 2;
        let rooms = vec![unread, room("g", RoomKind::Group, 6, false)];

        let only_unread = aggregate(&rooms, RoomFilter::Unread, &me, 0);
        assert_eq!(only_unread.len(), 1);
        assert_eq!(only_unread[0].room_id, "u");

        let groups = aggregate(&rooms, RoomFilter::Groups, &me, 0);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].room_id, "g");

        assert_eq!(aggregate(&rooms, RoomFilter::All, &me, 0).len(), 2);
        assert_eq!(rooms.len(), 2);
    }

    #[test]
    fn direct_room_title_and_avatar_come_from_peer() {
        let me = user(1, "Me");
        let s = annotate(&room("a", RoomKind::Direct, 0, false), &me, 0);
        assert_eq!(s.title, "Kiran");
        assert_eq!(s.avatar_url.as_deref(), Some("https://cdn/2.png"));
    }

    #[test]
    fn previews_label_non_text_types() {
        let me = user(1, "Me");
        let kiran = user(2, "Kiran");
        assert_eq!(
            preview_text(&last(kiran.clone(), MessageType::Image, "x.jpg"), RoomKind::Group, &me),
            "Kiran: [Photo]"
        );
        assert_eq!(
            preview_text(&last(kiran.clone(), MessageType::Text, "see you\nlater"), RoomKind::Direct, &me),
            "see you"
        );
        assert_eq!(
            preview_text(&last(me.clone(), MessageType::File, "a.pdf"), RoomKind::Direct, &me),
            "You: [File]"
        );
        let mut deleted = last(kiran, MessageType::Text, "");
        deleted.is_deleted = true;
        assert_eq!(
            preview_text(&deleted, RoomKind::Group, &me),
            "Kiran: This message was deleted"
        );
    }

    #[test]
    fn upsert_canonicalizes_members() {
        let mut dir = RoomDirectory::default();
        dir.upsert(room("a", RoomKind::Group, 0, false));
        assert!(dir
            .get("a")
            .unwrap()
            .members
            .iter()
            .all(|m| matches!(m, UserRef::Direct(_))));
    }
}
