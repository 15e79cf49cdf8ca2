// Session-scoped conversation engine. Owns the hot cache, the room directory and
// everything tied to the open room. Pure and synchronous: callers pass `now`,
// and anything asynchronous comes back out as an `Effect`.

use std::collections::{HashMap, HashSet};

use super::config::EngineLimits;
use super::effects::{Completion, Effect, Request, Timer};
use super::message_cache::{promote_in, CachedMessage, MessageCache};
use super::mute::{resolve_mute_expiry, MuteDuration};
use super::pagination::{MarkerCursor, TokenSource};
use super::room_list::{self, RoomDirectory};
use super::search::SearchController;
use super::selection::{bulk_actions, check_delete_for_everyone, Selection};
use super::typing::{TypingCoordinator, TypingSignal};
use crate::backend::{LiveEvent, OutgoingMessage};
use crate::error::{CoreError, CoreResult, PolicyViolation};
use crate::model::{ChatRoom, LastMessage, Message, MessageType, ParentRef, RoomKind, User};
use crate::state::{
    group_reactions, AppState, BusyState, ChatMessage, MessageDeliveryState, RoomFilter,
    RoomViewState, SearchView,
};

pub const LOCAL_ID_PREFIX: &str = "local-";

/// Operations that await the backend before mutating, keyed by target so a
/// second invocation while one is in flight is dropped.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum OpKey {
    Mute(String),
    Pin(String),
    DeleteForEveryone(String, String),
}

struct OpenRoom {
    room_id: String,
    context: u64,
    /// Scroll-back pages followed by the hot window, chronological.
    timeline: Vec<CachedMessage>,
    history: MarkerCursor,
    selection: Selection,
    reply_target: Option<ParentRef>,
    search: Option<SearchController>,
}

impl OpenRoom {
    fn find(&self, message_id: &str) -> Option<&CachedMessage> {
        self.timeline.iter().find(|m| m.id() == message_id)
    }
}

pub struct ConversationController {
    me: User,
    limits: EngineLimits,
    cache: MessageCache,
    rooms: RoomDirectory,
    room_cursor: MarkerCursor,
    filter: RoomFilter,
    tokens: TokenSource,
    open: Option<OpenRoom>,
    typing: TypingCoordinator,
    typing_users: HashMap<String, Vec<User>>,
    in_flight: HashSet<OpKey>,
    creating_room: bool,
    updating_members: bool,
}

impl ConversationController {
    pub fn new(me: User, limits: EngineLimits) -> Self {
        Self {
            me,
            cache: MessageCache::new(limits.cache_room_capacity, limits.cache_window_size),
            limits,
            rooms: RoomDirectory::default(),
            room_cursor: MarkerCursor::default(),
            filter: RoomFilter::All,
            tokens: TokenSource::default(),
            open: None,
            typing: TypingCoordinator::default(),
            typing_users: HashMap::new(),
            in_flight: HashSet::new(),
            creating_room: false,
            updating_members: false,
        }
    }

    pub fn me(&self) -> &User {
        &self.me
    }

    pub fn cache(&self) -> &MessageCache {
        &self.cache
    }

    pub fn rooms(&self) -> &RoomDirectory {
        &self.rooms
    }

    pub fn open_room_id(&self) -> Option<&str> {
        self.open.as_ref().map(|o| o.room_id.as_str())
    }

    /// Rendered sequence of the open room (empty when none is open).
    pub fn timeline(&self) -> &[CachedMessage] {
        self.open.as_ref().map(|o| o.timeline.as_slice()).unwrap_or(&[])
    }

    fn open_mut(&mut self, room_id: &str) -> Option<&mut OpenRoom> {
        self.open.as_mut().filter(|o| o.room_id == room_id)
    }

    fn active(&mut self) -> CoreResult<&mut OpenRoom> {
        self.open
            .as_mut()
            .ok_or_else(|| PolicyViolation::NoActiveRoom.into())
    }

    fn find_message(&self, room_id: &str, message_id: &str) -> Option<&CachedMessage> {
        match self.open.as_ref().filter(|o| o.room_id == room_id) {
            Some(open) => open.find(message_id),
            None => self.cache.find(room_id, message_id),
        }
    }

    // Room list

    pub fn set_filter(&mut self, filter: RoomFilter) {
        self.filter = filter;
    }

    /// Reloads the room list from the first page. A page already in flight is
    /// superseded.
    pub fn refresh_rooms(&mut self) -> Vec<Effect> {
        self.room_cursor.reset(None, true);
        self.next_room_page()
    }

    pub fn load_more_rooms(&mut self) -> Vec<Effect> {
        if self.room_cursor.marker().is_none() {
            return vec![];
        }
        self.next_room_page()
    }

    fn next_room_page(&mut self) -> Vec<Effect> {
        let token = self.tokens.next();
        match self.room_cursor.begin(token) {
            Some(cursor) => vec![Effect::Request(Request::FetchRooms { token, cursor })],
            None => vec![],
        }
    }

    // Open room lifecycle

    pub fn open_room(&mut self, room_id: &str) -> Vec<Effect> {
        if self.open_room_id() == Some(room_id) {
            return vec![];
        }
        let mut effects = self.close_room();

        self.cache.touch(room_id);
        let timeline = match self.cache.lookup(room_id) {
            Ok(window) => window.to_vec(),
            Err(e) => {
                tracing::debug!(error = %e, "opening without cached window");
                vec![]
            }
        };
        let oldest_confirmed = timeline
            .iter()
            .find(|m| m.is_confirmed())
            .map(|m| m.id().to_string());
        let mut open = OpenRoom {
            room_id: room_id.to_string(),
            context: self.tokens.next(),
            history: MarkerCursor::new(oldest_confirmed.clone(), true),
            timeline,
            selection: Selection::default(),
            reply_target: None,
            search: None,
        };

        if oldest_confirmed.is_none() {
            tracing::debug!(%room_id, "room not cached, fetching latest page");
            let token = self.tokens.next();
            if let Some(before) = open.history.begin(token) {
                effects.push(Effect::Request(Request::FetchMessages {
                    token,
                    room_id: room_id.to_string(),
                    before,
                    limit: self.limits.history_page_size,
                }));
            }
        }
        self.open = Some(open);

        if let Some(room) = self.rooms.get_mut(room_id) {
            room.unread_count = 0;
        }
        effects.push(Effect::Request(Request::MarkRead {
            room_id: room_id.to_string(),
        }));
        effects
    }

    /// Leaves the open room. Room-scoped view state goes with it; the cache
    /// entry stays.
    pub fn close_room(&mut self) -> Vec<Effect> {
        let effects = self.stop_typing();
        if let Some(open) = self.open.take() {
            self.typing_users.remove(&open.room_id);
            tracing::debug!(room_id = %open.room_id, "closed room");
        }
        effects
    }

    pub fn load_older(&mut self) -> Vec<Effect> {
        let token = self.tokens.next();
        let limit = self.limits.history_page_size;
        let Some(open) = self.open.as_mut() else {
            return vec![];
        };
        match open.history.begin(token) {
            Some(before) => vec![Effect::Request(Request::FetchMessages {
                token,
                room_id: open.room_id.clone(),
                before,
                limit,
            })],
            None => vec![],
        }
    }

    // Sending

    pub fn send(
        &mut self,
        room_id: &str,
        content: &str,
        message_type: MessageType,
        now: i64,
    ) -> CoreResult<Vec<Effect>> {
        let content = content.trim();
        if content.is_empty() {
            return Err(PolicyViolation::EmptyMessage.into());
        }
        let me = self.me.clone();
        let open = self
            .open
            .as_mut()
            .filter(|o| o.room_id == room_id)
            .ok_or(PolicyViolation::NoActiveRoom)?;

        let local_id = format!("{LOCAL_ID_PREFIX}{}", uuid::Uuid::new_v4());
        let parent = open.reply_target.take();
        let payload = OutgoingMessage {
            content: content.to_string(),
            message_type,
            reply_to_id: parent.as_ref().map(|p| p.message_id.clone()),
            client_id: local_id.clone(),
        };
        let entry = CachedMessage::pending(Message {
            id: local_id.clone(),
            room_id: room_id.to_string(),
            sender: me,
            content: content.to_string(),
            message_type,
            created_at: now,
            is_edited: false,
            is_deleted: false,
            is_forwarded: false,
            parent,
            reactions: vec![],
            receipt: Default::default(),
        });
        open.timeline.push(entry.clone());
        self.cache_entry(room_id, entry);

        let mut effects = self.stop_typing();
        effects.push(Effect::Request(Request::Send {
            room_id: room_id.to_string(),
            local_id,
            payload,
        }));
        Ok(effects)
    }

    /// Resubmits a failed send, reusing its optimistic entry.
    pub fn retry(&mut self, message_id: &str) -> CoreResult<Vec<Effect>> {
        let open = self.active()?;
        let room_id = open.room_id.clone();
        let entry = open.find(message_id).ok_or(PolicyViolation::MessageNotFound)?;
        if entry.delivery != MessageDeliveryState::Failed {
            return Ok(vec![]);
        }
        let payload = OutgoingMessage {
            content: entry.message.content.clone(),
            message_type: entry.message.message_type,
            reply_to_id: entry.message.parent.as_ref().map(|p| p.message_id.clone()),
            client_id: message_id.to_string(),
        };
        self.set_delivery(&room_id, message_id, MessageDeliveryState::Pending);
        Ok(vec![Effect::Request(Request::Send {
            room_id,
            local_id: message_id.to_string(),
            payload,
        })])
    }

    /// Drops a failed send locally. Nothing reached the server, so nothing is sent.
    pub fn discard(&mut self, message_id: &str) -> CoreResult<()> {
        let open = self.active()?;
        let room_id = open.room_id.clone();
        let entry = open.find(message_id).ok_or(PolicyViolation::MessageNotFound)?;
        if entry.delivery != MessageDeliveryState::Failed {
            return Ok(());
        }
        self.remove_locally(&room_id, message_id);
        Ok(())
    }

    // Reactions

    pub fn toggle_reaction(
        &mut self,
        room_id: &str,
        message_id: &str,
        emoji: &str,
    ) -> CoreResult<Vec<Effect>> {
        let entry = self
            .find_message(room_id, message_id)
            .ok_or(PolicyViolation::MessageNotFound)?;
        if entry.message.is_deleted {
            return Err(PolicyViolation::MessageDeleted.into());
        }
        if !entry.is_confirmed() {
            return Err(PolicyViolation::MessageNotConfirmed.into());
        }
        let add = !entry.message.has_reaction(&self.me, emoji);
        let me = self.me.clone();
        self.set_reaction(room_id, message_id, &me, emoji, add);
        Ok(vec![Effect::Request(Request::React {
            room_id: room_id.to_string(),
            message_id: message_id.to_string(),
            emoji: emoji.to_string(),
            add,
        })])
    }

    /// Quick-reaction bar: reacts to the single selected message and leaves
    /// selection mode.
    pub fn react_to_selection(&mut self, emoji: &str) -> CoreResult<Vec<Effect>> {
        let (room_id, message_id) = self.single_selected()?;
        let effects = self.toggle_reaction(&room_id, &message_id, emoji)?;
        self.clear_selection();
        Ok(effects)
    }

    fn set_reaction(&mut self, room_id: &str, message_id: &str, user: &User, emoji: &str, add: bool) {
        self.update_everywhere(room_id, message_id, |m| {
            if m.has_reaction(user, emoji) != add {
                m.toggle_reaction(user, emoji);
            }
        });
    }

    // Deletion

    /// Local-only removal. Unconfirmed entries never reached the server and are
    /// not forwarded.
    pub fn delete_for_me(&mut self, room_id: &str, message_ids: Vec<String>) -> CoreResult<Vec<Effect>> {
        if message_ids.is_empty() {
            return Err(PolicyViolation::EmptySelection.into());
        }
        let mut forward = Vec::with_capacity(message_ids.len());
        for id in &message_ids {
            let entry = self
                .find_message(room_id, id)
                .ok_or(PolicyViolation::MessageNotFound)?;
            if entry.is_confirmed() {
                forward.push(id.clone());
            }
        }
        for id in &message_ids {
            self.remove_locally(room_id, id);
        }
        if forward.is_empty() {
            return Ok(vec![]);
        }
        Ok(vec![Effect::Request(Request::DeleteForMe {
            room_id: room_id.to_string(),
            message_ids: forward,
        })])
    }

    /// Checks every message against the window before anything is sent. The
    /// deletion marker is applied once the backend confirms.
    pub fn delete_for_everyone(
        &mut self,
        room_id: &str,
        message_ids: Vec<String>,
        now: i64,
    ) -> CoreResult<Vec<Effect>> {
        if message_ids.is_empty() {
            return Err(PolicyViolation::EmptySelection.into());
        }
        for id in &message_ids {
            let entry = self
                .find_message(room_id, id)
                .ok_or(PolicyViolation::MessageNotFound)?;
            check_delete_for_everyone(entry, now, self.limits.delete_for_everyone_window_secs)?;
        }
        let keys: Vec<OpKey> = message_ids
            .iter()
            .map(|id| OpKey::DeleteForEveryone(room_id.to_string(), id.clone()))
            .collect();
        if keys.iter().any(|k| self.in_flight.contains(k)) {
            tracing::debug!(%room_id, "delete for everyone already in flight");
            return Ok(vec![]);
        }
        self.in_flight.extend(keys);
        Ok(vec![Effect::Request(Request::DeleteForEveryone {
            room_id: room_id.to_string(),
            message_ids,
        })])
    }

    pub fn delete_selected_for_me(&mut self) -> CoreResult<Vec<Effect>> {
        let open = self.active()?;
        let (room_id, ids) = (open.room_id.clone(), open.selection.ids().to_vec());
        let effects = self.delete_for_me(&room_id, ids)?;
        self.clear_selection();
        Ok(effects)
    }

    /// On a policy failure the selection is kept so the user can adjust it.
    pub fn delete_selected_for_everyone(&mut self, now: i64) -> CoreResult<Vec<Effect>> {
        let open = self.active()?;
        let (room_id, ids) = (open.room_id.clone(), open.selection.ids().to_vec());
        let effects = self.delete_for_everyone(&room_id, ids, now)?;
        self.clear_selection();
        Ok(effects)
    }

    // Selection and reply

    pub fn long_press(&mut self, message_id: &str) -> CoreResult<()> {
        let open = self.active()?;
        let entry = open
            .timeline
            .iter()
            .find(|m| m.id() == message_id)
            .ok_or(PolicyViolation::MessageNotFound)?;
        open.selection.long_press(entry)?;
        Ok(())
    }

    pub fn tap(&mut self, message_id: &str) -> CoreResult<()> {
        let open = self.active()?;
        let entry = open
            .timeline
            .iter()
            .find(|m| m.id() == message_id)
            .ok_or(PolicyViolation::MessageNotFound)?;
        open.selection.tap(entry)?;
        Ok(())
    }

    pub fn clear_selection(&mut self) {
        if let Some(open) = self.open.as_mut() {
            open.selection.clear();
        }
    }

    pub fn dismiss_quick_reaction(&mut self) {
        if let Some(open) = self.open.as_mut() {
            open.selection.dismiss_quick_reaction();
        }
    }

    pub fn set_reply_target(&mut self, message_id: &str) -> CoreResult<()> {
        let open = self.active()?;
        let entry = open.find(message_id).ok_or(PolicyViolation::MessageNotFound)?;
        if entry.message.is_deleted {
            return Err(PolicyViolation::MessageDeleted.into());
        }
        if !entry.is_confirmed() {
            return Err(PolicyViolation::MessageNotConfirmed.into());
        }
        open.reply_target = Some(ParentRef::of(&entry.message));
        Ok(())
    }

    pub fn reply_to_selection(&mut self) -> CoreResult<()> {
        let (_, message_id) = self.single_selected()?;
        self.set_reply_target(&message_id)?;
        self.clear_selection();
        Ok(())
    }

    pub fn clear_reply_target(&mut self) {
        if let Some(open) = self.open.as_mut() {
            open.reply_target = None;
        }
    }

    fn single_selected(&mut self) -> CoreResult<(String, String)> {
        let open = self.active()?;
        match open.selection.ids() {
            [] => Err(PolicyViolation::EmptySelection.into()),
            [id] => Ok((open.room_id.clone(), id.clone())),
            _ => Err(PolicyViolation::SelectionTooLarge.into()),
        }
    }

    // Typing

    pub fn composer_input(&mut self) -> Vec<Effect> {
        let Some(room_id) = self.open_room_id().map(str::to_string) else {
            return vec![];
        };
        let input = self.typing.on_input(&room_id);
        let mut effects: Vec<Effect> = input.signals.into_iter().map(typing_request).collect();
        effects.push(Effect::Schedule {
            timer: Timer::TypingIdle {
                generation: input.timer_generation,
            },
            after: self.limits.typing_idle,
        });
        effects
    }

    fn stop_typing(&mut self) -> Vec<Effect> {
        self.typing.stop().map(typing_request).into_iter().collect()
    }

    // Search

    pub fn search_query_changed(&mut self, query: &str) -> Vec<Effect> {
        let page_size = self.limits.search_page_size;
        let debounce = self.limits.search_debounce;
        let Some(open) = self.open.as_mut() else {
            return vec![];
        };
        let search = open
            .search
            .get_or_insert_with(|| SearchController::new(page_size));
        match search.on_query_changed(query) {
            Some(generation) => vec![Effect::Schedule {
                timer: Timer::SearchDebounce {
                    context: open.context,
                    generation,
                },
                after: debounce,
            }],
            None => vec![],
        }
    }

    pub fn search_load_more(&mut self) -> Vec<Effect> {
        let token = self.tokens.next();
        let Some(open) = self.open.as_mut() else {
            return vec![];
        };
        let Some(page) = open.search.as_mut().and_then(|s| s.load_more(token)) else {
            return vec![];
        };
        vec![Effect::Request(Request::Search {
            room_id: open.room_id.clone(),
            page,
        })]
    }

    /// Closing drops the controller, so any page still in flight becomes stale.
    pub fn close_search(&mut self) {
        if let Some(open) = self.open.as_mut() {
            open.search = None;
        }
    }

    pub fn on_timer(&mut self, timer: Timer) -> Vec<Effect> {
        match timer {
            Timer::TypingIdle { generation } => self
                .typing
                .on_timer(generation)
                .map(typing_request)
                .into_iter()
                .collect(),
            Timer::SearchDebounce {
                context,
                generation,
            } => {
                let token = self.tokens.next();
                let Some(open) = self.open.as_mut().filter(|o| o.context == context) else {
                    return vec![];
                };
                let Some(page) = open
                    .search
                    .as_mut()
                    .and_then(|s| s.on_debounce_fired(generation, token))
                else {
                    return vec![];
                };
                tracing::debug!(room_id = %open.room_id, offset = page.offset, "search dispatch");
                vec![Effect::Request(Request::Search {
                    room_id: open.room_id.clone(),
                    page,
                })]
            }
        }
    }

    // Room settings

    pub fn mute(&mut self, room_id: &str, choice: MuteDuration, now: i64) -> Vec<Effect> {
        if !self.begin_op(OpKey::Mute(room_id.to_string())) {
            return vec![];
        }
        vec![Effect::Request(Request::SetMute {
            room_id: room_id.to_string(),
            muted_until: resolve_mute_expiry(choice, now),
        })]
    }

    pub fn unmute(&mut self, room_id: &str) -> Vec<Effect> {
        if !self.begin_op(OpKey::Mute(room_id.to_string())) {
            return vec![];
        }
        vec![Effect::Request(Request::Unmute {
            room_id: room_id.to_string(),
        })]
    }

    pub fn set_pinned(&mut self, room_id: &str, pinned: bool) -> Vec<Effect> {
        if !self.begin_op(OpKey::Pin(room_id.to_string())) {
            return vec![];
        }
        vec![Effect::Request(Request::SetPinned {
            room_id: room_id.to_string(),
            pinned,
        })]
    }

    fn begin_op(&mut self, key: OpKey) -> bool {
        if !self.in_flight.insert(key.clone()) {
            tracing::debug!(?key, "operation already in flight");
            return false;
        }
        true
    }

    // Room creation and membership

    /// Opens the existing direct room with `peer` when there is one.
    pub fn create_room(&mut self, peer: User) -> Vec<Effect> {
        let existing = self
            .rooms
            .rooms()
            .iter()
            .find(|r| {
                r.kind == RoomKind::Direct && r.member_users().iter().any(|u| u.matches(&peer))
            })
            .map(|r| r.id.clone());
        if let Some(room_id) = existing {
            return self.open_room(&room_id);
        }
        if self.creating_room {
            return vec![];
        }
        self.creating_room = true;
        vec![Effect::Request(Request::CreateRoom { peer })]
    }

    pub fn create_group(
        &mut self,
        name: &str,
        description: Option<String>,
        members: Vec<User>,
    ) -> CoreResult<Vec<Effect>> {
        if members.is_empty() {
            return Err(PolicyViolation::NoMembersSelected.into());
        }
        let name = name.trim();
        if name.is_empty() {
            return Err(PolicyViolation::EmptyGroupName.into());
        }
        if self.creating_room {
            return Ok(vec![]);
        }
        self.creating_room = true;
        Ok(vec![Effect::Request(Request::CreateGroup {
            name: name.to_string(),
            description: description
                .map(|d| d.trim().to_string())
                .filter(|d| !d.is_empty()),
            members,
        })])
    }

    pub fn add_members(&mut self, room_id: &str, members: Vec<User>) -> CoreResult<Vec<Effect>> {
        if members.is_empty() {
            return Err(PolicyViolation::NoMembersSelected.into());
        }
        let current = self
            .rooms
            .get(room_id)
            .map(ChatRoom::member_users)
            .unwrap_or_default();
        let new_members: Vec<User> = members
            .into_iter()
            .filter(|m| !current.iter().any(|c| c.matches(m)))
            .collect();
        if new_members.is_empty() || self.updating_members {
            return Ok(vec![]);
        }
        self.updating_members = true;
        Ok(vec![Effect::Request(Request::AddMembers {
            room_id: room_id.to_string(),
            members: new_members,
        })])
    }

    // Live events

    /// Applies one realtime event. Events for a room are applied in arrival order.
    pub fn receive(&mut self, event: LiveEvent) -> Vec<Effect> {
        match event {
            LiveEvent::NewMessage { message } => return self.receive_message(message),
            LiveEvent::MessageEdited {
                room_id,
                message_id,
                content,
            } => {
                self.update_everywhere(&room_id, &message_id, |m| {
                    if !m.is_deleted {
                        m.content = content.clone();
                        m.is_edited = true;
                    }
                });
                if let Some(last) = self
                    .rooms
                    .get_mut(&room_id)
                    .and_then(|r| r.last_message.as_mut())
                    .filter(|l| l.message_id == message_id && !l.is_deleted)
                {
                    last.content = content;
                }
            }
            LiveEvent::MessageDeleted {
                room_id,
                message_id,
            } => self.apply_remote_delete(&room_id, &message_id),
            LiveEvent::ReactionChanged {
                room_id,
                message_id,
                reactions,
            } => {
                self.update_everywhere(&room_id, &message_id, |m| {
                    if !m.is_deleted {
                        m.reactions = reactions.clone();
                    }
                });
            }
            LiveEvent::Receipt {
                room_id,
                message_id,
                status,
            } => {
                self.update_everywhere(&room_id, &message_id, |m| {
                    m.receipt = m.receipt.max(status);
                });
            }
            LiveEvent::Typing {
                room_id,
                user,
                is_typing,
            } => {
                // Only the open room renders typing users.
                if user.matches(&self.me) || self.open_room_id() != Some(room_id.as_str()) {
                    return vec![];
                }
                let users = self.typing_users.entry(room_id).or_default();
                users.retain(|u| !u.matches(&user));
                if is_typing {
                    users.push(user);
                }
            }
            LiveEvent::RoomUpdated { mut room } => {
                if self.open_room_id() == Some(room.id.as_str()) {
                    room.unread_count = 0;
                }
                self.rooms.upsert(room);
            }
        }
        vec![]
    }

    fn receive_message(&mut self, message: Message) -> Vec<Effect> {
        let room_id = message.room_id.clone();
        let known = self.find_message(&room_id, &message.id).is_some()
            || self
                .rooms
                .get(&room_id)
                .and_then(|r| r.last_message.as_ref())
                .is_some_and(|l| l.message_id == message.id);
        let from_me = message.sender.matches(&self.me);

        if let Some(users) = self.typing_users.get_mut(&room_id) {
            users.retain(|u| !u.matches(&message.sender));
        }
        let is_open = match self.open_mut(&room_id) {
            Some(open) => {
                upsert_in(&mut open.timeline, CachedMessage::confirmed(message.clone()));
                true
            }
            None => false,
        };
        self.cache_entry(&room_id, CachedMessage::confirmed(message.clone()));

        let Some(room) = self.rooms.get_mut(&room_id) else {
            tracing::debug!(%room_id, "message for unknown room");
            return vec![];
        };
        room.apply_new_message(&message);
        if known || from_me {
            return vec![];
        }
        if is_open {
            return vec![Effect::Request(Request::MarkRead { room_id })];
        }
        room.unread_count = room.unread_count.saturating_add(1);
        vec![]
    }

    // Completions

    /// Applies a backend result. `Err(Stale)` means the result was dropped;
    /// `Err(Transport)` means local state was settled and the user should be told.
    pub fn complete(&mut self, completion: Completion) -> CoreResult<Vec<Effect>> {
        match completion {
            Completion::Rooms {
                token,
                cursor,
                result,
            } => self.on_room_page(token, cursor.is_none(), result),
            Completion::Messages {
                token,
                room_id,
                before,
                result,
            } => self.on_message_page(token, &room_id, before.is_none(), result),
            Completion::Search {
                token,
                room_id,
                query,
                result,
            } => {
                let search = self
                    .open_mut(&room_id)
                    .and_then(|o| o.search.as_mut())
                    .ok_or(CoreError::Stale)?;
                let applied = match result {
                    Ok(page) => search.on_page(token, &query, page.results, page.has_more),
                    Err(e) => {
                        if search.on_failure(token) {
                            return Err(e.into());
                        }
                        false
                    }
                };
                if applied {
                    Ok(vec![])
                } else {
                    Err(CoreError::Stale)
                }
            }
            Completion::Sent {
                room_id,
                local_id,
                result,
            } => match result {
                Ok(confirmed) => {
                    self.on_sent(&room_id, &local_id, confirmed);
                    Ok(vec![])
                }
                Err(e) => {
                    self.set_delivery(&room_id, &local_id, MessageDeliveryState::Failed);
                    Err(e.into())
                }
            },
            Completion::Reacted {
                room_id,
                message_id,
                emoji,
                add,
                result,
            } => {
                if let Err(e) = result {
                    let me = self.me.clone();
                    self.set_reaction(&room_id, &message_id, &me, &emoji, !add);
                    return Err(e.into());
                }
                Ok(vec![])
            }
            Completion::DeletedForMe { result, .. } => result.map(|_| vec![]).map_err(Into::into),
            Completion::DeletedForEveryone {
                room_id,
                message_ids,
                result,
            } => {
                for id in &message_ids {
                    self.in_flight
                        .remove(&OpKey::DeleteForEveryone(room_id.clone(), id.clone()));
                }
                result?;
                for id in &message_ids {
                    self.apply_remote_delete(&room_id, id);
                }
                Ok(vec![])
            }
            Completion::MuteSet {
                room_id,
                muted_until,
                result,
            } => {
                self.in_flight.remove(&OpKey::Mute(room_id.clone()));
                result?;
                if let Some(room) = self.rooms.get_mut(&room_id) {
                    room.is_muted = true;
                    room.muted_until = muted_until;
                }
                Ok(vec![])
            }
            Completion::Unmuted { room_id, result } => {
                self.in_flight.remove(&OpKey::Mute(room_id.clone()));
                result?;
                if let Some(room) = self.rooms.get_mut(&room_id) {
                    room.is_muted = false;
                    room.muted_until = None;
                }
                Ok(vec![])
            }
            Completion::PinSet {
                room_id,
                pinned,
                result,
            } => {
                self.in_flight.remove(&OpKey::Pin(room_id.clone()));
                result?;
                if let Some(room) = self.rooms.get_mut(&room_id) {
                    room.is_pinned = pinned;
                }
                Ok(vec![])
            }
            Completion::Acked {
                what,
                room_id,
                result,
            } => {
                if let Err(e) = result {
                    tracing::warn!(what, %room_id, error = %e, "acknowledgement failed");
                }
                Ok(vec![])
            }
            Completion::RoomCreated { result } => {
                self.creating_room = false;
                let room = result?;
                let room_id = room.id.clone();
                self.rooms.upsert(room);
                Ok(self.open_room(&room_id))
            }
            Completion::MembersAdded { room_id, result } => {
                self.updating_members = false;
                let mut room = result?;
                if room.id != room_id {
                    tracing::warn!(%room_id, returned = %room.id, "add members returned another room");
                }
                if self.open_room_id() == Some(room.id.as_str()) {
                    room.unread_count = 0;
                }
                self.rooms.upsert(room);
                Ok(vec![])
            }
        }
    }

    fn on_room_page(
        &mut self,
        token: u64,
        first_page: bool,
        result: Result<crate::backend::RoomPage, crate::backend::BackendError>,
    ) -> CoreResult<Vec<Effect>> {
        let page = match result {
            Ok(page) => page,
            Err(e) => {
                return Err(if self.room_cursor.fail(token) {
                    e.into()
                } else {
                    CoreError::Stale
                })
            }
        };
        if !self
            .room_cursor
            .complete(token, page.next_cursor.clone(), page.has_more)
        {
            return Err(CoreError::Stale);
        }
        if first_page {
            self.rooms.replace_all(page.rooms);
        } else {
            for room in page.rooms {
                self.rooms.upsert(room);
            }
        }
        if let Some(open) = &self.open {
            if let Some(room) = self.rooms.get_mut(&open.room_id) {
                room.unread_count = 0;
            }
        }
        Ok(vec![])
    }

    fn on_message_page(
        &mut self,
        token: u64,
        room_id: &str,
        latest: bool,
        result: Result<crate::backend::MessagePage, crate::backend::BackendError>,
    ) -> CoreResult<Vec<Effect>> {
        let open = self.open_mut(room_id).ok_or(CoreError::Stale)?;
        let page = match result {
            Ok(page) => page,
            Err(e) => {
                return Err(if open.history.fail(token) {
                    e.into()
                } else {
                    CoreError::Stale
                })
            }
        };
        let oldest = page.messages.first().map(|m| m.id.clone());
        let has_more = page.has_more && !page.messages.is_empty();
        if !open.history.complete(token, oldest, has_more) {
            return Err(CoreError::Stale);
        }

        let mut merged: Vec<CachedMessage> = page
            .messages
            .into_iter()
            .map(CachedMessage::confirmed)
            .collect();
        if latest {
            // Keep live arrivals and optimistic entries made while the page was loading.
            for existing in open.timeline.drain(..) {
                if !merged.iter().any(|m| m.id() == existing.id()) {
                    merged.push(existing);
                }
            }
            open.timeline = merged;
            let window = open.timeline.clone();
            if let Some(evicted) = self.cache.put(room_id, window) {
                tracing::debug!(%evicted, "room evicted from message cache");
            }
        } else {
            merged.retain(|m| !open.timeline.iter().any(|t| t.id() == m.id()));
            open.timeline.splice(0..0, merged);
        }
        Ok(vec![])
    }

    fn on_sent(&mut self, room_id: &str, local_id: &str, confirmed: Message) {
        self.cache.promote(room_id, local_id, confirmed.clone());
        if let Some(open) = self.open_mut(room_id) {
            promote_in(&mut open.timeline, local_id, confirmed.clone());
            open.selection.rename(local_id, &confirmed.id);
        }
        if let Some(room) = self.rooms.get_mut(room_id) {
            room.apply_new_message(&confirmed);
        }
    }

    // Shared mutation helpers

    /// Appends to the room's cached window. An open room whose first page
    /// never arrived has no window yet, so one is seeded from its timeline.
    fn cache_entry(&mut self, room_id: &str, entry: CachedMessage) {
        if self.cache.append(room_id, entry) {
            return;
        }
        let Some(open) = self.open.as_ref().filter(|o| o.room_id == room_id) else {
            return;
        };
        if let Some(evicted) = self.cache.put(room_id, open.timeline.clone()) {
            tracing::debug!(%evicted, "room evicted from message cache");
        }
    }

    /// Applies `f` to the message in the cache, the open timeline and the open
    /// search results, wherever it is present.
    fn update_everywhere(
        &mut self,
        room_id: &str,
        message_id: &str,
        mut f: impl FnMut(&mut Message),
    ) -> bool {
        let mut hit = self
            .cache
            .update_message(room_id, message_id, |e| f(&mut e.message));
        if let Some(open) = self.open.as_mut().filter(|o| o.room_id == room_id) {
            if let Some(entry) = open.timeline.iter_mut().find(|m| m.id() == message_id) {
                f(&mut entry.message);
                hit = true;
            }
            if let Some(search) = open.search.as_mut() {
                search.update_result(message_id, |m| f(m));
            }
        }
        hit
    }

    fn set_delivery(&mut self, room_id: &str, message_id: &str, delivery: MessageDeliveryState) {
        self.cache
            .update_message(room_id, message_id, |e| e.delivery = delivery.clone());
        if let Some(entry) = self
            .open_mut(room_id)
            .and_then(|o| o.timeline.iter_mut().find(|m| m.id() == message_id))
        {
            entry.delivery = delivery;
        }
    }

    fn apply_remote_delete(&mut self, room_id: &str, message_id: &str) {
        self.update_everywhere(room_id, message_id, Message::mark_deleted);
        if let Some(open) = self.open_mut(room_id) {
            open.selection.retain(|id| id != message_id);
            if open.reply_target.as_ref().map(|p| p.message_id.as_str()) == Some(message_id) {
                open.reply_target = None;
            }
        }
        if let Some(last) = self
            .rooms
            .get_mut(room_id)
            .and_then(|r| r.last_message.as_mut())
            .filter(|l| l.message_id == message_id)
        {
            last.is_deleted = true;
            last.content.clear();
        }
    }

    fn remove_locally(&mut self, room_id: &str, message_id: &str) {
        self.cache.remove_message(room_id, message_id);
        let mut newest: Option<LastMessage> = self
            .cache
            .window(room_id)
            .and_then(|w| w.iter().rev().find(|m| m.is_confirmed()))
            .map(|m| LastMessage::of(&m.message));
        if let Some(open) = self.open_mut(room_id) {
            open.timeline.retain(|m| m.id() != message_id);
            open.selection.retain(|id| id != message_id);
            if open.reply_target.as_ref().map(|p| p.message_id.as_str()) == Some(message_id) {
                open.reply_target = None;
            }
            if let Some(search) = open.search.as_mut() {
                search.remove_result(message_id);
            }
            newest = open
                .timeline
                .iter()
                .rev()
                .find(|m| m.is_confirmed())
                .map(|m| LastMessage::of(&m.message))
                .or(newest);
        }
        if let Some(room) = self.rooms.get_mut(room_id) {
            if room.last_message.as_ref().map(|l| l.message_id.as_str()) == Some(message_id) {
                room.last_message = newest;
            }
        }
    }

    /// Ends the session. The actor drops the controller afterwards.
    pub fn teardown(&mut self) -> Vec<Effect> {
        let effects = self.close_room();
        self.cache.clear();
        self.rooms.clear();
        self.typing_users.clear();
        self.in_flight.clear();
        effects
    }

    // Projection

    pub fn project(&self, state: &mut AppState, now: i64) {
        state.current_user = Some(self.me.clone());
        state.room_filter = self.filter;
        state.room_list = room_list::aggregate(self.rooms.rooms(), self.filter, &self.me, now);
        state.can_load_more_rooms =
            self.room_cursor.has_more() && self.room_cursor.marker().is_some();
        state.busy = BusyState {
            loading_rooms: self.room_cursor.is_loading(),
            creating_room: self.creating_room,
            updating_members: self.updating_members,
        };
        state.current_room = self.open.as_ref().map(|o| self.room_view(o, now));
    }

    fn room_view(&self, open: &OpenRoom, now: i64) -> RoomViewState {
        let room = self.rooms.get(&open.room_id);
        let selected: Vec<&CachedMessage> = open
            .selection
            .ids()
            .iter()
            .filter_map(|id| open.find(id))
            .collect();
        RoomViewState {
            room_id: open.room_id.clone(),
            title: room
                .map(|r| r.title(&self.me))
                .unwrap_or_else(|| open.room_id.clone()),
            is_group: room.map(ChatRoom::is_group).unwrap_or(false),
            description: room.and_then(|r| r.description.clone()),
            members: room.map(ChatRoom::member_users).unwrap_or_default(),
            messages: open
                .timeline
                .iter()
                .map(|m| {
                    self.render(&m.message, m.delivery.clone(), open.selection.contains(m.id()))
                })
                .collect(),
            can_load_older: open.history.has_more(),
            loading_older: open.history.is_loading(),
            selection: open.selection.view(),
            bulk_actions: bulk_actions(&selected, now, self.limits.delete_for_everyone_window_secs),
            reply_target: open.reply_target.clone(),
            search: open.search.as_ref().map(|s| SearchView {
                query: s.typed().to_string(),
                results: s
                    .results()
                    .iter()
                    .map(|m| self.render(m, MessageDeliveryState::Sent, false))
                    .collect(),
                has_more: s.has_more(),
                loading: s.is_loading(),
            }),
            typing_users: self
                .typing_users
                .get(&open.room_id)
                .cloned()
                .unwrap_or_default(),
        }
    }

    fn render(&self, m: &Message, delivery: MessageDeliveryState, is_selected: bool) -> ChatMessage {
        ChatMessage {
            id: m.id.clone(),
            sender: m.sender.clone(),
            sender_name: m.sender.display_name(),
            is_mine: m.sender.matches(&self.me),
            content: m.content.clone(),
            message_type: m.message_type,
            created_at: m.created_at,
            is_edited: m.is_edited,
            is_deleted: m.is_deleted,
            is_forwarded: m.is_forwarded,
            parent: m.parent.clone(),
            reactions: group_reactions(&m.reactions, Some(&self.me)),
            delivery,
            receipt: m.receipt,
            is_selected,
        }
    }
}

fn typing_request(signal: TypingSignal) -> Effect {
    let (room_id, is_typing) = match signal {
        TypingSignal::Started { room_id } => (room_id, true),
        TypingSignal::Stopped { room_id } => (room_id, false),
    };
    Effect::Request(Request::Typing { room_id, is_typing })
}

fn upsert_in(list: &mut Vec<CachedMessage>, entry: CachedMessage) {
    match list.iter_mut().find(|m| m.id() == entry.id()) {
        Some(existing) => *existing = entry,
        None => list.push(entry),
    }
}
