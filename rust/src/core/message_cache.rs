// Bounded per-room message windows with whole-room LRU eviction.

use std::num::NonZeroUsize;

use lru::LruCache;

use crate::error::{CoreError, CoreResult};
use crate::model::Message;
use crate::state::MessageDeliveryState;

#[derive(Clone, Debug, PartialEq)]
pub struct CachedMessage {
    pub message: Message,
    pub delivery: MessageDeliveryState,
}

impl CachedMessage {
    pub fn confirmed(message: Message) -> Self {
        Self {
            message,
            delivery: MessageDeliveryState::Sent,
        }
    }

    pub fn pending(message: Message) -> Self {
        Self {
            message,
            delivery: MessageDeliveryState::Pending,
        }
    }

    pub fn id(&self) -> &str {
        &self.message.id
    }

    pub fn is_confirmed(&self) -> bool {
        matches!(self.delivery, MessageDeliveryState::Sent)
    }
}

pub struct MessageCache {
    rooms: LruCache<String, Vec<CachedMessage>>,
    window_size: usize,
}

impl MessageCache {
    pub fn new(room_capacity: usize, window_size: usize) -> Self {
        let cap = NonZeroUsize::new(room_capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            rooms: LruCache::new(cap),
            window_size: window_size.max(1),
        }
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    pub fn room_capacity(&self) -> usize {
        self.rooms.cap().get()
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }

    pub fn contains(&self, room_id: &str) -> bool {
        self.rooms.contains(room_id)
    }

    /// Seeds or replaces a room's window with the newest `window_size` entries of
    /// `messages` (chronological). Returns the room evicted to make space, if any.
    pub fn put(&mut self, room_id: &str, mut messages: Vec<CachedMessage>) -> Option<String> {
        trim_front(&mut messages, self.window_size);
        match self.rooms.push(room_id.to_string(), messages) {
            Some((evicted, _)) if evicted != room_id => {
                tracing::debug!(%evicted, incoming = %room_id, "message cache evicted room");
                Some(evicted)
            }
            _ => None,
        }
    }

    /// Cached window, or empty when the room was never cached. Does not count as a touch.
    pub fn get(&self, room_id: &str) -> Vec<CachedMessage> {
        self.rooms.peek(room_id).cloned().unwrap_or_default()
    }

    pub fn window(&self, room_id: &str) -> Option<&[CachedMessage]> {
        self.rooms.peek(room_id).map(Vec::as_slice)
    }

    /// Like [`window`](Self::window), but a room that was never loaded is a
    /// `NotCached` error the caller resolves with a full fetch.
    pub fn lookup(&self, room_id: &str) -> CoreResult<&[CachedMessage]> {
        self.window(room_id)
            .ok_or_else(|| CoreError::NotCached(room_id.to_string()))
    }

    /// Marks a room most-recently-used. Returns `false` for uncached rooms.
    pub fn touch(&mut self, room_id: &str) -> bool {
        if self.rooms.contains(room_id) {
            self.rooms.promote(room_id);
            true
        } else {
            false
        }
    }

    /// Appends to a cached room's window, dropping the oldest entry past the cap.
    /// Entries whose id is already present are replaced in place instead.
    pub fn append(&mut self, room_id: &str, entry: CachedMessage) -> bool {
        let window_size = self.window_size;
        let Some(window) = self.rooms.peek_mut(room_id) else {
            return false;
        };
        if let Some(existing) = window.iter_mut().find(|m| m.id() == entry.id()) {
            *existing = entry;
            return true;
        }
        window.push(entry);
        trim_front(window, window_size);
        true
    }

    pub fn update_message(
        &mut self,
        room_id: &str,
        message_id: &str,
        f: impl FnOnce(&mut CachedMessage),
    ) -> bool {
        let Some(entry) = self
            .rooms
            .peek_mut(room_id)
            .and_then(|w| w.iter_mut().find(|m| m.id() == message_id))
        else {
            return false;
        };
        f(entry);
        true
    }

    pub fn find(&self, room_id: &str, message_id: &str) -> Option<&CachedMessage> {
        self.rooms
            .peek(room_id)
            .and_then(|w| w.iter().find(|m| m.id() == message_id))
    }

    pub fn remove_message(&mut self, room_id: &str, message_id: &str) -> Option<CachedMessage> {
        let window = self.rooms.peek_mut(room_id)?;
        let idx = window.iter().position(|m| m.id() == message_id)?;
        Some(window.remove(idx))
    }

    /// Swaps a local optimistic entry for its server-confirmed form, keeping its
    /// position. If the confirmed id already arrived through another path the
    /// local entry is dropped instead of producing a duplicate.
    pub fn promote(&mut self, room_id: &str, local_id: &str, confirmed: Message) -> bool {
        let Some(window) = self.rooms.peek_mut(room_id) else {
            return false;
        };
        promote_in(window, local_id, confirmed)
    }

    /// Drops a room's window entirely.
    pub fn evict(&mut self, room_id: &str) -> bool {
        self.rooms.pop(room_id).is_some()
    }

    pub fn clear(&mut self) {
        self.rooms.clear();
    }

    /// Room ids from most to least recently used.
    pub fn room_ids(&self) -> Vec<String> {
        self.rooms.iter().map(|(k, _)| k.clone()).collect()
    }
}

fn trim_front(messages: &mut Vec<CachedMessage>, max: usize) {
    if messages.len() > max {
        let excess = messages.len() - max;
        messages.drain(..excess);
    }
}

/// Shared by the hot cache and the open room's rendered timeline.
pub(crate) fn promote_in(list: &mut Vec<CachedMessage>, local_id: &str, confirmed: Message) -> bool {
    let Some(idx) = list.iter().position(|m| m.id() == local_id) else {
        return false;
    };
    if list.iter().any(|m| m.id() == confirmed.id) {
        list.remove(idx);
        return true;
    }
    list[idx] = CachedMessage::confirmed(confirmed);
    true
}
