// In-room message search: debounced dispatch, stale-page dropping, offset paging.

use super::pagination::{OffsetCursor, PageRequest};
use crate::model::Message;

#[derive(Debug)]
pub struct SearchController {
    page_size: u32,
    typed: String,
    debounce_generation: u64,
    pending: Option<String>,
    cursor: Option<OffsetCursor>,
    results: Vec<Message>,
}

impl SearchController {
    pub fn new(page_size: u32) -> Self {
        Self {
            page_size,
            typed: String::new(),
            debounce_generation: 0,
            pending: None,
            cursor: None,
            results: Vec::new(),
        }
    }

    /// What the search box shows.
    pub fn typed(&self) -> &str {
        &self.typed
    }

    pub fn active_query(&self) -> Option<&str> {
        self.cursor.as_ref().map(|c| c.query())
    }

    pub fn results(&self) -> &[Message] {
        &self.results
    }

    pub fn has_more(&self) -> bool {
        self.cursor.as_ref().map(|c| c.has_more()).unwrap_or(false)
    }

    pub fn is_loading(&self) -> bool {
        self.pending.is_some() || self.cursor.as_ref().map(|c| c.is_loading()).unwrap_or(false)
    }

    /// Records a keystroke. Returns the debounce generation to arm a timer with,
    /// or `None` when the query was cleared (results drop immediately).
    pub fn on_query_changed(&mut self, query: &str) -> Option<u64> {
        self.typed = query.to_string();
        self.debounce_generation = self.debounce_generation.wrapping_add(1);
        let trimmed = query.trim();
        if trimmed.is_empty() {
            self.pending = None;
            self.cursor = None;
            self.results.clear();
            return None;
        }
        self.pending = Some(trimmed.to_string());
        Some(self.debounce_generation)
    }

    /// Debounce expiry. Only the newest generation dispatches, and re-issuing
    /// the query that is already active is suppressed.
    pub fn on_debounce_fired(&mut self, generation: u64, token: u64) -> Option<PageRequest> {
        if generation != self.debounce_generation {
            return None;
        }
        let query = self.pending.take()?;
        if self.active_query() == Some(query.as_str()) {
            return None;
        }
        self.results.clear();
        let mut cursor = OffsetCursor::new(query, self.page_size);
        let request = cursor.begin(token);
        self.cursor = Some(cursor);
        request
    }

    pub fn load_more(&mut self, token: u64) -> Option<PageRequest> {
        if self.pending.is_some() {
            return None;
        }
        self.cursor.as_mut()?.begin(token)
    }

    /// Applies a page if it answers the outstanding request for the active
    /// query; anything else is a stale response and is dropped.
    pub fn on_page(&mut self, token: u64, query: &str, results: Vec<Message>, has_more: bool) -> bool {
        let Some(cursor) = self.cursor.as_mut() else {
            return false;
        };
        if !cursor.complete(token, query, results.len() as u32, has_more) {
            return false;
        }
        for m in results {
            if !self.results.iter().any(|r| r.id == m.id) {
                self.results.push(m);
            }
        }
        true
    }

    pub fn on_failure(&mut self, token: u64) -> bool {
        self.cursor.as_mut().map(|c| c.fail(token)).unwrap_or(false)
    }

    /// Keeps result snapshots in step with edits and deletions in the room.
    pub fn update_result(&mut self, message_id: &str, f: impl FnOnce(&mut Message)) {
        if let Some(m) = self.results.iter_mut().find(|m| m.id == message_id) {
            f(m);
        }
    }

    pub fn remove_result(&mut self, message_id: &str) {
        self.results.retain(|m| m.id != message_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{MessageType, ReceiptStatus, User};

    fn hit(id: &str) -> Message {
        Message {
            id: id.into(),
            room_id: "r".into(),
            sender: User {
                id: Some(3),
                employee_code: None,
                first_name: "S".into(),
                last_name: None,
                avatar_url: None,
            },
            content: "leave approved".into(),
            message_type: MessageType::Text,
            created_at: 0,
            is_edited: false,
            is_deleted: false,
            is_forwarded: false,
            parent: None,
            reactions: vec![],
            receipt: ReceiptStatus::None,
        }
    }

    #[test]
    fn rapid_typing_dispatches_once_for_final_query() {
        let mut s = SearchController::new(100);
        let g1 = s.on_query_changed("a").unwrap();
        let g2 = s.on_query_changed("ab").unwrap();
        let g3 = s.on_query_changed("abc").unwrap();

        assert!(s.on_debounce_fired(g1, 1).is_none());
        assert!(s.on_debounce_fired(g2, 2).is_none());
        let req = s.on_debounce_fired(g3, 3).unwrap();
        assert_eq!(req.query, "abc");
        assert_eq!((req.offset, req.limit), (0, 100));
    }

    #[test]
    fn late_page_for_superseded_query_is_dropped() {
        let mut s = SearchController::new(100);
        let g = s.on_query_changed("a").unwrap();
        let first = s.on_debounce_fired(g, 1).unwrap();

        let g = s.on_query_changed("abc").unwrap();
        let second = s.on_debounce_fired(g, 2).unwrap();

        assert!(!s.on_page(first.token, "a", vec![hit("1")], false));
        assert!(s.results().is_empty());
        assert!(s.on_page(second.token, "abc", vec![hit("2")], false));
        assert_eq!(s.results().len(), 1);
        assert_eq!(s.results()[0].id, "2");
    }

    #[test]
    fn load_more_appends_next_offset() {
        let mut s = SearchController::new(2);
        let g = s.on_query_changed("leave").unwrap();
        let req = s.on_debounce_fired(g, 1).unwrap();
        assert!(s.on_page(req.token, "leave", vec![hit("1"), hit("2")], true));

        let more = s.load_more(2).unwrap();
        assert_eq!(more.offset, 2);
        assert!(s.load_more(3).is_none(), "in-flight guard");
        assert!(s.on_page(more.token, "leave", vec![hit("3")], false));
        assert_eq!(s.results().len(), 3);
        assert!(!s.has_more());
        assert!(s.load_more(4).is_none());
    }

    #[test]
    fn same_query_is_not_reissued() {
        let mut s = SearchController::new(100);
        let g = s.on_query_changed("abc").unwrap();
        assert!(s.on_debounce_fired(g, 1).is_some());
        let g = s.on_query_changed("abc ").unwrap();
        assert!(s.on_debounce_fired(g, 2).is_none());
    }

    #[test]
    fn clearing_query_drops_results_immediately() {
        let mut s = SearchController::new(100);
        let g = s.on_query_changed("abc").unwrap();
        let req = s.on_debounce_fired(g, 1).unwrap();
        s.on_page(req.token, "abc", vec![hit("1")], false);
        assert!(s.on_query_changed("  ").is_none());
        assert!(s.results().is_empty());
        assert!(s.active_query().is_none());
        assert!(!s.on_page(req.token, "abc", vec![hit("9")], false));
    }
}
