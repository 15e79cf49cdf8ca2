// Multi-select over one room's messages, and the bulk actions it unlocks.

use super::message_cache::CachedMessage;
use crate::error::PolicyViolation;
use crate::state::{BulkActions, SelectionMode, SelectionView};

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Selection {
    selected: Vec<String>,
    quick_reaction_for: Option<String>,
}

impl Selection {
    pub fn mode(&self) -> SelectionMode {
        if self.selected.is_empty() {
            SelectionMode::Idle
        } else {
            SelectionMode::Selecting
        }
    }

    pub fn is_active(&self) -> bool {
        !self.selected.is_empty()
    }

    pub fn len(&self) -> usize {
        self.selected.len()
    }

    pub fn is_empty(&self) -> bool {
        self.selected.is_empty()
    }

    pub fn ids(&self) -> &[String] {
        &self.selected
    }

    pub fn contains(&self, message_id: &str) -> bool {
        self.selected.iter().any(|id| id == message_id)
    }

    pub fn quick_reaction_for(&self) -> Option<&str> {
        self.quick_reaction_for.as_deref()
    }

    /// From idle, selects exactly this message and anchors the quick-reaction
    /// bar to it. While already selecting it behaves like a tap.
    pub fn long_press(&mut self, message: &CachedMessage) -> Result<(), PolicyViolation> {
        if message.message.is_deleted {
            return Err(PolicyViolation::NotSelectable);
        }
        if self.is_active() {
            return self.tap(message).map(|_| ());
        }
        self.selected.push(message.id().to_string());
        self.quick_reaction_for = Some(message.id().to_string());
        Ok(())
    }

    /// Toggles membership while selecting. Returns `false` when idle (the tap is
    /// not a selection gesture).
    pub fn tap(&mut self, message: &CachedMessage) -> Result<bool, PolicyViolation> {
        if !self.is_active() {
            return Ok(false);
        }
        let id = message.id();
        if self.contains(id) {
            self.selected.retain(|s| s != id);
            if self.quick_reaction_for.as_deref() == Some(id) || self.selected.is_empty() {
                self.quick_reaction_for = None;
            }
            return Ok(true);
        }
        if message.message.is_deleted {
            return Err(PolicyViolation::NotSelectable);
        }
        self.selected.push(id.to_string());
        // Bulk mode suppresses single-message shortcuts.
        self.quick_reaction_for = None;
        Ok(true)
    }

    pub fn dismiss_quick_reaction(&mut self) {
        self.quick_reaction_for = None;
    }

    pub fn clear(&mut self) {
        self.selected.clear();
        self.quick_reaction_for = None;
    }

    /// Drops ids that no longer refer to a selectable message.
    pub fn retain(&mut self, mut keep: impl FnMut(&str) -> bool) {
        self.selected.retain(|id| keep(id));
        if let Some(anchor) = self.quick_reaction_for.as_deref() {
            if !self.contains(anchor) {
                self.quick_reaction_for = None;
            }
        }
    }

    /// Follows an optimistic entry to its confirmed id.
    pub fn rename(&mut self, from: &str, to: &str) {
        for id in self.selected.iter_mut() {
            if id == from {
                *id = to.to_string();
            }
        }
        if self.quick_reaction_for.as_deref() == Some(from) {
            self.quick_reaction_for = Some(to.to_string());
        }
    }

    pub fn view(&self) -> SelectionView {
        SelectionView {
            mode: self.mode(),
            selected_ids: self.selected.clone(),
            quick_reaction_for: self.quick_reaction_for.clone(),
        }
    }
}

/// The inclusive time-boxed delete-for-everyone policy for a single message.
pub fn check_delete_for_everyone(
    message: &CachedMessage,
    now: i64,
    window_secs: i64,
) -> Result<(), PolicyViolation> {
    if message.message.is_deleted {
        return Err(PolicyViolation::MessageDeleted);
    }
    if !message.is_confirmed() {
        return Err(PolicyViolation::MessageNotConfirmed);
    }
    if now - message.message.created_at > window_secs {
        return Err(PolicyViolation::DeleteWindowElapsed {
            window_mins: window_secs / 60,
        });
    }
    Ok(())
}

pub fn bulk_actions(selected: &[&CachedMessage], now: i64, window_secs: i64) -> BulkActions {
    if selected.is_empty() {
        return BulkActions::default();
    }
    let single_confirmed = selected.len() == 1
        && selected[0].is_confirmed()
        && !selected[0].message.is_deleted;
    BulkActions {
        delete_for_me: true,
        delete_for_everyone: selected
            .iter()
            .all(|m| check_delete_for_everyone(m, now, window_secs).is_ok()),
        reply: single_confirmed,
        react: single_confirmed,
        share: selected
            .iter()
            .all(|m| m.is_confirmed() && !m.message.is_deleted),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Message, MessageType, ReceiptStatus, User};
    use crate::state::MessageDeliveryState;

    const WINDOW: i64 = 30 * 60;
    const NOW: i64 = 1_700_000_000;

    fn msg(id: &str, age_secs: i64) -> CachedMessage {
        CachedMessage::confirmed(Message {
            id: id.into(),
            room_id: "r".into(),
            sender: User {
                id: Some(1),
                employee_code: None,
                first_name: "A".into(),
                last_name: None,
                avatar_url: None,
            },
            content: "x".into(),
            message_type: MessageType::Text,
            created_at: NOW - age_secs,
            is_edited: false,
            is_deleted: false,
            is_forwarded: false,
            parent: None,
            reactions: vec![],
            receipt: ReceiptStatus::None,
        })
    }

    #[test]
    fn select_a_then_b_then_deselect_a() {
        let (a, b) = (msg("a", 0), msg("b", 0));
        let mut sel = Selection::default();
        sel.long_press(&a).unwrap();
        assert!(sel.tap(&b).unwrap());
        assert!(sel.tap(&a).unwrap());
        assert_eq!(sel.ids(), &["b".to_string()]);
        assert_eq!(sel.mode(), SelectionMode::Selecting);

        sel.tap(&b).unwrap();
        assert_eq!(sel.mode(), SelectionMode::Idle);
    }

    #[test]
    fn tap_while_idle_is_not_a_selection_gesture() {
        let mut sel = Selection::default();
        assert!(!sel.tap(&msg("a", 0)).unwrap());
        assert_eq!(sel.mode(), SelectionMode::Idle);
    }

    #[test]
    fn long_press_anchors_quick_reaction_until_second_pick() {
        let mut sel = Selection::default();
        sel.long_press(&msg("a", 0)).unwrap();
        assert_eq!(sel.quick_reaction_for(), Some("a"));
        sel.tap(&msg("b", 0)).unwrap();
        assert_eq!(sel.quick_reaction_for(), None);
    }

    #[test]
    fn deleted_messages_are_not_selectable() {
        let mut deleted = msg("d", 0);
        deleted.message.mark_deleted();
        let mut sel = Selection::default();
        assert_eq!(sel.long_press(&deleted), Err(PolicyViolation::NotSelectable));
        sel.long_press(&msg("a", 0)).unwrap();
        assert_eq!(sel.tap(&deleted), Err(PolicyViolation::NotSelectable));
        assert_eq!(sel.len(), 1);
    }

    #[test]
    fn delete_for_everyone_window_is_inclusive() {
        assert!(check_delete_for_everyone(&msg("a", 29 * 60), NOW, WINDOW).is_ok());
        assert!(check_delete_for_everyone(&msg("a", 30 * 60), NOW, WINDOW).is_ok());
        assert_eq!(
            check_delete_for_everyone(&msg("a", 31 * 60), NOW, WINDOW),
            Err(PolicyViolation::DeleteWindowElapsed { window_mins: 30 })
        );
    }

    #[test]
    fn pending_messages_cannot_be_deleted_for_everyone() {
        let mut m = msg("local-1", 0);
        m.delivery = MessageDeliveryState::Pending;
        assert_eq!(
            check_delete_for_everyone(&m, NOW, WINDOW),
            Err(PolicyViolation::MessageNotConfirmed)
        );
    }

    #[test]
    fn bulk_actions_follow_size_and_window() {
        let fresh = msg("a", 60);
        let old = msg("b", 45 * 60);

        let one = bulk_actions(&[&fresh], NOW, WINDOW);
        assert!(one.delete_for_me && one.delete_for_everyone && one.reply && one.react);

        let two = bulk_actions(&[&fresh, &old], NOW, WINDOW);
        assert!(two.delete_for_me);
        assert!(!two.delete_for_everyone);
        assert!(!two.reply && !two.react);
        assert!(two.share);

        assert_eq!(bulk_actions(&[], NOW, WINDOW), BulkActions::default());
    }

    #[test]
    fn rename_follows_promoted_message() {
        let mut sel = Selection::default();
        sel.long_press(&msg("local-1", 0)).unwrap();
        sel.rename("local-1", "42");
        assert!(sel.contains("42"));
        assert_eq!(sel.quick_reaction_for(), Some("42"));
    }
}
