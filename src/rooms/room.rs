//! A single contest room

use std::collections::{HashMap, HashSet};

use crate::registry::ConnectionId;

use super::chat::ChatHistory;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Visible,
    Hidden,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberKind {
    Admin,
    Participant,
    Spectator,
}

pub struct Room {
    pub contest_id: u64,
    pub members: HashSet<ConnectionId>,
    /// principal id -> visibility, admins only
    pub admins: HashMap<String, Visibility>,
    pub chat_history: ChatHistory,
    member_kinds: HashMap<ConnectionId, MemberKind>,
}

impl Room {
    pub fn new(contest_id: u64, chat_history_len: usize) -> Self {
        Self {
            contest_id,
            members: HashSet::new(),
            admins: HashMap::new(),
            chat_history: ChatHistory::new(chat_history_len),
            member_kinds: HashMap::new(),
        }
    }

    pub fn spectator_count(&self) -> usize {
        self.member_kinds
            .values()
            .filter(|k| **k == MemberKind::Spectator)
            .count()
    }

    pub fn any_visible_admin(&self) -> bool {
        self.admins.values().any(|v| *v == Visibility::Visible)
    }

    pub fn is_member(&self, conn_id: ConnectionId) -> bool {
        self.members.contains(&conn_id)
    }

    pub fn member_kind(&self, conn_id: ConnectionId) -> Option<MemberKind> {
        self.member_kinds.get(&conn_id).copied()
    }

    /// Add a member; returns `true` if this is a brand new member (not a
    /// no-op re-join).
    pub fn add_member(
        &mut self,
        conn_id: ConnectionId,
        principal_id: &str,
        kind: MemberKind,
        initial_visibility: Visibility,
    ) -> bool {
        let is_new = self.members.insert(conn_id);
        self.member_kinds.insert(conn_id, kind);
        if kind == MemberKind::Admin {
            self.admins.insert(principal_id.to_string(), initial_visibility);
        }
        is_new
    }

    /// Remove a member. Returns `true` if the room is now empty and should
    /// be deallocated by the caller.
    pub fn remove_member(&mut self, conn_id: ConnectionId, principal_id: &str) -> bool {
        self.members.remove(&conn_id);
        if self.member_kinds.remove(&conn_id) == Some(MemberKind::Admin) {
            self.admins.remove(principal_id);
        }
        self.members.is_empty()
    }

    pub fn set_admin_visibility(&mut self, principal_id: &str, visibility: Visibility) -> bool {
        match self.admins.get_mut(principal_id) {
            Some(current) if *current != visibility => {
                *current = visibility;
                true
            }
            Some(_) => false,
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_spectator_count_excludes_admin_and_participant() {
        let mut room = Room::new(1, 10);
        room.add_member(Uuid::new_v4(), "a1", MemberKind::Admin, Visibility::Hidden);
        room.add_member(Uuid::new_v4(), "p1", MemberKind::Participant, Visibility::Hidden);
        room.add_member(Uuid::new_v4(), "s1", MemberKind::Spectator, Visibility::Hidden);
        room.add_member(Uuid::new_v4(), "s2", MemberKind::Spectator, Visibility::Hidden);
        assert_eq!(room.spectator_count(), 2);
    }

    #[test]
    fn test_remove_last_member_signals_empty() {
        let mut room = Room::new(1, 10);
        let id = Uuid::new_v4();
        room.add_member(id, "p1", MemberKind::Participant, Visibility::Hidden);
        assert!(room.remove_member(id, "p1"));
    }

    #[test]
    fn test_admin_visibility_flip() {
        let mut room = Room::new(1, 10);
        room.add_member(Uuid::new_v4(), "a1", MemberKind::Admin, Visibility::Hidden);
        assert!(!room.any_visible_admin());
        assert!(room.set_admin_visibility("a1", Visibility::Visible));
        assert!(room.any_visible_admin());
        assert!(!room.set_admin_visibility("a1", Visibility::Visible));
    }

    #[test]
    fn test_leaving_removes_admin_entry() {
        let mut room = Room::new(1, 10);
        let id = Uuid::new_v4();
        room.add_member(id, "a1", MemberKind::Admin, Visibility::Visible);
        room.remove_member(id, "a1");
        assert!(room.admins.is_empty());
    }
}
