//! Room/Presence Engine (C6)
//!
//! Per-contest rooms with participant/spectator/admin roles, visibility
//! flags, and a bounded chat history ring buffer. A single room's broadcasts
//! are serialized (the room's `Mutex`); unrelated rooms proceed in parallel.

pub mod chat;
pub mod room;

use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use serde_json::json;

use crate::auth::Principal;
use crate::broadcast::Broadcaster;
use crate::envelope::Envelope;
use crate::ratelimit::ChatWindowLimiter;
use crate::registry::ConnectionId;

pub use chat::ChatMessage;
pub use room::{MemberKind, Room, Visibility};

/// Participation is owned by a collaborator outside the hub's core: the
/// engine only needs a yes/no answer to "is this principal a participant
/// in this contest".
pub trait ParticipationLookup: Send + Sync {
    fn is_participant(&self, principal_id: &str, contest_id: u64) -> bool;
}

pub struct NoParticipants;
impl ParticipationLookup for NoParticipants {
    fn is_participant(&self, _principal_id: &str, _contest_id: u64) -> bool {
        false
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinError {
    AlreadyMember,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatError {
    NotAMember,
    TooLong,
    RateLimited,
}

pub struct RoomEngine {
    rooms: DashMap<u64, Mutex<Room>>,
    participation: Arc<dyn ParticipationLookup>,
    chat_limiter: ChatWindowLimiter,
    chat_history_len: usize,
    chat_message_max_chars: usize,
    broadcaster: Arc<Broadcaster>,
}

impl RoomEngine {
    pub fn new(
        broadcaster: Arc<Broadcaster>,
        participation: Arc<dyn ParticipationLookup>,
        chat_history_len: usize,
        chat_message_max_chars: usize,
        chat_window_max: u32,
        chat_window_secs: u64,
    ) -> Self {
        Self {
            rooms: DashMap::new(),
            participation,
            chat_limiter: ChatWindowLimiter::new(chat_window_max, chat_window_secs),
            chat_history_len,
            chat_message_max_chars,
            broadcaster,
        }
    }

    fn channel(contest_id: u64) -> String {
        format!("contest.{contest_id}")
    }

    fn classify(&self, principal: &Principal, contest_id: u64) -> MemberKind {
        if principal.role.is_admin() {
            MemberKind::Admin
        } else if self.participation.is_participant(&principal.id, contest_id) {
            MemberKind::Participant
        } else {
            MemberKind::Spectator
        }
    }

    /// `join(room, conn)`. `requested_visibility` is only consulted for
    /// admins; defaults to hidden
    pub fn join(
        &self,
        contest_id: u64,
        conn_id: ConnectionId,
        principal: &Principal,
        requested_visibility: Visibility,
    ) -> Result<MemberKind, JoinError> {
        let kind = self.classify(principal, contest_id);
        let visibility = if kind == MemberKind::Admin {
            requested_visibility
        } else {
            Visibility::Hidden
        };

        let channel = Self::channel(contest_id);
        let room_lock = self
            .rooms
            .entry(contest_id)
            .or_insert_with(|| Mutex::new(Room::new(contest_id, self.chat_history_len)));
        let mut room = room_lock.lock();

        let was_visible_admin = room.any_visible_admin();
        let is_new = room.add_member(conn_id, &principal.id, kind, visibility);
        if !is_new {
            return Err(JoinError::AlreadyMember);
        }

        let should_announce_presence = kind != MemberKind::Admin || visibility == Visibility::Visible;
        if should_announce_presence {
            self.broadcaster.broadcast(
                &channel,
                Envelope::data(
                    "contest",
                    "PRESENCE",
                    json!({ "action": "join", "contestId": contest_id, "principalId": principal.id }),
                ),
            );
        }

        if !was_visible_admin && room.any_visible_admin() {
            self.announce_admin_presence(&channel, contest_id, true);
        }

        if kind == MemberKind::Spectator {
            self.announce_spectator_count(&channel, contest_id, room.spectator_count());
        }

        Ok(kind)
    }

    pub fn leave(&self, contest_id: u64, conn_id: ConnectionId, principal: &Principal) {
        let channel = Self::channel(contest_id);
        let Some(room_lock) = self.rooms.get(&contest_id) else {
            return;
        };

        let (should_remove_room, was_visible_admin, kind) = {
            let mut room = room_lock.lock();
            let kind = room.member_kind(conn_id);
            let was_visible_admin = room.any_visible_admin();
            let empty = room.remove_member(conn_id, &principal.id);
            (empty, was_visible_admin, kind)
        };

        let should_announce_presence =
            kind.map(|k| k != MemberKind::Admin).unwrap_or(false) || was_visible_admin;
        if should_announce_presence {
            self.broadcaster.broadcast(
                &channel,
                Envelope::data(
                    "contest",
                    "PRESENCE",
                    json!({ "action": "leave", "contestId": contest_id, "principalId": principal.id }),
                ),
            );
        }

        if should_remove_room {
            self.rooms.remove(&contest_id);
        } else {
            let (admin_flipped_off, spectator_count) = {
                let room = room_lock.lock();
                (
                    was_visible_admin && !room.any_visible_admin(),
                    room.spectator_count(),
                )
            };
            if admin_flipped_off {
                self.announce_admin_presence(&channel, contest_id, false);
            }
            if kind == Some(MemberKind::Spectator) {
                self.announce_spectator_count(&channel, contest_id, spectator_count);
            }
        }
    }

    /// `SET_ADMIN_PRESENCE`. No-op (returns `false`) if the principal is not
    /// a room admin or the visibility is unchanged.
    pub fn set_admin_presence(
        &self,
        contest_id: u64,
        principal_id: &str,
        visibility: Visibility,
    ) -> bool {
        let Some(room_lock) = self.rooms.get(&contest_id) else {
            return false;
        };
        let (changed, now_visible) = {
            let mut room = room_lock.lock();
            let changed = room.set_admin_visibility(principal_id, visibility);
            (changed, room.any_visible_admin())
        };
        if changed {
            self.announce_admin_presence(&Self::channel(contest_id), contest_id, now_visible);
        }
        changed
    }

    fn announce_admin_presence(&self, channel: &str, contest_id: u64, active: bool) {
        self.broadcaster.broadcast(
            channel,
            Envelope::data(
                "contest",
                "ADMIN_PRESENCE",
                json!({ "contestId": contest_id, "active": active }),
            ),
        );
    }

    fn announce_spectator_count(&self, channel: &str, contest_id: u64, count: usize) {
        self.broadcaster.broadcast(
            channel,
            Envelope::data(
                "contest",
                "SPECTATOR_COUNT",
                json!({ "contestId": contest_id, "count": count }),
            ),
        );
    }

    /// Chat acceptance pipeline: membership → length → chat
    /// counter → ring buffer append → broadcast.
    pub fn accept_chat(
        &self,
        contest_id: u64,
        conn_id: ConnectionId,
        principal: &Principal,
        text: String,
    ) -> Result<ChatMessage, ChatError> {
        let Some(room_lock) = self.rooms.get(&contest_id) else {
            return Err(ChatError::NotAMember);
        };

        let is_admin = {
            let room = room_lock.lock();
            if !room.is_member(conn_id) {
                return Err(ChatError::NotAMember);
            }
            room.member_kind(conn_id) == Some(MemberKind::Admin)
        };

        if text.chars().count() > self.chat_message_max_chars {
            return Err(ChatError::TooLong);
        }

        if !self.chat_limiter.try_chat(&principal.id, contest_id) {
            return Err(ChatError::RateLimited);
        }

        let message = ChatMessage::new(contest_id, principal.id.clone(), text, is_admin);
        room_lock.lock().chat_history.push(message.clone());

        self.broadcaster.broadcast(
            &Self::channel(contest_id),
            Envelope::data("contest", "CHAT_MESSAGE", serde_json::to_value(&message).unwrap()),
        );

        Ok(message)
    }

    pub fn spectator_count(&self, contest_id: u64) -> usize {
        self.rooms
            .get(&contest_id)
            .map(|r| r.lock().spectator_count())
            .unwrap_or(0)
    }

    pub fn chat_history(&self, contest_id: u64) -> Vec<ChatMessage> {
        self.rooms
            .get(&contest_id)
            .map(|r| r.lock().chat_history.snapshot())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Role;
    use crate::registry::ConnectionRegistry;
    use uuid::Uuid;

    fn engine() -> (RoomEngine, Arc<ConnectionRegistry>) {
        let registry = Arc::new(ConnectionRegistry::new());
        let broadcaster = Arc::new(Broadcaster::new(registry.clone(), 20));
        let engine = RoomEngine::new(broadcaster, Arc::new(NoParticipants), 200, 500, 10, 30);
        (engine, registry)
    }

    fn admin(id: &str) -> Principal {
        Principal {
            id: id.to_string(),
            role: Role::Admin,
        }
    }

    fn user(id: &str) -> Principal {
        Principal {
            id: id.to_string(),
            role: Role::User,
        }
    }

    #[test]
    fn test_admin_joins_hidden_by_default_no_presence() {
        let (engine, _registry) = engine();
        let kind = engine
            .join(7, Uuid::new_v4(), &admin("a1"), Visibility::Hidden)
            .unwrap();
        assert_eq!(kind, MemberKind::Admin);
        assert!(!engine.rooms.get(&7).unwrap().lock().any_visible_admin());
    }

    #[test]
    fn test_admin_visibility_flip_scenario() {
        let (engine, _registry) = engine();
        engine
            .join(7, Uuid::new_v4(), &admin("a1"), Visibility::Hidden)
            .unwrap();
        assert!(engine.set_admin_presence(7, "a1", Visibility::Visible));
        assert!(engine.rooms.get(&7).unwrap().lock().any_visible_admin());
        // A second identical call is a no-op.
        assert!(!engine.set_admin_presence(7, "a1", Visibility::Visible));
    }

    #[test]
    fn test_spectator_count_tracks_non_participant_joins() {
        let (engine, _registry) = engine();
        engine
            .join(7, Uuid::new_v4(), &user("u1"), Visibility::Hidden)
            .unwrap();
        engine
            .join(7, Uuid::new_v4(), &user("u2"), Visibility::Hidden)
            .unwrap();
        assert_eq!(engine.spectator_count(7), 2);
    }

    #[test]
    fn test_chat_overflow_rejects_after_window_max() {
        let (engine, _registry) = engine();
        let principal = user("u1");
        let conn_id = Uuid::new_v4();
        engine.join(42, conn_id, &principal, Visibility::Hidden).unwrap();

        for _ in 0..10 {
            assert!(engine
                .accept_chat(42, conn_id, &principal, "hi".to_string())
                .is_ok());
        }
        let err = engine
            .accept_chat(42, conn_id, &principal, "one too many".to_string())
            .unwrap_err();
        assert_eq!(err, ChatError::RateLimited);
        assert_eq!(engine.chat_history(42).len(), 10);
    }

    #[test]
    fn test_chat_rejects_non_member() {
        let (engine, _registry) = engine();
        let err = engine
            .accept_chat(99, Uuid::new_v4(), &user("u1"), "hi".to_string())
            .unwrap_err();
        assert_eq!(err, ChatError::NotAMember);
    }

    #[test]
    fn test_chat_membership_checked_before_length() {
        let (engine, _registry) = engine();
        let text = "x".repeat(501);
        let err = engine
            .accept_chat(99, Uuid::new_v4(), &user("u1"), text)
            .unwrap_err();
        assert_eq!(err, ChatError::NotAMember);
    }

    #[test]
    fn test_chat_too_long_rejected() {
        let (engine, _registry) = engine();
        let principal = user("u1");
        let conn_id = Uuid::new_v4();
        engine.join(1, conn_id, &principal, Visibility::Hidden).unwrap();
        let text = "x".repeat(501);
        let err = engine.accept_chat(1, conn_id, &principal, text).unwrap_err();
        assert_eq!(err, ChatError::TooLong);
    }

    #[test]
    fn test_room_deallocated_when_last_member_leaves() {
        let (engine, _registry) = engine();
        let principal = user("u1");
        let conn_id = Uuid::new_v4();
        engine.join(5, conn_id, &principal, Visibility::Hidden).unwrap();
        engine.leave(5, conn_id, &principal);
        assert!(engine.rooms.get(&5).is_none());
    }
}
