//! Chat messages and the bounded ring buffer holding a room's history

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::utils::time::now_timestamp;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatMessage {
    pub id: String,
    pub contest_id: u64,
    pub sender_principal: String,
    pub text: String,
    pub timestamp: String,
    pub is_admin: bool,
}

impl ChatMessage {
    pub fn new(contest_id: u64, sender_principal: String, text: String, is_admin: bool) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            contest_id,
            sender_principal,
            text,
            timestamp: now_timestamp(),
            is_admin,
        }
    }
}

/// Fixed-capacity ring: pushing past `capacity` evicts the oldest entry.
pub struct ChatHistory {
    capacity: usize,
    messages: VecDeque<ChatMessage>,
}

impl ChatHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            messages: VecDeque::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, msg: ChatMessage) {
        if self.messages.len() >= self.capacity {
            self.messages.pop_front();
        }
        self.messages.push_back(msg);
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn snapshot(&self) -> Vec<ChatMessage> {
        self.messages.iter().cloned().collect()
    }
}
