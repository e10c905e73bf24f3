//! In-process [`ChatService`] used by the standalone binary and tests.
//!
//! Keeps chats, participants and per-message read state behind a single
//! lock. Nothing is persisted.

use std::collections::{BTreeSet, HashMap, HashSet};

use async_trait::async_trait;
use parking_lot::RwLock;
use relay_hub::{ChatService, ServiceError};

#[derive(Debug, Default)]
struct ChatRecord {
    participants: BTreeSet<i64>,
    messages: Vec<MessageRecord>,
}

#[derive(Debug)]
struct MessageRecord {
    sender_id: i64,
    read_by: HashSet<i64>,
}

/// Chat membership and read receipts held in memory.
#[derive(Debug, Default)]
pub struct MemoryDirectory {
    chats: RwLock<HashMap<i64, ChatRecord>>,
}

impl MemoryDirectory {
    /// Empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create `chat_id` with `participants`, replacing any existing chat.
    pub fn create_chat(&self, chat_id: i64, participants: impl IntoIterator<Item = i64>) {
        let record = ChatRecord {
            participants: participants.into_iter().collect(),
            messages: Vec::new(),
        };
        let _ = self.chats.write().insert(chat_id, record);
    }

    /// Record a message from `sender_id`. The sender has read it.
    pub fn add_message(&self, chat_id: i64, sender_id: i64) -> Result<(), ServiceError> {
        let mut chats = self.chats.write();
        let chat = chats.get_mut(&chat_id).ok_or_else(|| not_found(chat_id))?;
        chat.messages.push(MessageRecord {
            sender_id,
            read_by: HashSet::from([sender_id]),
        });
        Ok(())
    }
}

fn not_found(chat_id: i64) -> ServiceError {
    ServiceError::NotFound(format!("chat {chat_id}"))
}

#[async_trait]
impl ChatService for MemoryDirectory {
    async fn is_participant(&self, chat_id: i64, user_id: i64) -> Result<bool, ServiceError> {
        let chats = self.chats.read();
        let chat = chats.get(&chat_id).ok_or_else(|| not_found(chat_id))?;
        Ok(chat.participants.contains(&user_id))
    }

    async fn mark_messages_read(&self, chat_id: i64, user_id: i64) -> Result<(), ServiceError> {
        let mut chats = self.chats.write();
        let chat = chats.get_mut(&chat_id).ok_or_else(|| not_found(chat_id))?;
        for message in &mut chat.messages {
            let _ = message.read_by.insert(user_id);
        }
        Ok(())
    }

    async fn participants(&self, chat_id: i64) -> Result<Vec<i64>, ServiceError> {
        let chats = self.chats.read();
        let chat = chats.get(&chat_id).ok_or_else(|| not_found(chat_id))?;
        Ok(chat.participants.iter().copied().collect())
    }

    async fn unread_count(&self, user_id: i64) -> Result<u64, ServiceError> {
        let chats = self.chats.read();
        let unread = chats
            .values()
            .filter(|chat| chat.participants.contains(&user_id))
            .flat_map(|chat| chat.messages.iter())
            .filter(|m| m.sender_id != user_id && !m.read_by.contains(&user_id))
            .count();
        Ok(unread as u64)
    }
}
