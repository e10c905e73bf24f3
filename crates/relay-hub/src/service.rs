//! Chat collaborator contract.
//!
//! Persistence and membership live outside the hubs. Sessions and the
//! publisher reach them only through [`ChatService`].

use async_trait::async_trait;

/// Failure reported by a collaborator.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ServiceError {
    /// The referenced chat or user does not exist.
    #[error("not found: {0}")]
    NotFound(String),
    /// The backing store could not be reached.
    #[error("service unavailable: {0}")]
    Unavailable(String),
    /// Any other failure.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Chat membership and read-state operations.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChatService: Send + Sync {
    /// Whether `user_id` participates in `chat_id`.
    async fn is_participant(&self, chat_id: i64, user_id: i64) -> Result<bool, ServiceError>;

    /// Mark every message in `chat_id` as read by `user_id`.
    async fn mark_messages_read(&self, chat_id: i64, user_id: i64) -> Result<(), ServiceError>;

    /// User ids participating in `chat_id`.
    async fn participants(&self, chat_id: i64) -> Result<Vec<i64>, ServiceError>;

    /// Total unread messages across all chats of `user_id`.
    async fn unread_count(&self, user_id: i64) -> Result<u64, ServiceError>;
}
