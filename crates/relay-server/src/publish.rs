//! Fan-out of persisted chat messages.
//!
//! A collaborator that has stored a message calls
//! [`MessagePublisher::publish`]. The chat broadcast is submitted before
//! `publish` returns; per-recipient notifications run later on the
//! background pool and never report failures back.

use std::sync::Arc;

use relay_core::{Payload, SYSTEM_SENDER};
use relay_hub::{BackgroundPool, ChatHub, ChatService, NotificationHub, notifications};
use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::errors::PublishError;

/// Pushes chat messages and their follow-up notifications through the hubs.
#[derive(Clone)]
pub struct MessagePublisher {
    chat_hub: ChatHub,
    notification_hub: NotificationHub,
    chat: Arc<dyn ChatService>,
    pool: BackgroundPool,
}

impl MessagePublisher {
    /// Wire a publisher to both hubs.
    pub fn new(
        chat_hub: ChatHub,
        notification_hub: NotificationHub,
        chat: Arc<dyn ChatService>,
        pool: BackgroundPool,
    ) -> Self {
        Self {
            chat_hub,
            notification_hub,
            chat,
            pool,
        }
    }

    /// Broadcast `message` to the other sessions of `chat_id`, then notify
    /// every other participant in the background.
    ///
    /// `sender_name` and `text` feed the `new_message` preview.
    pub async fn publish(&self, chat_id: i64, sender_id: i64, message: Value, sender_name: &str, text: &str) {
        self.chat_hub
            .submit(chat_id, sender_id, Payload::Message(message))
            .await;

        let fan_out = NotifyParticipants {
            chat_hub: self.chat_hub.clone(),
            notification_hub: self.notification_hub.clone(),
            chat: Arc::clone(&self.chat),
            chat_id,
            sender_id,
            sender_name: sender_name.to_owned(),
            text: text.to_owned(),
        };
        self.pool.spawn_detached("notify_participants", fan_out.run());
    }

    /// Push a `system` notification to every device of `user_id`.
    pub async fn notify_system(&self, user_id: i64, message: &str, level: &str) {
        self.notification_hub
            .submit(user_id, SYSTEM_SENDER, notifications::system(message, level))
            .await;
    }

    /// Recompute and push the unread count of `user_id`.
    pub async fn refresh_unread(&self, user_id: i64) -> Result<(), PublishError> {
        push_unread(&*self.chat, &self.notification_hub, user_id).await
    }
}

impl std::fmt::Debug for MessagePublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessagePublisher")
            .field("pool", &self.pool)
            .finish_non_exhaustive()
    }
}

struct NotifyParticipants {
    chat_hub: ChatHub,
    notification_hub: NotificationHub,
    chat: Arc<dyn ChatService>,
    chat_id: i64,
    sender_id: i64,
    sender_name: String,
    text: String,
}

impl NotifyParticipants {
    /// A failed lookup for one recipient is logged and skipped; the
    /// remaining recipients are still notified.
    #[instrument(skip_all, fields(chat_id = self.chat_id, sender_id = self.sender_id))]
    async fn run(self) -> Result<(), PublishError> {
        let participants = self.chat.participants(self.chat_id).await?;
        for user_id in participants.into_iter().filter(|&id| id != self.sender_id) {
            if let Err(e) = push_unread(&*self.chat, &self.notification_hub, user_id).await {
                warn!(user_id, error = %e, "failed to push unread count");
            }

            match self.chat_hub.is_session_present(self.chat_id, user_id).await {
                Ok(true) => {
                    debug!(user_id, "recipient is in the chat, skipping new_message");
                    continue;
                }
                Ok(false) => {}
                Err(e) => {
                    warn!(user_id, error = %e, "presence check failed, skipping new_message");
                    continue;
                }
            }
            let payload = notifications::new_message(self.chat_id, &self.sender_name, &self.text);
            self.notification_hub
                .submit(user_id, SYSTEM_SENDER, payload)
                .await;
        }
        Ok(())
    }
}

async fn push_unread(
    chat: &dyn ChatService,
    notification_hub: &NotificationHub,
    user_id: i64,
) -> Result<(), PublishError> {
    let unread = chat.unread_count(user_id).await?;
    notification_hub
        .submit(user_id, SYSTEM_SENDER, notifications::unread_count_update(unread))
        .await;
    Ok(())
}
