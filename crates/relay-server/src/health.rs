//! `/health` payload.

use std::time::Instant;

use relay_hub::{ChatHub, HubStats, NotificationHub};
use serde::Serialize;

/// Body of `GET /health`.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// `ok`, or `degraded` when a hub no longer answers.
    pub status: &'static str,
    /// Seconds since the server was built.
    pub uptime_secs: u64,
    /// Chat hub registry size.
    pub chat: HubStats,
    /// Notification hub registry size.
    pub notifications: HubStats,
}

impl HealthResponse {
    /// Whether both hubs answered.
    pub fn is_healthy(&self) -> bool {
        self.status == "ok"
    }
}

/// Query both hubs.
pub async fn check(started: Instant, chat: &ChatHub, notifications: &NotificationHub) -> HealthResponse {
    let (chat_stats, notification_stats) = tokio::join!(chat.stats(), notifications.stats());
    let status = if chat_stats.is_ok() && notification_stats.is_ok() {
        "ok"
    } else {
        "degraded"
    };
    HealthResponse {
        status,
        uptime_secs: started.elapsed().as_secs(),
        chat: chat_stats.unwrap_or_default(),
        notifications: notification_stats.unwrap_or_default(),
    }
}
