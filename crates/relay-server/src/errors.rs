//! Upgrade rejection errors and their HTTP mapping.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use relay_hub::{HubError, ServiceError};
use serde_json::json;

/// Why a WebSocket upgrade was refused before any session existed.
#[derive(Debug, thiserror::Error)]
pub enum UpgradeError {
    /// The chat id path segment is not a positive integer.
    #[error("invalid chat id: {0}")]
    InvalidChatId(String),
    /// No `token` query parameter.
    #[error("missing token")]
    MissingToken,
    /// The token did not resolve to a user.
    #[error("invalid token")]
    InvalidToken,
    /// The user does not participate in the chat.
    #[error("user {user_id} is not a participant of chat {chat_id}")]
    NotParticipant {
        /// Chat id.
        chat_id: i64,
        /// Authenticated user.
        user_id: i64,
    },
    /// The participant lookup itself failed.
    #[error("participant check failed: {0}")]
    ParticipantCheck(#[from] ServiceError),
}

impl UpgradeError {
    /// HTTP status for this rejection.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidChatId(_) => StatusCode::BAD_REQUEST,
            Self::MissingToken | Self::InvalidToken => StatusCode::UNAUTHORIZED,
            Self::NotParticipant { .. } => StatusCode::FORBIDDEN,
            Self::ParticipantCheck(ServiceError::NotFound(_)) => StatusCode::FORBIDDEN,
            Self::ParticipantCheck(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for UpgradeError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "upgrade failed");
        } else {
            tracing::debug!(error = %self, "upgrade rejected");
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

/// Failure of a background notification fan-out.
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    /// A collaborator lookup failed.
    #[error(transparent)]
    Service(#[from] ServiceError),
    /// A hub stopped while the fan-out was running.
    #[error(transparent)]
    Hub(#[from] HubError),
}
