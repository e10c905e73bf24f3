//! Envelope decoding errors.

use thiserror::Error;

/// Errors raised while turning wire JSON into an [`Envelope`](crate::Envelope).
#[derive(Debug, Error)]
pub enum EnvelopeError {
    /// Neither `chat_id` nor `user_id` was present.
    #[error("envelope of type '{kind}' has no scope (chat_id or user_id)")]
    MissingScope {
        /// The wire `type` of the offending envelope.
        kind: String,
    },
}
