//! Inbound frame interpretation.
//!
//! [`dispatch`] is pure: it maps one decoded frame to the action the session
//! should take and never touches the hub or the transport itself.

use relay_core::{Envelope, Inbound, Payload, SessionId};

use crate::actor::{HubFlavor, HubKind};

/// Who sent an inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionIdentity {
    /// Session id.
    pub id: SessionId,
    /// Authenticated user.
    pub user_id: i64,
    /// Registry key: chat id, or the user id on the notification hub.
    pub scope_id: i64,
}

/// What a session does with an inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchAction {
    /// Enqueue directly onto the session's own queue.
    Reply(Envelope),
    /// Submit a broadcast to the owning hub.
    Broadcast {
        /// Target scope.
        scope_id: i64,
        /// Originating user, excluded on the chat hub.
        sender_id: i64,
        /// Envelope to fan out.
        envelope: Envelope,
    },
    /// Ask the chat collaborator to mark the chat read, in the background.
    MarkRead {
        /// Chat id.
        chat_id: i64,
        /// Reader.
        user_id: i64,
    },
    /// Nothing to do.
    Ignore,
}

/// Decide what to do with `inbound` on a session of hub flavor `F`.
///
/// The notification hub answers `ping` only; every other type is ignored on
/// both hubs, including types this build does not know.
pub fn dispatch<F: HubFlavor>(identity: &SessionIdentity, inbound: &Inbound) -> DispatchAction {
    let scope = F::scope(identity.scope_id);
    match (F::KIND, inbound) {
        (_, Inbound::Ping) => DispatchAction::Reply(Envelope::system(scope, Payload::Pong)),
        (HubKind::Chat, Inbound::Typing | Inbound::StopTyping) => {
            let is_typing = matches!(inbound, Inbound::Typing);
            let payload = Payload::Typing {
                user_id: identity.user_id,
                is_typing,
            };
            DispatchAction::Broadcast {
                scope_id: identity.scope_id,
                sender_id: identity.user_id,
                envelope: Envelope::new(scope, identity.user_id, payload),
            }
        }
        (HubKind::Chat, Inbound::Read) => DispatchAction::MarkRead {
            chat_id: identity.scope_id,
            user_id: identity.user_id,
        },
        _ => DispatchAction::Ignore,
    }
}
