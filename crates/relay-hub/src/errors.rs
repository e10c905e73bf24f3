//! Hub, session and transport errors.

/// Failure of the underlying connection.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The peer or the socket closed the connection.
    #[error("connection closed")]
    Closed,
    /// A single write did not complete within the write timeout.
    #[error("write timed out")]
    WriteTimeout,
    /// Any other I/O or protocol failure reported by the transport.
    #[error("transport failure: {0}")]
    Failed(String),
}

/// The hub actor is no longer accepting requests.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HubError {
    /// The actor loop has exited (shutdown or all handles dropped).
    #[error("{hub} hub is not running")]
    ActorStopped {
        /// Hub name.
        hub: &'static str,
    },
}

/// Why a session ended.
///
/// Every session ends with exactly one of these; the read loop reports the
/// first condition it observes.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    /// An inbound frame exceeded the configured size ceiling.
    #[error("inbound frame of {size} bytes exceeds the {limit} byte limit")]
    FrameTooLarge {
        /// Received size in bytes.
        size: usize,
        /// Configured ceiling.
        limit: usize,
    },
    /// An inbound frame was not a JSON object.
    #[error("malformed frame: {0}")]
    MalformedFrame(String),
    /// The transport failed while reading.
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// No inbound traffic arrived within the read deadline.
    #[error("read deadline expired")]
    DeadlineExpired,
    /// The peer closed the connection cleanly.
    #[error("peer closed the connection")]
    PeerClosed,
    /// The write loop gave up the transport.
    #[error("transport released by the write loop")]
    TransportReleased,
    /// Registration failed because the hub is gone.
    #[error(transparent)]
    Hub(#[from] HubError),
}

impl SessionError {
    /// Whether the session ended because the client broke the protocol.
    pub fn is_protocol_violation(&self) -> bool {
        matches!(self, Self::FrameTooLarge { .. } | Self::MalformedFrame(_))
    }

    /// Short machine-readable label used for metrics.
    pub fn label(&self) -> &'static str {
        match self {
            Self::FrameTooLarge { .. } => "frame_too_large",
            Self::MalformedFrame(_) => "malformed_frame",
            Self::Transport(_) => "transport",
            Self::DeadlineExpired => "deadline_expired",
            Self::PeerClosed => "peer_closed",
            Self::TransportReleased => "transport_released",
            Self::Hub(_) => "hub_stopped",
        }
    }
}
