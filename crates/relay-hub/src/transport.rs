//! Transport-neutral frames.
//!
//! Sessions read from a `Stream<Item = Result<Frame, TransportError>>` and
//! write to a `Sink<Frame>`. The server adapts its WebSocket halves to these
//! types; tests drive sessions with in-memory channels.

use futures::channel::mpsc;
use futures::{Sink, SinkExt, Stream, StreamExt};

use crate::errors::TransportError;

/// One transport frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// UTF-8 text frame.
    Text(String),
    /// Binary frame.
    Binary(Vec<u8>),
    /// Liveness probe.
    Ping(Vec<u8>),
    /// Liveness acknowledgement.
    Pong(Vec<u8>),
    /// Close handshake.
    Close,
}

impl Frame {
    /// Payload length in bytes.
    pub fn len(&self) -> usize {
        match self {
            Self::Text(text) => text.len(),
            Self::Binary(data) | Self::Ping(data) | Self::Pong(data) => data.len(),
            Self::Close => 0,
        }
    }

    /// Whether the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Server side of an in-memory transport.
pub struct MemoryTransport {
    /// Frames sent by the client.
    pub incoming: mpsc::UnboundedReceiver<Result<Frame, TransportError>>,
    /// Frames written by the server.
    pub outgoing: std::pin::Pin<Box<dyn Sink<Frame, Error = TransportError> + Send>>,
}

/// Client side of an in-memory transport.
pub struct MemoryPeer {
    /// Push frames (or read errors) to the server.
    pub to_server: mpsc::UnboundedSender<Result<Frame, TransportError>>,
    /// Frames written by the server.
    pub from_server: mpsc::UnboundedReceiver<Frame>,
}

impl MemoryPeer {
    /// Send a text frame.
    pub fn send_text(&self, text: impl Into<String>) -> bool {
        self.to_server
            .unbounded_send(Ok(Frame::Text(text.into())))
            .is_ok()
    }

    /// Receive the next frame written by the server.
    pub async fn recv(&mut self) -> Option<Frame> {
        self.from_server.next().await
    }

    /// Hang up: the server's read side ends.
    pub fn hang_up(&self) {
        self.to_server.close_channel();
    }
}

/// Build a connected in-memory transport pair.
///
/// Writes fail with [`TransportError::Closed`] once the peer is dropped.
pub fn memory_pair() -> (MemoryTransport, MemoryPeer) {
    let (to_server, incoming) = mpsc::unbounded();
    let (tx, from_server) = mpsc::unbounded();
    let outgoing = tx.sink_map_err(|_| TransportError::Closed);
    (
        MemoryTransport {
            incoming,
            outgoing: Box::pin(outgoing),
        },
        MemoryPeer {
            to_server,
            from_server,
        },
    )
}

/// Accept any stream/sink pair as a session transport.
pub trait FrameStream: Stream<Item = Result<Frame, TransportError>> + Unpin + Send + 'static {}
impl<T> FrameStream for T where T: Stream<Item = Result<Frame, TransportError>> + Unpin + Send + 'static {}

/// Sink half of a session transport.
pub trait FrameSink: Sink<Frame, Error = TransportError> + Unpin + Send + 'static {}
impl<T> FrameSink for T where T: Sink<Frame, Error = TransportError> + Unpin + Send + 'static {}
