//! Adapt an axum [`WebSocket`] to the hub's frame stream and sink.

use std::future;

use axum::extract::ws::{CloseFrame, Message, WebSocket, close_code};
use axum::Error as AxumError;
use futures::{SinkExt, StreamExt};
use relay_hub::{Frame, FrameSink, FrameStream, TransportError};

/// Split `socket` into a frame stream and a frame sink.
pub fn split(socket: WebSocket) -> (impl FrameStream, impl FrameSink) {
    let (sink, stream) = socket.split();
    let stream = stream.map(|message| message.map(into_frame).map_err(transport_error));
    let sink = sink
        .sink_map_err(transport_error)
        .with(|frame: Frame| future::ready(Ok::<_, TransportError>(into_message(frame))));
    (stream, sink)
}

fn transport_error(e: AxumError) -> TransportError {
    TransportError::Failed(e.to_string())
}

/// Convert an inbound WebSocket message.
pub fn into_frame(message: Message) -> Frame {
    match message {
        Message::Text(text) => Frame::Text(text.as_str().to_owned()),
        Message::Binary(data) => Frame::Binary(data.to_vec()),
        Message::Ping(data) => Frame::Ping(data.to_vec()),
        Message::Pong(data) => Frame::Pong(data.to_vec()),
        Message::Close(_) => Frame::Close,
    }
}

/// Convert an outbound frame. A close carries the normal-closure code.
pub fn into_message(frame: Frame) -> Message {
    match frame {
        Frame::Text(text) => Message::Text(text.into()),
        Frame::Binary(data) => Message::Binary(data.into()),
        Frame::Ping(data) => Message::Ping(data.into()),
        Frame::Pong(data) => Message::Pong(data.into()),
        Frame::Close => Message::Close(Some(CloseFrame {
            code: close_code::NORMAL,
            reason: "".into(),
        })),
    }
}
