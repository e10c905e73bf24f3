//! # relay-core
//!
//! Shared vocabulary for the real-time relay:
//!
//! - [`Envelope`]: the immutable message fanned out by the hubs, with a typed
//!   [`Payload`] per known `type` and a catch-all for everything else
//! - [`Inbound`]: the client-to-server frame kinds the dispatcher understands
//! - [`SessionId`]: per-connection identifiers
//! - [`logging`]: `tracing` subscriber bootstrap

#![deny(unsafe_code)]

pub mod envelope;
pub mod errors;
pub mod ids;
pub mod inbound;
pub mod logging;

pub use envelope::{Envelope, Payload, SYSTEM_SENDER, Scope, WireEnvelope};
pub use errors::EnvelopeError;
pub use ids::SessionId;
pub use inbound::Inbound;
pub use logging::{LogFormat, init_subscriber};
