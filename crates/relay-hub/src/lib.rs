//! # relay-hub
//!
//! Real-time fan-out for two hubs that share one actor shape:
//!
//! - [`ChatHub`]: sessions keyed by conversation id; broadcasts skip the
//!   sender's own sessions
//! - [`NotificationHub`]: sessions keyed by recipient user id; a broadcast
//!   reaches every device of that user
//!
//! Each hub is a single task that owns its [`Registry`] and processes
//! register/unregister/broadcast requests in arrival order. A [`Session`]
//! pairs a read loop and a write loop around a bounded outbound queue; a
//! recipient whose queue is full is evicted rather than waited on.

#![deny(unsafe_code)]

pub mod actor;
pub mod dispatcher;
pub mod errors;
pub mod metrics;
pub mod notifications;
pub mod registry;
pub mod service;
pub mod session;
pub mod transport;
pub mod worker;

pub use actor::{Chat, ChatHub, Hub, HubFlavor, HubKind, HubStats, NotificationHub, Notifications};
pub use dispatcher::{DispatchAction, SessionIdentity, dispatch};
pub use errors::{HubError, SessionError, TransportError};
pub use registry::{Bucket, Member, Registry, SessionList, SessionSet};
pub use service::{ChatService, ServiceError};
pub use session::{Session, SessionConfig, SessionHandle, SessionState};
pub use transport::{Frame, FrameSink, FrameStream, MemoryPeer, MemoryTransport, memory_pair};
pub use worker::BackgroundPool;
