//! # relay-server
//!
//! HTTP surface for the relay hubs:
//!
//! - `GET /chats/{chat_id}/ws?token=` upgrades into a chat session after the
//!   token and participant checks
//! - `GET /notifications/ws?token=` upgrades into a notification session
//! - `GET /health` and `GET /metrics`
//!
//! [`RelayServer`] owns both hub actors and the background pool, and shuts
//! them down together.

#![deny(unsafe_code)]

pub mod auth;
pub mod config;
pub mod errors;
pub mod health;
pub mod memory;
pub mod metrics;
pub mod publish;
pub mod server;
pub mod shutdown;
pub mod socket;

pub use auth::{Authenticator, StaticTokens};
pub use config::ServerConfig;
pub use errors::{PublishError, UpgradeError};
pub use health::HealthResponse;
pub use memory::MemoryDirectory;
pub use publish::MessagePublisher;
pub use server::{AppState, RelayServer, TokenQuery, authorize_chat};
pub use shutdown::ShutdownCoordinator;
