//! Server configuration.

use std::time::Duration;

use relay_hub::SessionConfig;
use relay_settings::RelaySettings;

/// Runtime configuration for [`RelayServer`](crate::server::RelayServer).
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Host to bind.
    pub host: String,
    /// Port to bind (`0` auto-assigns).
    pub port: u16,
    /// Per-session limits and timers.
    pub session: SessionConfig,
    /// Pending requests buffered in front of each hub.
    pub mailbox_capacity: usize,
    /// Concurrent detached tasks.
    pub background_limit: usize,
    /// Graceful shutdown budget.
    pub shutdown_timeout: Duration,
}

impl ServerConfig {
    /// Derive from loaded settings.
    pub fn from_settings(settings: &RelaySettings) -> Self {
        Self {
            host: settings.server.host.clone(),
            port: settings.server.port,
            session: SessionConfig::from_settings(&settings.hub),
            mailbox_capacity: settings.hub.mailbox_capacity,
            background_limit: settings.workers.background_limit,
            shutdown_timeout: Duration::from_secs(settings.server.shutdown_timeout_secs),
        }
    }

    /// `host:port` bind address.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::from_settings(&RelaySettings::default())
    }
}
