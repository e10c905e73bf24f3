//! Settings type definitions.
//!
//! Every section is `#[serde(default)]`, so a settings file only needs the
//! keys it wants to change.

use std::collections::BTreeMap;
use std::time::Duration;

use relay_core::LogFormat;
use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings type.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RelaySettings {
    /// Network binding and shutdown.
    pub server: ServerSettings,
    /// Hub and session tuning.
    pub hub: HubSettings,
    /// Detached background work.
    pub workers: WorkerSettings,
    /// Log output.
    pub logging: LoggingSettings,
    /// Development authenticator.
    pub auth: AuthSettings,
}

impl RelaySettings {
    /// Check cross-field constraints.
    pub fn validate(&self) -> Result<()> {
        self.hub.validate()?;
        if self.workers.background_limit == 0 {
            return Err(SettingsError::InvalidValue(
                "workers.background_limit must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// Server network settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Host to bind.
    pub host: String,
    /// Port to bind (`0` auto-assigns).
    pub port: u16,
    /// How long graceful shutdown waits for tasks before giving up.
    pub shutdown_timeout_secs: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8080,
            shutdown_timeout_secs: 30,
        }
    }
}

/// Hub and session settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct HubSettings {
    /// Outbound envelopes buffered per session before it counts as unresponsive.
    pub queue_capacity: usize,
    /// Largest inbound frame accepted, in bytes.
    pub max_frame_bytes: usize,
    /// Idle time after which a silent session is closed.
    pub read_deadline_secs: u64,
    /// Period of server-initiated ping frames. Must be below the read deadline.
    pub heartbeat_interval_secs: u64,
    /// Upper bound on a single transport write.
    pub write_timeout_secs: u64,
    /// Pending requests buffered in front of each hub actor.
    pub mailbox_capacity: usize,
}

impl Default for HubSettings {
    fn default() -> Self {
        Self {
            queue_capacity: 256,
            max_frame_bytes: 512,
            read_deadline_secs: 60,
            heartbeat_interval_secs: 54,
            write_timeout_secs: 10,
            mailbox_capacity: 1024,
        }
    }
}

impl HubSettings {
    /// Read deadline as a [`Duration`].
    pub fn read_deadline(&self) -> Duration {
        Duration::from_secs(self.read_deadline_secs)
    }

    /// Heartbeat period as a [`Duration`].
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    /// Write timeout as a [`Duration`].
    pub fn write_timeout(&self) -> Duration {
        Duration::from_secs(self.write_timeout_secs)
    }

    fn validate(&self) -> Result<()> {
        if self.queue_capacity == 0 {
            return Err(SettingsError::InvalidValue(
                "hub.queue_capacity must be positive".into(),
            ));
        }
        if self.mailbox_capacity == 0 {
            return Err(SettingsError::InvalidValue(
                "hub.mailbox_capacity must be positive".into(),
            ));
        }
        if self.max_frame_bytes == 0 {
            return Err(SettingsError::InvalidValue(
                "hub.max_frame_bytes must be positive".into(),
            ));
        }
        if self.heartbeat_interval_secs == 0
            || self.heartbeat_interval_secs >= self.read_deadline_secs
        {
            return Err(SettingsError::InvalidValue(format!(
                "hub.heartbeat_interval_secs ({}) must be positive and below hub.read_deadline_secs ({})",
                self.heartbeat_interval_secs, self.read_deadline_secs
            )));
        }
        Ok(())
    }
}

/// Background worker pool settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerSettings {
    /// Maximum detached tasks running at once.
    pub background_limit: usize,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            background_limit: 32,
        }
    }
}

/// Logging settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub level: String,
    /// Output format.
    pub format: LogFormat,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: LogFormat::Compact,
        }
    }
}

/// Static bearer tokens accepted by the development authenticator.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthSettings {
    /// Token to user id.
    pub tokens: BTreeMap<String, i64>,
}
