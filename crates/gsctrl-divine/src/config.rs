//! Device configuration and session timing options.

use std::time::Duration;

use serde::Deserialize;

use gsctrl_core::error::{Error, Result};
use gsctrl_core::types::{ControllerId, DEFAULT_CONTROLLER_ID};

use crate::poller::DEFAULT_POLL_INTERVAL;
use crate::queue::DEFAULT_QUEUE_INTERVAL;
use crate::watchdog::DEFAULT_DATA_TIMEOUT;

/// Default UDP control port of the device.
pub const DEFAULT_PORT: u16 = 41161;

/// Default capacity of the observer broadcast channel.
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Host-facing configuration of one device.
///
/// Deserializes from TOML (or any serde format) with every field optional:
///
/// ```toml
/// host = "192.168.1.50"
/// port = 41161
/// controller_id = "42495446"
/// fast_meters = false
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DeviceConfig {
    /// Device address. No transport is opened while unset.
    pub host: Option<String>,
    pub port: u16,
    /// Eight hex characters, validated on every send.
    pub controller_id: String,
    pub fast_meters: bool,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        DeviceConfig {
            host: None,
            port: DEFAULT_PORT,
            controller_id: DEFAULT_CONTROLLER_ID.to_string(),
            fast_meters: false,
        }
    }
}

impl DeviceConfig {
    /// Parsed controller id.
    pub fn controller_id(&self) -> Result<ControllerId> {
        ControllerId::parse(&self.controller_id)
    }

    /// Whether switching to `other` requires a new transport.
    pub fn address_changed(&self, other: &DeviceConfig) -> bool {
        self.host != other.host || self.port != other.port
    }

    /// The configured host, treating an empty string as unset.
    pub fn host(&self) -> Option<&str> {
        self.host.as_deref().filter(|host| !host.is_empty())
    }
}

/// Timing knobs for a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOptions {
    /// Time without data before the status becomes `ConnectionFailure`.
    pub data_timeout: Duration,
    /// Period of config polling once the transport is listening.
    pub poll_interval: Duration,
    /// Minimum spacing between queued sends.
    pub queue_interval: Duration,
    /// Observer broadcast channel capacity.
    pub event_capacity: usize,
}

impl Default for SessionOptions {
    fn default() -> Self {
        SessionOptions {
            data_timeout: DEFAULT_DATA_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            queue_interval: DEFAULT_QUEUE_INTERVAL,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

impl SessionOptions {
    /// Reject values the timers and channels cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.data_timeout.is_zero() {
            return Err(Error::InvalidParameter("data timeout must be non-zero".into()));
        }
        if self.poll_interval.is_zero() {
            return Err(Error::InvalidParameter("poll interval must be non-zero".into()));
        }
        if self.event_capacity == 0 {
            return Err(Error::InvalidParameter("event capacity must be non-zero".into()));
        }
        Ok(())
    }
}
