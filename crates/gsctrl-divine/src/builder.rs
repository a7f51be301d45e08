//! DivineBuilder -- fluent builder for [`DivineSession`] instances.
//!
//! Separates configuration from construction so callers can set the
//! device address, controller id, and timing knobs before the transport
//! is opened.
//!
//! # Example
//!
//! ```no_run
//! use gsctrl_divine::DivineBuilder;
//!
//! # async fn example() -> gsctrl_core::Result<()> {
//! let session = DivineBuilder::new()
//!     .host("192.168.1.50")
//!     .fast_meters(true)
//!     .build()?;
//! let mut events = session.subscribe();
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use gsctrl_core::error::Result;
use gsctrl_core::transport::TransportFactory;
use gsctrl_transport::UdpTransportFactory;

use crate::config::{DeviceConfig, SessionOptions};
use crate::session::{self, DivineSession};

/// Fluent builder for [`DivineSession`].
///
/// Every setting has a default; only the host is needed to talk to a
/// device. A builder without a host yields a session that stays idle until
/// [`DivineSession::reconfigure`] supplies one.
#[derive(Debug, Clone, Default)]
pub struct DivineBuilder {
    config: DeviceConfig,
    options: SessionOptions,
}

impl DivineBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole device configuration.
    pub fn config(mut self, config: DeviceConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the device's IP address or hostname.
    pub fn host(mut self, host: &str) -> Self {
        self.config.host = Some(host.to_string());
        self
    }

    /// Set the UDP control port (default: 41161).
    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    /// Set the controller id, 8 hex characters (default: "42495446").
    ///
    /// Not validated here: a session with an invalid id runs but drops
    /// every request with a warning.
    pub fn controller_id(mut self, controller_id: &str) -> Self {
        self.config.controller_id = controller_id.to_string();
        self
    }

    /// Enable or disable fast meters (default: false).
    pub fn fast_meters(mut self, enable: bool) -> Self {
        self.config.fast_meters = enable;
        self
    }

    /// Set the data watchdog timeout (default: 10s).
    pub fn data_timeout(mut self, timeout: Duration) -> Self {
        self.options.data_timeout = timeout;
        self
    }

    /// Set the config poll period (default: 5s).
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.options.poll_interval = interval;
        self
    }

    /// Set the minimum spacing between sends (default: 5ms).
    pub fn queue_interval(mut self, interval: Duration) -> Self {
        self.options.queue_interval = interval;
        self
    }

    /// Set the observer channel capacity (default: 256).
    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.options.event_capacity = capacity;
        self
    }

    /// Start a session over UDP.
    ///
    /// Must be called from within a tokio runtime.
    pub fn build(self) -> Result<DivineSession> {
        self.build_with_factory(Arc::new(UdpTransportFactory))
    }

    /// Start a session using transports from `factory`.
    ///
    /// This is the entry point for tests, which pass a mock factory.
    pub fn build_with_factory(self, factory: Arc<dyn TransportFactory>) -> Result<DivineSession> {
        self.options.validate()?;
        tracing::debug!(
            host = self.config.host().unwrap_or(""),
            port = self.config.port,
            "Building session"
        );
        Ok(session::spawn(self.config, self.options, factory))
    }
}
