//! gsctrl-core: Core traits, types, and error definitions for the Glensound
//! control driver.
//!
//! This crate defines the device-agnostic pieces that the protocol backend,
//! the transports, and the test harness share. Host applications depend on
//! these types to consume session events without pulling in a transport.
//!
//! # Key types
//!
//! - [`Transport`] / [`TransportFactory`] -- datagram channel to the device
//! - [`TransportEvent`] -- notifications emitted by a transport
//! - [`DeviceEvent`] -- observer notifications emitted by a session
//! - [`ConnectionStatus`] / [`ControllerId`] -- session-level value types
//! - [`Error`] / [`Result`] -- error handling

pub mod error;
pub mod events;
pub mod transport;
pub mod types;

// Re-export key types at crate root for ergonomic `use gsctrl_core::*`.
pub use error::{Error, Result};
pub use events::DeviceEvent;
pub use transport::{Transport, TransportEvent, TransportFactory, TransportHandle};
pub use types::*;
