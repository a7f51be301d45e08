//! Transport implementations for the Glensound control driver.
//!
//! This crate provides the concrete implementation of the
//! [`Transport`](gsctrl_core::Transport) contract used against real
//! hardware:
//!
//! - [`UdpTransport`]: a connected tokio UDP socket that reports
//!   `listening`, `data`, `error`, and `status_change` events
//! - [`UdpTransportFactory`]: the [`TransportFactory`](gsctrl_core::TransportFactory)
//!   a session uses to (re)open the socket when its address changes
//!
//! # Example
//!
//! ```no_run
//! use gsctrl_core::{TransportEvent, TransportFactory};
//! use gsctrl_transport::UdpTransportFactory;
//!
//! # async fn example() -> gsctrl_core::Result<()> {
//! let mut handle = UdpTransportFactory.open("192.168.1.60", 41161)?;
//! while let Some(event) = handle.events.recv().await {
//!     if event == TransportEvent::Listening {
//!         handle.transport.send(b"GS Ctrl\0").await?;
//!         break;
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod udp;

pub use udp::{UdpTransport, UdpTransportFactory};
