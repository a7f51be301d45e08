//! gsctrl-divine: Glensound Divine control backend.
//!
//! Drives one device over its UDP control protocol: requests are encoded
//! and serialized through a rate-limited send queue, reports are decoded
//! into cached [`DeviceState`], and a data watchdog turns silence into a
//! `ConnectionFailure` status.
//!
//! # Quick start
//!
//! ```no_run
//! use gsctrl_core::DeviceEvent;
//! use gsctrl_divine::DivineBuilder;
//!
//! # async fn example() -> gsctrl_core::Result<()> {
//! let session = DivineBuilder::new().host("192.168.1.50").build()?;
//! let mut events = session.subscribe();
//! while let Ok(event) = events.recv().await {
//!     if let DeviceEvent::VariablesUpdated(vars) = event {
//!         println!("{vars:?}");
//!     }
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Modules
//!
//! - [`codec`] -- request encoding and report classification/decoding
//! - [`channels`] -- mix-selection channel table
//! - [`state`] -- cached device state with change detection
//! - [`queue`] -- single-concurrency, rate-limited send queue
//! - [`watchdog`] / [`poller`] -- liveness timer and config poll
//! - [`session`] -- the session controller and its handle

pub mod builder;
pub mod channels;
pub mod codec;
pub mod config;
pub mod poller;
pub mod queue;
pub mod session;
pub mod state;
pub mod watchdog;

pub use builder::DivineBuilder;
pub use codec::{Frame, Request};
pub use config::{DeviceConfig, SessionOptions};
pub use session::DivineSession;
pub use state::DeviceState;
