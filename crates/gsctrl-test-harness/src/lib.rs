//! gsctrl-test-harness: Test utilities, mock transports, and canned device
//! frames for the Glensound control driver.
//!
//! - [`MockTransport`] / [`MockTransportFactory`] stand in for the UDP
//!   transport so a session can be driven deterministically: tests inject
//!   transport events and inspect every datagram the session sent.
//! - [`MockDevice`] is a loopback UDP "device" answering scripted requests,
//!   for exercising the real UDP transport.
//! - [`frames`] holds report frames captured from a real unit plus builders
//!   for synthetic ones.

pub mod frames;
pub mod mock_device;
pub mod mock_transport;

pub use mock_device::MockDevice;
pub use mock_transport::{MockConnection, MockTransport, MockTransportFactory};
