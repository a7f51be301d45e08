//! Transport traits for device communication.
//!
//! The [`Transport`] trait abstracts over the datagram link to a device.
//! The production implementation is the tokio UDP transport in
//! `gsctrl-transport`; `gsctrl-test-harness` provides a mock that records
//! sent datagrams and lets tests inject events.
//!
//! A transport is opened through a [`TransportFactory`], which returns the
//! send half ([`Transport`]) together with a stream of [`TransportEvent`]s.
//! The session owns both and is the only component that reacts to events.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

use crate::error::Result;
use crate::types::ConnectionStatus;

/// Notification emitted by an open transport.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// The transport's own view of the link changed.
    StatusChange {
        status: ConnectionStatus,
        message: Option<String>,
    },
    /// A socket error. Informational; the transport keeps running.
    Error(String),
    /// The socket is bound and ready to send.
    Listening,
    /// A datagram arrived from the device.
    Data(Bytes),
}

/// Send half of an open datagram transport.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send one datagram to the device.
    async fn send(&self, data: &[u8]) -> Result<()>;

    /// Close the socket and stop emitting events. Idempotent.
    fn destroy(&self);

    /// Whether [`destroy`](Transport::destroy) has been called.
    fn is_destroyed(&self) -> bool;
}

/// An opened transport: the send half plus its event stream.
pub struct TransportHandle {
    pub transport: Arc<dyn Transport>,
    pub events: mpsc::Receiver<TransportEvent>,
}

/// Opens transports to a device address.
///
/// Opening is non-blocking: the transport binds in the background and
/// reports progress through [`TransportEvent::Listening`] and
/// [`TransportEvent::StatusChange`]. Must be called from within a tokio
/// runtime.
pub trait TransportFactory: Send + Sync {
    fn open(&self, host: &str, port: u16) -> Result<TransportHandle>;
}
