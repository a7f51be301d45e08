//! UDP transport for device communication.
//!
//! This module provides [`UdpTransport`], a connected datagram socket that
//! implements the [`Transport`] contract. Opening is non-blocking: the
//! socket is bound and connected by a background task, which then reports
//! progress as [`TransportEvent`]s:
//!
//! - `StatusChange(Connecting)` as soon as the task starts
//! - `Listening` followed by `StatusChange(Ok)` once the socket is ready
//! - `Data` for every datagram received from the device
//! - `Error` plus `StatusChange(ConnectionFailure)` on socket failures
//!
//! Connecting the socket filters out datagrams from other sources, so only
//! the configured device can feed the session.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::net::UdpSocket;
use tokio::sync::{OnceCell, mpsc};
use tokio_util::sync::CancellationToken;

use gsctrl_core::error::{Error, Result};
use gsctrl_core::transport::{Transport, TransportEvent, TransportFactory, TransportHandle};
use gsctrl_core::types::ConnectionStatus;

/// Capacity of the event channel between the socket task and the session.
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Receive buffer size. The largest device report is 144 bytes.
const RECV_BUF_SIZE: usize = 2048;

/// Connected UDP socket to a single device.
#[derive(Debug)]
pub struct UdpTransport {
    /// Remote `host:port` this transport was opened for.
    remote: String,
    /// The socket, set once the background task has bound and connected it.
    socket: OnceCell<Arc<UdpSocket>>,
    destroyed: AtomicBool,
    /// Stops the background receive loop.
    cancel: CancellationToken,
}

impl UdpTransport {
    /// Open a transport to `host:port`.
    ///
    /// Returns immediately; binding and connecting happen on a spawned task.
    /// Must be called from within a tokio runtime.
    pub fn open(host: &str, port: u16) -> TransportHandle {
        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let transport = Arc::new(UdpTransport {
            remote: format!("{host}:{port}"),
            socket: OnceCell::new(),
            destroyed: AtomicBool::new(false),
            cancel: CancellationToken::new(),
        });

        tokio::spawn(socket_task(Arc::clone(&transport), event_tx));

        TransportHandle {
            transport,
            events: event_rx,
        }
    }

    /// Remote `host:port` this transport sends to.
    pub fn remote(&self) -> &str {
        &self.remote
    }
}

#[async_trait]
impl Transport for UdpTransport {
    async fn send(&self, data: &[u8]) -> Result<()> {
        if self.is_destroyed() {
            return Err(Error::NotConnected);
        }
        let socket = self.socket.get().ok_or(Error::NotConnected)?;

        tracing::trace!(remote = %self.remote, bytes = data.len(), "Sending datagram");

        socket.send(data).await.map_err(|e| {
            tracing::error!(remote = %self.remote, error = %e, "Failed to send datagram");
            Error::Io(e)
        })?;
        Ok(())
    }

    fn destroy(&self) {
        if !self.destroyed.swap(true, Ordering::SeqCst) {
            tracing::debug!(remote = %self.remote, "Destroying UDP transport");
            self.cancel.cancel();
        }
    }

    fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }
}

/// Opens [`UdpTransport`]s. The factory a session uses against real hardware.
#[derive(Debug, Clone, Copy, Default)]
pub struct UdpTransportFactory;

impl TransportFactory for UdpTransportFactory {
    fn open(&self, host: &str, port: u16) -> Result<TransportHandle> {
        if host.is_empty() {
            return Err(Error::InvalidParameter("host must not be empty".into()));
        }
        Ok(UdpTransport::open(host, port))
    }
}

/// Bind to an ephemeral local port and connect to the remote address.
async fn bind_connected(remote: &str) -> std::io::Result<UdpSocket> {
    let socket = UdpSocket::bind("0.0.0.0:0").await?;
    socket.connect(remote).await?;
    Ok(socket)
}

async fn emit(event_tx: &mpsc::Sender<TransportEvent>, event: TransportEvent) -> bool {
    event_tx.send(event).await.is_ok()
}

async fn emit_status(
    event_tx: &mpsc::Sender<TransportEvent>,
    status: ConnectionStatus,
    message: Option<String>,
) -> bool {
    emit(event_tx, TransportEvent::StatusChange { status, message }).await
}

/// Background task: bind, connect, then forward received datagrams until
/// destroyed or the session drops the event receiver.
async fn socket_task(transport: Arc<UdpTransport>, event_tx: mpsc::Sender<TransportEvent>) {
    let remote = transport.remote.clone();
    let cancel = transport.cancel.clone();

    if !emit_status(&event_tx, ConnectionStatus::Connecting, None).await {
        return;
    }

    let bound = tokio::select! {
        _ = cancel.cancelled() => return,
        result = bind_connected(&remote) => result,
    };

    let socket = match bound {
        Ok(socket) => Arc::new(socket),
        Err(e) => {
            tracing::error!(remote = %remote, error = %e, "Failed to open UDP socket");
            let message = e.to_string();
            let _ = emit(&event_tx, TransportEvent::Error(message.clone())).await;
            let _ = emit_status(&event_tx, ConnectionStatus::ConnectionFailure, Some(message)).await;
            return;
        }
    };

    if let Ok(local) = socket.local_addr() {
        tracing::debug!(local = %local, remote = %remote, "UDP socket connected");
    }
    let _ = transport.socket.set(Arc::clone(&socket));

    if !emit(&event_tx, TransportEvent::Listening).await
        || !emit_status(&event_tx, ConnectionStatus::Ok, None).await
    {
        return;
    }

    let mut buf = vec![0u8; RECV_BUF_SIZE];
    loop {
        let received = tokio::select! {
            _ = cancel.cancelled() => {
                tracing::debug!(remote = %remote, "UDP receive loop cancelled");
                break;
            }
            result = socket.recv(&mut buf) => result,
        };

        match received {
            Ok(n) => {
                tracing::trace!(remote = %remote, bytes = n, "Received datagram");
                let data = Bytes::copy_from_slice(&buf[..n]);
                if !emit(&event_tx, TransportEvent::Data(data)).await {
                    break;
                }
            }
            Err(e) => {
                // Connected UDP sockets surface ICMP unreachable as a recv
                // error; the socket stays usable.
                tracing::debug!(remote = %remote, error = %e, "UDP receive error");
                let message = e.to_string();
                if !emit(&event_tx, TransportEvent::Error(message.clone())).await
                    || !emit_status(&event_tx, ConnectionStatus::ConnectionFailure, Some(message))
                        .await
                {
                    break;
                }
            }
        }
    }
}
