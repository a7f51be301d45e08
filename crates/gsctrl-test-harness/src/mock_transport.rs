//! Mock transport for deterministic session testing.
//!
//! [`MockTransportFactory`] implements [`TransportFactory`] and hands out
//! [`MockTransport`]s. Every open is recorded as a [`MockConnection`], which
//! gives the test both sides of the link: the datagrams the session sent,
//! and a sender for injecting `listening`, `data`, `error`, and
//! `status_change` events.
//!
//! # Example
//!
//! ```
//! use gsctrl_core::TransportFactory;
//! use gsctrl_test_harness::MockTransportFactory;
//!
//! # async fn example() -> gsctrl_core::Result<()> {
//! let factory = MockTransportFactory::new();
//! let handle = factory.open("10.0.0.5", 41161)?;
//! handle.transport.send(&[0x47, 0x53]).await?;
//!
//! let conn = factory.last().unwrap();
//! assert_eq!(conn.transport.sent_data(), vec![vec![0x47, 0x53]]);
//! # Ok(())
//! # }
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::{mpsc, watch};

use gsctrl_core::error::{Error, Result};
use gsctrl_core::transport::{Transport, TransportEvent, TransportFactory, TransportHandle};
use gsctrl_core::types::ConnectionStatus;

/// Event channel capacity for mock connections.
const EVENT_CHANNEL_CAPACITY: usize = 64;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A mock [`Transport`] that records every datagram sent through it.
#[derive(Debug)]
pub struct MockTransport {
    /// Log of all datagrams sent through this transport.
    sent_log: Mutex<Vec<Vec<u8>>>,
    /// Number of datagrams sent, for tests that wait on sends.
    sent_count: watch::Sender<usize>,
    destroyed: AtomicBool,
    fail_sends: AtomicBool,
}

impl MockTransport {
    /// Create a new, live mock transport.
    pub fn new() -> Self {
        let (sent_count, _) = watch::channel(0);
        MockTransport {
            sent_log: Mutex::new(Vec::new()),
            sent_count,
            destroyed: AtomicBool::new(false),
            fail_sends: AtomicBool::new(false),
        }
    }

    /// All datagrams sent so far, oldest first.
    pub fn sent_data(&self) -> Vec<Vec<u8>> {
        lock(&self.sent_log).clone()
    }

    /// Number of datagrams sent so far.
    pub fn sent_count(&self) -> usize {
        lock(&self.sent_log).len()
    }

    /// Wait until at least `count` datagrams have been sent.
    pub async fn wait_sent(&self, count: usize) {
        let mut rx = self.sent_count.subscribe();
        // The sender lives in `self`, so the channel cannot close here.
        let _ = rx.wait_for(|n| *n >= count).await;
    }

    /// Make subsequent sends fail with a transport error.
    pub fn set_fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, data: &[u8]) -> Result<()> {
        if self.is_destroyed() {
            return Err(Error::NotConnected);
        }
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(Error::Transport("mock send failure".into()));
        }

        let count = {
            let mut log = lock(&self.sent_log);
            log.push(data.to_vec());
            log.len()
        };
        self.sent_count.send_replace(count);
        Ok(())
    }

    fn destroy(&self) {
        self.destroyed.store(true, Ordering::SeqCst);
    }

    fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }
}

/// One transport opened through a [`MockTransportFactory`].
#[derive(Debug, Clone)]
pub struct MockConnection {
    /// Host the session asked for.
    pub host: String,
    /// Port the session asked for.
    pub port: u16,
    /// The transport handed to the session.
    pub transport: Arc<MockTransport>,
    /// Injects events into the session's transport event stream.
    pub events: mpsc::Sender<TransportEvent>,
}

impl MockConnection {
    /// Inject an arbitrary transport event.
    ///
    /// Returns `false` if the session has dropped the event stream.
    pub async fn emit(&self, event: TransportEvent) -> bool {
        self.events.send(event).await.is_ok()
    }

    /// Report the socket as bound.
    pub async fn listening(&self) -> bool {
        self.emit(TransportEvent::Listening).await
    }

    /// Deliver one datagram from the device.
    pub async fn data(&self, frame: &[u8]) -> bool {
        self.emit(TransportEvent::Data(Bytes::copy_from_slice(frame)))
            .await
    }

    /// Report a transport status change.
    pub async fn status(&self, status: ConnectionStatus, message: Option<&str>) -> bool {
        self.emit(TransportEvent::StatusChange {
            status,
            message: message.map(str::to_string),
        })
        .await
    }

    /// Report a socket error.
    pub async fn error(&self, message: &str) -> bool {
        self.emit(TransportEvent::Error(message.to_string())).await
    }
}

/// A [`TransportFactory`] producing [`MockTransport`]s.
#[derive(Debug, Default)]
pub struct MockTransportFactory {
    connections: Mutex<Vec<MockConnection>>,
    fail_opens: AtomicBool,
}

impl MockTransportFactory {
    /// Create a factory with no connections.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent opens fail with a transport error.
    pub fn set_fail_opens(&self, fail: bool) {
        self.fail_opens.store(fail, Ordering::SeqCst);
    }

    /// Number of transports opened so far.
    pub fn open_count(&self) -> usize {
        lock(&self.connections).len()
    }

    /// The `index`th connection opened (0-based).
    pub fn connection(&self, index: usize) -> Option<MockConnection> {
        lock(&self.connections).get(index).cloned()
    }

    /// The most recently opened connection.
    pub fn last(&self) -> Option<MockConnection> {
        lock(&self.connections).last().cloned()
    }
}

impl TransportFactory for MockTransportFactory {
    fn open(&self, host: &str, port: u16) -> Result<TransportHandle> {
        if self.fail_opens.load(Ordering::SeqCst) {
            return Err(Error::Transport(format!("mock open of {host}:{port} refused")));
        }

        let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let transport = Arc::new(MockTransport::new());
        lock(&self.connections).push(MockConnection {
            host: host.to_string(),
            port,
            transport: Arc::clone(&transport),
            events: events_tx,
        });

        Ok(TransportHandle {
            transport,
            events: events_rx,
        })
    }
}
