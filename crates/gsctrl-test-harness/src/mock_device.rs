//! Mock UDP device for transport-level testing.
//!
//! [`MockDevice`] binds a loopback UDP socket and answers scripted
//! requests, enabling tests of the real UDP transport (and of a full
//! session over it) without hardware.
//!
//! # Example
//!
//! ```
//! use gsctrl_test_harness::MockDevice;
//!
//! # async fn example() -> gsctrl_core::Result<()> {
//! let mut device = MockDevice::new().await?;
//! // When the client sends "ping", answer with "pong".
//! device.expect(b"ping", b"pong");
//! let addr = device.addr();
//! device.start();
//! // ... open a transport to `addr` and exchange datagrams ...
//! device.wait().await.map_err(gsctrl_core::Error::Transport)?;
//! # Ok(())
//! # }
//! ```

use std::collections::VecDeque;
use std::net::SocketAddr;

use tokio::net::UdpSocket;
use tokio::task::JoinHandle;

use gsctrl_core::error::{Error, Result};

/// A pre-loaded request/response pair for the mock device.
#[derive(Debug, Clone)]
struct Expectation {
    /// The exact datagram we expect the client to send.
    request: Vec<u8>,
    /// Datagram sent back to the client.
    response: Vec<u8>,
}

/// A loopback UDP device answering scripted requests in order.
///
/// If the client sends a datagram that does not match the next
/// expectation, the device task stops and [`wait`](MockDevice::wait)
/// reports the mismatch.
pub struct MockDevice {
    socket: Option<UdpSocket>,
    addr: SocketAddr,
    expectations: VecDeque<Expectation>,
    handle: Option<JoinHandle<std::result::Result<(), String>>>,
}

impl MockDevice {
    /// Bind a new device on a random loopback port.
    pub async fn new() -> Result<Self> {
        let socket = UdpSocket::bind("127.0.0.1:0")
            .await
            .map_err(|e| Error::Transport(format!("failed to bind mock device: {e}")))?;
        let addr = socket.local_addr().map_err(Error::Io)?;
        Ok(Self {
            socket: Some(socket),
            addr,
            expectations: VecDeque::new(),
            handle: None,
        })
    }

    /// Address the device listens on.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Answer `request` with `response`.
    pub fn expect(&mut self, request: &[u8], response: &[u8]) {
        self.expectations.push_back(Expectation {
            request: request.to_vec(),
            response: response.to_vec(),
        });
    }

    /// Start serving expectations on a background task.
    ///
    /// Calling `start` twice has no effect.
    pub fn start(&mut self) {
        let Some(socket) = self.socket.take() else {
            return;
        };
        let expectations: Vec<Expectation> = self.expectations.drain(..).collect();

        let handle = tokio::spawn(async move {
            let mut buf = vec![0u8; 2048];
            for (i, expectation) in expectations.iter().enumerate() {
                let (n, peer) = socket
                    .recv_from(&mut buf)
                    .await
                    .map_err(|e| format!("expectation {i}: recv error: {e}"))?;

                if buf[..n] != expectation.request[..] {
                    return Err(format!(
                        "expectation {}: request mismatch: expected {:02X?}, got {:02X?}",
                        i,
                        expectation.request,
                        &buf[..n]
                    ));
                }

                socket
                    .send_to(&expectation.response, peer)
                    .await
                    .map_err(|e| format!("expectation {i}: send error: {e}"))?;
            }
            Ok(())
        });

        self.handle = Some(handle);
    }

    /// Wait for all expectations to be served and return any mismatch.
    pub async fn wait(self) -> std::result::Result<(), String> {
        match self.handle {
            Some(handle) => handle
                .await
                .map_err(|e| format!("device task panicked: {e}"))?,
            None => Ok(()),
        }
    }
}
