//! Session controller for one device.
//!
//! One tokio task owns the transport, the device state, the watchdog and
//! the poller. It reacts to transport events, timer expiry, and commands
//! from the [`DivineSession`] handle in a single `select!` loop, so no two
//! handlers ever run concurrently. Outbound requests are handed to the
//! [`SendQueue`], whose jobs reach the transport through a shared slot.
//!
//! Nothing fails out of the loop: send errors, socket errors, and bad
//! configuration end in a log line or a status change.

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use gsctrl_core::error::{Error, Result};
use gsctrl_core::events::DeviceEvent;
use gsctrl_core::transport::{Transport, TransportEvent, TransportFactory};
use gsctrl_core::types::ConnectionStatus;

use crate::codec::{self, Frame, MAX_CONTROL_PAYLOAD, OPCODE_OFFSET, Request};
use crate::config::{DeviceConfig, SessionOptions};
use crate::poller::Poller;
use crate::queue::{Completion, SendQueue};
use crate::state::DeviceState;
use crate::watchdog::Watchdog;

/// Report request sent when the transport reports the link up.
const RESYNC_PAYLOAD: [u8; 4] = [0x00, 0x00, 0x00, 0x00];

/// Report request sent when data arrives on a link not marked up.
const RECOVERY_PAYLOAD: [u8; 6] = [0x00, 0x10, 0x00, 0x00, 0x00, 0x00];

const COMMAND_CHANNEL_CAPACITY: usize = 32;

/// Current transport as seen by queued send jobs.
type TransportSlot = watch::Receiver<Option<Arc<dyn Transport>>>;

// ---------------------------------------------------------------------------
// Handle
// ---------------------------------------------------------------------------

enum Command {
    Reconfigure {
        config: DeviceConfig,
        reply: oneshot::Sender<()>,
    },
    SendControl {
        payload: Vec<u8>,
        reply: oneshot::Sender<Option<Completion>>,
    },
    State {
        reply: oneshot::Sender<DeviceState>,
    },
    Status {
        reply: oneshot::Sender<(ConnectionStatus, Option<String>)>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// Handle to a running device session.
///
/// Created by [`DivineBuilder`](crate::DivineBuilder). Dropping the handle
/// stops the session: pending sends are discarded, timers cancelled, and
/// the transport destroyed.
pub struct DivineSession {
    cmd_tx: mpsc::Sender<Command>,
    event_tx: broadcast::Sender<DeviceEvent>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl DivineSession {
    /// Subscribe to status, variable, and feedback events.
    pub fn subscribe(&self) -> broadcast::Receiver<DeviceEvent> {
        self.event_tx.subscribe()
    }

    async fn request<T>(&self, command: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.cmd_tx
            .send(command(reply_tx))
            .await
            .map_err(|_| Error::SessionClosed)?;
        reply_rx.await.map_err(|_| Error::SessionClosed)
    }

    /// Apply a new configuration.
    ///
    /// Pending sends are dropped and the device state is cleared. The
    /// transport is recreated only if the host or port changed (or none is
    /// open); a get-info request follows either way.
    pub async fn reconfigure(&self, config: DeviceConfig) -> Result<()> {
        self.request(|reply| Command::Reconfigure { config, reply })
            .await
    }

    /// Send a set-control request carrying `payload`.
    ///
    /// Resolves once the send queue has handed the request to the
    /// transport, or dropped it (invalid controller id, reconfiguration).
    /// Fails only if the payload is too long to encode or the session has
    /// stopped.
    pub async fn send_control(&self, payload: &[u8]) -> Result<()> {
        if payload.len() > MAX_CONTROL_PAYLOAD {
            return Err(Error::InvalidParameter(format!(
                "control payload is {} bytes, at most {MAX_CONTROL_PAYLOAD} allowed",
                payload.len()
            )));
        }
        let payload = payload.to_vec();
        let completion = self
            .request(|reply| Command::SendControl { payload, reply })
            .await?;
        if let Some(completion) = completion {
            completion.await;
        }
        Ok(())
    }

    /// Snapshot of the device state.
    pub async fn state(&self) -> Result<DeviceState> {
        self.request(|reply| Command::State { reply }).await
    }

    /// Current link status and its message.
    pub async fn status(&self) -> Result<(ConnectionStatus, Option<String>)> {
        self.request(|reply| Command::Status { reply }).await
    }

    /// Whether the session task has stopped.
    pub fn is_closed(&self) -> bool {
        self.cmd_tx.is_closed()
    }

    /// Stop the session and wait for it to finish tearing down.
    pub async fn shutdown(mut self) -> Result<()> {
        let result = self.request(|reply| Command::Shutdown { reply }).await;
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
        result
    }
}

impl Drop for DivineSession {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

// ---------------------------------------------------------------------------
// Spawn
// ---------------------------------------------------------------------------

/// Open the transport for `config` and spawn the session task.
///
/// Must be called from within a tokio runtime.
pub(crate) fn spawn(
    config: DeviceConfig,
    options: SessionOptions,
    factory: Arc<dyn TransportFactory>,
) -> DivineSession {
    let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
    let (event_tx, _) = broadcast::channel(options.event_capacity);
    let cancel = CancellationToken::new();

    let mut controller = Controller::new(config, &options, factory, event_tx.clone());
    controller.init_transport();
    let task = tokio::spawn(controller.run(cmd_rx, cancel.clone()));

    DivineSession {
        cmd_tx,
        event_tx,
        cancel,
        task: Some(task),
    }
}

// ---------------------------------------------------------------------------
// Controller
// ---------------------------------------------------------------------------

struct Controller {
    config: DeviceConfig,
    factory: Arc<dyn TransportFactory>,
    /// Owned transport, shared read-only with queued send jobs.
    transport: watch::Sender<Option<Arc<dyn Transport>>>,
    events: Option<mpsc::Receiver<TransportEvent>>,
    status: ConnectionStatus,
    status_message: Option<String>,
    state: DeviceState,
    queue: SendQueue,
    watchdog: Watchdog,
    poller: Poller,
    event_tx: broadcast::Sender<DeviceEvent>,
}

impl Controller {
    fn new(
        config: DeviceConfig,
        options: &SessionOptions,
        factory: Arc<dyn TransportFactory>,
        event_tx: broadcast::Sender<DeviceEvent>,
    ) -> Self {
        let (transport, _) = watch::channel(None);
        Controller {
            config,
            factory,
            transport,
            events: None,
            status: ConnectionStatus::Connecting,
            status_message: None,
            state: DeviceState::new(),
            queue: SendQueue::new(options.queue_interval),
            watchdog: Watchdog::new(options.data_timeout),
            poller: Poller::new(options.poll_interval),
            event_tx,
        }
    }

    /// The session loop.
    ///
    /// Priority order: cancellation, transport events, watchdog, poll
    /// tick, then handle commands. Transport events go first so a query
    /// issued after a datagram was delivered observes its effects.
    async fn run(mut self, mut cmd_rx: mpsc::Receiver<Command>, cancel: CancellationToken) {
        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    debug!("Session cancelled");
                    break;
                }

                event = next_event(&mut self.events) => match event {
                    Some(event) => self.handle_transport_event(event),
                    None => {
                        debug!("Transport event stream ended");
                        self.events = None;
                    }
                },

                _ = self.watchdog.expired() => self.on_watchdog_expired(),

                _ = self.poller.tick() => self.on_poll(),

                cmd = cmd_rx.recv() => match cmd {
                    Some(cmd) => {
                        if !self.handle_command(cmd) {
                            break;
                        }
                    }
                    None => {
                        debug!("Session handle dropped");
                        break;
                    }
                },
            }
        }

        self.teardown();
    }

    /// Returns `false` when the session should stop.
    fn handle_command(&mut self, cmd: Command) -> bool {
        match cmd {
            Command::Reconfigure { config, reply } => {
                self.reconfigure(config);
                let _ = reply.send(());
            }
            Command::SendControl { payload, reply } => {
                let completion = self.send_message(Request::SetControl(payload));
                let _ = reply.send(completion);
            }
            Command::State { reply } => {
                let _ = reply.send(self.state.clone());
            }
            Command::Status { reply } => {
                let _ = reply.send((self.status, self.status_message.clone()));
            }
            Command::Shutdown { reply } => {
                debug!("Session shutdown requested");
                let _ = reply.send(());
                return false;
            }
        }
        true
    }

    fn handle_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::StatusChange { status, message } => {
                self.on_status_change(status, message)
            }
            TransportEvent::Error(message) => error!("Network error: {message}"),
            TransportEvent::Listening => self.on_listening(),
            TransportEvent::Data(data) => self.on_data(&data),
        }
    }

    // -- transitions --

    fn on_status_change(&mut self, status: ConnectionStatus, message: Option<String>) {
        if self.set_status(status, message) && status == ConnectionStatus::Ok {
            self.send_message(Request::GetReport(RESYNC_PAYLOAD.to_vec()));
        }
    }

    fn on_listening(&mut self) {
        info!("Listening");
        self.send_message(Request::GetInfo);
        self.poller.start();
        self.watchdog.arm();
    }

    fn on_data(&mut self, data: &[u8]) {
        trace!(bytes = data.len(), frame = %format!("{data:02X?}"), "Received datagram");
        self.process_frame(data);
        self.watchdog.arm();
        if self.set_status(ConnectionStatus::Ok, None) {
            self.send_message(Request::GetReport(RECOVERY_PAYLOAD.to_vec()));
        }
    }

    fn on_watchdog_expired(&mut self) {
        if self.status == ConnectionStatus::ConnectionFailure {
            return;
        }
        let seconds = self.watchdog.timeout().as_secs_f64();
        warn!(seconds, "Data watchdog expired");
        self.set_status(
            ConnectionStatus::ConnectionFailure,
            Some(format!("No data for {seconds} seconds")),
        );
    }

    fn on_poll(&mut self) {
        if self.current_transport().is_some_and(|t| !t.is_destroyed()) {
            self.send_message(Request::GetConfig);
        } else {
            debug!("Poll skipped, socket not open");
        }
    }

    fn reconfigure(&mut self, config: DeviceConfig) {
        info!(
            host = config.host().unwrap_or(""),
            port = config.port,
            fast_meters = config.fast_meters,
            "Configuration updated"
        );
        self.queue.clear();
        let reconnect =
            self.config.address_changed(&config) || self.current_transport().is_none();
        self.config = config;
        self.state.reset();

        if reconnect {
            self.set_status(ConnectionStatus::Connecting, None);
            self.init_transport();
        }
        self.send_message(Request::GetInfo);
    }

    // -- helpers --

    /// Publish a status change. Returns `false` if `status` is current.
    fn set_status(&mut self, status: ConnectionStatus, message: Option<String>) -> bool {
        if self.status == status {
            return false;
        }
        info!(
            status = %status,
            message = message.as_deref().unwrap_or(""),
            "Connection status changed"
        );
        self.status = status;
        self.status_message = message.clone();
        let _ = self
            .event_tx
            .send(DeviceEvent::StatusChanged { status, message });
        true
    }

    fn process_frame(&mut self, data: &[u8]) {
        let frame = codec::decode(data);
        match &frame {
            Frame::Config(report) => info!("Config data received: {report}"),
            Frame::Unrecognized => debug!(
                bytes = data.len(),
                opcode = ?data.get(OPCODE_OFFSET),
                "Ignoring unrecognized frame"
            ),
            _ => {}
        }

        let update = self.state.apply(&frame);
        if !update.variables.is_empty() {
            let _ = self
                .event_tx
                .send(DeviceEvent::VariablesUpdated(update.variables));
        }
        if !update.feedbacks.is_empty() {
            let _ = self
                .event_tx
                .send(DeviceEvent::FeedbacksChanged(update.feedbacks));
        }
    }

    /// Encode `request` and queue it. Invalid configuration drops it with a
    /// warning before anything is queued.
    fn send_message(&self, request: Request) -> Option<Completion> {
        let Ok(controller_id) = self.config.controller_id() else {
            warn!(
                controller_id = %self.config.controller_id,
                "Invalid Controller Id! Please check module settings."
            );
            return None;
        };
        let opcode = request.opcode();
        let frame = match codec::encode(&request, &controller_id, self.config.fast_meters) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(?opcode, error = %e, "Dropping request");
                return None;
            }
        };

        debug!(?opcode, frame = %format!("{frame:02X?}"), "Queueing request");
        Some(self.queue.add(dispatch(self.transport.subscribe(), frame)))
    }

    fn current_transport(&self) -> Option<Arc<dyn Transport>> {
        self.transport.borrow().clone()
    }

    /// Replace the transport with a fresh one for the configured address.
    fn init_transport(&mut self) {
        self.close_transport();
        self.poller.stop();

        let Some(host) = self.config.host().map(str::to_string) else {
            debug!("No host configured, transport not opened");
            return;
        };
        let port = self.config.port;

        match self.factory.open(&host, port) {
            Ok(handle) => {
                info!(host = %host, port, "Transport opened");
                self.transport.send_replace(Some(handle.transport));
                self.events = Some(handle.events);
            }
            Err(e) => {
                error!(host = %host, port, error = %e, "Failed to open transport");
                self.set_status(ConnectionStatus::ConnectionFailure, Some(e.to_string()));
            }
        }
    }

    fn close_transport(&mut self) {
        if let Some(transport) = self.transport.send_replace(None) {
            transport.destroy();
        }
        self.events = None;
    }

    fn teardown(&mut self) {
        self.queue.close();
        self.watchdog.disarm();
        self.poller.stop();
        self.close_transport();
    }
}

/// Next transport event, or pending forever when no transport is open.
async fn next_event(events: &mut Option<mpsc::Receiver<TransportEvent>>) -> Option<TransportEvent> {
    match events {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

/// Queue job: send `frame` through whichever transport is current at
/// dispatch time.
async fn dispatch(slot: TransportSlot, frame: Vec<u8>) {
    let transport = slot.borrow().clone();
    let Some(transport) = transport.filter(|t| !t.is_destroyed()) else {
        warn!("Socket not connected");
        return;
    };
    if let Err(e) = transport.send(&frame).await {
        warn!(error = %e, "Message send failed!");
    }
}
