//! Observer notifications emitted by a session.
//!
//! Events are delivered through a [`tokio::sync::broadcast`] channel. Host
//! bindings (action/feedback/variable renderers, monitors, loggers)
//! subscribe to them instead of polling the device state.

use crate::types::{ConnectionStatus, Feedback, Variables};

/// An event emitted by a session when device or link state changes.
///
/// Delivery is best-effort: slow subscribers may lag and miss events, in
/// which case they can resynchronise from a state snapshot.
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceEvent {
    /// The link status changed.
    StatusChanged {
        /// New status.
        status: ConnectionStatus,
        /// Optional human-readable detail (e.g. "No data for 10 seconds").
        message: Option<String>,
    },

    /// Variable values decoded from a report.
    VariablesUpdated(Variables),

    /// Feedback groups whose backing values changed.
    FeedbacksChanged(Vec<Feedback>),
}
