//! Core value types shared by the session, transports, and observers.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

// ---------------------------------------------------------------------------
// Connection status
// ---------------------------------------------------------------------------

/// Link status of a session, as reported to the host.
///
/// Transitions are driven by transport events and the data watchdog. A
/// session never re-publishes a status equal to the current one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionStatus {
    /// Transport opened, no data received yet.
    #[default]
    Connecting,
    /// Datagrams are flowing.
    Ok,
    /// The transport failed or no data arrived within the watchdog window.
    ConnectionFailure,
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionStatus::Connecting => "connecting",
            ConnectionStatus::Ok => "ok",
            ConnectionStatus::ConnectionFailure => "connection_failure",
        };
        write!(f, "{s}")
    }
}

// ---------------------------------------------------------------------------
// Controller id
// ---------------------------------------------------------------------------

/// Number of bytes in a controller id.
pub const CONTROLLER_ID_LEN: usize = 4;

/// Controller id used when the host has not configured one.
pub const DEFAULT_CONTROLLER_ID: &str = "42495446";

/// Four-byte id distinguishing this controller from other control units on
/// the same network segment.
///
/// Configured as exactly 8 hexadecimal characters; any other string is
/// rejected with [`Error::InvalidControllerId`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ControllerId([u8; CONTROLLER_ID_LEN]);

impl ControllerId {
    /// Parse an 8-character hex string (either case).
    pub fn parse(s: &str) -> Result<Self> {
        if s.len() != CONTROLLER_ID_LEN * 2 {
            return Err(Error::InvalidControllerId(s.to_string()));
        }
        let mut bytes = [0u8; CONTROLLER_ID_LEN];
        hex::decode_to_slice(s, &mut bytes)
            .map_err(|_| Error::InvalidControllerId(s.to_string()))?;
        Ok(ControllerId(bytes))
    }

    /// The id as it appears on the wire.
    pub fn as_bytes(&self) -> &[u8; CONTROLLER_ID_LEN] {
        &self.0
    }
}

impl Default for ControllerId {
    fn default() -> Self {
        // "BITF"
        ControllerId([0x42, 0x49, 0x54, 0x46])
    }
}

impl FromStr for ControllerId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        ControllerId::parse(s)
    }
}

impl fmt::Display for ControllerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode_upper(self.0))
    }
}

// ---------------------------------------------------------------------------
// Observer-facing types
// ---------------------------------------------------------------------------

/// Feedback groups the host re-evaluates when their backing values change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Feedback {
    /// Level meters (inputs and output).
    Meter,
    /// Pot position, device volume, and temperature indicators.
    Indicator,
}

impl Feedback {
    /// Feedback id as registered with the host.
    pub fn as_str(&self) -> &'static str {
        match self {
            Feedback::Meter => "Meter",
            Feedback::Indicator => "Indicator",
        }
    }
}

impl fmt::Display for Feedback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Value of a published host variable.
#[derive(Debug, Clone, PartialEq)]
pub enum VariableValue {
    Number(f64),
    Text(String),
}

impl VariableValue {
    /// Numeric value, if this is a number.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            VariableValue::Number(n) => Some(*n),
            VariableValue::Text(_) => None,
        }
    }

    /// Text value, if this is text.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            VariableValue::Number(_) => None,
            VariableValue::Text(s) => Some(s),
        }
    }
}

impl fmt::Display for VariableValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VariableValue::Number(n) => write!(f, "{n}"),
            VariableValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<f64> for VariableValue {
    fn from(v: f64) -> Self {
        VariableValue::Number(v)
    }
}

impl From<u8> for VariableValue {
    fn from(v: u8) -> Self {
        VariableValue::Number(f64::from(v))
    }
}

impl From<&str> for VariableValue {
    fn from(v: &str) -> Self {
        VariableValue::Text(v.to_string())
    }
}

impl From<String> for VariableValue {
    fn from(v: String) -> Self {
        VariableValue::Text(v)
    }
}

/// A batch of variable values, keyed by variable id.
pub type Variables = BTreeMap<&'static str, VariableValue>;
