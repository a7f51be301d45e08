//! Error types for the Glensound control driver.
//!
//! All fallible operations across the workspace return [`Result<T>`], which
//! uses [`Error`] as the error type. The session event loop itself never
//! returns these to the host: failures there end in a log line or a status
//! update. They surface from constructors, validators, and transports.

/// The error type for all driver operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A transport-level error (socket bind, resolve, send).
    #[error("transport error: {0}")]
    Transport(String),

    /// The configured controller id is not exactly 8 hexadecimal characters.
    ///
    /// Every outbound request carries the id, so an invalid one blocks all
    /// sends until the configuration is corrected.
    #[error("invalid controller id: {0:?} (expected 8 hex characters)")]
    InvalidControllerId(String),

    /// An invalid parameter was passed to a builder or command.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// No transport is open, or the transport has been destroyed.
    #[error("not connected")]
    NotConnected,

    /// The session event loop has shut down.
    #[error("session closed")]
    SessionClosed,

    /// An underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A convenience `Result` alias using [`Error`] as the error type.
pub type Result<T> = std::result::Result<T, Error>;
