use crate::models::panel::ConnectionState;
use thiserror::Error;

/// Result type alias for `led-serial` operations.
pub type Result<T> = std::result::Result<T, LedSerialError>;

#[derive(Debug, Error)]
pub enum LedSerialError {
    /// The device could not be opened (missing, busy, no permission).
    #[error("Failed to open serial port '{port_name}': {reason}")]
    PortOpen { port_name: String, reason: String },

    #[error("Failed to enumerate serial ports: {0}")]
    Scan(String),

    #[error("Serial port '{0}' is not open")]
    NotOpen(String),

    #[error("Serial port '{0}' is already open")]
    AlreadyOpen(String),

    #[error("No serial port selected")]
    NoPortSelected,

    #[error("Unknown serial port '{0}'")]
    UnknownPort(String),

    /// A panel event that is not allowed in the current connection state.
    #[error("Cannot {event} while {from}")]
    InvalidTransition {
        from: ConnectionState,
        event: &'static str,
    },

    #[error("Serial I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl LedSerialError {
    pub fn port_open(port_name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::PortOpen {
            port_name: port_name.into(),
            reason: reason.into(),
        }
    }
}
