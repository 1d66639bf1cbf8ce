use crate::models::panel::{ConnectionState, PanelView};
use serde::{Deserialize, Serialize};
use strum::Display;

/// Main struct to communicate with the lib
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Action {
    /// result of an open attempt
    Status(PortStatus),
    /// the named port was closed
    Closed(String),
    /// the connection state machine moved
    StateChange(ConnectionState),
    /// the panel controls changed
    PanelChanged(PanelView),
    /// a fresh list of serial port names
    PortsScanned(Vec<String>),
    /// send a command to the lib
    Command(Command),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Display)]
pub enum OpenStatus {
    Failed,
    Opened,
}

impl OpenStatus {
    /// 0 for an error during opening, 1 for success
    pub fn code(self) -> u8 {
        match self {
            OpenStatus::Failed => 0,
            OpenStatus::Opened => 1,
        }
    }
}

/// Outcome of one open attempt.
///
/// `attempt` identifies the connect that started the open, so a late result
/// of an abandoned attempt can't be taken for the current one.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortStatus {
    pub port: String,
    pub status: OpenStatus,
    pub attempt: u64,
}

impl PortStatus {
    pub fn opened(port: impl Into<String>, attempt: u64) -> Self {
        PortStatus {
            port: port.into(),
            status: OpenStatus::Opened,
            attempt,
        }
    }

    pub fn failed(port: impl Into<String>, attempt: u64) -> Self {
        PortStatus {
            port: port.into(),
            status: OpenStatus::Failed,
            attempt,
        }
    }
}

/// Send an Action command to the lib
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Display)]
pub enum Command {
    /// rescan the available serial ports
    Scan,
    /// choose the port to connect to
    SelectPort(String),
    /// toggle "connect" on
    Connect,
    /// toggle "connect" off
    Disconnect,
    /// flip the send toggle and write the matching LED command
    ToggleLed,
    /// close the port and stop the lib
    Shutdown,
}
