use crate::error::{LedSerialError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use strum::Display;

pub const DISABLED_LABEL: &str = "DISABLED";
pub const TURN_ON_LABEL: &str = "TURN ON";
pub const TURN_OFF_LABEL: &str = "TURN OFF";

/// Connection state of the panel.
///
/// Transitions are validated: every event returns the next state or an
/// `InvalidTransition` error leaving the caller's state untouched.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Display)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

impl ConnectionState {
    /// the user toggled "connect" on
    pub fn connect(self) -> Result<Self> {
        match self {
            ConnectionState::Disconnected => Ok(ConnectionState::Connecting),
            from => Err(invalid(from, "connect")),
        }
    }

    /// the background open succeeded
    pub fn opened(self) -> Result<Self> {
        match self {
            ConnectionState::Connecting => Ok(ConnectionState::Connected),
            from => Err(invalid(from, "complete opening")),
        }
    }

    /// the background open failed
    pub fn failed(self) -> Result<Self> {
        match self {
            ConnectionState::Connecting => Ok(ConnectionState::Disconnected),
            from => Err(invalid(from, "fail opening")),
        }
    }

    /// the user toggled "connect" off
    pub fn disconnect(self) -> Result<Self> {
        match self {
            ConnectionState::Connecting | ConnectionState::Connected => {
                Ok(ConnectionState::Disconnected)
            }
            from => Err(invalid(from, "disconnect")),
        }
    }
}

fn invalid(from: ConnectionState, event: &'static str) -> LedSerialError {
    LedSerialError::InvalidTransition { from, event }
}

/// What the three controls of the panel show: the port selector, the
/// connect toggle and the send toggle.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PanelView {
    pub port_label: String,
    pub port_selector_enabled: bool,
    pub connect_label: String,
    pub connect_checked: bool,
    pub send_label: String,
    pub send_enabled: bool,
    pub send_checked: bool,
}

impl PanelView {
    pub fn new(port: &str) -> Self {
        PanelView {
            port_label: port.to_string(),
            port_selector_enabled: true,
            connect_label: connect_label(port),
            connect_checked: false,
            send_label: DISABLED_LABEL.to_string(),
            send_enabled: false,
            send_checked: false,
        }
    }

    pub fn select_port(&mut self, port: &str) {
        self.port_label = port.to_string();
        self.connect_label = connect_label(port);
    }

    pub fn show_connecting(&mut self) {
        self.port_selector_enabled = false;
        self.connect_checked = true;
    }

    pub fn show_connected(&mut self, port: &str) {
        self.port_selector_enabled = false;
        self.connect_label = format!("Disconnect from port {}", port);
        self.connect_checked = true;
        self.send_label = TURN_ON_LABEL.to_string();
        self.send_enabled = true;
        self.send_checked = false;
    }

    /// Used both after a failed open and after an explicit disconnect.
    pub fn show_disconnected(&mut self) {
        self.port_selector_enabled = true;
        self.connect_label = connect_label(&self.port_label);
        self.connect_checked = false;
        self.send_label = DISABLED_LABEL.to_string();
        self.send_enabled = false;
        self.send_checked = false;
    }

    pub fn show_led(&mut self, pressed: bool) {
        self.send_checked = pressed;
        self.send_label = if pressed {
            TURN_OFF_LABEL.to_string()
        } else {
            TURN_ON_LABEL.to_string()
        };
    }
}

impl Default for PanelView {
    fn default() -> Self {
        PanelView::new("")
    }
}

fn connect_label(port: &str) -> String {
    format!("Connect to port {}", port)
}

impl fmt::Display for PanelView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "port: {}{} | {}{} | {}{}",
            self.port_label,
            if self.port_selector_enabled { "" } else { " (locked)" },
            if self.connect_checked { "[x] " } else { "[ ] " },
            self.connect_label,
            if self.send_checked { "[x] " } else { "[ ] " },
            self.send_label,
        )
    }
}
