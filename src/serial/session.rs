use crate::error::{LedSerialError, Result};
use crate::models::action::{Action, PortStatus};
use crate::models::serial_connector::{PortSettings, SETTLE_DELAY};
use crate::serial::driver::{PortDriver, SerialLink};
use log::{info, warn};
use std::io::Write;
use std::sync::Arc;
use tokio::sync::broadcast::Sender;

/// Owns at most one open serial port.
///
/// Status is reported on the action channel: `Action::Status` after every
/// open attempt and `Action::Closed` after every effective close. The handle
/// is created fresh by each `open` and dropped by `close`.
pub struct SerialSession {
    driver: Arc<dyn PortDriver>,
    tx: Sender<Action>,
    port_name: String,
    link: Option<Box<dyn SerialLink>>,
    close_requested: bool,
    attempt: u64,
    last_status: Option<PortStatus>,
}

impl SerialSession {
    pub fn new(driver: Arc<dyn PortDriver>, tx: Sender<Action>) -> Self {
        SerialSession {
            driver,
            tx,
            port_name: String::new(),
            link: None,
            close_requested: false,
            attempt: 0,
            last_status: None,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.link.is_some()
    }

    /// name of the open port, or of the last one tried
    pub fn port_name(&self) -> &str {
        &self.port_name
    }

    /// connect attempt of the open port, or of the last one tried
    pub fn attempt(&self) -> u64 {
        self.attempt
    }

    /// status reported by the last open that reached the driver
    pub fn last_status(&self) -> Option<&PortStatus> {
        self.last_status.as_ref()
    }

    /// Open `port_name` at the fixed link settings. Blocks for the duration
    /// of the OS call plus the settle delay.
    pub fn open(&mut self, port_name: &str) -> Result<()> {
        self.open_attempt(port_name, 0)
    }

    /// Same as `open`, tagging the status with the caller's attempt number.
    pub fn open_attempt(&mut self, port_name: &str, attempt: u64) -> Result<()> {
        if self.is_connected() {
            warn!(
                "Port {} is still open, not opening {}",
                self.port_name, port_name
            );
            return Err(LedSerialError::AlreadyOpen(self.port_name.clone()));
        }

        self.port_name = port_name.to_string();
        self.attempt = attempt;
        let result = self.driver.open(&PortSettings::new(port_name));
        let (status, outcome) = match result {
            Ok(link) => {
                self.link = Some(link);
                self.close_requested = false;
                info!("Port {} opened.", port_name);
                (PortStatus::opened(port_name, attempt), Ok(()))
            }
            Err(e) => {
                info!("Error with port {}.", port_name);
                (PortStatus::failed(port_name, attempt), Err(e))
            }
        };
        self.last_status = Some(status.clone());
        self.notify(Action::Status(status));
        std::thread::sleep(SETTLE_DELAY);
        outcome
    }

    /// Write a single character. Failures are logged, never returned.
    pub fn write(&mut self, ch: char) {
        match self.try_write(ch) {
            Ok(()) => info!("Written {} on port {}.", ch, self.port_name),
            Err(e) => {
                info!("Could not write {} on port {}.", ch, self.port_name);
                warn!("{}", e);
            }
        }
    }

    fn try_write(&mut self, ch: char) -> Result<()> {
        let link = self
            .link
            .as_mut()
            .ok_or_else(|| LedSerialError::NotOpen(self.port_name.clone()))?;
        let mut buffer = [0; 4];
        link.write_all(ch.encode_utf8(&mut buffer).as_bytes())?;
        link.flush()?;
        Ok(())
    }

    pub fn request_close(&mut self) {
        self.close_requested = true;
    }

    /// Close the port if a close was requested and a port is open; a no-op
    /// otherwise.
    pub fn close(&mut self) {
        if self.close_requested && self.is_connected() {
            self.link = None;
            std::thread::sleep(SETTLE_DELAY);
            info!("Port {} closed.", self.port_name);
            self.notify(Action::Closed(self.port_name.clone()));
        }
        info!("Killing the serial worker");
    }

    fn notify(&self, action: Action) {
        // no subscribers is fine
        let _ = self.tx.send(action);
    }
}
