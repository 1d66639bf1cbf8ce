use crate::error::{LedSerialError, Result};
use crate::models::serial_connector::PortSettings;
use log::debug;
use std::io::Write;

/// An open serial handle. Only writing is needed, nothing is read back.
pub trait SerialLink: Write + Send {}

impl<T: Write + Send> SerialLink for T {}

/// Access to the serial devices of the host.
pub trait PortDriver: Send + Sync {
    /// names of the currently visible serial devices
    fn available_ports(&self) -> Result<Vec<String>>;

    /// open a fresh handle for `settings.port_name`
    fn open(&self, settings: &PortSettings) -> Result<Box<dyn SerialLink>>;
}

/// Driver backed by the operating system through the `serialport` crate.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemDriver;

impl PortDriver for SystemDriver {
    fn available_ports(&self) -> Result<Vec<String>> {
        let ports =
            serialport::available_ports().map_err(|e| LedSerialError::Scan(e.to_string()))?;
        debug!("Number of ports: {}", ports.len());
        Ok(ports.into_iter().map(|p| p.port_name).collect())
    }

    fn open(&self, settings: &PortSettings) -> Result<Box<dyn SerialLink>> {
        let port = serialport::new(settings.port_name.as_str(), settings.baud_rate)
            .timeout(settings.read_timeout)
            .open()
            .map_err(|e| LedSerialError::port_open(settings.port_name.as_str(), e.to_string()))?;
        Ok(Box::new(port))
    }
}
