//! In-memory serial devices.
//!
//! Every listed port opens successfully unless it was marked busy; the bytes
//! written to a port are recorded and can be inspected with [`SimulatedDriver::written`].

use crate::error::{LedSerialError, Result};
use crate::models::serial_connector::PortSettings;
use crate::serial::driver::{PortDriver, SerialLink};
use std::collections::{HashMap, HashSet};
use std::io::{self, Write};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Default)]
struct Devices {
    ports: Vec<String>,
    busy: HashSet<String>,
    broken: HashSet<String>,
    written: HashMap<String, Vec<u8>>,
    opened: usize,
}

#[derive(Clone, Default)]
pub struct SimulatedDriver {
    devices: Arc<Mutex<Devices>>,
}

impl SimulatedDriver {
    pub fn new<I, S>(ports: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let driver = SimulatedDriver::default();
        driver.devices().ports = ports.into_iter().map(Into::into).collect();
        driver
    }

    /// opening `port` fails as if another process held it
    pub fn set_busy(&self, port: &str, busy: bool) {
        let mut devices = self.devices();
        if busy {
            devices.busy.insert(port.to_string());
        } else {
            devices.busy.remove(port);
        }
    }

    /// writes to `port` fail as if the device was unplugged
    pub fn set_broken(&self, port: &str, broken: bool) {
        let mut devices = self.devices();
        if broken {
            devices.broken.insert(port.to_string());
        } else {
            devices.broken.remove(port);
        }
    }

    /// every byte written to `port` so far
    pub fn written(&self, port: &str) -> Vec<u8> {
        self.devices().written.get(port).cloned().unwrap_or_default()
    }

    /// number of successful opens across all ports
    pub fn open_count(&self) -> usize {
        self.devices().opened
    }

    fn devices(&self) -> MutexGuard<'_, Devices> {
        self.devices.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl PortDriver for SimulatedDriver {
    fn available_ports(&self) -> Result<Vec<String>> {
        Ok(self.devices().ports.clone())
    }

    fn open(&self, settings: &PortSettings) -> Result<Box<dyn SerialLink>> {
        let mut devices = self.devices();
        let name = settings.port_name.as_str();
        if !devices.ports.iter().any(|p| p == name) {
            return Err(LedSerialError::port_open(name, "No such file or directory"));
        }
        if devices.busy.contains(name) {
            return Err(LedSerialError::port_open(name, "Device or resource busy"));
        }
        devices.opened += 1;
        Ok(Box::new(SimulatedLink {
            port: name.to_string(),
            devices: self.devices.clone(),
        }))
    }
}

struct SimulatedLink {
    port: String,
    devices: Arc<Mutex<Devices>>,
}

impl Write for SimulatedLink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut devices = self.devices.lock().unwrap_or_else(PoisonError::into_inner);
        if devices.broken.contains(&self.port) {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "device removed"));
        }
        devices
            .written
            .entry(self.port.clone())
            .or_default()
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
