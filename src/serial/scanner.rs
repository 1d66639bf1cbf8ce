use crate::models::serial_connector::SerialConnector;
use crate::serial::driver::PortDriver;
use log::{debug, error};

/// Enumerate the serial ports currently visible to the host.
///
/// Nothing is cached: every call asks the driver again. An enumeration
/// failure is logged and reported as an empty list.
pub fn scan(driver: &dyn PortDriver) -> Vec<String> {
    let mut ports = match driver.available_ports() {
        Ok(ports) => ports,
        Err(e) => {
            error!("{}", e);
            return Vec::new();
        }
    };

    ports.sort_by_key(|p| port_sort_key(p));
    ports.dedup();
    for p in &ports {
        debug!("PORT: {}", p);
    }
    ports
}

/// Initial selection for the given connector.
pub fn resolve(connector: &SerialConnector, ports: &[String]) -> Option<String> {
    match connector {
        SerialConnector::Auto => ports.first().cloned(),
        SerialConnector::Manual(name) => Some(name.clone()),
    }
}

// ttyACM* first, then ttyUSB*, both by numeric suffix, then the rest by name
fn port_sort_key(name: &str) -> (u8, usize, String) {
    let basename = name.rsplit('/').next().unwrap_or(name);
    if let Some(rest) = basename.strip_prefix("ttyACM") {
        return (0, rest.parse().unwrap_or(usize::MAX), name.to_string());
    }
    if let Some(rest) = basename.strip_prefix("ttyUSB") {
        return (1, rest.parse().unwrap_or(usize::MAX), name.to_string());
    }
    (2, 0, name.to_string())
}
