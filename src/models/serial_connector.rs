use serde::{Deserialize, Serialize};
use std::time::Duration;

/// The remote firmware listens at a fixed rate.
pub const BAUD_RATE: u32 = 9600;
/// `serialport` has a single timeout and applies it to reads. Writes are not
/// bounded: a single byte goes straight to the OS buffer.
pub const READ_TIMEOUT: Duration = Duration::from_secs(2);
/// Time the device gets to settle after the port is opened or closed.
pub const SETTLE_DELAY: Duration = Duration::from_millis(10);

/// How the initial port selection is made.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SerialConnector {
    // preselect the first serial port found
    #[default]
    Auto,
    // manually specify the serial port
    Manual(String),
}

/// Parameters used to open a port.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortSettings {
    pub port_name: String,
    pub baud_rate: u32,
    pub read_timeout: Duration,
}

impl PortSettings {
    pub fn new(port_name: impl Into<String>) -> Self {
        PortSettings {
            port_name: port_name.into(),
            baud_rate: BAUD_RATE,
            read_timeout: READ_TIMEOUT,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_use_fixed_link_parameters() {
        let settings = PortSettings::new("COM5");
        assert_eq!(settings.port_name, "COM5");
        assert_eq!(settings.baud_rate, 9600);
        assert_eq!(settings.read_timeout, Duration::from_secs(2));
    }
}
