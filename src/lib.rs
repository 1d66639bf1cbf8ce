//! Toggle a remote LED over a serial port.
//!
//! [`led_serial::LedSerial`] is the entry point: it scans the serial ports,
//! opens the selected one on a background task and writes single-character
//! commands to it. Everything it does is reported as [`models::action::Action`]
//! values on a `tokio` broadcast channel.

pub mod error;
pub mod led_serial;
pub mod models;
pub mod serial;
