pub mod action;
pub mod led;
pub mod panel;
pub mod serial_connector;
