pub mod driver;
pub mod scanner;
pub mod session;
pub mod simulated;
