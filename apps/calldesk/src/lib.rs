//! Real-time client core for the crisis call-center dashboard.

pub mod board;
pub mod config;
pub mod connection;
pub mod session;
pub mod telemetry;

pub use config::Config;
pub use connection::{ConnectionManager, ConnectionStatus, ReconnectPolicy};
pub use session::{Session, SessionError, SessionHandle, SessionOptions};

#[cfg(test)]
mod tests;
