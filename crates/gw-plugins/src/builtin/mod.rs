//! Built-in plugins shipped with the gateway.

pub mod json_repair;
pub mod logging;

pub use logging::LoggingPlugin;
