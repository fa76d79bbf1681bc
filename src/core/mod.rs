/*!
 * Core Module
 * Fundamental types, configuration and error handling
 */

pub mod config;
pub mod errors;
pub mod types;

// Re-export for convenience
pub use config::{Config, ConfigError, ProcessConfig, SocketConfig};
pub use errors::{Error, Result};
pub use types::*;
