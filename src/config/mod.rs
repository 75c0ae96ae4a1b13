//! Configuration Management
//!
//! Unified configuration system with hierarchical resolution:
//! 1. Built-in defaults
//! 2. Global config (`<config dir>/bookbuddy/config.toml`)
//! 3. Project config (`.bookbuddy/config.toml`)
//! 4. Environment variables (`BOOKBUDDY_*`)
//! 5. CLI arguments (highest priority)

mod loader;
mod types;

pub use loader::ConfigLoader;
pub use types::*;
