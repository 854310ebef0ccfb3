//! Configuration loading and management.
//!
//! This module is split into logical submodules:
//! - [`types`]: Top-level config struct and the `[server]` block
//! - [`caps`]: The `[caps]` block (base path, key file, seal mode)
//! - [`validation`]: Startup checks that report every problem at once

mod caps;
mod types;
pub mod validation;

pub use caps::CapsConfig;
pub use types::{Config, ConfigError, LogFormat, ServerConfig};
pub use validation::{ValidationError, validate};
