//! revcaps - capability-URL authorization for the admissions review server.
//!
//! Sensitive operations are reached through sealed URLs instead of session
//! cookies. See [`caps`] for the model and [`http`] for mounting it.

pub mod caps;
pub mod config;
pub mod error;
pub mod http;
pub mod metrics;
pub mod telemetry;

pub use caps::{CapServer, CapabilityHandler, HandlerRegistry};
pub use error::{DispatchError, SealError, StartupError};
