//! Integration test common infrastructure.
//!
//! Provides utilities for spawning an in-process capability server on an
//! ephemeral port and driving it over real HTTP.

pub mod server;

#[allow(unused_imports)]
pub use server::TestServer;
