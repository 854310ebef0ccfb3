//! Capability sealing configuration.

use serde::Deserialize;

use super::types::default_true;
use crate::caps::SealMode;

/// The `[caps]` block.
#[derive(Debug, Clone, Deserialize)]
pub struct CapsConfig {
    /// Mount prefix for capability URLs (default: "/caps/").
    #[serde(default = "default_base_path")]
    pub base_path: String,
    /// Path to the key file (raw 16/32 bytes, or the same bytes hex-encoded).
    pub key_file: String,
    /// Nonce policy for sealing.
    #[serde(default)]
    pub seal_mode: SealMode,
    /// Log granted values and URLs at info level (default: true).
    /// Granted URLs are bearer credentials; disable in deployments that ship
    /// logs off-host.
    #[serde(default = "default_true")]
    pub log_grants: bool,
}

fn default_base_path() -> String {
    "/caps/".to_string()
}
