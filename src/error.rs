//! Unified error handling for revcaps.
//!
//! Two families: [`StartupError`] aborts initialization before any request is
//! served, [`DispatchError`] is handled per request by the cap handler and is
//! never shown to the client beyond an opaque 400.

use axum::http::StatusCode;
use thiserror::Error;

// ============================================================================
// Startup Errors (fatal, returned from constructors)
// ============================================================================

/// Errors that prevent the capability server from being constructed.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("key must be 16 or 32 bytes, got {0}")]
    KeyLength(usize),

    #[error("handler {0:?} already registered")]
    RegistrationConflict(String),

    #[error("failed to read key file {path}: {source}")]
    KeyFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("key file {0} is not valid hex")]
    KeyEncoding(String),

    #[error("invalid base path {0:?}: must start and end with '/'")]
    BasePath(String),

    #[error(transparent)]
    Config(#[from] crate::config::ConfigError),
}

// ============================================================================
// Seal Errors (issuing side)
// ============================================================================

/// Errors minting a capability URL.
#[derive(Debug, Error)]
pub enum SealError {
    #[error("failed to serialize payload: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("AEAD encryption failed")]
    Encrypt,
}

// ============================================================================
// Dispatch Errors (per request, always 400 to the client)
// ============================================================================

/// Reasons a capability URL is rejected before any handler runs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    /// The path suffix is not valid URL-safe base64, or is too short to hold
    /// a sealed envelope.
    #[error("malformed token: {0}")]
    Decode(String),

    /// The token decoded but did not authenticate or did not parse into an
    /// envelope.
    #[error("unparseable envelope: {0}")]
    Parse(String),

    #[error("capability for {key:?} expired at {expired_at}")]
    Expired { key: String, expired_at: i64 },

    #[error("no handler for key {0:?}")]
    UnknownHandler(String),
}

impl DispatchError {
    /// Get a static error code string for metrics labeling.
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Decode(_) => "decode",
            Self::Parse(_) => "parse",
            Self::Expired { .. } => "expired",
            Self::UnknownHandler(_) => "unknown_handler",
        }
    }

    /// Status code sent to the client. Every dispatch failure is a client
    /// error and they are deliberately indistinguishable.
    #[inline]
    pub fn status(&self) -> StatusCode {
        StatusCode::BAD_REQUEST
    }
}
