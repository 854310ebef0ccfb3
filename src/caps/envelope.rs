//! The capability envelope: the record sealed into every token.

use crate::error::DispatchError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// A handler key paired with its opaque value.
///
/// Field names on the wire are single letters to keep URLs short. `e` is only
/// present for expiring grants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Envelope {
    /// Which registered handler this capability invokes.
    #[serde(rename = "k")]
    pub key: String,
    /// Handler-defined payload.
    #[serde(rename = "v")]
    pub value: String,
    /// Unix seconds after which the dispatcher refuses the capability.
    #[serde(rename = "e", default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
}

impl Envelope {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            expires_at: None,
        }
    }

    /// Attach an expiry (unix seconds).
    pub fn expiring_at(mut self, expires_at: i64) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// An envelope is still usable during the second it expires at.
    pub fn is_expired_at(&self, now: i64) -> bool {
        matches!(self.expires_at, Some(expires_at) if now > expires_at)
    }

    /// Reject the envelope if it has expired as of `now`.
    pub fn check_expiry(&self, now: i64) -> Result<(), DispatchError> {
        match self.expires_at {
            Some(expires_at) if now > expires_at => Err(DispatchError::Expired {
                key: self.key.clone(),
                expired_at: expires_at,
            }),
            _ => Ok(()),
        }
    }
}

/// Decode a structured value carried inside an envelope.
///
/// Values minted with [`CapServer::grant_json`](super::CapServer::grant_json)
/// are JSON; handlers call this to recover the typed payload.
pub fn payload<T: DeserializeOwned>(value: &str) -> Result<T, serde_json::Error> {
    serde_json::from_str(value)
}

/// Encode a structured value for carrying inside an envelope.
pub fn encode_payload<T: Serialize + ?Sized>(payload: &T) -> Result<String, serde_json::Error> {
    serde_json::to_string(payload)
}
