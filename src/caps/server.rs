//! The capability server: mints capability URLs and dispatches them.
//!
//! [`CapServer`] is the sole entity that seals envelopes. Issuing code
//! (login, comment fetch, password-reset mail) calls one of the `grant*`
//! methods; the cap endpoint calls [`CapServer::dispatch`] for every request
//! under the base path.
//!
//! # Dispatch
//!
//! ```text
//! Received -> Decoded -> HandlerFound -> Dispatched -> Completed
//!                |            |
//!                +------------+--> Rejected (400, Connection: close)
//! ```
//!
//! Rejections carry no body, so a client probing tokens cannot tell which
//! check failed. The reason is logged with the remote address.

use super::codec::Codec;
use super::envelope::{Envelope, encode_payload};
use super::exchange::{reject, remote_addr};
use super::key::KeyMaterial;
use super::kind::CapabilityKind;
use super::registry::HandlerRegistry;
use crate::config::{CapsConfig, validation};
use crate::error::{DispatchError, SealError, StartupError};
use crate::telemetry::{DispatchTimer, spans};
use axum::extract::Request;
use axum::http::{StatusCode, Uri};
use axum::response::Response;
use futures_util::FutureExt;
use serde::Serialize;
use std::panic::AssertUnwindSafe;
use std::time::Duration;
use tracing::{Instrument, debug, error, info, warn};

/// Outcome label recorded for successful dispatches.
const OUTCOME_OK: &str = "ok";

/// Outcome label recorded when a handler panics.
const OUTCOME_PANIC: &str = "panic";

/// Codec + registry bound to a base path.
///
/// Built once before the listener starts and shared behind an `Arc`.
#[derive(Debug)]
pub struct CapServer {
    base_path: String,
    codec: Codec,
    registry: HandlerRegistry,
    log_grants: bool,
}

impl CapServer {
    /// Create a server. `base_path` must start and end with `/`.
    pub fn new(
        base_path: impl Into<String>,
        codec: Codec,
        registry: HandlerRegistry,
    ) -> Result<Self, StartupError> {
        let base_path = base_path.into();
        validation::check_base_path(&base_path)
            .map_err(|_| StartupError::BasePath(base_path.clone()))?;
        Ok(Self {
            base_path,
            codec,
            registry,
            log_grants: true,
        })
    }

    /// Create a server from the `[caps]` config block, loading the key file.
    pub fn from_config(config: &CapsConfig, registry: HandlerRegistry) -> Result<Self, StartupError> {
        let key = KeyMaterial::from_file(&config.key_file)?;
        let codec = Codec::new(&key, config.seal_mode)?;
        info!(
            base_path = %config.base_path,
            key_bits = key.len() * 8,
            seal_mode = config.seal_mode.as_str(),
            handlers = registry.len(),
            "Capability server initialized"
        );
        Ok(Self::new(&config.base_path, codec, registry)?.with_grant_logging(config.log_grants))
    }

    /// Whether granted values and URLs are logged at info level.
    pub fn with_grant_logging(mut self, enabled: bool) -> Self {
        self.log_grants = enabled;
        self
    }

    #[inline]
    pub fn base_path(&self) -> &str {
        &self.base_path
    }

    #[inline]
    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    #[inline]
    pub fn codec(&self) -> &Codec {
        &self.codec
    }

    // ========================================================================
    // Issuing
    // ========================================================================

    /// Mint a capability URL for `key` carrying `value`.
    pub fn grant(&self, key: &str, value: &str) -> Result<String, SealError> {
        self.issue(Envelope::new(key, value))
    }

    /// Mint a capability URL that stops working after `expires_at` (unix
    /// seconds).
    pub fn grant_until(&self, key: &str, value: &str, expires_at: i64) -> Result<String, SealError> {
        self.issue(Envelope::new(key, value).expiring_at(expires_at))
    }

    /// Mint a capability URL valid for `ttl` from now.
    pub fn grant_for(&self, key: &str, value: &str, ttl: Duration) -> Result<String, SealError> {
        let ttl = i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX);
        let expires_at = chrono::Utc::now().timestamp().saturating_add(ttl);
        self.grant_until(key, value, expires_at)
    }

    /// Mint a capability URL whose value is `payload` serialized as JSON.
    pub fn grant_json<T: Serialize + ?Sized>(&self, key: &str, payload: &T) -> Result<String, SealError> {
        let value = encode_payload(payload)?;
        self.grant(key, &value)
    }

    /// Mint a capability URL for a typed kind.
    pub fn grant_kind<K: CapabilityKind>(&self, payload: &K::Payload) -> Result<String, SealError> {
        self.grant_json(K::KEY, payload)
    }

    /// Mint an expiring capability URL for a typed kind.
    pub fn grant_kind_until<K: CapabilityKind>(
        &self,
        payload: &K::Payload,
        expires_at: i64,
    ) -> Result<String, SealError> {
        let value = encode_payload(payload)?;
        self.grant_until(K::KEY, &value, expires_at)
    }

    fn issue(&self, envelope: Envelope) -> Result<String, SealError> {
        if !self.registry.contains(&envelope.key) {
            // Still minted: the issuing side may run without the handler.
            debug!(key = %envelope.key, "Granting capability for unregistered key");
        }
        let url = format!("{}{}", self.base_path, self.codec.seal(&envelope)?);
        self.log_grant(&envelope, &url);
        crate::metrics::record_grant(&envelope.key);
        Ok(url)
    }

    /// Log a capability grant.
    fn log_grant(&self, envelope: &Envelope, url: &str) {
        if self.log_grants {
            info!(
                key = %envelope.key,
                value = %envelope.value,
                expires_at = ?envelope.expires_at,
                url = %url,
                "GRANT"
            );
        } else {
            debug!(key = %envelope.key, "GRANT");
        }
    }

    // ========================================================================
    // Opening and dispatch
    // ========================================================================

    /// Recover the envelope from a request path and check its expiry.
    ///
    /// `path` must start with the base path; anything else is a decode error.
    pub fn open_path(&self, path: &str) -> Result<Envelope, DispatchError> {
        let envelope = self.open_path_unchecked(path)?;
        envelope.check_expiry(chrono::Utc::now().timestamp())?;
        Ok(envelope)
    }

    /// Recover the envelope from a request path without checking expiry.
    pub fn open_path_unchecked(&self, path: &str) -> Result<Envelope, DispatchError> {
        let token = path.strip_prefix(&self.base_path).ok_or_else(|| {
            DispatchError::Decode(format!("path outside {}", self.base_path))
        })?;
        self.codec.open(token)
    }

    /// Open a capability given as an absolute URL or as a bare path.
    ///
    /// Query strings are ignored and expiry is not checked, so expired
    /// capabilities can still be examined.
    pub fn open_url(&self, url: &str) -> Result<Envelope, DispatchError> {
        let uri = url
            .parse::<Uri>()
            .map_err(|e| DispatchError::Decode(format!("invalid URL: {e}")))?;
        self.open_path_unchecked(uri.path())
    }

    /// Handle one request under the base path.
    pub async fn dispatch(&self, request: Request) -> Response {
        let remote = remote_addr(&request);
        let span = spans::cap_request(&remote, request.method().as_str(), &request.uri().to_string());

        async move {
            info!("BEGIN");
            let timer = DispatchTimer::start();
            let (outcome, response) = self.dispatch_inner(&remote, request).await;
            timer.finish(outcome);
            info!(status = response.status().as_u16(), outcome, "END");
            response
        }
        .instrument(span)
        .await
    }

    async fn dispatch_inner(&self, remote: &str, request: Request) -> (&'static str, Response) {
        let envelope = match self.open_path(request.uri().path()) {
            Ok(envelope) => envelope,
            Err(e) => return self.log_rejection(remote, &e),
        };

        let Some(handler) = self.registry.lookup(&envelope.key) else {
            return self.log_rejection(remote, &DispatchError::UnknownHandler(envelope.key));
        };

        info!(key = %envelope.key, "INVOKE");
        debug!(key = %envelope.key, value = %envelope.value, "Capability value");

        match AssertUnwindSafe(handler.call(envelope.value, request))
            .catch_unwind()
            .await
        {
            Ok(response) => (OUTCOME_OK, response),
            Err(panic) => {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "non-string panic payload".to_string());
                error!(
                    remote = %remote,
                    key = %envelope.key,
                    panic = %message,
                    "Capability handler panicked"
                );
                crate::metrics::record_handler_panic(&envelope.key);
                (OUTCOME_PANIC, reject(StatusCode::INTERNAL_SERVER_ERROR))
            }
        }
    }

    /// Log a capability rejection.
    fn log_rejection(&self, remote: &str, e: &DispatchError) -> (&'static str, Response) {
        warn!(remote = %remote, error = %e, code = e.error_code(), "Capability rejected");
        (e.error_code(), reject(e.status()))
    }
}
