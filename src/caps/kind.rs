//! Typed capability kinds.
//!
//! A [`CapabilityKind`] ties a handler key to the payload type its values
//! carry, so issuing code and the handler agree on the payload at compile
//! time instead of by convention.
//!
//! ```ignore
//! struct SetScore;
//! impl CapabilityKind for SetScore {
//!     type Payload = ReviewTarget;
//!     const KEY: &'static str = "setScore";
//! }
//!
//! // issuing side
//! let url = server.grant_kind::<SetScore>(&target)?;
//!
//! // handling side
//! registry.register_kind_post::<SetScore, _, _>(|target, request| async move { ... })?;
//! ```

use super::envelope::payload;
use super::exchange::{reject, remote_addr};
use super::registry::CapabilityHandler;
use async_trait::async_trait;
use axum::extract::Request;
use axum::http::StatusCode;
use axum::response::Response;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::future::Future;
use std::marker::PhantomData;
use tracing::error;

/// Trait for capability kinds.
///
/// Each kind defines:
/// - `Payload`: the structured value sealed into its capabilities
/// - `KEY`: the handler key it registers under
pub trait CapabilityKind: 'static + Send + Sync {
    /// The value type carried inside the envelope (JSON-encoded).
    type Payload: Serialize + DeserializeOwned + Send + 'static;

    /// Handler key (also used for logging).
    const KEY: &'static str;
}

/// Adapts a payload-typed handler to [`CapabilityHandler`].
pub struct Typed<K, F> {
    handler: F,
    _kind: PhantomData<fn() -> K>,
}

impl<K, F> Typed<K, F> {
    pub(super) fn new(handler: F) -> Self {
        Self {
            handler,
            _kind: PhantomData,
        }
    }
}

#[async_trait]
impl<K, F, Fut> CapabilityHandler for Typed<K, F>
where
    K: CapabilityKind,
    F: Fn(K::Payload, Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Response> + Send + 'static,
{
    async fn call(&self, value: String, request: Request) -> Response {
        match payload::<K::Payload>(&value) {
            Ok(decoded) => (self.handler)(decoded, request).await,
            Err(e) => {
                // The value was sealed by this server, so a bad payload is
                // our bug, not the client's.
                error!(
                    remote = %remote_addr(&request),
                    capability = K::KEY,
                    error = %e,
                    "Failed to decode capability payload"
                );
                reject(StatusCode::INTERNAL_SERVER_ERROR)
            }
        }
    }
}
