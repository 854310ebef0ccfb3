//! Handler registry: the fixed table from handler key to handler.
//!
//! Registration happens on a [`RegistryBuilder`] during startup. Building
//! freezes it into a [`HandlerRegistry`], which has no mutating methods and
//! is read concurrently by every request without locking.

use super::exchange::{reject, remote_addr};
use super::kind::{CapabilityKind, Typed};
use crate::error::StartupError;
use async_trait::async_trait;
use axum::extract::Request;
use axum::http::{Method, StatusCode};
use axum::response::Response;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, warn};

/// A server-side operation reachable through a capability.
///
/// The handler receives the value that was passed to `grant` and the live
/// request, and owns the whole response.
#[async_trait]
pub trait CapabilityHandler: Send + Sync + 'static {
    async fn call(&self, value: String, request: Request) -> Response;
}

#[async_trait]
impl<F, Fut> CapabilityHandler for F
where
    F: Fn(String, Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Response> + Send + 'static,
{
    async fn call(&self, value: String, request: Request) -> Response {
        (self)(value, request).await
    }
}

// ============================================================================
// Method guards
// ============================================================================

/// Rejects requests whose method differs from the expected one before the
/// wrapped handler runs.
pub struct MethodGuard<H> {
    method: Method,
    inner: H,
}

/// Only let `method` through to `handler`; everything else gets a 400.
pub fn require_method<H: CapabilityHandler>(method: Method, handler: H) -> MethodGuard<H> {
    MethodGuard {
        method,
        inner: handler,
    }
}

/// Shorthand for the common case: state-changing capabilities must be POSTed.
pub fn post_only<H: CapabilityHandler>(handler: H) -> MethodGuard<H> {
    require_method(Method::POST, handler)
}

#[async_trait]
impl<H: CapabilityHandler> CapabilityHandler for MethodGuard<H> {
    async fn call(&self, value: String, request: Request) -> Response {
        if request.method() != self.method {
            warn!(
                remote = %remote_addr(&request),
                method = %request.method(),
                expected = %self.method,
                uri = %request.uri(),
                "Capability used with wrong method"
            );
            return reject(StatusCode::BAD_REQUEST);
        }
        self.inner.call(value, request).await
    }
}

// ============================================================================
// Registry
// ============================================================================

/// Collects handlers during startup.
#[derive(Default)]
pub struct RegistryBuilder {
    handlers: HashMap<String, Arc<dyn CapabilityHandler>>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` under `key`.
    ///
    /// A key can be registered once; a second registration is a configuration
    /// bug and is reported as [`StartupError::RegistrationConflict`].
    pub fn register<H: CapabilityHandler>(
        &mut self,
        key: impl Into<String>,
        handler: H,
    ) -> Result<&mut Self, StartupError> {
        let key = key.into();
        if self.handlers.contains_key(&key) {
            return Err(StartupError::RegistrationConflict(key));
        }
        debug!(key = %key, "Registered capability handler");
        self.handlers.insert(key, Arc::new(handler));
        Ok(self)
    }

    /// Register a closure. Same as [`register`](Self::register) but lets the
    /// compiler infer the closure's argument types.
    pub fn register_fn<F, Fut>(
        &mut self,
        key: impl Into<String>,
        handler: F,
    ) -> Result<&mut Self, StartupError>
    where
        F: Fn(String, Request) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Response> + Send + 'static,
    {
        self.register(key, handler)
    }

    /// Register a handler that receives the decoded payload of kind `K`.
    pub fn register_kind<K, F, Fut>(&mut self, handler: F) -> Result<&mut Self, StartupError>
    where
        K: CapabilityKind,
        F: Fn(K::Payload, Request) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Response> + Send + 'static,
    {
        self.register(K::KEY, Typed::<K, F>::new(handler))
    }

    /// Register a POST-only handler for payload kind `K`.
    pub fn register_kind_post<K, F, Fut>(&mut self, handler: F) -> Result<&mut Self, StartupError>
    where
        K: CapabilityKind,
        F: Fn(K::Payload, Request) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Response> + Send + 'static,
    {
        self.register(K::KEY, post_only(Typed::<K, F>::new(handler)))
    }

    /// Freeze the registry.
    pub fn build(self) -> HandlerRegistry {
        HandlerRegistry {
            handlers: self.handlers,
        }
    }
}

/// The frozen handler table.
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn CapabilityHandler>>,
}

impl HandlerRegistry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    /// Find the handler for `key`.
    #[inline]
    pub fn lookup(&self, key: &str) -> Option<&Arc<dyn CapabilityHandler>> {
        self.handlers.get(key)
    }

    #[inline]
    pub fn contains(&self, key: &str) -> bool {
        self.handlers.contains_key(key)
    }

    /// Registered keys, sorted.
    pub fn keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        keys.sort_unstable();
        keys
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("keys", &self.keys())
            .finish()
    }
}
