//! Capability URLs: stateless authorization by possession.
//!
//! A capability is a URL that both names a server-side operation and
//! authorizes a call to it with one fixed argument. The server keeps no
//! record of what it has granted; the URL carries an encrypted envelope and
//! whoever presents it may exercise it.
//!
//! # Architecture
//!
//! The system has four core components:
//!
//! 1. **[`Envelope`]** - The `{key, value, expiry}` record sealed into a token.
//!
//! 2. **[`Codec`]** - AES-GCM sealing and opening of envelopes, keyed by
//!    [`KeyMaterial`].
//!
//! 3. **[`HandlerRegistry`]** - Write-once table from handler key to
//!    [`CapabilityHandler`], built with a [`RegistryBuilder`].
//!
//! 4. **[`CapServer`]** - Grants URLs and dispatches incoming ones to their
//!    handlers.
//!
//! # Security Properties
//!
//! - Tokens are authenticated: any modification is rejected before dispatch
//! - Every rejection is an identical body-less 400
//! - No revocation: a leaked URL works until its payload or envelope expiry
//!   says otherwise, or the key is rotated
//! - All grants and dispatches are logged for audit
//!
//! # Usage
//!
//! ```ignore
//! let mut registry = HandlerRegistry::builder();
//! registry.register("data", data_handler)?;
//! registry.register("setScore", post_only(set_score_handler))?;
//! let server = Arc::new(CapServer::from_config(&config.caps, registry.build())?);
//!
//! // after checking a password:
//! let apps_cap = server.grant("data", &username)?;
//! ```

mod codec;
mod envelope;
mod exchange;
mod key;
mod kind;
mod registry;
mod server;

pub use codec::{Codec, NONCE_LEN, SealMode, TAG_LEN};
pub use envelope::{Envelope, encode_payload, payload};
pub use exchange::{reject, remote_addr};
pub use key::{KEY_LENGTHS, KeyMaterial};
pub use kind::{CapabilityKind, Typed};
pub use registry::{
    CapabilityHandler, HandlerRegistry, MethodGuard, RegistryBuilder, post_only, require_method,
};
pub use server::CapServer;
