//! RPC session management for irislink.
//!
//! This crate turns a raw connection into a usable, authenticated RPC
//! session:
//!
//! 1. **Handshake and auth**: the [`RpcSession`] actor walks the
//!    `Handshaking → Authorizing → ... → Ready` state machine, reusing,
//!    refreshing, or obtaining OAuth tokens as needed.
//! 2. **Credentials**: tokens persist through an injected
//!    [`CredentialStore`]; the HTTPS side of OAuth sits behind
//!    [`TokenEndpoint`].
//! 3. **Subscriptions**: the [`SubscriptionRegistry`] remembers what the
//!    application asked for and replays it after every reconnect.
//!
//! # How it fits in the stack
//!
//! ```text
//! Voice / facade (above)  ← send commands, consume SessionEvents
//!     ↕
//! Session Layer (this crate)  ← state machine, auth, subscriptions
//!     ↕
//! Protocol + Transport (below)  ← frames and bytes
//! ```

mod auth;
mod error;
mod manager;
mod pending;
mod registry;
mod session;
mod store;

pub use auth::{ClientCredentials, HttpTokenEndpoint, OAuthTokens, TokenEndpoint};
pub use error::SessionError;
pub use manager::{ErrorEvent, RpcSession, SessionEvent, SessionHandle};
pub use registry::{Subscription, SubscriptionRegistry};
pub use session::{DEFAULT_SCOPES, DEFAULT_SUBSCRIPTIONS, SessionConfig, SessionState};
pub use store::{
    CredentialStore, JsonFileCredentialStore, MemoryCredentialStore, TokenSet, unix_millis,
};
