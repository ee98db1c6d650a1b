//! # irislink
//!
//! Local RPC client for a desktop chat application, with live call-state
//! tracking.
//!
//! irislink finds the chat client's IPC endpoint, performs the handshake
//! and OAuth dance (reusing or refreshing stored tokens when it can),
//! keeps event subscriptions alive across reconnects, and turns the
//! resulting event stream into a [`CallSnapshot`](irislink_voice::CallSnapshot):
//! idle, ringing, or in a call with a roster of who is muted and who is
//! speaking.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use irislink::prelude::*;
//!
//! # async fn run() -> Result<(), IrisError> {
//! let store = JsonFileCredentialStore::open("irislink-tokens.json")?;
//! let client = RpcClient::connect("1234567890", "client-secret", store).await?;
//!
//! let mut calls = client.call_state();
//! while calls.changed().await.is_ok() {
//!     println!("{:?}", calls.borrow().mode);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Layers
//!
//! | Crate | Role |
//! |---|---|
//! | `irislink-transport` | IPC endpoint scan and byte streams |
//! | `irislink-protocol` | framing, commands, typed events |
//! | `irislink-session` | handshake, OAuth, subscriptions, reconnects |
//! | `irislink-voice` | voice controls and call-state projection |

mod client;
mod error;
pub mod logging;
mod pump;

pub use client::{ClientEvent, ConnectOutcome, RpcClient, RpcClientBuilder};
pub use error::IrisError;

pub use irislink_protocol as protocol;
pub use irislink_session as session;
pub use irislink_transport as transport;
pub use irislink_voice as voice;

/// Everything most applications need.
pub mod prelude {
    pub use crate::{ClientEvent, ConnectOutcome, IrisError, RpcClient, RpcClientBuilder};
    pub use irislink_session::{
        CredentialStore, JsonFileCredentialStore, MemoryCredentialStore, SessionConfig,
        SessionState,
    };
    pub use irislink_transport::{EndpointConfig, ReconnectPolicy};
    pub use irislink_voice::{
        CallMode, CallSnapshot, LocalVoiceSettings, ProjectorConfig, RingOutcome, VoiceAction,
        VoiceController,
    };
}
