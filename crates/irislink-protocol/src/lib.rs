//! Wire protocol for the chat client's local RPC.
//!
//! This crate defines what travels over the IPC channel:
//!
//! - **Framing** ([`FrameCodec`], [`FrameDecoder`]): the 8-byte header
//!   plus JSON payload, and reassembly from arbitrarily chunked reads.
//! - **Types** ([`Opcode`], [`Frame`], [`Nonce`], [`IncomingMessage`]):
//!   the envelope shared by commands, replies, and events.
//! - **Commands** ([`RpcCommand`], [`Handshake`]): everything we send.
//! - **Events** ([`RpcEvent`]): typed views of what we receive.
//!
//! # Architecture
//!
//! ```text
//! Transport (bytes) → Protocol (Frame / IncomingMessage) → Session (state machine)
//! ```
//!
//! Nothing here touches a socket or keeps state beyond the decoder's
//! buffer.

// ---------------------------------------------------------------------------
// Module declarations
// ---------------------------------------------------------------------------

mod codec;
mod command;
mod error;
mod event;
mod types;

// ---------------------------------------------------------------------------
// Re-exports
// ---------------------------------------------------------------------------

pub use codec::{DEFAULT_MAX_FRAME_LEN, FrameCodec, FrameDecoder, HEADER_LEN};
pub use command::{
    AuthenticateArgs, AuthorizeArgs, Handshake, RpcCommand, SelectVoiceChannelArgs,
    VoiceSettingsArgs,
};
pub use error::ProtocolError;
pub use event::{
    CALL_MESSAGE_TYPE, Notification, NotificationMessage, RpcEvent, RpcUser,
    SelectedVoiceChannel, Speaking, VoiceChannelSelect, VoiceSettings, VoiceStateFlags,
    VoiceStatePayload, names,
};
pub use types::{
    CommandKind, Frame, IncomingMessage, Nonce, Opcode, OutgoingCommand, RemoteError,
};
