//! Voice controls and call-state tracking for irislink.
//!
//! Two halves:
//!
//! - [`VoiceController`] sends the local user's voice actions (mute,
//!   deafen, join, leave) through a [`SessionHandle`](irislink_session::SessionHandle).
//! - [`CallStateProjector`] turns the session's event stream into a
//!   [`CallSnapshot`]: idle, ringing, or in a call with a live roster.
//!
//! The projector is synchronous and does no I/O; the facade crate runs
//! it in a task next to the session and executes its [`CallEffect`]s.

mod config;
mod controller;
mod error;
mod projector;
mod state;

pub use config::ProjectorConfig;
pub use controller::{VoiceAction, VoiceController};
pub use error::VoiceError;
pub use projector::{CHANNEL_SCOPED_EVENTS, CallEffect, CallStateProjector};
pub use state::{
    CallMode, CallSnapshot, CallerInfo, LocalVoiceSettings, RingOutcome, RingingCall,
    VoiceChannelState, VoiceUserState,
};
