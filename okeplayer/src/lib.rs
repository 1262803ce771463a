//! Playback orchestration for OkeBox.
//!
//! This crate owns the "what plays next" decision and the lifecycle of the
//! external media player:
//!
//! - [`select_next`] reads the queue store and the playback
//!   policy and produces the next item: a queued song, a filler (jingle,
//!   sponsor, intro, outro, encore, pause screen) or the idle background.
//! - [`PlaybackController`] is a single spawned task driving the player
//!   through [`TransportDriver`] commands and consuming its telemetry
//!   stream. It is the only writer of the live [`PlaybackSlot`].
//! - [`PlayerEventBus`] relays domain events (state transitions, now
//!   playing snapshots, errors) to the transport boundary.
//!
//! Higher layers must only interact with playback through
//! [`PlayerHandle`], which validates control actions against the observed
//! state before enqueueing them.

mod controller;
mod error;
mod events;
mod selector;
mod slot;
mod transport;

#[cfg(feature = "okeconfig")]
mod config_ext;

pub use controller::{
    ControllerStatus, PlaybackController, PlayerAction, PlayerCommand, PlayerHandle,
};
pub use error::{PlayerError, Result};
pub use events::{PlayerEvent, PlayerEventBus};
pub use selector::{select_next, EncorePolicy, FillerCounters, PlayPolicy, Selection};
pub use slot::{ControllerState, PlaybackSlot, PlayerState};
pub use transport::{SimulatedTransport, Telemetry, TransportDriver};

#[cfg(feature = "okeconfig")]
pub use config_ext::PlayerConfigExt;
