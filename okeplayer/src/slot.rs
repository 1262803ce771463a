//! Live playback state owned by the controller.

use std::fmt;

use okemedia::{MediaInfo, MediaType};
use okequeue::EntryId;
use serde::{Deserialize, Serialize};

/// Externally visible transport state of the player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlayerState {
    Stopped,
    Paused,
    Playing,
}

impl fmt::Display for PlayerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PlayerState::Stopped => "stopped",
            PlayerState::Paused => "paused",
            PlayerState::Playing => "playing",
        };
        f.write_str(s)
    }
}

/// Internal state of the playback controller.
///
/// `Stopping` is the observable "stop requested while a load is in
/// flight" state: the controller never abandons a pending load silently,
/// it waits for the acknowledgement (or its timeout) and then stops.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControllerState {
    Idle,
    Loading,
    Playing,
    Paused,
    Stopping,
}

impl fmt::Display for ControllerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ControllerState::Idle => "idle",
            ControllerState::Loading => "loading",
            ControllerState::Playing => "playing",
            ControllerState::Paused => "paused",
            ControllerState::Stopping => "stopping",
        };
        f.write_str(s)
    }
}

/// The single live "now playing" slot.
///
/// Re-created on every transport load; never persisted, never outlives a
/// single media load.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaybackSlot {
    /// Queue entry being played, when the media is a song.
    pub active_entry: Option<EntryId>,
    /// Metadata of the loaded media.
    pub media: MediaInfo,
    pub media_type: MediaType,
    pub player_state: PlayerState,
    /// Seconds, from telemetry.
    pub time_position: f64,
    /// Seconds; falls back to the catalog duration until telemetry reports.
    pub duration: f64,
    /// Cleared on every new load.
    pub eof_reached: bool,
    pub volume: u16,
    pub muted: bool,
}

impl PlaybackSlot {
    pub(crate) fn new(
        media: MediaInfo,
        active_entry: Option<EntryId>,
        volume: u16,
        muted: bool,
    ) -> Self {
        let media_type = media.media_type;
        let duration = media.duration_secs as f64;
        Self {
            active_entry,
            media,
            media_type,
            player_state: PlayerState::Stopped,
            time_position: 0.0,
            duration,
            eof_reached: false,
            volume,
            muted,
        }
    }
}
