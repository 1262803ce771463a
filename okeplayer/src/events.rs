//! Player event bus.
//!
//! The core never talks to clients directly: it broadcasts domain events
//! and the transport layer relays them. Events are emitted in the order
//! their causing transition was applied; the bus preserves that order per
//! subscriber.

use std::sync::{Arc, Mutex};

use crossbeam_channel::{Receiver, Sender, unbounded};
use okequeue::EntryId;

use crate::slot::{ControllerState, PlaybackSlot};

/// Domain events published by the playback controller.
#[derive(Debug, Clone)]
pub enum PlayerEvent {
    /// Exactly one per state-machine transition.
    PlaybackStateChanged {
        old: ControllerState,
        new: ControllerState,
    },
    /// A new item was loaded; carries the fresh slot snapshot.
    NowPlayingChanged { slot: PlaybackSlot },
    /// Transport failure; the controller has fallen back to Idle.
    PlaybackError { reason: String },
    /// The playing song has less than the notification threshold left.
    SongNearEnd { entry_id: EntryId },
}

#[derive(Clone, Default)]
pub struct PlayerEventBus {
    subscribers: Arc<Mutex<Vec<Sender<PlayerEvent>>>>,
}

impl PlayerEventBus {
    pub fn new() -> Self {
        Self {
            subscribers: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn subscribe(&self) -> Receiver<PlayerEvent> {
        let (tx, rx) = unbounded::<PlayerEvent>();
        {
            let mut subscribers = self.subscribers.lock().unwrap();
            subscribers.push(tx);
        }
        rx
    }

    pub(crate) fn broadcast(&self, event: PlayerEvent) {
        let mut subscribers = self.subscribers.lock().unwrap();
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }
}
