//! Next-item selection.
//!
//! `select_next` is the only place that decides what plays next. It reads
//! the queue store under its lock scope and a set of counters owned by the
//! playback controller, so a selection never observes a half-applied queue
//! mutation and never mutates anything besides the counters (plus the
//! round-reset / refusal side effects documented on the store).

use std::sync::Arc;

use okemedia::{MediaCatalog, MediaInfo, MediaType};
use okequeue::{QueueEntry, QueueStore};
use rand::prelude::*;
use tracing::{debug, warn};

use crate::error::Result;

/// Encore behaviour once the queue is exhausted.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EncorePolicy {
    pub enabled: bool,
    /// Chance that an encore actually plays, in `[0, 1]`.
    pub probability: f64,
}

impl Default for EncorePolicy {
    fn default() -> Self {
        Self {
            enabled: false,
            probability: 0.5,
        }
    }
}

/// Recognized playback policy options.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayPolicy {
    /// A jingle plays every N songs. 0 disables jingles.
    pub jingle_interval: u32,
    /// A sponsor spot plays every N songs. 0 disables sponsors.
    pub sponsor_interval: u32,
    /// Enables the session intro and caps its length in seconds.
    pub intro_duration: Option<u32>,
    /// Enables the session outro and caps its length in seconds.
    pub outro_duration: Option<u32>,
    pub encore: EncorePolicy,
    /// Restart the round when the playlist is exhausted.
    pub repeat_playlist: bool,
    /// Per-user submission quota, `None` = unlimited (enforced by the store).
    pub quota_per_user: Option<u32>,
    /// Operator-paced mode: hold on the pause screen after each song.
    pub classic_mode: bool,
    /// Re-select immediately after a transport error instead of idling.
    pub auto_restart: bool,
    /// Seconds to wait for a load acknowledgement.
    pub load_timeout_secs: u64,
}

impl Default for PlayPolicy {
    fn default() -> Self {
        Self {
            jingle_interval: 20,
            sponsor_interval: 50,
            intro_duration: None,
            outro_duration: None,
            encore: EncorePolicy::default(),
            repeat_playlist: false,
            quota_per_user: None,
            classic_mode: false,
            auto_restart: false,
            load_timeout_secs: 10,
        }
    }
}

/// Counters read and advanced across selections.
///
/// Owned by the playback controller; they survive stop/start within a
/// session so filler cadence is not reset by an operator pause.
#[derive(Debug, Clone, Copy, Default)]
pub struct FillerCounters {
    pub songs_since_jingle: u32,
    pub songs_since_sponsor: u32,
    pub songs_played: u64,
    pub intro_played: bool,
    pub encore_played: bool,
    pub outro_played: bool,
}

/// Outcome of a selection.
#[derive(Debug, Clone)]
pub enum Selection {
    /// A queued song, with its resolved media.
    Song {
        entry: QueueEntry,
        media: MediaInfo,
    },
    /// Filler media (jingle, sponsor, intro, outro, encore, background).
    Filler { media: MediaInfo, kind: MediaType },
    /// Nothing playable at all (empty queue and no background media).
    Nothing,
}

/// Decide the next item to play.
///
/// Ordering guarantees: jingles take priority over sponsors on the same
/// tick (both counters still advance on every song, so the sponsor fires
/// on the next check); songs play in ascending position order, making the
/// queue a strict FIFO per round; Background never advances the filler
/// counters.
pub async fn select_next(
    store: &QueueStore,
    catalog: &Arc<dyn MediaCatalog>,
    policy: &PlayPolicy,
    counters: &mut FillerCounters,
) -> Result<Selection> {
    let Some(current) = store.current_playlist().await else {
        debug!("No current playlist, selecting background");
        return Ok(background_or_nothing(catalog));
    };
    let playlist_id = current.id.clone();

    // Session intro, once, before the first song ever plays
    if !counters.intro_played
        && counters.songs_played == 0
        && policy.intro_duration.unwrap_or(0) > 0
        && store.next_unplayed(&playlist_id).await?.is_some()
    {
        if let Some(media) = pick_filler(catalog, MediaType::Intro) {
            counters.intro_played = true;
            return Ok(Selection::Filler {
                media,
                kind: MediaType::Intro,
            });
        }
    }

    // Jingle wins over sponsor when both intervals lapse on the same tick
    if policy.jingle_interval > 0 && counters.songs_since_jingle >= policy.jingle_interval {
        counters.songs_since_jingle = 0;
        match pick_filler(catalog, MediaType::Jingle) {
            Some(media) => {
                return Ok(Selection::Filler {
                    media,
                    kind: MediaType::Jingle,
                })
            }
            None => warn!("Jingle interval lapsed but no jingle media in catalog"),
        }
    }

    if policy.sponsor_interval > 0 && counters.songs_since_sponsor >= policy.sponsor_interval {
        counters.songs_since_sponsor = 0;
        match pick_filler(catalog, MediaType::Sponsor) {
            Some(media) => {
                return Ok(Selection::Filler {
                    media,
                    kind: MediaType::Sponsor,
                })
            }
            None => warn!("Sponsor interval lapsed but no sponsor media in catalog"),
        }
    }

    // FIFO by position; entries whose media vanished are refused and skipped
    if let Some(selection) = take_next_song(store, catalog, &playlist_id, counters).await? {
        return Ok(selection);
    }

    // Round reset: replayed entries come back, refused ones stay dead
    if policy.repeat_playlist {
        let reset = store.reset_round(&playlist_id).await?;
        if reset > 0 {
            debug!(playlist = %playlist_id, reset, "Round reset, playlist repeats");
            if let Some(selection) =
                take_next_song(store, catalog, &playlist_id, counters).await?
            {
                return Ok(selection);
            }
        }
    }

    // Queue exhausted: session tail (encore, then outro), at most once each
    if counters.songs_played > 0 {
        if policy.encore.enabled && !counters.encore_played {
            counters.encore_played = true;
            if rand::rng().random_bool(policy.encore.probability.clamp(0.0, 1.0)) {
                if let Some(media) = pick_filler(catalog, MediaType::Encore) {
                    return Ok(Selection::Filler {
                        media,
                        kind: MediaType::Encore,
                    });
                }
            }
        }

        if policy.outro_duration.unwrap_or(0) > 0 && !counters.outro_played {
            counters.outro_played = true;
            if let Some(media) = pick_filler(catalog, MediaType::Outro) {
                return Ok(Selection::Filler {
                    media,
                    kind: MediaType::Outro,
                });
            }
        }
    }

    Ok(background_or_nothing(catalog))
}

/// Pop the next unplayed song, refusing entries whose media cannot be
/// resolved anymore so a stale id never wedges the loop.
async fn take_next_song(
    store: &QueueStore,
    catalog: &Arc<dyn MediaCatalog>,
    playlist_id: &okequeue::PlaylistId,
    counters: &mut FillerCounters,
) -> Result<Option<Selection>> {
    while let Some(entry) = store.next_unplayed(playlist_id).await? {
        match catalog.lookup(&entry.media_id) {
            Some(media) => {
                counters.songs_since_jingle += 1;
                counters.songs_since_sponsor += 1;
                counters.songs_played += 1;
                return Ok(Some(Selection::Song { entry, media }));
            }
            None => {
                store.refuse_unresolvable(&entry.id).await?;
            }
        }
    }
    Ok(None)
}

fn pick_filler(catalog: &Arc<dyn MediaCatalog>, kind: MediaType) -> Option<MediaInfo> {
    let pool = catalog.media_of_type(kind);
    pool.choose(&mut rand::rng()).cloned()
}

fn background_or_nothing(catalog: &Arc<dyn MediaCatalog>) -> Selection {
    match pick_filler(catalog, MediaType::Background) {
        Some(media) => Selection::Filler {
            media,
            kind: MediaType::Background,
        },
        None => Selection::Nothing,
    }
}
