//! Playback controller.
//!
//! One spawned task owns the live playback slot and the external player:
//! it is the only issuer of transport commands and the single consumer of
//! the telemetry channel, which removes interleaved command races with the
//! player process. Client mutations never touch the controller directly;
//! they go through the queue store, and the controller re-reads the store
//! (via the selector) whenever it needs the next item.
//!
//! The controller tracks one pending transport command at a time. A load
//! in flight is never abandoned silently: stop and skip requests received
//! while Loading are deferred until the acknowledgement (or its timeout)
//! resolves, then applied.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use okemedia::{MediaCatalog, MediaInfo, MediaType};
use okequeue::{QueueEntry, QueueStore};
use rand::prelude::*;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::error::{PlayerError, Result};
use crate::events::{PlayerEvent, PlayerEventBus};
use crate::selector::{select_next, FillerCounters, PlayPolicy, Selection};
use crate::slot::{ControllerState, PlaybackSlot, PlayerState};
use crate::transport::{Telemetry, TransportDriver};

/// Remaining song seconds below which `SongNearEnd` fires.
const NEAR_END_SECS: f64 = 15.0;

/// Command channel depth; commands are tiny and drained quickly.
const COMMAND_CHANNEL_SIZE: usize = 32;

/// Commands sent to the playback loop.
#[derive(Debug)]
pub enum PlayerCommand {
    Start,
    Pause,
    Resume,
    Skip,
    Stop,
    Seek(f64),
    SetVolume(u16),
    SetMute(bool),
    Shutdown,
}

/// Transport-control actions exposed to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerAction {
    Start,
    Pause,
    Resume,
    Skip,
    Stop,
}

impl PlayerAction {
    fn as_str(&self) -> &'static str {
        match self {
            PlayerAction::Start => "start",
            PlayerAction::Pause => "pause",
            PlayerAction::Resume => "resume",
            PlayerAction::Skip => "skip",
            PlayerAction::Stop => "stop",
        }
    }
}

/// Snapshot of the controller state published to handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControllerStatus {
    pub state: ControllerState,
    /// Classic mode: a song finished and the loop holds on the pause
    /// screen until the operator starts the next one.
    pub awaiting_operator: bool,
}

/// Client-side handle: validated control surface plus a state mirror.
#[derive(Clone)]
pub struct PlayerHandle {
    tx: mpsc::Sender<PlayerCommand>,
    status_rx: watch::Receiver<ControllerStatus>,
}

impl PlayerHandle {
    /// Current controller status (may lag the loop by one message).
    pub fn status(&self) -> ControllerStatus {
        *self.status_rx.borrow()
    }

    /// Watch stream of status changes, for callers that need to await a
    /// specific state.
    pub fn status_stream(&self) -> watch::Receiver<ControllerStatus> {
        self.status_rx.clone()
    }

    /// Validated playback control: rejects actions that are illegal in the
    /// observed state with `InvalidTransition`.
    pub async fn control(&self, action: PlayerAction) -> Result<()> {
        let status = self.status();
        let valid = match action {
            PlayerAction::Start => {
                status.state == ControllerState::Idle || status.awaiting_operator
            }
            PlayerAction::Pause => status.state == ControllerState::Playing,
            PlayerAction::Resume => status.state == ControllerState::Paused,
            PlayerAction::Skip => matches!(
                status.state,
                ControllerState::Playing | ControllerState::Paused | ControllerState::Loading
            ),
            PlayerAction::Stop => status.state != ControllerState::Idle,
        };
        if !valid {
            return Err(PlayerError::InvalidTransition {
                action: action.as_str().to_string(),
                state: status.state.to_string(),
            });
        }

        let command = match action {
            PlayerAction::Start => PlayerCommand::Start,
            PlayerAction::Pause => PlayerCommand::Pause,
            PlayerAction::Resume => PlayerCommand::Resume,
            PlayerAction::Skip => PlayerCommand::Skip,
            PlayerAction::Stop => PlayerCommand::Stop,
        };
        self.send(command).await
    }

    /// Seek within the current media. Ignored unless something is loaded.
    pub async fn seek(&self, position_secs: f64) -> Result<()> {
        self.send(PlayerCommand::Seek(position_secs)).await
    }

    pub async fn set_volume(&self, volume: u16) -> Result<()> {
        self.send(PlayerCommand::SetVolume(volume)).await
    }

    pub async fn set_mute(&self, mute: bool) -> Result<()> {
        self.send(PlayerCommand::SetMute(mute)).await
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.send(PlayerCommand::Shutdown).await
    }

    async fn send(&self, command: PlayerCommand) -> Result<()> {
        self.tx
            .send(command)
            .await
            .map_err(|_| PlayerError::ControllerGone)
    }
}

/// Handle to the spawned playback task.
pub struct PlaybackController {
    join_handle: JoinHandle<()>,
}

impl PlaybackController {
    /// Spawn the playback loop.
    ///
    /// `telemetry_rx` is the single-consumer stream produced by the
    /// transport driver; the controller takes exclusive ownership of it.
    pub fn spawn(
        store: QueueStore,
        catalog: Arc<dyn MediaCatalog>,
        transport: Arc<dyn TransportDriver>,
        telemetry_rx: mpsc::Receiver<Telemetry>,
        policy: PlayPolicy,
        bus: PlayerEventBus,
    ) -> (Self, PlayerHandle) {
        let (tx, rx) = mpsc::channel(COMMAND_CHANNEL_SIZE);
        let (status_tx, status_rx) = watch::channel(ControllerStatus {
            state: ControllerState::Idle,
            awaiting_operator: false,
        });

        let controller = ControllerLoop {
            store,
            catalog,
            transport,
            policy,
            bus,
            status_tx,
            state: ControllerState::Idle,
            slot: None,
            generation: 0,
            counters: FillerCounters::default(),
            deferred: None,
            load_retried: false,
            awaiting_operator: false,
            near_end_sent: false,
            volume: 100,
            muted: false,
            shutdown: false,
        };

        let join_handle = tokio::spawn(async move {
            controller.run(rx, telemetry_rx).await;
        });

        (Self { join_handle }, PlayerHandle { tx, status_rx })
    }

    /// Wait for the playback loop to terminate.
    pub async fn wait(self) -> anyhow::Result<()> {
        if let Err(err) = self.join_handle.await {
            if err.is_cancelled() {
                warn!("Playback task cancelled: {err}");
                return Ok(());
            }
            return Err(anyhow::anyhow!("Playback task join error: {}", err));
        }
        Ok(())
    }
}

/// Stop or skip request received while a load was in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DeferredAction {
    Skip,
    Stop,
}

#[derive(Debug)]
enum LoadFailure {
    Timeout(Duration),
    Error(String),
}

type LoadJob = JoinHandle<std::result::Result<(), LoadFailure>>;

enum Wake {
    Command(Option<PlayerCommand>),
    Telemetry(Option<Telemetry>),
    LoadResolved(std::result::Result<(), LoadFailure>),
}

struct ControllerLoop {
    store: QueueStore,
    catalog: Arc<dyn MediaCatalog>,
    transport: Arc<dyn TransportDriver>,
    policy: PlayPolicy,
    bus: PlayerEventBus,
    status_tx: watch::Sender<ControllerStatus>,

    state: ControllerState,
    slot: Option<PlaybackSlot>,
    /// Incremented on every transport load; telemetry carrying an older
    /// generation is discarded.
    generation: u64,
    counters: FillerCounters,
    deferred: Option<DeferredAction>,
    load_retried: bool,
    awaiting_operator: bool,
    near_end_sent: bool,
    volume: u16,
    muted: bool,
    shutdown: bool,
}

impl ControllerLoop {
    async fn run(
        mut self,
        mut rx: mpsc::Receiver<PlayerCommand>,
        mut telemetry_rx: mpsc::Receiver<Telemetry>,
    ) {
        info!("Starting playback controller");
        let mut pending_load: Option<LoadJob> = None;

        loop {
            let wake = if let Some(job) = pending_load.as_mut() {
                tokio::select! {
                    cmd = rx.recv() => Wake::Command(cmd),
                    report = telemetry_rx.recv() => Wake::Telemetry(report),
                    res = job => Wake::LoadResolved(match res {
                        Ok(inner) => inner,
                        Err(join_err) => {
                            Err(LoadFailure::Error(format!("load task failed: {join_err}")))
                        }
                    }),
                }
            } else {
                tokio::select! {
                    cmd = rx.recv() => Wake::Command(cmd),
                    report = telemetry_rx.recv() => Wake::Telemetry(report),
                }
            };

            match wake {
                Wake::Command(None) => break,
                Wake::Command(Some(cmd)) => {
                    if let Some(job) = self.handle_command(cmd).await {
                        pending_load = Some(job);
                    }
                }
                Wake::Telemetry(None) => {
                    error!("Telemetry channel closed, stopping controller");
                    self.fail_to_idle("telemetry channel closed").await;
                    break;
                }
                Wake::Telemetry(Some(report)) => {
                    if let Some(job) = self.handle_telemetry(report).await {
                        pending_load = Some(job);
                    }
                }
                Wake::LoadResolved(res) => {
                    pending_load = self.handle_load_resolved(res).await;
                }
            }

            if self.shutdown {
                break;
            }
        }

        if let Err(err) = self.transport.stop().await {
            debug!(error = %err, "Transport stop on shutdown failed");
        }
        info!("Playback controller stopped");
    }

    // ===== Command handling =====

    async fn handle_command(&mut self, command: PlayerCommand) -> Option<LoadJob> {
        debug!(command = ?command, state = %self.state, "Handling player command");
        match command {
            PlayerCommand::Start => {
                if self.state == ControllerState::Idle {
                    self.advance().await
                } else if self.awaiting_operator {
                    // Operator releases the classic-mode hold
                    self.awaiting_operator = false;
                    self.publish_status();
                    if self.state == ControllerState::Loading {
                        self.defer(DeferredAction::Skip);
                        None
                    } else {
                        self.advance().await
                    }
                } else {
                    debug!(state = %self.state, "start ignored");
                    None
                }
            }
            PlayerCommand::Pause => {
                if self.state == ControllerState::Playing {
                    match self.transport.pause().await {
                        Ok(()) => {
                            self.transition(ControllerState::Paused);
                            self.set_slot_player_state(PlayerState::Paused);
                            None
                        }
                        Err(err) => self.on_transport_error(&format!("pause: {err}")).await,
                    }
                } else {
                    None
                }
            }
            PlayerCommand::Resume => {
                if self.state == ControllerState::Paused {
                    match self.transport.play().await {
                        Ok(()) => {
                            self.transition(ControllerState::Playing);
                            self.set_slot_player_state(PlayerState::Playing);
                            None
                        }
                        Err(err) => self.on_transport_error(&format!("resume: {err}")).await,
                    }
                } else {
                    None
                }
            }
            PlayerCommand::Skip => match self.state {
                ControllerState::Loading => {
                    self.defer(DeferredAction::Skip);
                    None
                }
                ControllerState::Playing | ControllerState::Paused => {
                    // Fillers are not queue entries: only songs get marked
                    self.finish_current_song().await;
                    self.advance().await
                }
                _ => None,
            },
            PlayerCommand::Stop => match self.state {
                ControllerState::Loading => {
                    self.defer(DeferredAction::Stop);
                    self.transition(ControllerState::Stopping);
                    None
                }
                ControllerState::Playing | ControllerState::Paused => {
                    self.stop_playback().await;
                    None
                }
                _ => None,
            },
            PlayerCommand::Seek(position_secs) => {
                if matches!(
                    self.state,
                    ControllerState::Playing | ControllerState::Paused
                ) {
                    match self.transport.seek(position_secs).await {
                        Ok(()) => {
                            self.near_end_sent = false;
                            if let Some(slot) = self.slot.as_mut() {
                                slot.time_position = position_secs;
                            }
                        }
                        Err(err) => warn!(error = %err, "seek failed"),
                    }
                }
                None
            }
            PlayerCommand::SetVolume(volume) => {
                match self.transport.set_volume(volume).await {
                    Ok(()) => {
                        self.volume = volume;
                        if let Some(slot) = self.slot.as_mut() {
                            slot.volume = volume;
                        }
                    }
                    Err(err) => warn!(error = %err, "set_volume failed"),
                }
                None
            }
            PlayerCommand::SetMute(mute) => {
                match self.transport.set_mute(mute).await {
                    Ok(()) => {
                        self.muted = mute;
                        if let Some(slot) = self.slot.as_mut() {
                            slot.muted = mute;
                        }
                    }
                    Err(err) => warn!(error = %err, "set_mute failed"),
                }
                None
            }
            PlayerCommand::Shutdown => {
                self.shutdown = true;
                None
            }
        }
    }

    fn defer(&mut self, action: DeferredAction) {
        // Stop pre-empts a previously deferred skip, never the other way
        if self.deferred != Some(DeferredAction::Stop) {
            self.deferred = Some(action);
        }
    }

    // ===== Telemetry =====

    async fn handle_telemetry(&mut self, report: Telemetry) -> Option<LoadJob> {
        if report.generation != self.generation {
            debug!(
                reported = report.generation,
                current = self.generation,
                "Discarding stale telemetry"
            );
            return None;
        }

        let (media_type, active_entry, position, duration) = match self.slot.as_mut() {
            Some(slot) => {
                slot.time_position = report.position_secs;
                if let Some(d) = report.duration_secs {
                    slot.duration = d;
                }
                (
                    slot.media_type,
                    slot.active_entry,
                    slot.time_position,
                    slot.duration,
                )
            }
            None => return None,
        };

        // EOF is reported by the player only while actively playing; a
        // report that slips through in any other state is ignored.
        if self.state != ControllerState::Playing {
            return None;
        }

        if media_type == MediaType::Song && !self.near_end_sent && duration > 0.0 {
            let remaining = duration - position;
            if remaining <= NEAR_END_SECS {
                self.near_end_sent = true;
                if let Some(entry_id) = active_entry {
                    self.bus.broadcast(PlayerEvent::SongNearEnd { entry_id });
                }
            }
        }

        // Intro/outro length caps count as end of file
        let capped = match media_type {
            MediaType::Intro => cap_reached(self.policy.intro_duration, position),
            MediaType::Outro => cap_reached(self.policy.outro_duration, position),
            _ => false,
        };

        if report.eof || capped {
            if let Some(slot) = self.slot.as_mut() {
                slot.eof_reached = true;
            }
            return self.handle_media_finished().await;
        }
        None
    }

    async fn handle_media_finished(&mut self) -> Option<LoadJob> {
        let media_type = self.slot.as_ref().map(|slot| slot.media_type);
        match media_type {
            Some(MediaType::Song) => {
                self.finish_current_song().await;
                if self.policy.classic_mode {
                    self.enter_classic_hold().await
                } else {
                    self.advance().await
                }
            }
            Some(MediaType::PauseScreen) => {
                // Loop the pause screen until the operator moves on
                let media = self.slot.as_ref().map(|slot| slot.media.clone());
                media.map(|media| self.begin_load(media, None))
            }
            Some(_) => self.advance().await,
            None => None,
        }
    }

    // ===== Load lifecycle =====

    async fn handle_load_resolved(
        &mut self,
        res: std::result::Result<(), LoadFailure>,
    ) -> Option<LoadJob> {
        // A deferred stop/skip pre-empts whatever the load outcome was
        if let Some(action) = self.deferred.take() {
            match action {
                DeferredAction::Stop => {
                    self.stop_playback().await;
                    return None;
                }
                DeferredAction::Skip => {
                    self.finish_current_song().await;
                    return self.advance().await;
                }
            }
        }

        match res {
            Ok(()) => match self.transport.play().await {
                Ok(()) => {
                    if let Some(entry_id) = self.slot.as_ref().and_then(|s| s.active_entry) {
                        if let Err(err) = self.store.mark_playing(&entry_id).await {
                            warn!(entry = %entry_id, error = %err, "mark_playing failed");
                        }
                    }
                    self.transition(ControllerState::Playing);
                    self.set_slot_player_state(PlayerState::Playing);
                    None
                }
                Err(err) => self.on_transport_error(&format!("play: {err}")).await,
            },
            Err(failure) => {
                let reason = match &failure {
                    LoadFailure::Timeout(timeout) => {
                        format!("load did not acknowledge within {timeout:?}")
                    }
                    LoadFailure::Error(message) => format!("load failed: {message}"),
                };

                if !self.load_retried {
                    warn!(reason = %reason, "Load failed, retrying once");
                    self.load_retried = true;
                    match self.retry_load() {
                        Some(job) => Some(job),
                        None => self.on_transport_error(&reason).await,
                    }
                } else {
                    // Second consecutive failure on the same selection is
                    // fatal for that item: mark it played so a corrupt file
                    // cannot trap the loop, then move on.
                    error!(reason = %reason, "Load failed twice, advancing past item");
                    self.bus.broadcast(PlayerEvent::PlaybackError {
                        reason: reason.clone(),
                    });
                    let media_type = self.slot.as_ref().map(|slot| slot.media_type);
                    self.finish_current_song().await;
                    if media_type == Some(MediaType::Background) {
                        // Background already is the fallback, nothing left
                        self.stop_playback().await;
                        None
                    } else {
                        self.advance().await
                    }
                }
            }
        }
    }

    /// Ask the selector for the next item and start loading it.
    async fn advance(&mut self) -> Option<LoadJob> {
        // Moving on always ends a classic-mode hold
        if self.awaiting_operator {
            self.awaiting_operator = false;
            self.publish_status();
        }
        match select_next(&self.store, &self.catalog, &self.policy, &mut self.counters).await {
            Ok(Selection::Song { entry, media }) => Some(self.begin_load(media, Some(entry))),
            Ok(Selection::Filler { media, .. }) => Some(self.begin_load(media, None)),
            Ok(Selection::Nothing) => {
                debug!("Nothing to play, going idle");
                self.stop_playback().await;
                None
            }
            Err(err) => {
                error!(error = %err, "Selection failed");
                self.stop_playback().await;
                None
            }
        }
    }

    fn begin_load(&mut self, media: MediaInfo, entry: Option<QueueEntry>) -> LoadJob {
        self.generation += 1;
        self.load_retried = false;
        self.near_end_sent = false;

        let slot = PlaybackSlot::new(
            media.clone(),
            entry.as_ref().map(|e| e.id),
            self.volume,
            self.muted,
        );
        info!(
            media = %media.id,
            kind = %media.media_type,
            generation = self.generation,
            "Loading media"
        );
        self.slot = Some(slot.clone());
        self.transition(ControllerState::Loading);
        self.bus.broadcast(PlayerEvent::NowPlayingChanged { slot });

        self.spawn_load(media.path, self.generation)
    }

    /// Re-issue the load of the current slot after a failure.
    fn retry_load(&mut self) -> Option<LoadJob> {
        let path = self.slot.as_ref().map(|slot| slot.media.path.clone())?;
        self.generation += 1;
        Some(self.spawn_load(path, self.generation))
    }

    fn spawn_load(&self, path: PathBuf, generation: u64) -> LoadJob {
        let transport = Arc::clone(&self.transport);
        let timeout = Duration::from_secs(self.policy.load_timeout_secs);
        tokio::spawn(async move {
            match tokio::time::timeout(timeout, transport.load(&path, generation)).await {
                Ok(Ok(())) => Ok(()),
                Ok(Err(err)) => Err(LoadFailure::Error(err.to_string())),
                Err(_) => Err(LoadFailure::Timeout(timeout)),
            }
        })
    }

    // ===== Session framing =====

    /// Classic mode: a song just ended, hold on the pause screen until the
    /// operator starts the next one.
    async fn enter_classic_hold(&mut self) -> Option<LoadJob> {
        let pool = self.catalog.media_of_type(MediaType::PauseScreen);
        let choice = pool.choose(&mut rand::rng()).cloned();
        match choice {
            Some(media) => {
                self.awaiting_operator = true;
                self.publish_status();
                Some(self.begin_load(media, None))
            }
            None => {
                debug!("Classic mode without pause screen media, idling");
                self.stop_playback().await;
                None
            }
        }
    }

    // ===== Shared plumbing =====

    /// Mark the active entry played, when the current media is a song.
    async fn finish_current_song(&mut self) {
        let Some(slot) = self.slot.as_ref() else {
            return;
        };
        if slot.media_type != MediaType::Song {
            return;
        }
        if let Some(entry_id) = slot.active_entry {
            if let Err(err) = self.store.mark_played(&entry_id).await {
                warn!(entry = %entry_id, error = %err, "mark_played failed");
            }
        }
    }

    /// Stop the transport, clear the slot and fall back to Idle.
    async fn stop_playback(&mut self) {
        if let Err(err) = self.transport.stop().await {
            warn!(error = %err, "Transport stop failed");
        }
        self.store.clear_playing().await;
        self.slot = None;
        self.deferred = None;
        self.awaiting_operator = false;
        self.transition(ControllerState::Idle);
        self.publish_status();
    }

    /// Transport failure: error event, slot cleared, back to Idle.
    /// `auto_restart` immediately re-selects instead of idling.
    async fn on_transport_error(&mut self, reason: &str) -> Option<LoadJob> {
        error!(reason = %reason, "Transport error");
        self.bus.broadcast(PlayerEvent::PlaybackError {
            reason: reason.to_string(),
        });
        self.store.clear_playing().await;
        self.slot = None;
        self.deferred = None;
        self.awaiting_operator = false;
        self.transition(ControllerState::Idle);

        if self.policy.auto_restart {
            self.advance().await
        } else {
            None
        }
    }

    async fn fail_to_idle(&mut self, reason: &str) {
        self.bus.broadcast(PlayerEvent::PlaybackError {
            reason: reason.to_string(),
        });
        self.store.clear_playing().await;
        self.slot = None;
        self.transition(ControllerState::Idle);
    }

    fn set_slot_player_state(&mut self, player_state: PlayerState) {
        if let Some(slot) = self.slot.as_mut() {
            slot.player_state = player_state;
        }
    }

    fn transition(&mut self, new: ControllerState) {
        if self.state == new {
            return;
        }
        let old = self.state;
        self.state = new;
        debug!(from = %old, to = %new, "Playback state transition");
        self.bus
            .broadcast(PlayerEvent::PlaybackStateChanged { old, new });
        self.publish_status();
    }

    fn publish_status(&self) {
        let _ = self.status_tx.send(ControllerStatus {
            state: self.state,
            awaiting_operator: self.awaiting_operator,
        });
    }
}

fn cap_reached(cap: Option<u32>, position_secs: f64) -> bool {
    match cap {
        Some(cap) if cap > 0 => position_secs >= cap as f64,
        _ => false,
    }
}
