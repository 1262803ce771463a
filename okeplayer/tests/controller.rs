use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use okemedia::{InMemoryCatalog, MediaCatalog, MediaId, MediaInfo, MediaType};
use okeplayer::{
    ControllerState, PlaybackController, PlayerAction, PlayerEvent, PlayerEventBus, PlayerHandle,
    PlayPolicy, SimulatedTransport, Telemetry, TransportDriver,
};
use okequeue::{EntryId, NoQuota, PlaylistId, QueueStore, UserId};
use tokio::sync::mpsc;

#[derive(Debug, Clone, PartialEq)]
enum Call {
    Load(u64),
    Play,
    Pause,
    Stop,
    Volume(u16),
    Mute(bool),
}

enum LoadBehavior {
    Ack,
    AckAfter(Duration),
    Hang,
}

/// Transport test double: loads follow a per-call script, everything is
/// recorded, telemetry is pushed by the test through the channel it keeps.
struct ScriptedTransport {
    loads: Mutex<VecDeque<LoadBehavior>>,
    calls: Mutex<Vec<Call>>,
}

impl ScriptedTransport {
    fn new(loads: Vec<LoadBehavior>) -> Arc<Self> {
        Arc::new(Self {
            loads: Mutex::new(loads.into()),
            calls: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    fn load_generations(&self) -> Vec<u64> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Load(generation) => Some(generation),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl TransportDriver for ScriptedTransport {
    async fn load(&self, _path: &Path, generation: u64) -> Result<()> {
        self.calls.lock().unwrap().push(Call::Load(generation));
        let behavior = self
            .loads
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(LoadBehavior::Ack);
        match behavior {
            LoadBehavior::Ack => Ok(()),
            LoadBehavior::AckAfter(delay) => {
                tokio::time::sleep(delay).await;
                Ok(())
            }
            LoadBehavior::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(anyhow!("unreachable"))
            }
        }
    }

    async fn play(&self) -> Result<()> {
        self.calls.lock().unwrap().push(Call::Play);
        Ok(())
    }

    async fn pause(&self) -> Result<()> {
        self.calls.lock().unwrap().push(Call::Pause);
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.calls.lock().unwrap().push(Call::Stop);
        Ok(())
    }

    async fn seek(&self, _position_secs: f64) -> Result<()> {
        Ok(())
    }

    async fn set_volume(&self, volume: u16) -> Result<()> {
        self.calls.lock().unwrap().push(Call::Volume(volume));
        Ok(())
    }

    async fn set_mute(&self, mute: bool) -> Result<()> {
        self.calls.lock().unwrap().push(Call::Mute(mute));
        Ok(())
    }
}

struct Fixture {
    store: QueueStore,
    entries: Vec<EntryId>,
    handle: PlayerHandle,
    events: crossbeam_channel::Receiver<PlayerEvent>,
}

async fn fixture(
    songs: usize,
    fillers: &[MediaType],
    transport: Arc<dyn TransportDriver>,
    telemetry_rx: mpsc::Receiver<Telemetry>,
    policy: PlayPolicy,
) -> Fixture {
    let catalog = InMemoryCatalog::new();
    for i in 0..songs {
        catalog.register(MediaInfo::new(
            format!("s{i}"),
            format!("Song {i}"),
            180,
            MediaType::Song,
            format!("/media/s{i}.mkv"),
        ));
    }
    for kind in fillers {
        let id = format!("{kind}-0");
        catalog.register(MediaInfo::new(
            id.as_str(),
            id.as_str(),
            10,
            *kind,
            format!("/media/{id}.mp4"),
        ));
    }
    let catalog: Arc<dyn MediaCatalog> = Arc::new(catalog);

    let store = QueueStore::new(catalog.clone(), Arc::new(NoQuota), None);
    let playlist = PlaylistId::from("session");
    store
        .create_playlist(playlist.clone(), "Session")
        .await
        .unwrap();
    store.set_current(&playlist).await.unwrap();

    let mut entries = Vec::new();
    for i in 0..songs {
        let entry = store
            .add_entry(
                &playlist,
                &MediaId::from(format!("s{i}").as_str()),
                &UserId::from(format!("u{i}").as_str()),
                None,
            )
            .await
            .unwrap();
        entries.push(entry.id);
    }

    let bus = PlayerEventBus::new();
    let events = bus.subscribe();
    let (_controller, handle) =
        PlaybackController::spawn(store.clone(), catalog, transport, telemetry_rx, policy, bus);

    Fixture {
        store,
        entries,
        handle,
        events,
    }
}

fn quiet_policy() -> PlayPolicy {
    PlayPolicy {
        jingle_interval: 0,
        sponsor_interval: 0,
        load_timeout_secs: 1,
        ..PlayPolicy::default()
    }
}

async fn wait_for_state(handle: &PlayerHandle, wanted: ControllerState) {
    let mut status = handle.status_stream();
    tokio::time::timeout(
        Duration::from_secs(120),
        status.wait_for(|s| s.state == wanted),
    )
    .await
    .expect("timed out waiting for state")
    .expect("controller gone");
}

fn state_changes(events: &crossbeam_channel::Receiver<PlayerEvent>) -> Vec<(ControllerState, ControllerState)> {
    events
        .try_iter()
        .filter_map(|event| match event {
            PlayerEvent::PlaybackStateChanged { old, new } => Some((old, new)),
            _ => None,
        })
        .collect()
}

async fn entry_played(store: &QueueStore, id: &EntryId) -> bool {
    store.find_entry(id).await.unwrap().1.played
}

#[tokio::test(start_paused = true)]
async fn test_start_then_eof_runs_the_full_cycle() {
    let transport = ScriptedTransport::new(vec![LoadBehavior::Ack]);
    let (telemetry_tx, telemetry_rx) = mpsc::channel(16);
    let fx = fixture(1, &[], transport.clone(), telemetry_rx, quiet_policy()).await;

    fx.handle.control(PlayerAction::Start).await.unwrap();
    wait_for_state(&fx.handle, ControllerState::Playing).await;

    // The playing entry is flagged in the store
    let (_, entry) = fx.store.find_entry(&fx.entries[0]).await.unwrap();
    assert!(entry.playing);

    let generation = transport.load_generations()[0];
    telemetry_tx
        .send(Telemetry {
            generation,
            position_secs: 180.0,
            duration_secs: Some(180.0),
            eof: true,
        })
        .await
        .unwrap();

    // Queue exhausted, no background media: back to Idle
    wait_for_state(&fx.handle, ControllerState::Idle).await;
    assert!(entry_played(&fx.store, &fx.entries[0]).await);

    // Exactly one state-change event per transition, in order
    assert_eq!(
        state_changes(&fx.events),
        vec![
            (ControllerState::Idle, ControllerState::Loading),
            (ControllerState::Loading, ControllerState::Playing),
            (ControllerState::Playing, ControllerState::Idle),
        ]
    );
    assert!(transport.calls().contains(&Call::Play));
}

#[tokio::test(start_paused = true)]
async fn test_skip_during_loading_is_deferred_and_never_reaches_playing() {
    let transport = ScriptedTransport::new(vec![LoadBehavior::AckAfter(Duration::from_millis(
        200,
    ))]);
    let (_telemetry_tx, telemetry_rx) = mpsc::channel(16);
    let fx = fixture(1, &[], transport.clone(), telemetry_rx, quiet_policy()).await;

    fx.handle.control(PlayerAction::Start).await.unwrap();
    wait_for_state(&fx.handle, ControllerState::Loading).await;

    // Skip lands while the load is still in flight
    fx.handle.control(PlayerAction::Skip).await.unwrap();
    wait_for_state(&fx.handle, ControllerState::Idle).await;

    // The load resolved, the deferred skip consumed the song, and the
    // controller went Loading -> Idle without ever reaching Playing
    assert!(entry_played(&fx.store, &fx.entries[0]).await);
    let changes = state_changes(&fx.events);
    assert!(changes.iter().all(|(_, new)| *new != ControllerState::Playing));
    assert_eq!(changes.last().unwrap().1, ControllerState::Idle);
    assert!(!transport.calls().contains(&Call::Play));
}

#[tokio::test(start_paused = true)]
async fn test_stop_during_loading_goes_through_stopping() {
    let transport = ScriptedTransport::new(vec![LoadBehavior::AckAfter(Duration::from_millis(
        200,
    ))]);
    let (_telemetry_tx, telemetry_rx) = mpsc::channel(16);
    let fx = fixture(1, &[], transport.clone(), telemetry_rx, quiet_policy()).await;

    fx.handle.control(PlayerAction::Start).await.unwrap();
    wait_for_state(&fx.handle, ControllerState::Loading).await;

    fx.handle.control(PlayerAction::Stop).await.unwrap();
    wait_for_state(&fx.handle, ControllerState::Idle).await;

    // Stop was deferred (observable as Stopping) until the ack resolved
    let changes = state_changes(&fx.events);
    assert!(changes.contains(&(ControllerState::Loading, ControllerState::Stopping)));
    assert!(changes.contains(&(ControllerState::Stopping, ControllerState::Idle)));
    // Stopping is not skipping: the song stays unplayed and can be removed
    assert!(!entry_played(&fx.store, &fx.entries[0]).await);
    assert!(!transport.calls().contains(&Call::Play));
    assert!(transport.calls().contains(&Call::Stop));
}

#[tokio::test(start_paused = true)]
async fn test_stale_generation_telemetry_is_discarded() {
    let transport = ScriptedTransport::new(vec![LoadBehavior::Ack, LoadBehavior::Ack]);
    let (telemetry_tx, telemetry_rx) = mpsc::channel(16);
    let fx = fixture(2, &[], transport.clone(), telemetry_rx, quiet_policy()).await;

    fx.handle.control(PlayerAction::Start).await.unwrap();
    wait_for_state(&fx.handle, ControllerState::Playing).await;

    // Fast skip: song 1 is consumed, song 2 loads with a new generation
    fx.handle.control(PlayerAction::Skip).await.unwrap();
    tokio::time::timeout(Duration::from_secs(120), async {
        while transport.load_generations().len() < 2
            || fx.handle.status().state != ControllerState::Playing
        {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();

    let generations = transport.load_generations();
    assert_eq!(generations.len(), 2);
    let (stale, current) = (generations[0], generations[1]);
    assert!(stale < current);

    // Slow telemetry from the skipped track arrives after the new load:
    // it must produce no state transition and no played flag
    telemetry_tx
        .send(Telemetry {
            generation: stale,
            position_secs: 180.0,
            duration_secs: Some(180.0),
            eof: true,
        })
        .await
        .unwrap();
    // Ordering fence on the single telemetry channel
    telemetry_tx
        .send(Telemetry {
            generation: current,
            position_secs: 1.0,
            duration_secs: Some(180.0),
            eof: false,
        })
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(fx.handle.status().state, ControllerState::Playing);
    assert!(!entry_played(&fx.store, &fx.entries[1]).await);

    // The current generation still ends the track normally
    telemetry_tx
        .send(Telemetry {
            generation: current,
            position_secs: 180.0,
            duration_secs: Some(180.0),
            eof: true,
        })
        .await
        .unwrap();
    wait_for_state(&fx.handle, ControllerState::Idle).await;
    assert!(entry_played(&fx.store, &fx.entries[1]).await);
}

#[tokio::test(start_paused = true)]
async fn test_load_timeout_retries_once_then_advances_past_item() {
    let transport = ScriptedTransport::new(vec![LoadBehavior::Hang, LoadBehavior::Hang]);
    let (_telemetry_tx, telemetry_rx) = mpsc::channel(16);
    let fx = fixture(1, &[], transport.clone(), telemetry_rx, quiet_policy()).await;

    fx.handle.control(PlayerAction::Start).await.unwrap();
    wait_for_state(&fx.handle, ControllerState::Loading).await;
    wait_for_state(&fx.handle, ControllerState::Idle).await;

    // One automatic retry (a fresh generation), then the item is marked
    // played so a corrupt file cannot trap the loop
    let generations = transport.load_generations();
    assert_eq!(generations.len(), 2);
    assert!(generations[0] < generations[1]);
    assert!(entry_played(&fx.store, &fx.entries[0]).await);

    let had_error = fx
        .events
        .try_iter()
        .any(|event| matches!(event, PlayerEvent::PlaybackError { .. }));
    assert!(had_error);
}

#[tokio::test(start_paused = true)]
async fn test_pause_resume_transitions() {
    let transport = ScriptedTransport::new(vec![LoadBehavior::Ack]);
    let (_telemetry_tx, telemetry_rx) = mpsc::channel(16);
    let fx = fixture(1, &[], transport.clone(), telemetry_rx, quiet_policy()).await;

    fx.handle.control(PlayerAction::Start).await.unwrap();
    wait_for_state(&fx.handle, ControllerState::Playing).await;

    // Resume is illegal while playing
    let err = fx.handle.control(PlayerAction::Resume).await.unwrap_err();
    assert!(matches!(
        err,
        okeplayer::PlayerError::InvalidTransition { .. }
    ));

    fx.handle.control(PlayerAction::Pause).await.unwrap();
    wait_for_state(&fx.handle, ControllerState::Paused).await;
    fx.handle.control(PlayerAction::Resume).await.unwrap();
    wait_for_state(&fx.handle, ControllerState::Playing).await;

    let calls = transport.calls();
    assert!(calls.contains(&Call::Pause));
    // play: once on load ack, once on resume
    assert_eq!(calls.iter().filter(|c| **c == Call::Play).count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_classic_mode_holds_on_pause_screen_until_operator() {
    let transport = ScriptedTransport::new(Vec::new());
    let (telemetry_tx, telemetry_rx) = mpsc::channel(16);
    let policy = PlayPolicy {
        classic_mode: true,
        ..quiet_policy()
    };
    let fx = fixture(
        2,
        &[MediaType::PauseScreen],
        transport.clone(),
        telemetry_rx,
        policy,
    )
    .await;

    fx.handle.control(PlayerAction::Start).await.unwrap();
    wait_for_state(&fx.handle, ControllerState::Playing).await;

    let song_generation = transport.load_generations()[0];
    telemetry_tx
        .send(Telemetry {
            generation: song_generation,
            position_secs: 180.0,
            duration_secs: Some(180.0),
            eof: true,
        })
        .await
        .unwrap();

    // The loop holds on the pause screen instead of auto-advancing
    let mut status = fx.handle.status_stream();
    tokio::time::timeout(Duration::from_secs(120), async {
        status.wait_for(|s| s.awaiting_operator).await.unwrap();
    })
    .await
    .unwrap();
    assert!(entry_played(&fx.store, &fx.entries[0]).await);
    assert!(!entry_played(&fx.store, &fx.entries[1]).await);

    // The operator starts the next song
    fx.handle.control(PlayerAction::Start).await.unwrap();
    tokio::time::timeout(Duration::from_secs(120), async {
        status.wait_for(|s| !s.awaiting_operator).await.unwrap();
    })
    .await
    .unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;

    // Third load is the second song
    let mut seen = Vec::new();
    for event in fx.events.try_iter() {
        if let PlayerEvent::NowPlayingChanged { slot } = event {
            seen.push(slot.media_type);
        }
    }
    assert_eq!(
        seen,
        vec![MediaType::Song, MediaType::PauseScreen, MediaType::Song]
    );
}

#[tokio::test(start_paused = true)]
async fn test_volume_and_mute_are_forwarded() {
    let transport = ScriptedTransport::new(Vec::new());
    let (_telemetry_tx, telemetry_rx) = mpsc::channel(16);
    let fx = fixture(0, &[], transport.clone(), telemetry_rx, quiet_policy()).await;

    fx.handle.set_volume(55).await.unwrap();
    fx.handle.set_mute(true).await.unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;

    let calls = transport.calls();
    assert!(calls.contains(&Call::Volume(55)));
    assert!(calls.contains(&Call::Mute(true)));
}

#[tokio::test(start_paused = true)]
async fn test_simulated_session_weaves_a_jingle() {
    let (transport, telemetry_rx) = SimulatedTransport::new(Duration::from_millis(100));
    let policy = PlayPolicy {
        jingle_interval: 2,
        sponsor_interval: 0,
        load_timeout_secs: 1,
        ..PlayPolicy::default()
    };
    let fx = fixture(
        2,
        &[MediaType::Jingle],
        transport.clone(),
        telemetry_rx,
        policy,
    )
    .await;

    fx.handle.control(PlayerAction::Start).await.unwrap();
    wait_for_state(&fx.handle, ControllerState::Playing).await;
    // Virtual clock: both songs and the jingle play out, then the queue is
    // exhausted and the controller idles
    wait_for_state(&fx.handle, ControllerState::Idle).await;

    for id in &fx.entries {
        assert!(entry_played(&fx.store, id).await);
    }
    let kinds: Vec<MediaType> = fx
        .events
        .try_iter()
        .filter_map(|event| match event {
            PlayerEvent::NowPlayingChanged { slot } => Some(slot.media_type),
            _ => None,
        })
        .collect();
    assert_eq!(
        kinds,
        vec![MediaType::Song, MediaType::Song, MediaType::Jingle]
    );
}

#[tokio::test(start_paused = true)]
async fn test_intro_cap_counts_as_end_of_file() {
    let transport = ScriptedTransport::new(vec![LoadBehavior::Ack, LoadBehavior::Ack]);
    let (telemetry_tx, telemetry_rx) = mpsc::channel(16);
    let policy = PlayPolicy {
        intro_duration: Some(5),
        ..quiet_policy()
    };
    let fx = fixture(
        1,
        &[MediaType::Intro],
        transport.clone(),
        telemetry_rx,
        policy,
    )
    .await;

    fx.handle.control(PlayerAction::Start).await.unwrap();
    wait_for_state(&fx.handle, ControllerState::Playing).await;

    // The intro media itself lasts 10 s; the configured cap ends it at 5
    let generation = transport.load_generations()[0];
    telemetry_tx
        .send(Telemetry {
            generation,
            position_secs: 5.0,
            duration_secs: Some(10.0),
            eof: false,
        })
        .await
        .unwrap();

    tokio::time::timeout(Duration::from_secs(120), async {
        while transport.load_generations().len() < 2 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();

    let kinds: Vec<MediaType> = fx
        .events
        .try_iter()
        .filter_map(|event| match event {
            PlayerEvent::NowPlayingChanged { slot } => Some(slot.media_type),
            _ => None,
        })
        .collect();
    assert_eq!(kinds, vec![MediaType::Intro, MediaType::Song]);
}

#[tokio::test(start_paused = true)]
async fn test_song_near_end_notification_fires_once() {
    let transport = ScriptedTransport::new(vec![LoadBehavior::Ack]);
    let (telemetry_tx, telemetry_rx) = mpsc::channel(16);
    let fx = fixture(1, &[], transport.clone(), telemetry_rx, quiet_policy()).await;

    fx.handle.control(PlayerAction::Start).await.unwrap();
    wait_for_state(&fx.handle, ControllerState::Playing).await;

    let generation = transport.load_generations()[0];
    for position in [100.0, 170.0, 172.0] {
        telemetry_tx
            .send(Telemetry {
                generation,
                position_secs: position,
                duration_secs: Some(180.0),
                eof: false,
            })
            .await
            .unwrap();
    }
    tokio::time::sleep(Duration::from_millis(10)).await;

    let near_end: Vec<EntryId> = fx
        .events
        .try_iter()
        .filter_map(|event| match event {
            PlayerEvent::SongNearEnd { entry_id } => Some(entry_id),
            _ => None,
        })
        .collect();
    assert_eq!(near_end, vec![fx.entries[0]]);
}
