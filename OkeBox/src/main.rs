use std::sync::Arc;
use std::time::Duration;

use okeconfig::get_config;
use okemedia::{InMemoryCatalog, MediaCatalog, MediaId, MediaInfo, MediaType};
use okeplayer::{PlaybackController, PlayerAction, PlayerConfigExt, PlayerEventBus, SimulatedTransport};
use okequeue::{PlaylistId, QueueConfigExt, QueueStore, SessionQuota, UserId};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // ========== PHASE 1 : Infrastructure ==========

    let config = get_config();
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.get_log_min_level().to_lowercase()));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("🎤 OkeBox starting up...");
    let policy = config.play_policy();
    info!(
        jingle_interval = policy.jingle_interval,
        sponsor_interval = policy.sponsor_interval,
        classic_mode = policy.classic_mode,
        "Playback policy loaded"
    );

    // ========== PHASE 2 : Configuration métier ==========

    info!("🎵 Registering demo media catalog...");
    let catalog = Arc::new(InMemoryCatalog::new());
    register_demo_media(&catalog);

    let (transport, telemetry_rx) = SimulatedTransport::new(Duration::from_millis(250));
    for info in catalog.media_of_type(MediaType::Song) {
        transport.set_media_duration(info.path.clone(), info.duration_secs as f64);
    }

    let quota = Arc::new(SessionQuota::new());
    let store = QueueStore::new(catalog.clone(), quota.clone(), config.quota_per_user());

    let session = PlaylistId::from("session");
    store.create_playlist(session.clone(), "Saturday session").await?;
    store.set_current(&session).await?;

    let suggestions = PlaylistId::from("suggestions");
    store.create_playlist(suggestions.clone(), "Suggestions").await?;
    store.set_public(&suggestions).await?;

    info!("📋 Queueing demo songs...");
    for (media, singer) in [
        ("kara-zankoku", "aya"),
        ("kara-butterfly", "ren"),
        ("kara-tank", "aya"),
    ] {
        let singer = UserId::from(singer);
        match store
            .add_entry(&session, &MediaId::from(media), &singer, None)
            .await
        {
            Ok(entry) => {
                quota.record_submission(&singer, &session);
                info!(media, position = entry.position, "Song queued");
            }
            Err(err) => warn!(media, error = %err, "Submission rejected"),
        }
    }

    // ========== PHASE 3 : Démarrage de la lecture ==========

    let bus = PlayerEventBus::new();
    let events = bus.subscribe();
    std::thread::spawn(move || {
        for event in events.iter() {
            info!(event = ?event, "player event");
        }
    });

    let mut queue_events = store.subscribe_events();
    tokio::spawn(async move {
        while let Ok(envelope) = queue_events.recv().await {
            info!(
                playlist = %envelope.event.playlist_id,
                kind = ?envelope.event.kind,
                "queue event"
            );
        }
    });

    let (controller, handle) = PlaybackController::spawn(
        store.clone(),
        catalog.clone(),
        transport,
        telemetry_rx,
        policy,
        bus,
    );

    handle.set_volume(config.get_player_volume() as u16).await?;
    handle.control(PlayerAction::Start).await?;

    info!("✅ OkeBox is ready!");
    info!("Press Ctrl+C to stop...");
    tokio::signal::ctrl_c().await?;

    info!("🛑 Shutting down...");
    handle.shutdown().await.ok();
    controller.wait().await?;

    Ok(())
}

/// Demo content: a handful of songs plus one media of each filler kind.
fn register_demo_media(catalog: &InMemoryCatalog) {
    let songs = [
        ("kara-zankoku", "Zankoku na Tenshi no These", 92),
        ("kara-butterfly", "Butter-Fly", 87),
        ("kara-tank", "Tank!", 95),
    ];
    for (id, title, duration) in songs {
        catalog.register(MediaInfo::new(
            id,
            title,
            duration,
            MediaType::Song,
            format!("/demo/songs/{id}.mkv"),
        ));
    }

    let fillers = [
        ("jingle-1", "Station jingle", 8, MediaType::Jingle),
        ("sponsor-1", "Sponsor spot", 15, MediaType::Sponsor),
        ("background-1", "Idle loop", 30, MediaType::Background),
        ("pause-1", "Pause screen", 20, MediaType::PauseScreen),
        ("intro-1", "Session intro", 12, MediaType::Intro),
        ("outro-1", "Session outro", 12, MediaType::Outro),
        ("encore-1", "Encore!", 10, MediaType::Encore),
    ];
    for (id, title, duration, kind) in fillers {
        catalog.register(MediaInfo::new(
            id,
            title,
            duration,
            kind,
            format!("/demo/fillers/{id}.mp4"),
        ));
    }
}
