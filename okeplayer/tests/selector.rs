use std::sync::Arc;

use okemedia::{InMemoryCatalog, MediaCatalog, MediaId, MediaInfo, MediaType};
use okeplayer::{select_next, EncorePolicy, FillerCounters, PlayPolicy, Selection};
use okequeue::{EntryFlag, NoQuota, PlaylistId, QueueStore, UserId};

struct Fixture {
    store: QueueStore,
    catalog: Arc<dyn MediaCatalog>,
    playlist: PlaylistId,
}

async fn fixture(songs: usize, fillers: &[MediaType]) -> Fixture {
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

    for i in 0..songs {
        store
            .add_entry(
                &playlist,
                &MediaId::from(format!("s{i}").as_str()),
                &UserId::from(format!("u{i}").as_str()),
                None,
            )
            .await
            .unwrap();
    }

    Fixture {
        store,
        catalog,
        playlist,
    }
}

fn songs_only_policy(jingle: u32, sponsor: u32) -> PlayPolicy {
    PlayPolicy {
        jingle_interval: jingle,
        sponsor_interval: sponsor,
        ..PlayPolicy::default()
    }
}

/// Run one selection and, when it is a song, mark it played as the
/// controller would at end of file.
async fn step(fx: &Fixture, policy: &PlayPolicy, counters: &mut FillerCounters) -> char {
    match select_next(&fx.store, &fx.catalog, policy, counters)
        .await
        .unwrap()
    {
        Selection::Song { entry, .. } => {
            fx.store.mark_played(&entry.id).await.unwrap();
            'S'
        }
        Selection::Filler { kind, .. } => match kind {
            MediaType::Jingle => 'J',
            MediaType::Sponsor => 'P',
            MediaType::Background => 'B',
            MediaType::Intro => 'I',
            MediaType::Outro => 'O',
            MediaType::Encore => 'E',
            _ => '?',
        },
        Selection::Nothing => '.',
    }
}

#[tokio::test]
async fn test_seven_songs_with_jingle_every_three() {
    let fx = fixture(7, &[MediaType::Jingle]).await;
    let policy = songs_only_policy(3, 0);
    let mut counters = FillerCounters::default();

    let mut sequence = String::new();
    for _ in 0..9 {
        sequence.push(step(&fx, &policy, &mut counters).await);
    }
    assert_eq!(sequence, "SSSJSSSJS");
}

#[tokio::test]
async fn test_jingle_wins_over_sponsor_on_shared_tick() {
    let fx = fixture(4, &[MediaType::Jingle, MediaType::Sponsor]).await;
    // Both intervals lapse together after every second song: the jingle
    // plays first, the sponsor counter is still due on the next check.
    let policy = songs_only_policy(2, 2);
    let mut counters = FillerCounters::default();

    let mut sequence = String::new();
    for _ in 0..8 {
        sequence.push(step(&fx, &policy, &mut counters).await);
    }
    assert_eq!(sequence, "SSJPSSJP");
}

#[tokio::test]
async fn test_refused_entries_are_never_selected() {
    let fx = fixture(2, &[]).await;
    let entries = fx.store.entries(&fx.playlist).await.unwrap();
    fx.store
        .set_flag(&entries[0].id, EntryFlag::Refused, true)
        .await
        .unwrap();

    let policy = songs_only_policy(0, 0);
    let mut counters = FillerCounters::default();

    match select_next(&fx.store, &fx.catalog, &policy, &mut counters)
        .await
        .unwrap()
    {
        Selection::Song { entry, .. } => assert_eq!(entry.id, entries[1].id),
        other => panic!("expected the non-refused song, got {other:?}"),
    }
}

#[tokio::test]
async fn test_empty_queue_falls_back_to_background_without_advancing_counters() {
    let fx = fixture(0, &[MediaType::Background]).await;
    let policy = songs_only_policy(3, 0);
    let mut counters = FillerCounters {
        songs_since_jingle: 2,
        songs_since_sponsor: 2,
        ..FillerCounters::default()
    };

    match select_next(&fx.store, &fx.catalog, &policy, &mut counters)
        .await
        .unwrap()
    {
        Selection::Filler { kind, .. } => assert_eq!(kind, MediaType::Background),
        other => panic!("expected background, got {other:?}"),
    }
    assert_eq!(counters.songs_since_jingle, 2);
    assert_eq!(counters.songs_since_sponsor, 2);
}

#[tokio::test]
async fn test_empty_queue_without_background_is_nothing() {
    let fx = fixture(0, &[]).await;
    let policy = songs_only_policy(0, 0);
    let mut counters = FillerCounters::default();

    assert!(matches!(
        select_next(&fx.store, &fx.catalog, &policy, &mut counters)
            .await
            .unwrap(),
        Selection::Nothing
    ));
}

#[tokio::test]
async fn test_repeat_playlist_restarts_round_in_position_order() {
    let fx = fixture(2, &[]).await;
    let policy = PlayPolicy {
        repeat_playlist: true,
        ..songs_only_policy(0, 0)
    };
    let mut counters = FillerCounters::default();

    let first = fx.store.entries(&fx.playlist).await.unwrap()[0].id;
    assert_eq!(step(&fx, &policy, &mut counters).await, 'S');
    assert_eq!(step(&fx, &policy, &mut counters).await, 'S');

    // Both songs played: the round resets and the first song (lowest
    // position) comes back, not the last one played.
    match select_next(&fx.store, &fx.catalog, &policy, &mut counters)
        .await
        .unwrap()
    {
        Selection::Song { entry, .. } => assert_eq!(entry.id, first),
        other => panic!("expected first song after round reset, got {other:?}"),
    }
}

#[tokio::test]
async fn test_round_reset_never_resurrects_refused_entries() {
    let fx = fixture(2, &[MediaType::Background]).await;
    let policy = PlayPolicy {
        repeat_playlist: true,
        ..songs_only_policy(0, 0)
    };
    let mut counters = FillerCounters::default();

    let entries = fx.store.entries(&fx.playlist).await.unwrap();
    fx.store.mark_played(&entries[0].id).await.unwrap();
    fx.store
        .set_flag(&entries[0].id, EntryFlag::Refused, true)
        .await
        .unwrap();
    fx.store.mark_played(&entries[1].id).await.unwrap();
    fx.store
        .set_flag(&entries[1].id, EntryFlag::Refused, true)
        .await
        .unwrap();

    // Every remaining entry is refused: treated as "none found"
    match select_next(&fx.store, &fx.catalog, &policy, &mut counters)
        .await
        .unwrap()
    {
        Selection::Filler { kind, .. } => assert_eq!(kind, MediaType::Background),
        other => panic!("expected background, got {other:?}"),
    }
}

#[tokio::test]
async fn test_intro_plays_once_before_first_song() {
    let fx = fixture(2, &[MediaType::Intro]).await;
    let policy = PlayPolicy {
        intro_duration: Some(12),
        ..songs_only_policy(0, 0)
    };
    let mut counters = FillerCounters::default();

    assert_eq!(step(&fx, &policy, &mut counters).await, 'I');
    assert_eq!(step(&fx, &policy, &mut counters).await, 'S');
    assert_eq!(step(&fx, &policy, &mut counters).await, 'S');
    // Never a second intro in the same session
    assert!(counters.intro_played);
}

#[tokio::test]
async fn test_encore_certain_then_outro_then_background() {
    let fx = fixture(
        1,
        &[MediaType::Encore, MediaType::Outro, MediaType::Background],
    )
    .await;
    let policy = PlayPolicy {
        encore: EncorePolicy {
            enabled: true,
            probability: 1.0,
        },
        outro_duration: Some(10),
        ..songs_only_policy(0, 0)
    };
    let mut counters = FillerCounters::default();

    assert_eq!(step(&fx, &policy, &mut counters).await, 'S');
    assert_eq!(step(&fx, &policy, &mut counters).await, 'E');
    assert_eq!(step(&fx, &policy, &mut counters).await, 'O');
    assert_eq!(step(&fx, &policy, &mut counters).await, 'B');
}

#[tokio::test]
async fn test_encore_probability_zero_never_plays() {
    let fx = fixture(1, &[MediaType::Encore, MediaType::Background]).await;
    let policy = PlayPolicy {
        encore: EncorePolicy {
            enabled: true,
            probability: 0.0,
        },
        ..songs_only_policy(0, 0)
    };
    let mut counters = FillerCounters::default();

    assert_eq!(step(&fx, &policy, &mut counters).await, 'S');
    assert_eq!(step(&fx, &policy, &mut counters).await, 'B');
}

#[tokio::test]
async fn test_no_encore_before_any_song_played() {
    let fx = fixture(0, &[MediaType::Encore, MediaType::Background]).await;
    let policy = PlayPolicy {
        encore: EncorePolicy {
            enabled: true,
            probability: 1.0,
        },
        ..songs_only_policy(0, 0)
    };
    let mut counters = FillerCounters::default();

    // Empty session: straight to background, no encore
    assert_eq!(step(&fx, &policy, &mut counters).await, 'B');
}
