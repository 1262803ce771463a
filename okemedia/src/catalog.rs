//! Read-only media lookup.
//!
//! The core treats the catalog as a pure function `lookup(id) -> Option`;
//! no synchronization is required beyond what an implementation needs
//! internally to stay `Send + Sync`.

use std::collections::HashMap;
use std::sync::RwLock;

use tracing::debug;

use crate::model::{MediaId, MediaInfo, MediaType};

/// Lookup surface consumed by the queue store and the selector.
pub trait MediaCatalog: Send + Sync {
    /// Resolve a media id to its metadata. `None` when the id is unknown.
    fn lookup(&self, id: &MediaId) -> Option<MediaInfo>;

    /// Every catalog entry of the given type, in unspecified order.
    ///
    /// Used to pick filler media (jingles, sponsors, backgrounds, ...).
    fn media_of_type(&self, media_type: MediaType) -> Vec<MediaInfo>;
}

/// HashMap-backed catalog.
///
/// Registration is expected to happen at startup; lookups afterwards are
/// read-mostly, hence the coarse `RwLock`.
#[derive(Default)]
pub struct InMemoryCatalog {
    entries: RwLock<HashMap<MediaId, MediaInfo>>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a media item, replacing any previous entry with the same id.
    pub fn register(&self, info: MediaInfo) {
        debug!(media = %info.id, kind = %info.media_type, "Registering media");
        let mut entries = self.entries.write().unwrap();
        entries.insert(info.id.clone(), info);
    }

    /// Remove an entry, returning its metadata if it was present.
    pub fn unregister(&self, id: &MediaId) -> Option<MediaInfo> {
        self.entries.write().unwrap().remove(id)
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().unwrap().is_empty()
    }
}

impl MediaCatalog for InMemoryCatalog {
    fn lookup(&self, id: &MediaId) -> Option<MediaInfo> {
        self.entries.read().unwrap().get(id).cloned()
    }

    fn media_of_type(&self, media_type: MediaType) -> Vec<MediaInfo> {
        self.entries
            .read()
            .unwrap()
            .values()
            .filter(|info| info.media_type == media_type)
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn song(id: &str) -> MediaInfo {
        MediaInfo::new(id, id.to_uppercase(), 180, MediaType::Song, format!("/media/{id}.mkv"))
    }

    #[test]
    fn test_lookup_registered_media() {
        let catalog = InMemoryCatalog::new();
        catalog.register(song("kimi-no-shiranai"));

        let found = catalog.lookup(&MediaId::from("kimi-no-shiranai")).unwrap();
        assert_eq!(found.media_type, MediaType::Song);
        assert_eq!(found.duration_secs, 180);

        assert!(catalog.lookup(&MediaId::from("missing")).is_none());
    }

    #[test]
    fn test_media_of_type_filters() {
        let catalog = InMemoryCatalog::new();
        catalog.register(song("a"));
        catalog.register(song("b"));
        catalog.register(MediaInfo::new(
            "jingle-1",
            "Jingle",
            12,
            MediaType::Jingle,
            "/media/jingle1.mp4",
        ));

        assert_eq!(catalog.media_of_type(MediaType::Song).len(), 2);
        assert_eq!(catalog.media_of_type(MediaType::Jingle).len(), 1);
        assert!(catalog.media_of_type(MediaType::Sponsor).is_empty());
    }
}
