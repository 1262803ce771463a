//! Playlist : conteneur nommé et ordonné d'entrées karaoké

pub mod core;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use self::core::PlaylistCore;
use crate::entry::PlaylistId;

/// Playlist gérée par le QueueStore
///
/// Les drapeaux `current` et `public` sont tenus par le store : exactement
/// une playlist `current` (ou aucune au démarrage), au plus une `public`.
pub struct Playlist {
    pub id: PlaylistId,
    name: RwLock<String>,
    is_current: AtomicBool,
    is_public: AtomicBool,
    flag_visible: AtomicBool,
    pub core: Arc<RwLock<PlaylistCore>>,
    last_change: RwLock<DateTime<Utc>>,
}

impl Playlist {
    /// Crée une nouvelle playlist vide
    pub fn new(id: PlaylistId, name: String) -> Self {
        Self {
            id,
            name: RwLock::new(name),
            is_current: AtomicBool::new(false),
            is_public: AtomicBool::new(false),
            flag_visible: AtomicBool::new(true),
            core: Arc::new(RwLock::new(PlaylistCore::new())),
            last_change: RwLock::new(Utc::now()),
        }
    }

    pub fn is_current(&self) -> bool {
        self.is_current.load(Ordering::SeqCst)
    }

    pub(crate) fn set_current_flag(&self, value: bool) {
        self.is_current.store(value, Ordering::SeqCst);
    }

    pub fn is_public(&self) -> bool {
        self.is_public.load(Ordering::SeqCst)
    }

    pub(crate) fn set_public_flag(&self, value: bool) {
        self.is_public.store(value, Ordering::SeqCst);
    }

    pub fn is_visible(&self) -> bool {
        self.flag_visible.load(Ordering::SeqCst)
    }

    pub fn set_visible(&self, value: bool) {
        self.flag_visible.store(value, Ordering::SeqCst);
    }

    /// Met à jour l'horodatage de dernière modification
    pub async fn touch(&self) {
        *self.last_change.write().await = Utc::now();
    }

    /// Récupère le nom
    pub async fn name(&self) -> String {
        self.name.read().await.clone()
    }

    /// Change le nom
    pub async fn set_name(&self, name: String) {
        *self.name.write().await = name;
        self.touch().await;
    }

    /// Horodatage du dernier changement
    pub async fn last_change(&self) -> DateTime<Utc> {
        *self.last_change.read().await
    }
}
