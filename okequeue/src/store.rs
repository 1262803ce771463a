//! QueueStore : gestionnaire central des files karaoké
//!
//! Toutes les mutations client (soumission, suppression, réordonnancement,
//! vote, drapeaux) passent par ce type. Chaque opération est atomique du
//! point de vue de l'appelant : elle prend la portée d'exclusion de la
//! playlist visée, applique la mutation, renumérote, puis notifie.
//!
//! Le moteur de lecture lit le store (via le sélecteur) sous la même
//! portée : une décision de sélection n'observe jamais une mutation à
//! moitié appliquée.

use std::collections::{HashMap, HashSet};
use std::sync::RwLock as StdRwLock;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc, Mutex as StdMutex,
};
use std::time::{Duration, Instant};

use okemedia::{MediaCatalog, MediaId, MediaType};
use tokio::sync::broadcast;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::entry::{EntryFlag, EntryId, PlaylistId, QueueEntry, UserId};
use crate::playlist::Playlist;
use crate::quota::UserQuota;
use crate::{Error, Result};

/// Fenêtre pendant laquelle un second vote identique est absorbé
const VOTE_INFLIGHT_TTL: Duration = Duration::from_secs(2);

/// Type d'évènement émis par le QueueStore.
#[derive(Debug, Clone)]
pub struct QueueEvent {
    pub playlist_id: PlaylistId,
    pub kind: QueueEventKind,
}

/// Variantes d'évènements file.
#[derive(Debug, Clone)]
pub enum QueueEventKind {
    /// La file a été modifiée (ajout/suppression/drapeau/vote/ordre).
    Updated,
    /// Une entrée vient d'être marquée jouée par le moteur de lecture.
    EntryPlayed { entry_id: EntryId },
}

/// Évènement enrichi pour diffusion (horodatage).
#[derive(Debug, Clone)]
pub struct QueueEventEnvelope {
    pub event: QueueEvent,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// Structure interne du store
struct StoreInner {
    playlists: RwLock<HashMap<PlaylistId, Arc<Playlist>>>,
    catalog: Arc<dyn MediaCatalog>,
    quota: Arc<dyn UserQuota>,
    quota_limit: StdRwLock<Option<u32>>,
    callbacks: StdRwLock<HashMap<u64, Arc<dyn Fn(&QueueEvent) + Send + Sync>>>,
    cb_counter: AtomicU64,
    vote_inflight: StdMutex<HashMap<(EntryId, UserId), Instant>>,
    event_tx: broadcast::Sender<QueueEventEnvelope>,
}

/// Gestionnaire central des files
#[derive(Clone)]
pub struct QueueStore {
    inner: Arc<StoreInner>,
}

impl QueueStore {
    /// Crée un store vide
    ///
    /// `quota_limit` : nombre maximal de chansons par utilisateur et par
    /// session (`None` = illimité).
    pub fn new(
        catalog: Arc<dyn MediaCatalog>,
        quota: Arc<dyn UserQuota>,
        quota_limit: Option<u32>,
    ) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                playlists: RwLock::new(HashMap::new()),
                catalog,
                quota,
                quota_limit: StdRwLock::new(quota_limit),
                callbacks: StdRwLock::new(HashMap::new()),
                cb_counter: AtomicU64::new(1),
                vote_inflight: StdMutex::new(HashMap::new()),
                event_tx: broadcast::channel(256).0,
            }),
        }
    }

    // ============================================================================
    // PLAYLISTS
    // ============================================================================

    /// Crée une playlist (erreur si l'id existe déjà)
    pub async fn create_playlist(&self, id: PlaylistId, name: impl Into<String>) -> Result<()> {
        let mut playlists = self.inner.playlists.write().await;

        if playlists.contains_key(&id) {
            return Err(Error::PlaylistAlreadyExists(id.to_string()));
        }

        let playlist = Arc::new(Playlist::new(id.clone(), name.into()));
        playlists.insert(id.clone(), playlist);
        drop(playlists);

        debug!(playlist = %id, "Playlist created");
        self.notify(&id, QueueEventKind::Updated);
        Ok(())
    }

    /// Supprime une playlist définitivement
    pub async fn delete_playlist(&self, id: &PlaylistId) -> Result<()> {
        let mut playlists = self.inner.playlists.write().await;
        playlists
            .remove(id)
            .ok_or_else(|| Error::PlaylistNotFound(id.to_string()))?;
        drop(playlists);

        self.notify(id, QueueEventKind::Updated);
        Ok(())
    }

    /// Bascule le drapeau `current` sur la playlist donnée
    ///
    /// Exactement une playlist porte le drapeau à la fois : il est retiré de
    /// toutes les autres dans la même portée d'écriture.
    pub async fn set_current(&self, id: &PlaylistId) -> Result<()> {
        let playlists = self.inner.playlists.write().await;

        if !playlists.contains_key(id) {
            return Err(Error::PlaylistNotFound(id.to_string()));
        }
        for (pid, playlist) in playlists.iter() {
            playlist.set_current_flag(pid == id);
        }
        drop(playlists);

        self.notify(id, QueueEventKind::Updated);
        Ok(())
    }

    /// Bascule le drapeau `public` (au plus une playlist)
    pub async fn set_public(&self, id: &PlaylistId) -> Result<()> {
        let playlists = self.inner.playlists.write().await;

        if !playlists.contains_key(id) {
            return Err(Error::PlaylistNotFound(id.to_string()));
        }
        for (pid, playlist) in playlists.iter() {
            playlist.set_public_flag(pid == id);
        }
        drop(playlists);

        self.notify(id, QueueEventKind::Updated);
        Ok(())
    }

    /// Résout la playlist courante au moment de l'appel
    ///
    /// Aucun composant ne conserve de référence globale : « la » file
    /// courante se retrouve toujours par cette recherche.
    pub async fn current_playlist(&self) -> Option<Arc<Playlist>> {
        let playlists = self.inner.playlists.read().await;
        playlists.values().find(|p| p.is_current()).cloned()
    }

    /// Résout la playlist publique (suggestions), si elle existe
    pub async fn public_playlist(&self) -> Option<Arc<Playlist>> {
        let playlists = self.inner.playlists.read().await;
        playlists.values().find(|p| p.is_public()).cloned()
    }

    /// Récupère une playlist par id
    pub async fn playlist(&self, id: &PlaylistId) -> Result<Arc<Playlist>> {
        let playlists = self.inner.playlists.read().await;
        playlists
            .get(id)
            .cloned()
            .ok_or_else(|| Error::PlaylistNotFound(id.to_string()))
    }

    /// Liste les ids de toutes les playlists
    pub async fn list_playlists(&self) -> Vec<PlaylistId> {
        let playlists = self.inner.playlists.read().await;
        playlists.keys().cloned().collect()
    }

    // ============================================================================
    // ENTRÉES
    // ============================================================================

    /// Ajoute une chanson à une playlist
    ///
    /// Échoue avec `MediaNotFound` si le média est inconnu du catalogue,
    /// `QuotaExceeded` si le soumetteur a atteint sa limite de session,
    /// `AlreadyQueued` si le même média est déjà en attente pour lui dans
    /// cette playlist. `position` : insertion en fin par défaut.
    pub async fn add_entry(
        &self,
        playlist_id: &PlaylistId,
        media_id: &MediaId,
        submitter_id: &UserId,
        position: Option<usize>,
    ) -> Result<QueueEntry> {
        let playlist = self.playlist(playlist_id).await?;

        // Vérifier le média avant de toucher à la file
        let media = self
            .inner
            .catalog
            .lookup(media_id)
            .ok_or_else(|| Error::MediaNotFound(media_id.to_string()))?;
        if media.media_type != MediaType::Song {
            return Err(Error::InvalidState(format!(
                "media {} is {} media, only songs can be queued",
                media_id, media.media_type
            )));
        }

        // Quota de session (décompte fourni par le collaborateur)
        if let Some(limit) = *self.inner.quota_limit.read().unwrap() {
            let submitted = self
                .inner
                .quota
                .songs_submitted_this_session(submitter_id, playlist_id);
            if submitted >= limit {
                return Err(Error::QuotaExceeded {
                    submitter: submitter_id.to_string(),
                    limit,
                });
            }
        }

        let mut core = playlist.core.write().await;
        if core.has_pending(media_id, submitter_id) {
            return Err(Error::AlreadyQueued {
                media: media_id.to_string(),
                submitter: submitter_id.to_string(),
            });
        }

        let entry = QueueEntry::new(playlist_id.clone(), media_id.clone(), submitter_id.clone());
        let inserted = core.insert(entry, position);
        drop(core);

        playlist.touch().await;
        self.notify(playlist_id, QueueEventKind::Updated);
        Ok(inserted)
    }

    /// Supprime un ensemble d'entrées
    ///
    /// Les entrées en cours de lecture sont silencieusement conservées :
    /// l'appelant doit d'abord arrêter la lecture. Retourne les ids
    /// effectivement retirés, toutes playlists confondues.
    pub async fn remove_entries(&self, ids: &[EntryId]) -> Result<Vec<EntryId>> {
        let wanted: HashSet<EntryId> = ids.iter().copied().collect();
        let playlists: Vec<Arc<Playlist>> = {
            let map = self.inner.playlists.read().await;
            map.values().cloned().collect()
        };

        let mut removed = Vec::new();
        for playlist in playlists {
            let mut core = playlist.core.write().await;
            let here = core.remove_ids(&wanted);
            drop(core);

            if !here.is_empty() {
                playlist.touch().await;
                self.notify(&playlist.id, QueueEventKind::Updated);
                removed.extend(here);
            }
        }
        Ok(removed)
    }

    /// Déplace une entrée vers une nouvelle position (bornée)
    pub async fn reorder(&self, id: &EntryId, new_pos: usize) -> Result<()> {
        let playlist = self.owning_playlist(id).await?;
        let mut core = playlist.core.write().await;
        core.reorder(id, new_pos)?;
        drop(core);

        playlist.touch().await;
        self.notify(&playlist.id, QueueEventKind::Updated);
        Ok(())
    }

    /// Positionne un drapeau de modération
    ///
    /// `accepted = true` efface `refused` et réciproquement.
    pub async fn set_flag(&self, id: &EntryId, flag: EntryFlag, value: bool) -> Result<()> {
        let playlist = self.owning_playlist(id).await?;
        let mut core = playlist.core.write().await;
        let entry = core
            .get_mut(id)
            .ok_or_else(|| Error::EntryNotFound(id.to_string()))?;

        match flag {
            EntryFlag::Refused => {
                entry.refused = value;
                if value {
                    entry.accepted = false;
                }
            }
            EntryFlag::Accepted => {
                entry.accepted = value;
                if value {
                    entry.refused = false;
                }
            }
            EntryFlag::FreeUpvote => entry.free_upvote = value,
        }
        drop(core);

        playlist.touch().await;
        self.notify(&playlist.id, QueueEventKind::Updated);
        Ok(())
    }

    /// Applique un vote positif, de manière idempotente
    ///
    /// La déduplication des votants appartient à l'appelant ; le store se
    /// contente d'absorber une ré-application immédiate du même couple
    /// (entrée, votant) via un marqueur éphémère. Retourne le nouveau
    /// compte.
    pub async fn apply_upvote(&self, id: &EntryId, voter: &UserId) -> Result<u32> {
        let playlist = self.owning_playlist(id).await?;
        let mut core = playlist.core.write().await;
        let entry = core
            .get_mut(id)
            .ok_or_else(|| Error::EntryNotFound(id.to_string()))?;

        // Marqueur en vol : un doublon immédiat ne compte pas deux fois
        {
            let mut inflight = self.inner.vote_inflight.lock().unwrap();
            let now = Instant::now();
            inflight.retain(|_, at| now.duration_since(*at) < VOTE_INFLIGHT_TTL);

            let key = (*id, voter.clone());
            if inflight.contains_key(&key) {
                debug!(entry = %id, voter = %voter, "Duplicate upvote absorbed");
                return Ok(entry.upvote_count);
            }
            inflight.insert(key, now);
        }

        entry.upvote_count += 1;
        let count = entry.upvote_count;
        drop(core);

        playlist.touch().await;
        self.notify(&playlist.id, QueueEventKind::Updated);
        Ok(count)
    }

    /// Plus petite position non jouée et non refusée de la playlist
    pub async fn next_unplayed(&self, playlist_id: &PlaylistId) -> Result<Option<QueueEntry>> {
        let playlist = self.playlist(playlist_id).await?;
        let core = playlist.core.read().await;
        Ok(core.next_unplayed())
    }

    /// Marque une entrée comme jouée (l'historique est conservé)
    pub async fn mark_played(&self, id: &EntryId) -> Result<()> {
        let playlist = self.owning_playlist(id).await?;
        let mut core = playlist.core.write().await;
        let entry = core
            .get_mut(id)
            .ok_or_else(|| Error::EntryNotFound(id.to_string()))?;
        entry.played = true;
        entry.playing = false;
        drop(core);

        playlist.touch().await;
        self.notify(&playlist.id, QueueEventKind::EntryPlayed { entry_id: *id });
        Ok(())
    }

    /// Marque une entrée comme en cours de lecture
    ///
    /// Invariant global : au plus une entrée `playing` à tout instant, le
    /// drapeau est donc d'abord effacé partout.
    pub async fn mark_playing(&self, id: &EntryId) -> Result<()> {
        let playlists: Vec<Arc<Playlist>> = {
            let map = self.inner.playlists.read().await;
            map.values().cloned().collect()
        };

        let mut found = false;
        for playlist in &playlists {
            let mut core = playlist.core.write().await;
            core.clear_playing();
            if let Some(entry) = core.get_mut(id) {
                entry.playing = true;
                found = true;
            }
        }

        if !found {
            return Err(Error::EntryNotFound(id.to_string()));
        }

        let playlist = self.owning_playlist(id).await?;
        self.notify(&playlist.id, QueueEventKind::Updated);
        Ok(())
    }

    /// Efface tous les drapeaux `playing` (arrêt de la lecture)
    pub async fn clear_playing(&self) {
        let playlists: Vec<Arc<Playlist>> = {
            let map = self.inner.playlists.read().await;
            map.values().cloned().collect()
        };
        for playlist in playlists {
            let mut core = playlist.core.write().await;
            core.clear_playing();
        }
    }

    /// Réinitialise les drapeaux `played` pour un nouveau tour
    ///
    /// Les entrées refusées ne sont pas ressuscitées. Retourne le nombre
    /// d'entrées remises en jeu.
    pub async fn reset_round(&self, playlist_id: &PlaylistId) -> Result<usize> {
        let playlist = self.playlist(playlist_id).await?;
        let mut core = playlist.core.write().await;
        let reset = core.reset_round();
        drop(core);

        if reset > 0 {
            playlist.touch().await;
            self.notify(playlist_id, QueueEventKind::Updated);
        }
        Ok(reset)
    }

    /// Promeut une suggestion publique dans la file courante
    ///
    /// L'entrée promue est une nouvelle entrée (id propre) reliée à la
    /// suggestion d'origine par `linked_public_entry_id`, relation faible,
    /// jamais propriétaire : supprimer l'une ne supprime pas l'autre. Le
    /// refus a priorité sur la promotion : une suggestion `refused` ne peut
    /// pas être promue.
    pub async fn promote_public_entry(&self, public_id: &EntryId) -> Result<QueueEntry> {
        let public = self
            .public_playlist()
            .await
            .ok_or(Error::NoPublicPlaylist)?;
        let current = self
            .current_playlist()
            .await
            .ok_or(Error::NoCurrentPlaylist)?;

        // Lire la suggestion sous la portée publique
        let source = {
            let core = public.core.read().await;
            core.get(public_id)
                .cloned()
                .ok_or_else(|| Error::EntryNotFound(public_id.to_string()))?
        };

        if source.refused {
            return Err(Error::InvalidState(format!(
                "entry {} was refused, refusal takes precedence over promotion",
                public_id
            )));
        }

        let mut core = current.core.write().await;
        if core.has_pending(&source.media_id, &source.submitter_id) {
            return Err(Error::AlreadyQueued {
                media: source.media_id.to_string(),
                submitter: source.submitter_id.to_string(),
            });
        }

        let mut entry = QueueEntry::new(
            current.id.clone(),
            source.media_id.clone(),
            source.submitter_id.clone(),
        );
        entry.linked_public_entry_id = Some(*public_id);
        entry.upvote_count = source.upvote_count;
        // Promue par la communauté : ne compte pas dans le quota de l'auteur
        entry.free_upvote = true;

        let inserted = core.insert(entry, None);
        drop(core);

        current.touch().await;
        self.notify(&current.id, QueueEventKind::Updated);
        Ok(inserted)
    }

    /// Snapshot ordonné des entrées d'une playlist
    pub async fn entries(&self, playlist_id: &PlaylistId) -> Result<Vec<QueueEntry>> {
        let playlist = self.playlist(playlist_id).await?;
        let core = playlist.core.read().await;
        Ok(core.snapshot())
    }

    /// Retrouve une entrée et sa playlist propriétaire
    pub async fn find_entry(&self, id: &EntryId) -> Option<(PlaylistId, QueueEntry)> {
        let playlists: Vec<Arc<Playlist>> = {
            let map = self.inner.playlists.read().await;
            map.values().cloned().collect()
        };
        for playlist in playlists {
            let core = playlist.core.read().await;
            if let Some(entry) = core.get(id) {
                return Some((playlist.id.clone(), entry.clone()));
            }
        }
        None
    }

    /// Change la limite de quota par utilisateur
    pub fn set_quota_limit(&self, limit: Option<u32>) {
        *self.inner.quota_limit.write().unwrap() = limit;
    }

    async fn owning_playlist(&self, id: &EntryId) -> Result<Arc<Playlist>> {
        let playlists: Vec<Arc<Playlist>> = {
            let map = self.inner.playlists.read().await;
            map.values().cloned().collect()
        };
        for playlist in playlists {
            let core = playlist.core.read().await;
            if core.get(id).is_some() {
                drop(core);
                return Ok(playlist);
            }
        }
        Err(Error::EntryNotFound(id.to_string()))
    }

    // ============================================================================
    // ÉVÈNEMENTS
    // ============================================================================

    /// Enregistre un callback d'évènement file.
    ///
    /// Retourne un jeton (u64) pour désenregistrer plus tard.
    pub fn register_callback<F>(&self, cb: F) -> u64
    where
        F: Fn(&QueueEvent) + Send + Sync + 'static,
    {
        let token = self.inner.cb_counter.fetch_add(1, Ordering::Relaxed);
        let mut guard = self.inner.callbacks.write().unwrap();
        guard.insert(token, Arc::new(cb));
        token
    }

    /// Désenregistre un callback via son jeton.
    pub fn unregister_callback(&self, token: u64) {
        let mut guard = self.inner.callbacks.write().unwrap();
        guard.remove(&token);
    }

    /// Souscrit au flux d'évènements horodatés.
    pub fn subscribe_events(&self) -> broadcast::Receiver<QueueEventEnvelope> {
        self.inner.event_tx.subscribe()
    }

    fn notify(&self, id: &PlaylistId, kind: QueueEventKind) {
        let event = QueueEvent {
            playlist_id: id.clone(),
            kind,
        };
        let envelope = QueueEventEnvelope {
            event: event.clone(),
            timestamp: chrono::Utc::now(),
        };

        let guard = self.inner.callbacks.read().unwrap();
        for cb in guard.values() {
            cb(&event);
        }
        drop(guard);

        // Diffusion via canal interne (ignoré si aucun abonné)
        let _ = self.inner.event_tx.send(envelope);
    }

    /// Marque une entrée comme refusée suite à un média disparu du
    /// catalogue (utilisé par le sélecteur pour ne pas bloquer la boucle).
    pub async fn refuse_unresolvable(&self, id: &EntryId) -> Result<()> {
        warn!(entry = %id, "Media vanished from catalog, refusing entry");
        self.set_flag(id, EntryFlag::Refused, true).await
    }
}
