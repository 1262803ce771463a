//! Frontière de persistance : snapshots sérialisables des playlists
//!
//! Le stockage appartient à un collaborateur externe ; le store ne fait
//! qu'exporter et réimporter des documents serde aux frontières du
//! processus. Le slot de lecture n'est jamais persisté : les drapeaux
//! `playing` sont effacés à la restauration, le moteur re-sélectionne au
//! redémarrage.

use serde::{Deserialize, Serialize};

use crate::entry::{PlaylistId, QueueEntry};
use crate::store::QueueStore;
use crate::Result;

/// Document de persistance d'une playlist
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaylistSnapshot {
    pub id: PlaylistId,
    pub name: String,
    pub is_current: bool,
    pub is_public: bool,
    pub flag_visible: bool,
    pub entries: Vec<QueueEntry>,
}

impl QueueStore {
    /// Exporte une playlist sous forme de document sérialisable
    pub async fn snapshot(&self, playlist_id: &PlaylistId) -> Result<PlaylistSnapshot> {
        let playlist = self.playlist(playlist_id).await?;
        let entries = {
            let core = playlist.core.read().await;
            core.snapshot()
        };

        Ok(PlaylistSnapshot {
            id: playlist.id.clone(),
            name: playlist.name().await,
            is_current: playlist.is_current(),
            is_public: playlist.is_public(),
            flag_visible: playlist.is_visible(),
            entries,
        })
    }

    /// Restaure une playlist depuis un document
    ///
    /// Erreur si l'id existe déjà. Les positions sont renumérotées et les
    /// drapeaux `playing` effacés.
    pub async fn restore(&self, snapshot: PlaylistSnapshot) -> Result<PlaylistId> {
        let id = snapshot.id.clone();
        self.create_playlist(id.clone(), snapshot.name).await?;

        let playlist = self.playlist(&id).await?;
        {
            let mut core = playlist.core.write().await;
            core.replace(snapshot.entries);
        }
        playlist.set_visible(snapshot.flag_visible);

        if snapshot.is_current {
            self.set_current(&id).await?;
        }
        if snapshot.is_public {
            self.set_public(&id).await?;
        }

        Ok(id)
    }
}
