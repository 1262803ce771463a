//! QueueEntry : une chanson placée dans une file par un utilisateur
//!
//! Une entrée est distincte du média qu'elle référence : le même média peut
//! être demandé plusieurs fois (par des utilisateurs différents), chaque
//! demande produit une entrée avec son propre identifiant stable.

use std::fmt;

use chrono::{DateTime, Utc};
use okemedia::MediaId;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifiant stable d'une entrée (survit aux réordonnancements)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryId(Uuid);

impl EntryId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EntryId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Identifiant d'un utilisateur (fourni par le collaborateur d'authentification)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Identifiant d'une playlist
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlaylistId(String);

impl PlaylistId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PlaylistId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PlaylistId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Drapeaux modifiables via `QueueStore::set_flag`
///
/// `played` et `playing` ne sont pas exposés ici : ils sont pilotés par le
/// moteur de lecture via `mark_played` / `mark_playing` pour préserver les
/// invariants (au plus une entrée `playing` à la fois).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryFlag {
    /// Refusée par un modérateur (exclut `accepted`)
    Refused,
    /// Acceptée par un modérateur (exclut `refused`)
    Accepted,
    /// Entrée gratuite : ne compte pas dans le quota de son auteur
    FreeUpvote,
}

/// Une entrée dans une file karaoké
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueEntry {
    /// Identifiant unique, stable à travers les réordonnancements
    pub id: EntryId,

    /// Référence vers le catalogue média (non possédée)
    pub media_id: MediaId,

    /// Utilisateur ayant soumis la chanson
    pub submitter_id: UserId,

    /// Position dans la playlist (dense, renumérotée à chaque mutation)
    pub position: usize,

    /// Playlist propriétaire de l'entrée
    pub playlist_id: PlaylistId,

    pub played: bool,
    pub playing: bool,
    pub refused: bool,
    pub accepted: bool,
    pub free_upvote: bool,

    /// Nombre de votes positifs (dédupliqués par l'appelant)
    pub upvote_count: u32,

    /// Référence faible vers l'entrée publique d'origine lorsque l'entrée a
    /// été promue depuis la file de suggestions ; jamais propriétaire.
    pub linked_public_entry_id: Option<EntryId>,

    /// Horodatage de soumission
    pub added_at: DateTime<Utc>,
}

impl QueueEntry {
    /// Crée une nouvelle entrée en fin de playlist (position fixée ensuite
    /// par le renumérotage du core)
    pub fn new(playlist_id: PlaylistId, media_id: MediaId, submitter_id: UserId) -> Self {
        Self {
            id: EntryId::new(),
            media_id,
            submitter_id,
            position: 0,
            playlist_id,
            played: false,
            playing: false,
            refused: false,
            accepted: false,
            free_upvote: false,
            upvote_count: 0,
            linked_public_entry_id: None,
            added_at: Utc::now(),
        }
    }

    /// Une entrée est en attente tant qu'elle n'a été ni jouée ni refusée
    pub fn is_pending(&self) -> bool {
        !self.played && !self.refused
    }
}
