//! Quota de soumission par utilisateur
//!
//! Le décompte appartient au collaborateur d'authentification/session ; le
//! store ne fait que l'interroger au moment d'une soumission. Deux
//! implémentations sont fournies : `NoQuota` (illimité) et `SessionQuota`,
//! un compteur de session en mémoire que l'application alimente.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::entry::{PlaylistId, UserId};

/// Lecture seule : combien de chansons cet utilisateur a soumis dans la
/// session courante, pour cette playlist.
pub trait UserQuota: Send + Sync {
    fn songs_submitted_this_session(&self, user: &UserId, playlist: &PlaylistId) -> u32;
}

/// Aucun décompte : toutes les soumissions sont autorisées
#[derive(Debug, Default)]
pub struct NoQuota;

impl UserQuota for NoQuota {
    fn songs_submitted_this_session(&self, _user: &UserId, _playlist: &PlaylistId) -> u32 {
        0
    }
}

/// Décomptes figés, utile pour les tests
#[derive(Debug, Default)]
pub struct StaticQuota {
    counts: HashMap<(UserId, PlaylistId), u32>,
}

impl StaticQuota {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, user: UserId, playlist: PlaylistId, count: u32) {
        self.counts.insert((user, playlist), count);
    }
}

impl UserQuota for StaticQuota {
    fn songs_submitted_this_session(&self, user: &UserId, playlist: &PlaylistId) -> u32 {
        self.counts
            .get(&(user.clone(), playlist.clone()))
            .copied()
            .unwrap_or(0)
    }
}

/// Compteur de session en mémoire
///
/// L'application appelle `record_submission` après chaque soumission
/// acceptée ; `reset` démarre une nouvelle session.
#[derive(Debug, Default)]
pub struct SessionQuota {
    counts: Mutex<HashMap<(UserId, PlaylistId), u32>>,
}

impl SessionQuota {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_submission(&self, user: &UserId, playlist: &PlaylistId) {
        let mut counts = self.counts.lock().unwrap();
        *counts
            .entry((user.clone(), playlist.clone()))
            .or_insert(0) += 1;
    }

    pub fn reset(&self) {
        self.counts.lock().unwrap().clear();
    }
}

impl UserQuota for SessionQuota {
    fn songs_submitted_this_session(&self, user: &UserId, playlist: &PlaylistId) -> u32 {
        self.counts
            .lock()
            .unwrap()
            .get(&(user.clone(), playlist.clone()))
            .copied()
            .unwrap_or(0)
    }
}
