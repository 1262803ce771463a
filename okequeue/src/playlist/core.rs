//! PlaylistCore : structure ordonnée avec renumérotation automatique

use std::collections::HashSet;

use okemedia::MediaId;

use crate::entry::{EntryId, QueueEntry, UserId};
use crate::{Error, Result};

/// Noyau de la playlist (structure interne protégée par RwLock)
///
/// Invariant : les positions forment toujours une permutation dense
/// `0..n-1`, rétablie après chaque insertion, suppression ou déplacement.
pub struct PlaylistCore {
    entries: Vec<QueueEntry>,
}

impl PlaylistCore {
    /// Crée un nouveau core vide
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Renumérote toutes les positions (dense, à partir de 0)
    fn renumber(&mut self) {
        for (idx, entry) in self.entries.iter_mut().enumerate() {
            entry.position = idx;
        }
    }

    /// Insère une entrée à la position demandée (fin par défaut)
    ///
    /// La position est bornée à `[0, len]` puis l'ensemble est renuméroté.
    pub fn insert(&mut self, entry: QueueEntry, position: Option<usize>) -> QueueEntry {
        let at = position.unwrap_or(self.entries.len()).min(self.entries.len());
        self.entries.insert(at, entry);
        self.renumber();
        self.entries[at].clone()
    }

    /// Supprime les entrées dont l'id figure dans `ids`
    ///
    /// L'entrée en cours de lecture est silencieusement conservée (il faut
    /// d'abord arrêter la lecture). Retourne les ids effectivement retirés.
    pub fn remove_ids(&mut self, ids: &HashSet<EntryId>) -> Vec<EntryId> {
        let mut removed = Vec::new();
        self.entries.retain(|entry| {
            if ids.contains(&entry.id) && !entry.playing {
                removed.push(entry.id);
                false
            } else {
                true
            }
        });
        if !removed.is_empty() {
            self.renumber();
        }
        removed
    }

    /// Déplace une entrée vers `new_pos` (borné à `[0, len-1]`)
    ///
    /// Refusé si l'entrée est en cours de lecture.
    pub fn reorder(&mut self, id: &EntryId, new_pos: usize) -> Result<()> {
        let from = self
            .index_of(id)
            .ok_or_else(|| Error::EntryNotFound(id.to_string()))?;

        if self.entries[from].playing {
            return Err(Error::InvalidState(
                "cannot reorder the playing entry".to_string(),
            ));
        }

        let to = new_pos.min(self.entries.len().saturating_sub(1));
        if from != to {
            let entry = self.entries.remove(from);
            self.entries.insert(to, entry);
            self.renumber();
        }
        Ok(())
    }

    /// Plus petite position non jouée et non refusée
    pub fn next_unplayed(&self) -> Option<QueueEntry> {
        self.entries
            .iter()
            .find(|entry| !entry.played && !entry.refused)
            .cloned()
    }

    /// Réinitialise les drapeaux `played` pour un nouveau tour
    ///
    /// Les entrées refusées restent mortes. Retourne le nombre d'entrées
    /// remises en jeu.
    pub fn reset_round(&mut self) -> usize {
        let mut reset = 0;
        for entry in &mut self.entries {
            if entry.played && !entry.refused {
                entry.played = false;
                reset += 1;
            }
        }
        reset
    }

    /// Vrai si le même média est déjà en attente pour ce soumetteur
    pub fn has_pending(&self, media_id: &MediaId, submitter: &UserId) -> bool {
        self.entries.iter().any(|entry| {
            &entry.media_id == media_id && &entry.submitter_id == submitter && !entry.played
        })
    }

    pub fn get(&self, id: &EntryId) -> Option<&QueueEntry> {
        self.entries.iter().find(|entry| &entry.id == id)
    }

    pub fn get_mut(&mut self, id: &EntryId) -> Option<&mut QueueEntry> {
        self.entries.iter_mut().find(|entry| &entry.id == id)
    }

    fn index_of(&self, id: &EntryId) -> Option<usize> {
        self.entries.iter().position(|entry| &entry.id == id)
    }

    /// Remet tous les drapeaux `playing` à faux
    pub fn clear_playing(&mut self) {
        for entry in &mut self.entries {
            entry.playing = false;
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Snapshot de toutes les entrées, dans l'ordre des positions
    pub fn snapshot(&self) -> Vec<QueueEntry> {
        self.entries.clone()
    }

    /// Remplace le contenu (restauration depuis la frontière de persistance)
    ///
    /// Les drapeaux `playing` sont effacés : le slot de lecture n'est jamais
    /// persisté et se reconstruit par re-sélection.
    pub fn replace(&mut self, mut entries: Vec<QueueEntry>) {
        entries.sort_by_key(|entry| entry.position);
        for entry in &mut entries {
            entry.playing = false;
        }
        self.entries = entries;
        self.renumber();
    }
}

impl Default for PlaylistCore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::PlaylistId;

    fn entry(media: &str, user: &str) -> QueueEntry {
        QueueEntry::new(
            PlaylistId::from("pl"),
            MediaId::from(media),
            UserId::from(user),
        )
    }

    fn positions(core: &PlaylistCore) -> Vec<usize> {
        core.snapshot().iter().map(|e| e.position).collect()
    }

    #[test]
    fn test_positions_stay_dense() {
        let mut core = PlaylistCore::new();
        let a = core.insert(entry("a", "u1"), None);
        let _b = core.insert(entry("b", "u2"), None);
        let c = core.insert(entry("c", "u3"), Some(0));

        assert_eq!(positions(&core), vec![0, 1, 2]);
        assert_eq!(core.get(&c.id).unwrap().position, 0);

        let removed = core.remove_ids(&HashSet::from([a.id]));
        assert_eq!(removed, vec![a.id]);
        assert_eq!(positions(&core), vec![0, 1]);
    }

    #[test]
    fn test_insert_position_clamped() {
        let mut core = PlaylistCore::new();
        core.insert(entry("a", "u1"), None);
        let b = core.insert(entry("b", "u2"), Some(99));
        assert_eq!(b.position, 1);
    }

    #[test]
    fn test_reorder_clamps_and_renumbers() {
        let mut core = PlaylistCore::new();
        let a = core.insert(entry("a", "u1"), None);
        core.insert(entry("b", "u2"), None);
        core.insert(entry("c", "u3"), None);

        core.reorder(&a.id, 42).unwrap();
        assert_eq!(core.get(&a.id).unwrap().position, 2);
        assert_eq!(positions(&core), vec![0, 1, 2]);
    }

    #[test]
    fn test_reorder_playing_entry_refused() {
        let mut core = PlaylistCore::new();
        let a = core.insert(entry("a", "u1"), None);
        core.insert(entry("b", "u2"), None);
        core.get_mut(&a.id).unwrap().playing = true;

        let err = core.reorder(&a.id, 1).unwrap_err();
        assert!(matches!(err, Error::InvalidState(_)));
    }

    #[test]
    fn test_remove_skips_playing_entry() {
        let mut core = PlaylistCore::new();
        let a = core.insert(entry("a", "u1"), None);
        let b = core.insert(entry("b", "u2"), None);
        core.get_mut(&a.id).unwrap().playing = true;

        let removed = core.remove_ids(&HashSet::from([a.id, b.id]));
        assert_eq!(removed, vec![b.id]);
        assert_eq!(core.len(), 1);
    }

    #[test]
    fn test_round_reset_keeps_refused_dead() {
        let mut core = PlaylistCore::new();
        let a = core.insert(entry("a", "u1"), None);
        let b = core.insert(entry("b", "u2"), None);
        core.get_mut(&a.id).unwrap().played = true;
        core.get_mut(&b.id).unwrap().played = true;
        core.get_mut(&b.id).unwrap().refused = true;

        assert_eq!(core.reset_round(), 1);
        // Le tour repart sur la première position, pas la dernière jouée
        let next = core.next_unplayed().unwrap();
        assert_eq!(next.id, a.id);
        assert_eq!(next.position, 0);
    }
}
