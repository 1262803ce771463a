//! Types d'erreurs pour okequeue

/// Erreurs de gestion des files karaoké
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Playlist not found: {0}")]
    PlaylistNotFound(String),

    #[error("Playlist already exists: {0}")]
    PlaylistAlreadyExists(String),

    #[error("No playlist is flagged as current")]
    NoCurrentPlaylist,

    #[error("No playlist is flagged as public")]
    NoPublicPlaylist,

    #[error("Queue entry not found: {0}")]
    EntryNotFound(String),

    #[error("Media not found in catalog: {0}")]
    MediaNotFound(String),

    #[error("Quota exceeded for {submitter}: {limit} song(s) per session")]
    QuotaExceeded { submitter: String, limit: u32 },

    #[error("Media {media} already queued by {submitter}")]
    AlreadyQueued { media: String, submitter: String },

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Type Result spécialisé pour okequeue
pub type Result<T> = std::result::Result<T, Error>;
