//! # okequeue - Gestionnaire des files karaoké d'OkeBox
//!
//! Cette crate fournit le magasin central des files de chansons :
//! - Playlists nommées avec dualité courante/publique
//! - Entrées ordonnées (positions denses, renumérotées à chaque mutation)
//! - Drapeaux de modération, votes positifs idempotents, quotas de session
//! - Évènements de file (callbacks + canal broadcast horodaté)
//! - Frontière de persistance par snapshots serde
//!
//! # Architecture
//!
//! - **QueueStore** : surface unique de mutation, partagée par clonage
//! - **Playlist / PlaylistCore** : conteneur ordonné sous verrou par playlist
//! - **QueueEntry** : une soumission (distincte du média réutilisable)
//! - **UserQuota** : décompte de session fourni par le collaborateur d'auth
//!
//! # Exemple d'utilisation
//!
//! ```no_run
//! use std::sync::Arc;
//! use okemedia::{InMemoryCatalog, MediaId};
//! use okequeue::{NoQuota, PlaylistId, QueueStore, UserId};
//!
//! # #[tokio::main]
//! # async fn main() -> okequeue::Result<()> {
//! let catalog = Arc::new(InMemoryCatalog::new());
//! let store = QueueStore::new(catalog, Arc::new(NoQuota), None);
//!
//! let session = PlaylistId::from("saturday-night");
//! store.create_playlist(session.clone(), "Saturday Night").await?;
//! store.set_current(&session).await?;
//!
//! let entry = store
//!     .add_entry(&session, &MediaId::from("kara-001"), &UserId::from("aya"), None)
//!     .await?;
//! println!("queued at position {}", entry.position);
//! # Ok(())
//! # }
//! ```

mod entry;
mod error;
mod playlist;
mod quota;
mod snapshot;
mod store;

#[cfg(feature = "okeconfig")]
mod config_ext;

// Réexports publics
pub use entry::{EntryFlag, EntryId, PlaylistId, QueueEntry, UserId};
pub use error::{Error, Result};
pub use playlist::{core::PlaylistCore, Playlist};
pub use quota::{NoQuota, SessionQuota, StaticQuota, UserQuota};
pub use snapshot::PlaylistSnapshot;
pub use store::{QueueEvent, QueueEventEnvelope, QueueEventKind, QueueStore};

#[cfg(feature = "okeconfig")]
pub use config_ext::QueueConfigExt;
