//! Media catalog contracts for OkeBox.
//!
//! The playback core never opens media files itself: it resolves media
//! identifiers through the read-only [`MediaCatalog`] lookup and hands the
//! resulting path to the transport driver. This crate holds the identifier
//! and metadata value types shared by the queue and the player, plus an
//! in-memory catalog implementation used by tests and the demo binary.
//!
//! The catalog is an external collaborator: implementations may be backed
//! by a media library scanner, a database, or anything else, as long as
//! `lookup` behaves as a pure function for the lifetime of a session.

mod catalog;
mod model;

pub use catalog::{InMemoryCatalog, MediaCatalog};
pub use model::{MediaId, MediaInfo, MediaType};
