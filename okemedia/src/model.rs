use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Stable identifier of a playable item in the catalog.
///
/// The queue references media through this id only; it never owns the
/// underlying metadata.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MediaId(String);

impl MediaId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MediaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MediaId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for MediaId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Classification of a playable item.
///
/// `Song` is the only type that lives in queues; everything else is filler
/// media woven between songs by the selector or displayed by the player
/// while idle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaType {
    Song,
    Background,
    PauseScreen,
    Jingle,
    Sponsor,
    Encore,
    Outro,
    Intro,
}

impl MediaType {
    /// True for media that is not a queued song.
    pub fn is_filler(&self) -> bool {
        !matches!(self, MediaType::Song)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MediaType::Song => "song",
            MediaType::Background => "background",
            MediaType::PauseScreen => "pause_screen",
            MediaType::Jingle => "jingle",
            MediaType::Sponsor => "sponsor",
            MediaType::Encore => "encore",
            MediaType::Outro => "outro",
            MediaType::Intro => "intro",
        }
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Metadata returned by a catalog lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaInfo {
    pub id: MediaId,
    pub title: String,
    pub duration_secs: u32,
    pub media_type: MediaType,
    pub path: PathBuf,
}

impl MediaInfo {
    pub fn new(
        id: impl Into<MediaId>,
        title: impl Into<String>,
        duration_secs: u32,
        media_type: MediaType,
        path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            duration_secs,
            media_type,
            path: path.into(),
        }
    }
}
