//! Remote playback service
//!
//! The bridge only needs a handful of operations from the streaming service:
//! device discovery, catalog search, track enumeration, and the transport
//! controls. They sit behind `PlaybackService` so the input loops can be
//! exercised without network access.

mod auth;
mod spotify;

use async_trait::async_trait;

pub use auth::{
    AUTHORIZE_URL, SCOPES, SpotifyAuth, SpotifyCredentials, StoredToken, TOKEN_URL,
    extract_auth_code,
};
pub use spotify::SpotifyClient;

use crate::Result;

/// Kind of playable catalog item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ItemKind {
    /// A single song
    Track,
    /// An album (played as its ordered track list)
    Album,
    /// A playlist (played as its ordered track list)
    Playlist,
}

impl ItemKind {
    /// Search `type` parameter / URI segment name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Track => "track",
            Self::Album => "album",
            Self::Playlist => "playlist",
        }
    }

    /// Infer the kind from a `spotify:<kind>:<id>` URI
    ///
    /// Returns `None` for anything that is not a track, album or playlist URI.
    #[must_use]
    pub fn from_uri(uri: &str) -> Option<Self> {
        let mut segments = uri.trim().split(':');
        if segments.next() != Some("spotify") {
            return None;
        }

        // Legacy playlist URIs look like `spotify:user:<name>:playlist:<id>`
        let segments: Vec<&str> = segments.collect();
        let kind = match segments.as_slice() {
            [kind, id] if !id.is_empty() => *kind,
            ["user", _, "playlist", id] if !id.is_empty() => "playlist",
            _ => return None,
        };

        match kind {
            "track" => Some(Self::Track),
            "album" => Some(Self::Album),
            "playlist" => Some(Self::Playlist),
            _ => None,
        }
    }
}

impl std::fmt::Display for ItemKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An output endpoint registered with the streaming service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputDevice {
    /// Opaque device identifier
    pub id: String,
    /// Human readable name (what the user configures)
    pub name: String,
    /// Whether the device is currently the active one
    pub is_active: bool,
}

/// Best match returned by a catalog search
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogItem {
    /// Item URI, e.g. `spotify:track:...`
    pub uri: String,
    /// Display name
    pub name: String,
}

/// Operations consumed from the remote playback/catalog service
///
/// Implementations report HTTP 429 as [`crate::Error::RateLimited`]; every
/// other failure is an opaque error with a message.
#[async_trait]
pub trait PlaybackService: Send + Sync {
    /// List the user's available output devices
    async fn devices(&self) -> Result<Vec<OutputDevice>>;

    /// Start playback of `uris`, in order, on `device_id`
    async fn start_playback(&self, device_id: &str, uris: &[String]) -> Result<()>;

    /// Pause the current playback
    async fn pause(&self) -> Result<()>;

    /// Set output volume in percent (0-100)
    async fn set_volume(&self, percent: u8) -> Result<()>;

    /// Search the catalog, returning the single best match
    async fn search(&self, query: &str, kind: ItemKind) -> Result<Option<CatalogItem>>;

    /// Ordered track URIs of an album
    async fn album_tracks(&self, album_uri: &str) -> Result<Vec<String>>;

    /// Ordered track URIs of a playlist (unavailable entries skipped)
    async fn playlist_tracks(&self, playlist_uri: &str) -> Result<Vec<String>>;
}

/// Extract the bare id from a `spotify:<kind>:<id>` URI
///
/// Bare ids are returned unchanged.
#[must_use]
pub fn spotify_id(uri: &str) -> &str {
    uri.trim().rsplit(':').next().unwrap_or(uri)
}
