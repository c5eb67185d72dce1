//! Shared test utilities

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use nfc_jukebox::bridge::BridgeContext;
use nfc_jukebox::config::ThrottleConfig;
use nfc_jukebox::playback::{CatalogItem, ItemKind, OutputDevice, PlaybackService};
use nfc_jukebox::{Error, Result, Shutdown, Transcriber};

/// Device name the fake service exposes by default
pub const DEVICE_NAME: &str = "LIVING-ROOM";

/// Id of [`DEVICE_NAME`]
pub const DEVICE_ID: &str = "dev-1";

/// A call received by [`FakePlaybackService`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Devices,
    StartPlayback { device_id: String, uris: Vec<String> },
    Pause,
    SetVolume(u8),
    Search { query: String, kind: ItemKind },
    AlbumTracks(String),
    PlaylistTracks(String),
}

/// In-memory playback service that records every call
#[derive(Default)]
pub struct FakePlaybackService {
    devices: Mutex<Vec<OutputDevice>>,
    search: Mutex<HashMap<String, CatalogItem>>,
    albums: Mutex<HashMap<String, Vec<String>>>,
    playlists: Mutex<HashMap<String, Vec<String>>>,
    calls: Mutex<Vec<Call>>,
    rate_limited: AtomicUsize,
}

impl FakePlaybackService {
    /// Service with the default device and nothing in the catalog
    pub fn new() -> Self {
        let service = Self::default();
        service.devices.try_lock().unwrap().push(OutputDevice {
            id: DEVICE_ID.to_string(),
            name: DEVICE_NAME.to_string(),
            is_active: true,
        });
        service
    }

    /// Service reporting no devices at all
    pub fn without_devices() -> Self {
        Self::default()
    }

    /// Replace the device list
    pub async fn set_devices(&self, names: &[&str]) {
        *self.devices.lock().await = names
            .iter()
            .enumerate()
            .map(|(i, name)| OutputDevice {
                id: format!("dev-{i}"),
                name: (*name).to_string(),
                is_active: false,
            })
            .collect();
    }

    /// Make `query` find `uri`
    pub async fn add_search_result(&self, query: &str, uri: &str, name: &str) {
        self.search.lock().await.insert(
            query.to_string(),
            CatalogItem {
                uri: uri.to_string(),
                name: name.to_string(),
            },
        );
    }

    /// Register an album's tracks
    pub async fn add_album(&self, uri: &str, tracks: &[&str]) {
        self.albums
            .lock()
            .await
            .insert(uri.to_string(), tracks.iter().map(ToString::to_string).collect());
    }

    /// Register a playlist's tracks
    pub async fn add_playlist(&self, uri: &str, tracks: &[&str]) {
        self.playlists
            .lock()
            .await
            .insert(uri.to_string(), tracks.iter().map(ToString::to_string).collect());
    }

    /// Answer the next `n` calls with 429
    pub fn rate_limit_next(&self, n: usize) {
        self.rate_limited.store(n, Ordering::SeqCst);
    }

    /// Every call so far, in order
    pub async fn calls(&self) -> Vec<Call> {
        self.calls.lock().await.clone()
    }

    /// Volumes passed to `set_volume`, in order
    pub async fn volume_calls(&self) -> Vec<u8> {
        self.calls
            .lock()
            .await
            .iter()
            .filter_map(|c| match c {
                Call::SetVolume(v) => Some(*v),
                _ => None,
            })
            .collect()
    }

    /// Playback starts, in order
    pub async fn playback_starts(&self) -> Vec<Vec<String>> {
        self.calls
            .lock()
            .await
            .iter()
            .filter_map(|c| match c {
                Call::StartPlayback { uris, .. } => Some(uris.clone()),
                _ => None,
            })
            .collect()
    }

    async fn record(&self, call: Call) -> Result<()> {
        self.calls.lock().await.push(call);

        // Let a concurrent caller run while this one is "on the wire"
        tokio::task::yield_now().await;

        let limited = self
            .rate_limited
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if limited {
            return Err(Error::RateLimited { retry_after: None });
        }
        Ok(())
    }
}

#[async_trait]
impl PlaybackService for FakePlaybackService {
    async fn devices(&self) -> Result<Vec<OutputDevice>> {
        self.record(Call::Devices).await?;
        Ok(self.devices.lock().await.clone())
    }

    async fn start_playback(&self, device_id: &str, uris: &[String]) -> Result<()> {
        self.record(Call::StartPlayback {
            device_id: device_id.to_string(),
            uris: uris.to_vec(),
        })
        .await
    }

    async fn pause(&self) -> Result<()> {
        self.record(Call::Pause).await
    }

    async fn set_volume(&self, percent: u8) -> Result<()> {
        self.record(Call::SetVolume(percent)).await
    }

    async fn search(&self, query: &str, kind: ItemKind) -> Result<Option<CatalogItem>> {
        self.record(Call::Search {
            query: query.to_string(),
            kind,
        })
        .await?;
        Ok(self.search.lock().await.get(query).cloned())
    }

    async fn album_tracks(&self, album_uri: &str) -> Result<Vec<String>> {
        self.record(Call::AlbumTracks(album_uri.to_string())).await?;
        Ok(self.albums.lock().await.get(album_uri).cloned().unwrap_or_default())
    }

    async fn playlist_tracks(&self, playlist_uri: &str) -> Result<Vec<String>> {
        self.record(Call::PlaylistTracks(playlist_uri.to_string()))
            .await?;
        Ok(self
            .playlists
            .lock()
            .await
            .get(playlist_uri)
            .cloned()
            .unwrap_or_default())
    }
}

/// Shared bridge objects around a fake service, default limits
pub fn context(service: &Arc<FakePlaybackService>) -> BridgeContext {
    context_with(service, ThrottleConfig::default())
}

/// Shared bridge objects around a fake service
pub fn context_with(service: &Arc<FakePlaybackService>, limits: ThrottleConfig) -> BridgeContext {
    BridgeContext::new(
        Arc::clone(service) as Arc<dyn PlaybackService>,
        DEVICE_NAME,
        "arduino",
        limits,
        Shutdown::new(),
    )
}

/// One scripted transcription result
#[derive(Debug, Clone)]
pub enum Heard {
    Text(String),
    Nothing,
    Failure(String),
}

/// Transcriber that replays a script, then hears nothing
#[derive(Default)]
pub struct ScriptedTranscriber {
    script: Mutex<VecDeque<Heard>>,
    requests: AtomicUsize,
}

impl ScriptedTranscriber {
    pub fn new(script: Vec<Heard>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            requests: AtomicUsize::new(0),
        }
    }

    /// Number of transcription requests served
    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transcriber for ScriptedTranscriber {
    async fn transcribe(&self, _wav: &[u8]) -> Result<String> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        match self.script.lock().await.pop_front() {
            Some(Heard::Text(text)) => Ok(text),
            Some(Heard::Failure(message)) => Err(Error::Stt(message)),
            Some(Heard::Nothing) | None => Err(Error::Unintelligible),
        }
    }
}
