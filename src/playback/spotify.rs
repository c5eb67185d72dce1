//! Spotify Web API client

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Method, StatusCode};
use serde::Deserialize;

use super::{CatalogItem, ItemKind, OutputDevice, PlaybackService, SpotifyAuth, spotify_id};
use crate::{Error, Result};

/// Web API base URL
const API_BASE: &str = "https://api.spotify.com/v1";

/// Page size for album track listings (API maximum)
const ALBUM_PAGE_LIMIT: u32 = 50;

/// Page size for playlist track listings (API maximum)
const PLAYLIST_PAGE_LIMIT: u32 = 100;

#[derive(Deserialize)]
struct DevicesResponse {
    devices: Vec<DeviceObject>,
}

#[derive(Deserialize)]
struct DeviceObject {
    id: Option<String>,
    name: String,
    #[serde(default)]
    is_active: bool,
}

/// Paging object; `next` is the absolute URL of the following page
#[derive(Deserialize)]
struct Page<T> {
    items: Vec<T>,
    next: Option<String>,
}

#[derive(Deserialize)]
struct NamedItem {
    uri: String,
    name: String,
}

#[derive(Deserialize)]
struct SearchResponse {
    tracks: Option<Page<Option<NamedItem>>>,
    albums: Option<Page<Option<NamedItem>>>,
    playlists: Option<Page<Option<NamedItem>>>,
}

#[derive(Deserialize)]
struct AlbumTrack {
    uri: String,
}

#[derive(Deserialize)]
struct PlaylistEntry {
    track: Option<PlaylistTrack>,
}

#[derive(Deserialize)]
struct PlaylistTrack {
    uri: Option<String>,
}

/// Spotify implementation of [`PlaybackService`]
pub struct SpotifyClient {
    client: reqwest::Client,
    auth: SpotifyAuth,
}

impl SpotifyClient {
    /// Create a client using the given token provider
    #[must_use]
    pub fn new(auth: SpotifyAuth) -> Self {
        Self {
            client: reqwest::Client::new(),
            auth,
        }
    }

    /// Send an authorized request and map error statuses
    async fn send(
        &self,
        method: Method,
        url: &str,
        query: &[(&str, String)],
        body: Option<serde_json::Value>,
    ) -> Result<reqwest::Response> {
        let token = self.auth.access_token().await?;

        let mut request = self
            .client
            .request(method.clone(), url)
            .bearer_auth(token)
            .query(query);

        request = match body {
            Some(json) => request.json(&json),
            // PUT without a body must still send Content-Length: 0
            None if method == Method::PUT => request.header(reqwest::header::CONTENT_LENGTH, "0"),
            None => request,
        };

        let response = request.send().await.map_err(|e| {
            tracing::error!(error = %e, url, "Spotify request failed");
            e
        })?;

        let status = response.status();
        tracing::trace!(status = %status, url, "Spotify response");

        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(Error::RateLimited {
                retry_after: retry_after(response.headers()),
            });
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Playback(format!("Spotify API error {status}: {body}")));
        }

        Ok(response)
    }

    async fn get<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<T> {
        let response = self.send(Method::GET, url, query, None).await?;
        Ok(response.json().await?)
    }

    /// Walk a paged listing, following `next` links
    async fn collect_pages<T, F>(&self, first_url: String, limit: u32, mut extract: F) -> Result<Vec<String>>
    where
        T: serde::de::DeserializeOwned,
        F: FnMut(T) -> Option<String>,
    {
        let mut uris = Vec::new();
        let mut next = Some(first_url);
        let mut first = true;

        while let Some(url) = next {
            // `next` links already carry their own query string
            let query = if first {
                vec![("limit", limit.to_string())]
            } else {
                Vec::new()
            };
            first = false;

            let page: Page<T> = self.get(&url, &query).await?;
            uris.extend(page.items.into_iter().filter_map(&mut extract));
            next = page.next;
        }

        Ok(uris)
    }
}

#[async_trait]
impl PlaybackService for SpotifyClient {
    async fn devices(&self) -> Result<Vec<OutputDevice>> {
        let response: DevicesResponse = self.get(&format!("{API_BASE}/me/player/devices"), &[]).await?;

        Ok(response
            .devices
            .into_iter()
            .filter_map(|d| {
                // Restricted devices may come back without an id
                d.id.map(|id| OutputDevice {
                    id,
                    name: d.name,
                    is_active: d.is_active,
                })
            })
            .collect())
    }

    async fn start_playback(&self, device_id: &str, uris: &[String]) -> Result<()> {
        self.send(
            Method::PUT,
            &format!("{API_BASE}/me/player/play"),
            &[("device_id", device_id.to_string())],
            Some(serde_json::json!({ "uris": uris })),
        )
        .await?;
        Ok(())
    }

    async fn pause(&self) -> Result<()> {
        self.send(Method::PUT, &format!("{API_BASE}/me/player/pause"), &[], None)
            .await?;
        Ok(())
    }

    async fn set_volume(&self, percent: u8) -> Result<()> {
        self.send(
            Method::PUT,
            &format!("{API_BASE}/me/player/volume"),
            &[("volume_percent", percent.to_string())],
            None,
        )
        .await?;
        Ok(())
    }

    async fn search(&self, query: &str, kind: ItemKind) -> Result<Option<CatalogItem>> {
        let response: SearchResponse = self
            .get(
                &format!("{API_BASE}/search"),
                &[
                    ("q", query.to_string()),
                    ("type", kind.as_str().to_string()),
                    ("limit", "1".to_string()),
                ],
            )
            .await?;

        let page = match kind {
            ItemKind::Track => response.tracks,
            ItemKind::Album => response.albums,
            ItemKind::Playlist => response.playlists,
        };

        Ok(page
            .and_then(|p| p.items.into_iter().flatten().next())
            .map(|item| CatalogItem {
                uri: item.uri,
                name: item.name,
            }))
    }

    async fn album_tracks(&self, album_uri: &str) -> Result<Vec<String>> {
        let url = format!("{API_BASE}/albums/{}/tracks", spotify_id(album_uri));
        self.collect_pages(url, ALBUM_PAGE_LIMIT, |track: AlbumTrack| Some(track.uri))
            .await
    }

    async fn playlist_tracks(&self, playlist_uri: &str) -> Result<Vec<String>> {
        let url = format!("{API_BASE}/playlists/{}/tracks", spotify_id(playlist_uri));
        self.collect_pages(url, PLAYLIST_PAGE_LIMIT, |entry: PlaylistEntry| {
            entry.track.and_then(|t| t.uri)
        })
        .await
    }
}

/// Parse a `Retry-After` header given in whole seconds
pub(super) fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}
