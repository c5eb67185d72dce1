//! Spotify authorization-code flow and access-token refresh

use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::time::Instant;
use url::Url;

use crate::{Error, Result};

/// Authorization endpoint the user visits once
pub const AUTHORIZE_URL: &str = "https://accounts.spotify.com/authorize";

/// Token endpoint for code exchange and refresh
pub const TOKEN_URL: &str = "https://accounts.spotify.com/api/token";

/// Scopes needed to read devices and control playback
pub const SCOPES: &str = "user-modify-playback-state user-read-playback-state";

/// Refresh the access token this long before it expires
const REFRESH_MARGIN: Duration = Duration::from_secs(60);

/// Application credentials registered with Spotify
#[derive(Debug)]
pub struct SpotifyCredentials {
    /// Application client id
    pub client_id: String,
    /// Application client secret
    pub client_secret: SecretString,
    /// Redirect (callback) address registered for the application
    pub redirect_uri: String,
}

impl SpotifyCredentials {
    /// Build the URL the user opens to grant access
    ///
    /// # Errors
    ///
    /// Returns error if the authorize endpoint cannot be parsed
    pub fn authorize_url(&self, state: &str) -> Result<Url> {
        let mut url = Url::parse(AUTHORIZE_URL).map_err(|e| Error::Auth(e.to_string()))?;
        url.query_pairs_mut()
            .append_pair("client_id", &self.client_id)
            .append_pair("response_type", "code")
            .append_pair("redirect_uri", &self.redirect_uri)
            .append_pair("scope", SCOPES)
            .append_pair("state", state);
        Ok(url)
    }

    /// Exchange an authorization code for a long-lived refresh token
    ///
    /// # Errors
    ///
    /// Returns error if the token endpoint rejects the code
    pub async fn exchange_code(&self, code: &str) -> Result<StoredToken> {
        let client = reqwest::Client::new();
        let response = client
            .post(TOKEN_URL)
            .basic_auth(&self.client_id, Some(self.client_secret.expose_secret()))
            .form(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", self.redirect_uri.as_str()),
            ])
            .send()
            .await?;

        let token = read_token_response(response).await?;
        let refresh_token = token
            .refresh_token
            .ok_or_else(|| Error::Auth("token response did not include a refresh token".to_string()))?;

        tracing::info!("authorization code exchanged");
        Ok(StoredToken {
            refresh_token,
            obtained_at: Utc::now(),
        })
    }
}

/// Token endpoint response body
#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
    refresh_token: Option<String>,
}

async fn read_token_response(response: reqwest::Response) -> Result<TokenResponse> {
    let status = response.status();
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        return Err(Error::RateLimited {
            retry_after: super::spotify::retry_after(response.headers()),
        });
    }

    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        tracing::error!(status = %status, body = %body, "token request rejected");
        return Err(Error::Auth(format!("token endpoint error {status}: {body}")));
    }

    Ok(response.json().await?)
}

/// Cached access token
struct AccessToken {
    value: String,
    expires_at: Instant,
}

struct TokenState {
    refresh_token: SecretString,
    access: Option<AccessToken>,
}

/// Supplies valid access tokens, refreshing them as they expire
pub struct SpotifyAuth {
    client: reqwest::Client,
    credentials: SpotifyCredentials,
    state: Mutex<TokenState>,
}

impl SpotifyAuth {
    /// Create a token provider from credentials and a refresh token
    #[must_use]
    pub fn new(credentials: SpotifyCredentials, refresh_token: SecretString) -> Self {
        Self {
            client: reqwest::Client::new(),
            credentials,
            state: Mutex::new(TokenState {
                refresh_token,
                access: None,
            }),
        }
    }

    /// Return a valid access token
    ///
    /// Concurrent callers share one refresh request.
    ///
    /// # Errors
    ///
    /// Returns error if the refresh request fails
    pub async fn access_token(&self) -> Result<String> {
        let mut state = self.state.lock().await;

        if let Some(access) = &state.access {
            if Instant::now() + REFRESH_MARGIN < access.expires_at {
                return Ok(access.value.clone());
            }
        }

        tracing::debug!("refreshing Spotify access token");
        let response = self
            .client
            .post(TOKEN_URL)
            .basic_auth(
                &self.credentials.client_id,
                Some(self.credentials.client_secret.expose_secret()),
            )
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", state.refresh_token.expose_secret()),
            ])
            .send()
            .await?;

        let token = read_token_response(response).await?;

        // Spotify may rotate the refresh token
        if let Some(rotated) = token.refresh_token {
            state.refresh_token = SecretString::from(rotated);
        }

        let value = token.access_token;
        state.access = Some(AccessToken {
            value: value.clone(),
            expires_at: Instant::now() + Duration::from_secs(token.expires_in),
        });

        tracing::debug!(expires_in = token.expires_in, "access token refreshed");
        Ok(value)
    }
}

/// Refresh token persisted by `jukebox authorize`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredToken {
    /// Long-lived refresh token
    pub refresh_token: String,
    /// When the token was obtained
    pub obtained_at: DateTime<Utc>,
}

impl StoredToken {
    /// Load a stored token, `Ok(None)` when the file does not exist
    ///
    /// # Errors
    ///
    /// Returns error if the file exists but cannot be read or parsed
    pub fn load(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(path)?;
        let token = serde_json::from_str(&content)?;
        Ok(Some(token))
    }

    /// Write the token, readable only by the current user on unix
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be written
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
        }

        tracing::info!(path = %path.display(), "stored refresh token");
        Ok(())
    }
}

/// Pull the authorization code out of whatever the user pasted
///
/// Accepts either the full redirect URL (`...callback?code=XYZ&state=...`) or
/// the bare code.
#[must_use]
pub fn extract_auth_code(input: &str) -> Option<String> {
    let input = input.trim();
    if input.is_empty() {
        return None;
    }

    if let Ok(url) = Url::parse(input) {
        return url
            .query_pairs()
            .find(|(key, _)| key == "code")
            .map(|(_, value)| value.into_owned())
            .filter(|code| !code.is_empty());
    }

    if input.chars().any(char::is_whitespace) {
        return None;
    }

    Some(input.to_string())
}
