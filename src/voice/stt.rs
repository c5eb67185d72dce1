//! Speech-to-text (STT)

use std::str::FromStr;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};

use crate::command::fold_transcript;
use crate::{Error, Result};

/// Default Whisper model
pub const DEFAULT_WHISPER_MODEL: &str = "whisper-1";

/// Default Deepgram model
pub const DEFAULT_DEEPGRAM_MODEL: &str = "nova-2";

const WHISPER_URL: &str = "https://api.openai.com/v1/audio/transcriptions";
const DEEPGRAM_URL: &str = "https://api.deepgram.com/v1/listen";

/// Turns recorded speech into text
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Transcribe one WAV-encoded utterance
    ///
    /// # Errors
    ///
    /// Returns `Unintelligible` when the service heard no words, otherwise
    /// `Stt` / `Http` for service failures
    async fn transcribe(&self, wav: &[u8]) -> Result<String>;
}

/// Response from OpenAI Whisper transcription API
#[derive(serde::Deserialize)]
struct WhisperResponse {
    text: String,
}

/// Response from Deepgram transcription API
#[derive(serde::Deserialize)]
struct DeepgramResponse {
    results: DeepgramResults,
}

#[derive(serde::Deserialize)]
struct DeepgramResults {
    channels: Vec<DeepgramChannel>,
}

#[derive(serde::Deserialize)]
struct DeepgramChannel {
    alternatives: Vec<DeepgramAlternative>,
}

#[derive(serde::Deserialize)]
struct DeepgramAlternative {
    transcript: String,
}

/// STT provider backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SttProvider {
    /// OpenAI Whisper
    #[default]
    Whisper,
    /// Deepgram
    Deepgram,
}

impl SttProvider {
    /// Model used when none is configured
    #[must_use]
    pub const fn default_model(self) -> &'static str {
        match self {
            Self::Whisper => DEFAULT_WHISPER_MODEL,
            Self::Deepgram => DEFAULT_DEEPGRAM_MODEL,
        }
    }

    /// Environment variable holding the provider's API key
    #[must_use]
    pub const fn api_key_var(self) -> &'static str {
        match self {
            Self::Whisper => "OPENAI_API_KEY",
            Self::Deepgram => "DEEPGRAM_API_KEY",
        }
    }
}

impl FromStr for SttProvider {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "whisper" | "openai" => Ok(Self::Whisper),
            "deepgram" => Ok(Self::Deepgram),
            other => Err(format!("unknown STT provider {other:?} (expected \"whisper\" or \"deepgram\")")),
        }
    }
}

impl std::fmt::Display for SttProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Whisper => f.write_str("whisper"),
            Self::Deepgram => f.write_str("deepgram"),
        }
    }
}

/// Hosted transcription client
pub struct SpeechToText {
    client: reqwest::Client,
    api_key: SecretString,
    model: String,
    provider: SttProvider,
}

impl SpeechToText {
    /// Create a client for `provider`
    ///
    /// # Errors
    ///
    /// Returns error if the API key is empty
    pub fn new(provider: SttProvider, api_key: SecretString, model: String) -> Result<Self> {
        if api_key.expose_secret().trim().is_empty() {
            return Err(Error::Config(format!(
                "{} required for {provider} transcription",
                provider.api_key_var()
            )));
        }

        tracing::debug!(%provider, model = %model, "speech-to-text configured");

        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            model,
            provider,
        })
    }

    async fn transcribe_whisper(&self, audio: &[u8]) -> Result<String> {
        tracing::debug!(audio_bytes = audio.len(), "starting Whisper transcription");

        let form = reqwest::multipart::Form::new()
            .part(
                "file",
                reqwest::multipart::Part::bytes(audio.to_vec())
                    .file_name("audio.wav")
                    .mime_str("audio/wav")
                    .map_err(|e| Error::Stt(e.to_string()))?,
            )
            .text("model", self.model.clone());

        let response = self
            .client
            .post(WHISPER_URL)
            .bearer_auth(self.api_key.expose_secret())
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Stt(format!("Whisper API error {status}: {body}")));
        }

        let result: WhisperResponse = response.json().await?;
        Ok(result.text)
    }

    async fn transcribe_deepgram(&self, audio: &[u8]) -> Result<String> {
        tracing::debug!(audio_bytes = audio.len(), "starting Deepgram transcription");

        let response = self
            .client
            .post(DEEPGRAM_URL)
            .query(&[("model", self.model.as_str()), ("punctuate", "false")])
            .header(
                "Authorization",
                format!("Token {}", self.api_key.expose_secret()),
            )
            .header("Content-Type", "audio/wav")
            .body(audio.to_vec())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Stt(format!("Deepgram API error {status}: {body}")));
        }

        let result: DeepgramResponse = response.json().await?;
        Ok(result
            .results
            .channels
            .into_iter()
            .next()
            .and_then(|c| c.alternatives.into_iter().next())
            .map(|a| a.transcript)
            .unwrap_or_default())
    }
}

#[async_trait]
impl Transcriber for SpeechToText {
    async fn transcribe(&self, wav: &[u8]) -> Result<String> {
        let text = match self.provider {
            SttProvider::Whisper => self.transcribe_whisper(wav).await?,
            SttProvider::Deepgram => self.transcribe_deepgram(wav).await?,
        };

        let text = normalize_transcript(&text).ok_or(Error::Unintelligible)?;
        tracing::info!(transcript = %text, "transcription complete");
        Ok(text)
    }
}

/// Fold a transcript for command matching; `None` when nothing was said
#[must_use]
pub fn normalize_transcript(text: &str) -> Option<String> {
    let text = fold_transcript(text);
    if text.is_empty() { None } else { Some(text) }
}
