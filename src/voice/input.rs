//! Voice input loop

use std::sync::Arc;

use tokio::sync::mpsc;

use super::stt::Transcriber;
use crate::Error;
use crate::resolver::CommandResolver;
use crate::shutdown::Shutdown;

/// Transcribes utterances and hands the text to the resolver
pub struct VoiceInput {
    transcriber: Arc<dyn Transcriber>,
    resolver: Arc<CommandResolver>,
}

impl VoiceInput {
    /// Create the voice loop
    #[must_use]
    pub fn new(transcriber: Arc<dyn Transcriber>, resolver: Arc<CommandResolver>) -> Self {
        Self {
            transcriber,
            resolver,
        }
    }

    /// Transcribe one utterance and execute the resulting command
    ///
    /// Speech errors are logged; they never stop the loop.
    pub async fn handle_utterance(&self, wav: &[u8]) {
        match self.transcriber.transcribe(wav).await {
            Ok(text) => {
                tracing::info!(text = %text, "heard");
                self.resolver.handle_text(&text).await;
            }
            Err(Error::Unintelligible) => {
                tracing::info!("could not understand audio");
            }
            Err(e) => {
                tracing::warn!(error = %e, "transcription failed");
            }
        }
    }

    /// Consume utterances until shutdown or until the microphone goes away
    pub async fn run(&self, mut rx: mpsc::Receiver<Vec<u8>>, shutdown: Shutdown) {
        tracing::info!(wake_word = self.resolver.wake_word(), "voice input loop started");

        loop {
            let wav = tokio::select! {
                () = shutdown.triggered() => break,
                wav = rx.recv() => wav,
            };

            let Some(wav) = wav else {
                tracing::warn!("microphone closed");
                break;
            };

            tokio::select! {
                () = shutdown.triggered() => break,
                () = self.handle_utterance(&wav) => {}
            }
        }

        tracing::info!("voice input loop stopped");
    }
}
