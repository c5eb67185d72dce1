//! Microphone thread
//!
//! Owns the cpal stream, segments it into utterances and hands each one to
//! the voice loop as a WAV file.

use std::thread::JoinHandle;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};

use super::capture::{Microphone, SAMPLE_RATE, encode_wav};
use super::detector::UtteranceDetector;
use crate::shutdown::Shutdown;
use crate::{Error, Result};

/// How often the capture buffer is drained
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Start the microphone thread
///
/// Resolves once the microphone is recording, or with the error that
/// prevented it. One utterance can wait in `tx` while the voice loop is busy;
/// further utterances are dropped until it has been picked up.
///
/// # Errors
///
/// Returns error if the input device cannot be opened or the thread cannot
/// be spawned
pub async fn spawn_listener(tx: mpsc::Sender<Vec<u8>>, shutdown: Shutdown) -> Result<JoinHandle<()>> {
    let (ready_tx, ready_rx) = oneshot::channel();

    let handle = std::thread::Builder::new()
        .name("voice-capture".to_string())
        .spawn(move || {
            let microphone = match Microphone::open() {
                Ok(microphone) => {
                    let _ = ready_tx.send(Ok(()));
                    microphone
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                    return;
                }
            };

            listen(&microphone, &tx, &shutdown);
            tracing::debug!("voice capture stopped");
        })?;

    match ready_rx.await {
        Ok(Ok(())) => Ok(handle),
        Ok(Err(e)) => {
            let _ = handle.join();
            Err(e)
        }
        Err(_) => Err(Error::Audio("capture thread exited during startup".to_string())),
    }
}

fn listen(microphone: &Microphone, tx: &mpsc::Sender<Vec<u8>>, shutdown: &Shutdown) {
    let mut detector = UtteranceDetector::new(SAMPLE_RATE);
    tracing::info!("listening");

    while !shutdown.is_triggered() {
        std::thread::sleep(POLL_INTERVAL);

        let Some(utterance) = detector.process(&microphone.drain()) else {
            continue;
        };

        match encode_wav(&utterance) {
            Ok(wav) => {
                if !forward(tx, wav) {
                    break;
                }
            }
            Err(e) => tracing::warn!(error = %e, "failed to encode utterance"),
        }
    }
}

/// Hand an utterance to the voice loop without blocking the capture thread
///
/// Returns `false` once the voice loop has gone away.
fn forward(tx: &mpsc::Sender<Vec<u8>>, wav: Vec<u8>) -> bool {
    match tx.try_send(wav) {
        Ok(()) => true,
        Err(mpsc::error::TrySendError::Full(_)) => {
            tracing::debug!("an utterance is already waiting, dropping this one");
            true
        }
        Err(mpsc::error::TrySendError::Closed(_)) => false,
    }
}
