//! Voice pipeline integration tests
//!
//! Tests voice components without requiring audio hardware

use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use nfc_jukebox::voice::{DetectorState, SAMPLE_RATE, UtteranceDetector, encode_wav};
use nfc_jukebox::{Transcriber, VoiceInput};

mod common;

use common::{Call, FakePlaybackService, Heard, ScriptedTranscriber, context};

/// 100ms of audio, as the listener hands it to the detector
const CHUNK: usize = SAMPLE_RATE as usize / 10;

/// Generate sine wave audio samples
fn generate_sine_samples(frequency: f32, duration_secs: f32, amplitude: f32) -> Vec<f32> {
    let num_samples = (SAMPLE_RATE as f32 * duration_secs) as usize;
    (0..num_samples)
        .map(|i| {
            let t = i as f32 / SAMPLE_RATE as f32;
            amplitude * (2.0 * std::f32::consts::PI * frequency * t).sin()
        })
        .collect()
}

/// Generate silence
fn generate_silence(duration_secs: f32) -> Vec<f32> {
    let num_samples = (SAMPLE_RATE as f32 * duration_secs) as usize;
    vec![0.0; num_samples]
}

/// Feed `samples` in listener-sized chunks, returning the last utterance
fn feed(detector: &mut UtteranceDetector, samples: &[f32]) -> Option<Vec<f32>> {
    samples
        .chunks(CHUNK)
        .filter_map(|chunk| detector.process(chunk))
        .last()
}

fn voice_input(ctx: &nfc_jukebox::BridgeContext, script: Vec<Heard>) -> (VoiceInput, Arc<ScriptedTranscriber>) {
    let transcriber = Arc::new(ScriptedTranscriber::new(script));
    let input = VoiceInput::new(
        Arc::clone(&transcriber) as Arc<dyn Transcriber>,
        Arc::clone(&ctx.resolver),
    );
    (input, transcriber)
}

fn text(s: &str) -> Heard {
    Heard::Text(s.to_string())
}

#[test]
fn test_tone_between_silences_is_one_utterance() {
    let mut detector = UtteranceDetector::new(SAMPLE_RATE);

    assert!(feed(&mut detector, &generate_silence(0.5)).is_none());
    assert_eq!(detector.state(), DetectorState::Idle);

    let speech = generate_sine_samples(440.0, 0.8, 0.3);
    assert!(feed(&mut detector, &speech).is_none());
    assert_eq!(detector.state(), DetectorState::Speaking);

    let utterance = feed(&mut detector, &generate_silence(0.6)).expect("utterance");
    assert!(utterance.len() >= speech.len());
    assert_eq!(detector.state(), DetectorState::Calibrating);

    let wav = encode_wav(&utterance).unwrap();
    let reader = hound::WavReader::new(Cursor::new(wav)).unwrap();
    assert_eq!(reader.spec().sample_rate, SAMPLE_RATE);
    assert_eq!(reader.spec().channels, 1);
    assert_eq!(reader.len() as usize, utterance.len());
}

#[test]
fn test_quiet_hum_is_not_speech() {
    let mut detector = UtteranceDetector::new(SAMPLE_RATE);
    feed(&mut detector, &generate_silence(0.5));

    assert!(feed(&mut detector, &generate_sine_samples(50.0, 2.0, 0.01)).is_none());
    assert_eq!(detector.state(), DetectorState::Idle);
}

#[test]
fn test_encode_wav() {
    let samples = generate_sine_samples(440.0, 0.1, 0.5);
    let wav_data = encode_wav(&samples).unwrap();

    // Check WAV header magic
    assert_eq!(&wav_data[0..4], b"RIFF");
    assert_eq!(&wav_data[8..12], b"WAVE");
    assert!(wav_data.len() > 44);
}

#[tokio::test]
async fn test_command_is_executed() {
    let service = Arc::new(FakePlaybackService::new());
    let ctx = context(&service);
    let (input, transcriber) = voice_input(&ctx, vec![text("arduino pause")]);

    input.handle_utterance(b"RIFF").await;

    assert_eq!(transcriber.requests(), 1);
    assert_eq!(service.calls().await, vec![Call::Pause]);
}

#[tokio::test]
async fn test_speech_errors_keep_loop_running() {
    let service = Arc::new(FakePlaybackService::new());
    let ctx = context(&service);
    let (input, transcriber) = voice_input(
        &ctx,
        vec![
            Heard::Nothing,
            Heard::Failure("HTTP 503".to_string()),
            text("what a nice day"),
            text("arduino pause"),
        ],
    );
    let (tx, rx) = mpsc::channel(4);

    for _ in 0..4 {
        tx.send(b"RIFF".to_vec()).await.unwrap();
    }
    drop(tx);

    input.run(rx, ctx.shutdown.clone()).await;

    assert_eq!(transcriber.requests(), 4);
    assert_eq!(service.calls().await, vec![Call::Pause]);
    assert!(!ctx.shutdown.is_triggered());
}

#[tokio::test]
async fn test_exit_stops_loop() {
    let service = Arc::new(FakePlaybackService::new());
    let ctx = context(&service);
    let (input, _) = voice_input(&ctx, vec![text("arduino exit")]);
    let (tx, rx) = mpsc::channel(1);

    tx.send(b"RIFF".to_vec()).await.unwrap();

    // Sender stays open: only the exit command can end the loop
    tokio::time::timeout(Duration::from_secs(1), input.run(rx, ctx.shutdown.clone()))
        .await
        .expect("exit did not stop the loop");

    assert!(ctx.shutdown.is_triggered());
    assert_eq!(service.calls().await, vec![Call::Pause]);
    drop(tx);
}
