//! Voice input
//!
//! A capture thread segments the microphone stream into utterances; the voice
//! loop transcribes them through a hosted STT service and passes the text to
//! the command resolver.

mod capture;
mod detector;
mod input;
mod listener;
mod stt;

pub use capture::{Microphone, SAMPLE_RATE, encode_wav};
pub use detector::{DetectorState, MIN_ENERGY_THRESHOLD, UtteranceDetector, rms};
pub use input::VoiceInput;
pub use listener::spawn_listener;
pub use stt::{
    DEFAULT_DEEPGRAM_MODEL, DEFAULT_WHISPER_MODEL, SpeechToText, SttProvider, Transcriber,
    normalize_transcript,
};
