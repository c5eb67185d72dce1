//! Microphone and WAV encoding

use std::sync::{Arc, Mutex, PoisonError};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, Stream};

use crate::{Error, Result};

/// Capture rate; both transcription services accept 16kHz mono WAV
pub const SAMPLE_RATE: u32 = 16000;

/// The default input device, recording for as long as this value lives
///
/// The cpal stream is not `Send`, so open and drain it on one thread.
pub struct Microphone {
    name: String,
    recorded: Arc<Mutex<Vec<f32>>>,
    _stream: Stream,
}

impl Microphone {
    /// Open the default input device and start recording 16kHz mono
    ///
    /// # Errors
    ///
    /// Returns `Error::Audio` naming the device and the step that failed
    pub fn open() -> Result<Self> {
        let device = cpal::default_host()
            .default_input_device()
            .ok_or_else(|| Error::Audio("no microphone found".to_string()))?;
        let name = device.name().unwrap_or_else(|_| "unnamed input".to_string());
        let fail = |step: &str, e: &dyn std::fmt::Display| Error::Audio(format!("{name}: {step}: {e}"));

        let config = device
            .supported_input_configs()
            .map_err(|e| fail("querying formats", &e))?
            .find(|range| {
                range.channels() == 1
                    && (range.min_sample_rate()..=range.max_sample_rate()).contains(&SampleRate(SAMPLE_RATE))
            })
            .ok_or_else(|| fail("opening", &"no 16kHz mono format"))?
            .with_sample_rate(SampleRate(SAMPLE_RATE))
            .config();

        let recorded = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&recorded);

        let stream = device
            .build_input_stream(
                &config,
                move |chunk: &[f32], _: &cpal::InputCallbackInfo| {
                    sink.lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .extend_from_slice(chunk);
                },
                |e| tracing::error!(error = %e, "microphone stream error"),
                None,
            )
            .map_err(|e| fail("building stream", &e))?;
        stream.play().map_err(|e| fail("starting stream", &e))?;

        tracing::info!(device = %name, "microphone recording");

        Ok(Self {
            name,
            recorded,
            _stream: stream,
        })
    }

    /// Device name as reported by the host
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Samples recorded since the previous drain
    #[must_use]
    pub fn drain(&self) -> Vec<f32> {
        std::mem::take(&mut *self.recorded.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

/// Encode an utterance as 16-bit PCM WAV at [`SAMPLE_RATE`]
///
/// # Errors
///
/// Returns error if the encoder fails
pub fn encode_wav(samples: &[f32]) -> Result<Vec<u8>> {
    let audio = |e: hound::Error| Error::Audio(format!("wav encoding: {e}"));
    let format = hound::WavSpec {
        channels: 1,
        sample_rate: SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut out = std::io::Cursor::new(Vec::with_capacity(44 + samples.len() * 2));
    let mut writer = hound::WavWriter::new(&mut out, format).map_err(audio)?;
    let mut pcm = writer.get_i16_writer(u32::try_from(samples.len()).unwrap_or(u32::MAX));

    for &sample in samples {
        #[allow(clippy::cast_possible_truncation)]
        pcm.write_sample((sample.clamp(-1.0, 1.0) * f32::from(i16::MAX)) as i16);
    }

    pcm.flush().map_err(audio)?;
    writer.finalize().map_err(audio)?;
    Ok(out.into_inner())
}
