//! Utterance segmentation
//!
//! Each listening phase starts by measuring the ambient noise floor, then
//! waits for speech above the derived threshold and ends the utterance after a
//! stretch of silence.

use std::time::Duration;

/// Lowest speech threshold, used in a quiet room
pub const MIN_ENERGY_THRESHOLD: f32 = 0.03;

/// Speech must be this many times louder than the noise floor
const NOISE_FLOOR_FACTOR: f32 = 2.5;

/// Ambient noise measurement window
const CALIBRATION: Duration = Duration::from_millis(500);

/// Minimum amount of speech in an utterance
const MIN_SPEECH: Duration = Duration::from_millis(300);

/// Silence that ends an utterance
const TRAILING_SILENCE: Duration = Duration::from_millis(500);

/// Utterances are cut at this length
const MAX_UTTERANCE: Duration = Duration::from_secs(15);

/// State of the detector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectorState {
    /// Measuring the noise floor
    Calibrating,
    /// Waiting for speech
    Idle,
    /// Accumulating an utterance
    Speaking,
}

/// Splits a sample stream into utterances
pub struct UtteranceDetector {
    state: DetectorState,
    threshold: f32,
    calibration_samples: usize,
    calibration_sum: f64,
    calibration_count: usize,
    min_speech_samples: usize,
    silence_samples: usize,
    max_samples: usize,
    buffer: Vec<f32>,
    speech_counter: usize,
    silence_counter: usize,
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
fn samples_for(duration: Duration, sample_rate: u32) -> usize {
    (duration.as_secs_f64() * f64::from(sample_rate)) as usize
}

impl UtteranceDetector {
    /// Create a detector for a stream at `sample_rate`
    #[must_use]
    pub fn new(sample_rate: u32) -> Self {
        Self {
            state: DetectorState::Calibrating,
            threshold: MIN_ENERGY_THRESHOLD,
            calibration_samples: samples_for(CALIBRATION, sample_rate),
            calibration_sum: 0.0,
            calibration_count: 0,
            min_speech_samples: samples_for(MIN_SPEECH, sample_rate),
            silence_samples: samples_for(TRAILING_SILENCE, sample_rate),
            max_samples: samples_for(MAX_UTTERANCE, sample_rate),
            buffer: Vec::new(),
            speech_counter: 0,
            silence_counter: 0,
        }
    }

    /// Feed a chunk of samples
    ///
    /// Returns the utterance once it is complete; the detector then starts a
    /// new listening phase with a fresh calibration.
    pub fn process(&mut self, samples: &[f32]) -> Option<Vec<f32>> {
        if samples.is_empty() {
            return None;
        }

        match self.state {
            DetectorState::Calibrating => {
                self.calibration_sum += samples.iter().map(|s| f64::from(s * s)).sum::<f64>();
                self.calibration_count += samples.len();

                if self.calibration_count >= self.calibration_samples {
                    self.finish_calibration();
                }
                None
            }
            DetectorState::Idle => {
                if rms(samples) > self.threshold {
                    self.state = DetectorState::Speaking;
                    self.buffer.clear();
                    self.buffer.extend_from_slice(samples);
                    self.speech_counter = samples.len();
                    self.silence_counter = 0;
                    tracing::trace!(threshold = self.threshold, "speech started");
                }
                None
            }
            DetectorState::Speaking => {
                self.buffer.extend_from_slice(samples);

                if rms(samples) > self.threshold {
                    self.speech_counter += samples.len();
                    self.silence_counter = 0;
                } else {
                    self.silence_counter += samples.len();
                }

                if self.buffer.len() >= self.max_samples {
                    tracing::debug!(samples = self.buffer.len(), "utterance cut at maximum length");
                    return Some(self.complete());
                }

                if self.silence_counter >= self.silence_samples {
                    if self.speech_counter >= self.min_speech_samples {
                        tracing::debug!(samples = self.buffer.len(), "utterance complete");
                        return Some(self.complete());
                    }
                    tracing::trace!("too little speech, discarding");
                    self.buffer.clear();
                    self.state = DetectorState::Idle;
                }
                None
            }
        }
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
    fn finish_calibration(&mut self) {
        let floor = (self.calibration_sum / self.calibration_count as f64).sqrt() as f32;
        self.threshold = (floor * NOISE_FLOOR_FACTOR).max(MIN_ENERGY_THRESHOLD);
        self.calibration_sum = 0.0;
        self.calibration_count = 0;
        self.state = DetectorState::Idle;
        tracing::debug!(floor, threshold = self.threshold, "noise floor calibrated");
    }

    fn complete(&mut self) -> Vec<f32> {
        self.state = DetectorState::Calibrating;
        self.speech_counter = 0;
        self.silence_counter = 0;
        std::mem::take(&mut self.buffer)
    }

    /// Drop any partial utterance and recalibrate
    pub fn reset(&mut self) {
        self.state = DetectorState::Calibrating;
        self.buffer.clear();
        self.calibration_sum = 0.0;
        self.calibration_count = 0;
        self.speech_counter = 0;
        self.silence_counter = 0;
    }

    /// Current state
    #[must_use]
    pub const fn state(&self) -> DetectorState {
        self.state
    }

    /// Speech threshold from the last calibration
    #[must_use]
    pub const fn threshold(&self) -> f32 {
        self.threshold
    }
}

/// RMS energy of a block of samples
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }

    let sum_squares: f32 = samples.iter().map(|s| s * s).sum();
    (sum_squares / samples.len() as f32).sqrt()
}
