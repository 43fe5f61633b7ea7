//! Adaptive energy-gate utterance segmentation.
//!
//! The segmenter decides when an utterance starts and ends from nothing but
//! the RMS energy of fixed-duration audio chunks, tracked against a slowly
//! adapting noise floor. It deliberately trades recognition accuracy for
//! predictable, low-latency, explainable boundaries: downstream
//! transcription tolerates some silence padding but not truncated speech.
//!
//! # State transitions
//!
//! ```text
//! [Silence] ── speech_frames >= min_speech_frames ──► [Speaking]
//!     ▲                                                   │
//!     └────── silence_frames > max_silence_frames ────────┘
//! ```
//!
//! Hysteresis on both edges rejects transient clicks (sustained speech is
//! required to start) and tolerates short breaths (sustained silence is
//! required to end).

use tracing::debug;

/// Boundary event emitted when the speaking state flips.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmenterEvent {
    /// Sustained speech detected after silence; an utterance has begun.
    SpeechStart,
    /// Sustained silence after speech; the utterance is complete.
    SpeechEnd,
}

/// Per-chunk decision returned by [`UtteranceSegmenter::observe`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SegmenterDecision {
    /// Whether the segmenter currently considers the speaker to be talking.
    pub is_speaking: bool,
    /// Whether this individual chunk was above the energy threshold.
    pub is_voice: bool,
    /// Boundary event, if this chunk caused a state transition.
    pub event: Option<SegmenterEvent>,
}

/// Internal invariant violation. Fatal for the owning session.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SegmenterFault {
    #[error("non-finite chunk energy: {0}")]
    NonFiniteEnergy(f32),
    #[error("noise floor diverged: {0}")]
    NoiseFloorDiverged(f32),
}

/// Tuning parameters for the segmenter.
#[derive(Debug, Clone, Copy)]
pub struct SegmenterConfig {
    /// Consecutive above-threshold chunks required to enter `Speaking`.
    /// Default 3 (~300 ms at 100 ms chunks) to reject clicks and coughs.
    pub min_speech_frames: u32,
    /// Consecutive below-threshold chunks tolerated before leaving
    /// `Speaking`. Default 10 (~1 s) so short breaths do not end the
    /// utterance.
    pub max_silence_frames: u32,
    /// Starting noise floor estimate, adapted from observed energy.
    pub initial_noise_floor: f32,
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            min_speech_frames: 3,
            max_silence_frames: 10,
            initial_noise_floor: 0.001,
        }
    }
}

/// Energy-gate voice activity detector with an adaptive threshold.
pub struct UtteranceSegmenter {
    config: SegmenterConfig,
    noise_floor: f32,
    energy_threshold: f32,
    speech_frames: u32,
    silence_frames: u32,
    is_speaking: bool,
}

impl UtteranceSegmenter {
    pub fn new(config: SegmenterConfig) -> Self {
        let noise_floor = config.initial_noise_floor;
        Self {
            config,
            noise_floor,
            energy_threshold: noise_floor * 3.0,
            speech_frames: 0,
            silence_frames: 0,
            is_speaking: false,
        }
    }

    /// Whether the segmenter is currently inside an utterance.
    pub fn is_speaking(&self) -> bool {
        self.is_speaking
    }

    /// Current adaptive noise floor estimate.
    pub fn noise_floor(&self) -> f32 {
        self.noise_floor
    }

    /// Feed one fixed-duration chunk of mono f32 samples and get the
    /// speaking decision for it.
    ///
    /// Call once per chunk (nominally 100 ms). Returns an error only on an
    /// internal invariant violation, which the owning session must treat as
    /// fatal.
    pub fn observe(&mut self, samples: &[f32]) -> Result<SegmenterDecision, SegmenterFault> {
        let energy = rms_energy(samples);
        if !energy.is_finite() {
            return Err(SegmenterFault::NonFiniteEnergy(energy));
        }

        self.update_noise_floor(energy)?;

        let is_voice = energy > self.energy_threshold;
        if is_voice {
            self.speech_frames += 1;
            self.silence_frames = 0;
        } else {
            self.silence_frames += 1;
            if self.silence_frames > self.config.max_silence_frames {
                self.speech_frames = 0;
            }
        }

        let event = if !self.is_speaking {
            if self.speech_frames >= self.config.min_speech_frames {
                self.is_speaking = true;
                debug!(energy, threshold = self.energy_threshold, "speech started");
                Some(SegmenterEvent::SpeechStart)
            } else {
                None
            }
        } else if self.silence_frames > self.config.max_silence_frames {
            self.is_speaking = false;
            self.speech_frames = 0;
            debug!(noise_floor = self.noise_floor, "speech ended");
            Some(SegmenterEvent::SpeechEnd)
        } else {
            None
        };

        Ok(SegmenterDecision {
            is_speaking: self.is_speaking,
            is_voice,
            event,
        })
    }

    /// Return to `Silence` with all counters zeroed. Called at the start of
    /// every new utterance and whenever the session is reconfigured. The
    /// noise floor estimate is kept: ambient noise does not change because
    /// an utterance ended.
    pub fn reset(&mut self) {
        self.is_speaking = false;
        self.speech_frames = 0;
        self.silence_frames = 0;
    }

    /// Blend the chunk energy into the noise floor estimate.
    ///
    /// Only near-floor energies are blended in; louder chunks are assumed to
    /// be speech, keeping the floor from tracking the signal it gates.
    fn update_noise_floor(&mut self, energy: f32) -> Result<(), SegmenterFault> {
        if energy < self.noise_floor * 2.0 {
            self.noise_floor = 0.95 * self.noise_floor + 0.05 * energy;
        }
        self.energy_threshold = self.noise_floor * 3.0;

        if !self.noise_floor.is_finite() || self.noise_floor < 0.0 {
            return Err(SegmenterFault::NoiseFloorDiverged(self.noise_floor));
        }
        Ok(())
    }
}

/// RMS energy of a chunk of normalized samples. Empty chunks are silent.
pub fn rms_energy(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_sq: f32 = samples.iter().map(|s| s * s).sum();
    (sum_sq / samples.len() as f32).sqrt()
}

/// Decode little-endian signed 16-bit PCM into normalized f32 samples.
///
/// A trailing odd byte is ignored; the wire protocol frames audio in whole
/// samples so this only happens on corrupt input.
pub fn pcm16le_to_f32(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]) as f32 / 32768.0)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loud_chunk() -> Vec<f32> {
        vec![0.5; 1600]
    }

    fn silent_chunk() -> Vec<f32> {
        vec![0.0; 1600]
    }

    fn segmenter() -> UtteranceSegmenter {
        UtteranceSegmenter::new(SegmenterConfig::default())
    }

    #[test]
    fn test_sustained_speech_starts_utterance() {
        let mut seg = segmenter();
        let mut events = Vec::new();
        for _ in 0..3 {
            events.push(seg.observe(&loud_chunk()).unwrap().event);
        }
        assert_eq!(events, vec![None, None, Some(SegmenterEvent::SpeechStart)]);
        assert!(seg.is_speaking());
    }

    #[test]
    fn test_isolated_clicks_rejected() {
        let mut seg = segmenter();
        // Two loud chunks, under min_speech_frames, then silence.
        seg.observe(&loud_chunk()).unwrap();
        seg.observe(&loud_chunk()).unwrap();
        for _ in 0..20 {
            let decision = seg.observe(&silent_chunk()).unwrap();
            assert!(!decision.is_speaking);
            assert!(decision.event.is_none());
        }
    }

    #[test]
    fn test_sustained_silence_ends_utterance() {
        let mut seg = segmenter();
        for _ in 0..3 {
            seg.observe(&loud_chunk()).unwrap();
        }
        assert!(seg.is_speaking());

        // max_silence_frames of silence keep the utterance alive.
        for _ in 0..10 {
            let decision = seg.observe(&silent_chunk()).unwrap();
            assert!(decision.is_speaking);
            assert!(decision.event.is_none());
        }
        // One more ends it.
        let decision = seg.observe(&silent_chunk()).unwrap();
        assert!(!decision.is_speaking);
        assert_eq!(decision.event, Some(SegmenterEvent::SpeechEnd));
    }

    #[test]
    fn test_brief_pause_does_not_end_utterance() {
        let mut seg = segmenter();
        for _ in 0..3 {
            seg.observe(&loud_chunk()).unwrap();
        }
        for _ in 0..5 {
            seg.observe(&silent_chunk()).unwrap();
        }
        let decision = seg.observe(&loud_chunk()).unwrap();
        assert!(decision.is_speaking);
        assert!(decision.event.is_none());
    }

    #[test]
    fn test_noise_floor_adapts_slowly() {
        let mut seg = segmenter();
        let initial = seg.noise_floor();

        // Quiet ambience near the floor pulls the estimate towards itself.
        let ambience = vec![0.0015; 1600];
        seg.observe(&ambience).unwrap();
        let after_one = seg.noise_floor();
        assert!(after_one > initial);
        assert!((after_one - initial).abs() < 0.001, "adaptation is gradual");

        // Loud speech must not drag the floor up.
        let floor_before_speech = seg.noise_floor();
        for _ in 0..10 {
            seg.observe(&loud_chunk()).unwrap();
        }
        assert_eq!(seg.noise_floor(), floor_before_speech);
    }

    #[test]
    fn test_reset_returns_to_silence() {
        let mut seg = segmenter();
        for _ in 0..3 {
            seg.observe(&loud_chunk()).unwrap();
        }
        assert!(seg.is_speaking());

        seg.reset();
        assert!(!seg.is_speaking());
        // A single loud chunk after reset is not enough to re-enter Speaking.
        let decision = seg.observe(&loud_chunk()).unwrap();
        assert!(!decision.is_speaking);
    }

    #[test]
    fn test_rms_energy() {
        assert_eq!(rms_energy(&[]), 0.0);
        assert_eq!(rms_energy(&[0.0, 0.0]), 0.0);
        let energy = rms_energy(&[0.5, -0.5, 0.5, -0.5]);
        assert!((energy - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_pcm16le_conversion() {
        let bytes = [0x00, 0x00, 0xFF, 0x7F, 0x00, 0x80];
        let samples = pcm16le_to_f32(&bytes);
        assert_eq!(samples.len(), 3);
        assert_eq!(samples[0], 0.0);
        assert!((samples[1] - (32767.0 / 32768.0)).abs() < 1e-6);
        assert_eq!(samples[2], -1.0);
    }

    #[test]
    fn test_trailing_odd_byte_ignored() {
        let samples = pcm16le_to_f32(&[0x00, 0x00, 0x01]);
        assert_eq!(samples.len(), 1);
    }
}
