//! Single-shot utterance capture.
//!
//! Collects PCM frames from a channel until the speaker stops talking or a
//! hard duration cap is reached. This is the blocking, one-utterance
//! counterpart of the streaming coordinator, useful for command-style
//! interactions where the caller wants exactly one utterance back.

use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::core::vad::{SegmenterConfig, SegmenterFault, UtteranceSegmenter, pcm16le_to_f32};

#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Consecutive non-speaking frames after speech before capture ends.
    pub silence_after_speech: u32,
    /// Hard cap on total capture time.
    pub max_duration: Duration,
    pub segmenter: SegmenterConfig,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            // 15 frames of 100ms, about a second and a half of quiet.
            silence_after_speech: 15,
            max_duration: Duration::from_secs(30),
            segmenter: SegmenterConfig::default(),
        }
    }
}

/// Why a capture finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureEnd {
    /// Speech was followed by enough sustained silence.
    Silence,
    /// The hard duration cap was hit.
    MaxDuration,
    /// The source closed or the capture was cancelled before any speech.
    SourceClosed,
}

#[derive(Debug)]
pub struct Capture {
    pub audio: Vec<u8>,
    pub end: CaptureEnd,
    /// Whether any speech was observed at all.
    pub heard_speech: bool,
}

/// Record one utterance: consume frames from `frames` until speech has been
/// followed by sustained silence, the duration cap is reached, or the
/// source goes away.
///
/// Every frame received while speech is in progress is kept, including the
/// trailing tolerated silence. Frames before the first speech are dropped.
pub async fn record_until_silence(
    frames: &mut mpsc::Receiver<Bytes>,
    config: &CaptureConfig,
    cancel: &CancellationToken,
) -> Result<Capture, SegmenterFault> {
    let mut segmenter = UtteranceSegmenter::new(config.segmenter);
    let mut audio = Vec::new();
    let mut heard_speech = false;
    let mut silent_frames = 0u32;
    let deadline = Instant::now() + config.max_duration;

    loop {
        let frame = tokio::select! {
            _ = cancel.cancelled() => None,
            _ = tokio::time::sleep_until(deadline) => {
                debug!(bytes = audio.len(), "capture hit duration cap");
                return Ok(Capture { audio, end: CaptureEnd::MaxDuration, heard_speech });
            }
            frame = frames.recv() => frame,
        };
        let Some(frame) = frame else {
            return Ok(Capture {
                audio,
                end: CaptureEnd::SourceClosed,
                heard_speech,
            });
        };

        let samples = pcm16le_to_f32(&frame);
        let decision = segmenter.observe(&samples)?;

        if decision.is_speaking {
            heard_speech = true;
            audio.extend_from_slice(&frame);
        }

        if heard_speech && !decision.is_voice {
            silent_frames += 1;
            if silent_frames >= config.silence_after_speech {
                debug!(bytes = audio.len(), "capture ended on silence");
                return Ok(Capture {
                    audio,
                    end: CaptureEnd::Silence,
                    heard_speech,
                });
            }
        } else if decision.is_voice {
            silent_frames = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loud_frame() -> Bytes {
        let mut data = Vec::with_capacity(3200);
        for _ in 0..1600 {
            data.extend_from_slice(&16384i16.to_le_bytes());
        }
        Bytes::from(data)
    }

    fn silent_frame() -> Bytes {
        Bytes::from(vec![0u8; 3200])
    }

    #[tokio::test]
    async fn capture_ends_on_sustained_silence() {
        let (tx, mut rx) = mpsc::channel(64);
        let config = CaptureConfig {
            silence_after_speech: 3,
            ..CaptureConfig::default()
        };
        for _ in 0..5 {
            tx.send(loud_frame()).await.unwrap();
        }
        for _ in 0..20 {
            tx.send(silent_frame()).await.unwrap();
        }

        let cancel = CancellationToken::new();
        let capture = record_until_silence(&mut rx, &config, &cancel)
            .await
            .unwrap();
        assert_eq!(capture.end, CaptureEnd::Silence);
        assert!(capture.heard_speech);
        assert!(!capture.audio.is_empty());
    }

    #[tokio::test]
    async fn capture_drops_leading_silence() {
        let (tx, mut rx) = mpsc::channel(64);
        let config = CaptureConfig {
            silence_after_speech: 3,
            ..CaptureConfig::default()
        };
        for _ in 0..10 {
            tx.send(silent_frame()).await.unwrap();
        }
        for _ in 0..5 {
            tx.send(loud_frame()).await.unwrap();
        }
        for _ in 0..20 {
            tx.send(silent_frame()).await.unwrap();
        }

        let cancel = CancellationToken::new();
        let capture = record_until_silence(&mut rx, &config, &cancel)
            .await
            .unwrap();
        assert_eq!(capture.end, CaptureEnd::Silence);
        // Leading silence is never part of the utterance.
        assert!(capture.audio.len() < 3200 * 30);
    }

    #[tokio::test]
    async fn capture_reports_closed_source() {
        let (tx, mut rx) = mpsc::channel(4);
        drop(tx);
        let cancel = CancellationToken::new();
        let capture = record_until_silence(&mut rx, &CaptureConfig::default(), &cancel)
            .await
            .unwrap();
        assert_eq!(capture.end, CaptureEnd::SourceClosed);
        assert!(!capture.heard_speech);
    }

    #[tokio::test]
    async fn capture_honors_cancellation() {
        let (_tx, mut rx) = mpsc::channel::<Bytes>(4);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let capture = record_until_silence(&mut rx, &CaptureConfig::default(), &cancel)
            .await
            .unwrap();
        assert_eq!(capture.end, CaptureEnd::SourceClosed);
    }

    #[tokio::test(start_paused = true)]
    async fn capture_hits_duration_cap() {
        let (_tx, mut rx) = mpsc::channel::<Bytes>(4);
        let config = CaptureConfig {
            max_duration: Duration::from_secs(1),
            ..CaptureConfig::default()
        };
        let cancel = CancellationToken::new();
        let capture = record_until_silence(&mut rx, &config, &cancel)
            .await
            .unwrap();
        assert_eq!(capture.end, CaptureEnd::MaxDuration);
    }
}
