//! Per-session counters and latency tracking.
//!
//! Counters are monotonic and mutated only by the owning session's loops;
//! external readers take eventually-consistent snapshots at any time, so
//! everything is atomics plus one short-lived lock around the bounded
//! latency window.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use parking_lot::Mutex;
use serde::Serialize;

/// Rolling latency samples kept per session. Caps memory for long-lived
/// connections.
pub const LATENCY_WINDOW: usize = 100;

/// Monotonic counters for one streaming session.
pub struct SessionMetrics {
    started_at: Instant,
    audio_bytes_received: AtomicU64,
    audio_bytes_sent: AtomicU64,
    messages_received: AtomicU64,
    messages_sent: AtomicU64,
    transcripts_generated: AtomicU64,
    errors: AtomicU64,
    latency_samples: Mutex<VecDeque<f64>>,
}

impl Default for SessionMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionMetrics {
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            audio_bytes_received: AtomicU64::new(0),
            audio_bytes_sent: AtomicU64::new(0),
            messages_received: AtomicU64::new(0),
            messages_sent: AtomicU64::new(0),
            transcripts_generated: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            latency_samples: Mutex::new(VecDeque::with_capacity(LATENCY_WINDOW)),
        }
    }

    pub fn add_audio_bytes_received(&self, bytes: usize) {
        self.audio_bytes_received
            .fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn add_audio_bytes_sent(&self, bytes: usize) {
        self.audio_bytes_sent
            .fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn incr_messages_received(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn incr_messages_sent(&self) {
        self.messages_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn incr_transcripts(&self) {
        self.transcripts_generated.fetch_add(1, Ordering::Relaxed);
    }

    pub fn incr_errors(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn error_count(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }

    /// Record one transcription round-trip latency, evicting the oldest
    /// sample once the window is full.
    pub fn record_latency(&self, seconds: f64) {
        let mut samples = self.latency_samples.lock();
        if samples.len() == LATENCY_WINDOW {
            samples.pop_front();
        }
        samples.push_back(seconds);
    }

    /// Point-in-time view of the counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let avg_latency_ms = {
            let samples = self.latency_samples.lock();
            if samples.is_empty() {
                0.0
            } else {
                samples.iter().sum::<f64>() / samples.len() as f64 * 1000.0
            }
        };

        MetricsSnapshot {
            duration_seconds: self.started_at.elapsed().as_secs_f64(),
            audio_bytes_received: self.audio_bytes_received.load(Ordering::Relaxed),
            audio_bytes_sent: self.audio_bytes_sent.load(Ordering::Relaxed),
            messages_received: self.messages_received.load(Ordering::Relaxed),
            messages_sent: self.messages_sent.load(Ordering::Relaxed),
            transcripts_generated: self.transcripts_generated.load(Ordering::Relaxed),
            avg_latency_ms,
            errors: self.errors.load(Ordering::Relaxed),
        }
    }
}

/// Serializable snapshot sent to the client in `metrics_snapshot` messages.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct MetricsSnapshot {
    pub duration_seconds: f64,
    pub audio_bytes_received: u64,
    pub audio_bytes_sent: u64,
    pub messages_received: u64,
    pub messages_sent: u64,
    pub transcripts_generated: u64,
    pub avg_latency_ms: f64,
    pub errors: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate() {
        let metrics = SessionMetrics::new();
        metrics.add_audio_bytes_received(100);
        metrics.add_audio_bytes_received(50);
        metrics.incr_messages_received();
        metrics.incr_transcripts();
        metrics.incr_errors();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.audio_bytes_received, 150);
        assert_eq!(snapshot.messages_received, 1);
        assert_eq!(snapshot.transcripts_generated, 1);
        assert_eq!(snapshot.errors, 1);
        assert_eq!(snapshot.audio_bytes_sent, 0);
    }

    #[test]
    fn test_latency_window_is_bounded() {
        let metrics = SessionMetrics::new();
        for i in 0..250 {
            metrics.record_latency(i as f64);
        }
        let samples = metrics.latency_samples.lock();
        assert_eq!(samples.len(), LATENCY_WINDOW);
        // Oldest samples were evicted.
        assert_eq!(*samples.front().unwrap(), 150.0);
        assert_eq!(*samples.back().unwrap(), 249.0);
    }

    #[test]
    fn test_avg_latency() {
        let metrics = SessionMetrics::new();
        assert_eq!(metrics.snapshot().avg_latency_ms, 0.0);

        metrics.record_latency(0.1);
        metrics.record_latency(0.3);
        let snapshot = metrics.snapshot();
        assert!((snapshot.avg_latency_ms - 200.0).abs() < 1e-6);
    }
}
