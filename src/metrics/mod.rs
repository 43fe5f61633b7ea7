//! Service-level metrics sink.
//!
//! Sessions report connection deltas and per-direction message counts
//! through this fire-and-forget seam. Implementations must never block the
//! calling loop; anything expensive belongs behind a channel inside the
//! sink, not in the caller.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

use tracing::debug;

/// Direction of a counted message, from the server's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageDirection {
    Received,
    Sent,
}

/// Fire-and-forget sink for service-wide counters.
pub trait MetricsSink: Send + Sync {
    /// A session connected (`true`) or disconnected (`false`).
    fn record_connection(&self, connected: bool);

    /// One message crossed the transport in the given direction.
    fn record_message(&self, direction: MessageDirection);
}

/// Default sink: keeps in-process counters and emits debug-level traces.
#[derive(Default)]
pub struct TracingMetricsSink {
    active_connections: AtomicI64,
    messages_received: AtomicU64,
    messages_sent: AtomicU64,
}

impl TracingMetricsSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn active_connections(&self) -> i64 {
        self.active_connections.load(Ordering::Relaxed)
    }

    pub fn messages_received(&self) -> u64 {
        self.messages_received.load(Ordering::Relaxed)
    }

    pub fn messages_sent(&self) -> u64 {
        self.messages_sent.load(Ordering::Relaxed)
    }
}

impl MetricsSink for TracingMetricsSink {
    fn record_connection(&self, connected: bool) {
        let delta = if connected { 1 } else { -1 };
        let active = self.active_connections.fetch_add(delta, Ordering::Relaxed) + delta;
        debug!(active, "websocket connection count changed");
    }

    fn record_message(&self, direction: MessageDirection) {
        match direction {
            MessageDirection::Received => {
                self.messages_received.fetch_add(1, Ordering::Relaxed);
            }
            MessageDirection::Sent => {
                self.messages_sent.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}

/// Sink that discards everything. Useful in tests.
pub struct NoopMetricsSink;

impl MetricsSink for NoopMetricsSink {
    fn record_connection(&self, _connected: bool) {}
    fn record_message(&self, _direction: MessageDirection) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_gauge() {
        let sink = TracingMetricsSink::new();
        sink.record_connection(true);
        sink.record_connection(true);
        assert_eq!(sink.active_connections(), 2);
        sink.record_connection(false);
        assert_eq!(sink.active_connections(), 1);
    }

    #[test]
    fn test_message_counters() {
        let sink = TracingMetricsSink::new();
        sink.record_message(MessageDirection::Received);
        sink.record_message(MessageDirection::Sent);
        sink.record_message(MessageDirection::Sent);
        assert_eq!(sink.messages_received.load(Ordering::Relaxed), 1);
        assert_eq!(sink.messages_sent.load(Ordering::Relaxed), 2);
    }
}
