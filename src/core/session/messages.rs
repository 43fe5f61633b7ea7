//! Wire message types for a streaming session.
//!
//! All non-binary traffic uses `{ "type": ..., "data": ... }` JSON
//! envelopes; raw binary frames carry audio in both directions (inbound
//! microphone chunks, outbound synthesized speech). Outbound ordering is
//! FIFO relative to enqueue time; no reordering is permitted within a
//! session.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

use super::config::StreamConfigUpdate;
use super::metrics::MetricsSnapshot;
use super::state::SessionState;

/// Control messages accepted from the client.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum InboundMessage {
    /// Begin listening. May carry an initial configuration update.
    StartStream(Option<StreamConfigUpdate>),
    /// Stop listening: flush and transcribe whatever is buffered, then
    /// return to idle.
    StopStream,
    /// Update the stream configuration. Applied atomically between
    /// utterances, never mid-utterance.
    Config(StreamConfigUpdate),
    /// Liveness check; answered with a pong echoing the client timestamp.
    /// The payload is optional, like `start_stream`'s.
    Ping(Option<PingData>),
    /// Base64-wrapped audio for clients that cannot send binary frames.
    AudioChunk { audio: String },
}

/// Optional `ping` payload.
#[derive(Debug, Default, Deserialize)]
pub struct PingData {
    #[serde(default)]
    pub timestamp: Option<f64>,
}

/// Messages sent to the client.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum OutboundMessage {
    /// Confirms an applied configuration update, echoing the effective
    /// configuration.
    Ack { config: super::config::StreamConfig },
    /// Interim recognition result, possibly revised by a later partial or
    /// the final transcript.
    TranscriptPartial {
        text: String,
        stability: f32,
        timestamp: f64,
    },
    /// Settled recognition result for a completed utterance.
    TranscriptFinal {
        text: String,
        language: String,
        timestamp: f64,
    },
    /// Completion marker after the synthesized audio for an utterance has
    /// been enqueued (the audio itself travels as binary frames).
    AudioResponse {
        status: String,
        bytes_sent: usize,
        timestamp: f64,
    },
    /// Session state machine transition, giving the remote endpoint an
    /// observable timeline.
    StateChange {
        state: SessionState,
        previous_state: SessionState,
        timestamp: f64,
    },
    /// Recoverable error report. The session continues; the client owns
    /// retry and backoff decisions.
    Error { error: String, timestamp: f64 },
    /// Reply to a ping, also sent as a keepalive on ingest inactivity.
    Pong {
        timestamp: f64,
        #[serde(skip_serializing_if = "Option::is_none")]
        client_timestamp: Option<f64>,
    },
    /// Point-in-time view of the session counters.
    MetricsSnapshot(MetricsSnapshot),
}

/// Routed outbound payload: a JSON envelope or a raw binary frame.
#[derive(Debug)]
pub enum MessageRoute {
    Outbound(OutboundMessage),
    Binary(Bytes),
}

/// Raw frame handed from the transport to the session's ingest loop.
#[derive(Debug)]
pub enum InboundFrame {
    /// JSON control message, still unparsed. Malformed text is a protocol
    /// violation reported back to the client, never a session failure.
    Text(String),
    /// Raw audio bytes.
    Binary(Bytes),
}

/// Seconds since the Unix epoch, as carried in message envelopes.
pub fn unix_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}
