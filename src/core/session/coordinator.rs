//! Session coordinator: the concurrent core of a streaming connection.
//!
//! One coordinator owns one session: its audio buffer, segmenter, state
//! machine, metrics, and outbound queue. Three cooperatively scheduled
//! loops run per session:
//!
//! - **ingest** receives frames from the transport, writes audio into the
//!   bounded buffer (dropping and reporting on overflow rather than
//!   stalling), and handles control messages;
//! - **process** drains the buffer in fixed slices, drives the utterance
//!   segmenter, and hands completed utterances to the transcription
//!   collaborator, optionally following up with synthesis;
//! - **egress** is the sole writer towards the transport, draining the
//!   outbound queue with high/low-water-mark throttling that is fed back
//!   to ingest admission.
//!
//! The buffer and the outbound queue are the only state shared between the
//! loops; everything else is owned by exactly one of them or read through
//! cheap atomics. The transport itself is abstracted to a pair of channels
//! so the WebSocket handler stays a thin bridge and tests can drive a
//! session directly.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use bytes::Bytes;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::core::buffer::BoundedAudioBuffer;
use crate::core::stt::Transcriber;
use crate::core::tts::Synthesizer;
use crate::core::vad::{
    SegmenterConfig, SegmenterEvent, SegmenterFault, UtteranceSegmenter, pcm16le_to_f32,
};
use crate::metrics::{MessageDirection, MetricsSink};

use super::config::{SessionLimits, StreamConfig, StreamConfigUpdate};
use super::messages::{InboundFrame, InboundMessage, MessageRoute, OutboundMessage, unix_now};
use super::metrics::{MetricsSnapshot, SessionMetrics};
use super::state::{SessionState, StateCell};

/// Unrecoverable session failure. Everything else is reported to the
/// client and survived.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("segmenter invariant violation: {0}")]
    SegmenterFault(#[from] SegmenterFault),
}

/// External services a session calls into, injected at construction.
///
/// All of them are assumed stateless from the coordinator's point of view
/// and safely callable concurrently by multiple sessions.
#[derive(Clone)]
pub struct Collaborators {
    pub transcriber: Arc<dyn Transcriber>,
    pub synthesizer: Arc<dyn Synthesizer>,
    pub metrics_sink: Arc<dyn MetricsSink>,
}

pub struct SessionCoordinator {
    id: String,
    limits: SessionLimits,
    config: parking_lot::RwLock<StreamConfig>,
    /// Config updates parked here until the process loop is between
    /// utterances. Last update wins.
    pending_config: parking_lot::Mutex<Option<StreamConfigUpdate>>,
    state: StateCell,
    buffer: BoundedAudioBuffer,
    metrics: SessionMetrics,
    collaborators: Collaborators,
    outbound_tx: mpsc::Sender<MessageRoute>,
    outbound_rx: parking_lot::Mutex<Option<mpsc::Receiver<MessageRoute>>>,
    /// Set by the egress loop above the high-water mark, cleared below the
    /// low-water mark; read by ingest to delay audio admission.
    send_queue_high: AtomicBool,
    /// Explicit stop flag, checked by the process loop at every step so a
    /// stop takes effect within one chunk interval.
    stop_requested: AtomicBool,
    cancel: CancellationToken,
}

impl SessionCoordinator {
    pub fn new(
        config: StreamConfig,
        limits: SessionLimits,
        collaborators: Collaborators,
    ) -> Arc<Self> {
        let (outbound_tx, outbound_rx) = mpsc::channel(limits.outbound_queue_capacity);
        Arc::new(Self {
            id: Uuid::new_v4().to_string(),
            buffer: BoundedAudioBuffer::new(limits.buffer_max_size),
            limits,
            config: parking_lot::RwLock::new(config),
            pending_config: parking_lot::Mutex::new(None),
            state: StateCell::new(),
            metrics: SessionMetrics::new(),
            collaborators,
            outbound_tx,
            outbound_rx: parking_lot::Mutex::new(Some(outbound_rx)),
            send_queue_high: AtomicBool::new(false),
            stop_requested: AtomicBool::new(false),
            cancel: CancellationToken::new(),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> SessionState {
        self.state.get()
    }

    /// Whether egress congestion is currently throttling ingest.
    pub fn is_send_queue_high(&self) -> bool {
        self.send_queue_high.load(Ordering::Relaxed)
    }

    /// Eventually-consistent view of the session counters.
    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Run the session until the transport disconnects, the client stops
    /// it, or an unrecoverable fault occurs.
    ///
    /// `inbound` carries frames from the transport; `transport` receives
    /// routed outbound payloads in strict enqueue order. Consumes the
    /// session: a coordinator runs at most once.
    pub async fn run(
        self: Arc<Self>,
        inbound: mpsc::Receiver<InboundFrame>,
        transport: mpsc::Sender<MessageRoute>,
    ) -> Result<(), SessionError> {
        let Some(outbound_rx) = self.outbound_rx.lock().take() else {
            error!(session_id = %self.id, "session coordinator started twice");
            return Ok(());
        };

        info!(session_id = %self.id, "session started");
        self.collaborators.metrics_sink.record_connection(true);

        // Observable starting point of the state timeline.
        self.change_state(SessionState::Idle).await;

        let egress = tokio::spawn(self.clone().egress_loop(outbound_rx, transport));
        let segmenter = UtteranceSegmenter::new(SegmenterConfig::default());
        let process = tokio::spawn(self.clone().process_loop(segmenter));

        self.ingest_loop(inbound).await;
        self.shutdown().await;

        let result = match process.await {
            Ok(result) => result,
            Err(join_error) => {
                error!(session_id = %self.id, %join_error, "process loop panicked");
                Ok(())
            }
        };
        let _ = egress.await;

        info!(session_id = %self.id, "session terminated");
        result
    }

    /// Request teardown from outside the loops (for example on server
    /// shutdown). `run` observes the cancellation and unwinds.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    // ---------------------------------------------------------------------
    // Ingest loop
    // ---------------------------------------------------------------------

    async fn ingest_loop(&self, mut inbound: mpsc::Receiver<InboundFrame>) {
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                frame = inbound.recv() => {
                    match frame {
                        None => {
                            info!(session_id = %self.id, "transport disconnected");
                            break;
                        }
                        Some(frame) => {
                            self.metrics.incr_messages_received();
                            self.collaborators
                                .metrics_sink
                                .record_message(MessageDirection::Received);
                            self.handle_frame(frame).await;
                        }
                    }
                }
                _ = tokio::time::sleep(self.limits.heartbeat_timeout) => {
                    // Missing heartbeat keeps the connection alive rather
                    // than terminating it.
                    debug!(session_id = %self.id, "ingest idle, sending keepalive");
                    self.send(OutboundMessage::Pong {
                        timestamp: unix_now(),
                        client_timestamp: None,
                    })
                    .await;
                }
            }
        }
    }

    async fn handle_frame(&self, frame: InboundFrame) {
        match frame {
            InboundFrame::Binary(data) => self.ingest_audio(&data).await,
            InboundFrame::Text(text) => match serde_json::from_str::<InboundMessage>(&text) {
                Ok(message) => self.handle_control(message).await,
                Err(e) => {
                    // Protocol violation: report and drop, the session
                    // continues.
                    warn!(session_id = %self.id, error = %e, "malformed inbound message");
                    self.metrics.incr_errors();
                    self.report_error(format!("invalid message format: {e}"))
                        .await;
                }
            },
        }
    }

    async fn ingest_audio(&self, data: &[u8]) {
        self.metrics.add_audio_bytes_received(data.len());

        // Egress congestion slows admission instead of refusing frames.
        if self.send_queue_high.load(Ordering::Relaxed) {
            tokio::time::sleep(self.limits.backpressure_delay).await;
        }

        if !self.buffer.write(data) {
            warn!(
                session_id = %self.id,
                buffered = self.buffer.size(),
                dropped = data.len(),
                "audio buffer overflow, dropping frame"
            );
            self.report_error("buffer overflow - slow down audio input".to_string())
                .await;
        }
    }

    async fn handle_control(&self, message: InboundMessage) {
        match message {
            InboundMessage::StartStream(update) => {
                if let Some(update) = update {
                    // From idle there is no utterance to guard, so the
                    // update lands before listening begins. A restart
                    // while already streaming parks it instead.
                    if self.state.get() == SessionState::Idle {
                        if !self.apply_config_now(update).await {
                            return;
                        }
                    } else if !self.queue_config_update(update).await {
                        return;
                    }
                }
                self.change_state(SessionState::Listening).await;
            }
            InboundMessage::StopStream => {
                self.stop_requested.store(true, Ordering::Release);
            }
            InboundMessage::Config(update) => {
                self.queue_config_update(update).await;
            }
            InboundMessage::Ping(data) => {
                self.send(OutboundMessage::Pong {
                    timestamp: unix_now(),
                    client_timestamp: data.and_then(|d| d.timestamp),
                })
                .await;
            }
            InboundMessage::AudioChunk { audio } => match BASE64.decode(audio.as_bytes()) {
                Ok(data) => self.ingest_audio(&data).await,
                Err(e) => {
                    self.metrics.incr_errors();
                    self.report_error(format!("invalid base64 audio: {e}")).await;
                }
            },
        }
    }

    /// Apply a config update immediately. Only valid outside an utterance
    /// (stream start). Returns false when the update was rejected.
    async fn apply_config_now(&self, update: StreamConfigUpdate) -> bool {
        let result = self.config.write().apply(update);
        match result {
            Ok(()) => {
                let config = self.config.read().clone();
                self.send(OutboundMessage::Ack { config }).await;
                true
            }
            Err(e) => {
                self.metrics.incr_errors();
                self.report_error(format!("invalid config: {e}")).await;
                false
            }
        }
    }

    /// Validate an update and park it until the process loop is between
    /// utterances. Returns false when the update was rejected.
    async fn queue_config_update(&self, update: StreamConfigUpdate) -> bool {
        match update.validate() {
            Ok(()) => {
                // Last update wins.
                *self.pending_config.lock() = Some(update);
                true
            }
            Err(e) => {
                self.metrics.incr_errors();
                self.report_error(format!("invalid config: {e}")).await;
                false
            }
        }
    }

    // ---------------------------------------------------------------------
    // Process loop
    // ---------------------------------------------------------------------

    async fn process_loop(
        self: Arc<Self>,
        mut segmenter: UtteranceSegmenter,
    ) -> Result<(), SessionError> {
        // Audio accumulated for the utterance in progress.
        let mut utterance: Vec<u8> = Vec::new();
        // Drained bytes not yet forming a whole segmenter chunk.
        let mut residue: Vec<u8> = Vec::new();
        // Above-threshold chunks since the last interim transcription.
        let mut speech_chunks = 0u32;

        loop {
            if self.cancel.is_cancelled() {
                return Ok(());
            }

            if self.stop_requested.swap(false, Ordering::AcqRel) {
                self.flush_and_stop(&mut segmenter, &mut utterance, &mut residue)
                    .await;
                speech_chunks = 0;
                continue;
            }

            if self.state.get() != SessionState::Listening {
                // Between utterances by definition: reconfiguration is safe.
                self.apply_pending_config(&mut segmenter).await;
                self.sleep_or_cancelled(self.limits.flush_interval).await;
                continue;
            }

            if self.buffer.size() < self.limits.chunk_size {
                // Quiet listening counts as between utterances.
                if !segmenter.is_speaking() {
                    self.apply_pending_config(&mut segmenter).await;
                }
                self.sleep_or_cancelled(self.limits.flush_interval).await;
                continue;
            }

            let slice = self.buffer.read(Some(self.limits.chunk_size * 4)).await;

            let (vad_enabled, chunk_bytes, interim_enabled) = {
                let config = self.config.read();
                (
                    config.voice_activity_detection,
                    config.chunk_bytes(),
                    config.interim_results,
                )
            };

            if !vad_enabled {
                // Segmentation disabled: every drained slice is its own
                // final utterance.
                self.process_utterance(Bytes::from(slice), true).await;
                self.apply_pending_config(&mut segmenter).await;
                continue;
            }

            residue.extend_from_slice(&slice);
            let mut offset = 0;
            while residue.len() - offset >= chunk_bytes {
                let chunk = &residue[offset..offset + chunk_bytes];
                offset += chunk_bytes;

                let samples = pcm16le_to_f32(chunk);
                let decision = match segmenter.observe(&samples) {
                    Ok(decision) => decision,
                    Err(fault) => {
                        self.fail_fatal(&fault).await;
                        return Err(fault.into());
                    }
                };

                if decision.is_speaking {
                    utterance.extend_from_slice(chunk);
                    if decision.is_voice {
                        speech_chunks += 1;
                    }
                }

                match decision.event {
                    Some(SegmenterEvent::SpeechStart) => {
                        debug!(session_id = %self.id, "utterance started");
                    }
                    Some(SegmenterEvent::SpeechEnd) => {
                        debug!(
                            session_id = %self.id,
                            bytes = utterance.len(),
                            "utterance boundary"
                        );
                        let audio = std::mem::take(&mut utterance);
                        speech_chunks = 0;
                        if !audio.is_empty() {
                            self.process_utterance(Bytes::from(audio), true).await;
                        }
                        segmenter.reset();
                        self.apply_pending_config(&mut segmenter).await;
                        if self.cancel.is_cancelled() {
                            return Ok(());
                        }
                    }
                    None => {}
                }

                if decision.is_speaking
                    && interim_enabled
                    && speech_chunks >= self.limits.interim_chunk_interval
                {
                    speech_chunks = 0;
                    self.process_utterance(Bytes::copy_from_slice(&utterance), false)
                        .await;
                    if self.cancel.is_cancelled() {
                        return Ok(());
                    }
                }
            }
            residue.drain(..offset);
        }
    }

    /// Explicit stop: flush whatever is pending through one final
    /// transcription and return to idle.
    async fn flush_and_stop(
        &self,
        segmenter: &mut UtteranceSegmenter,
        utterance: &mut Vec<u8>,
        residue: &mut Vec<u8>,
    ) {
        if self.state.get() == SessionState::Idle {
            utterance.clear();
            residue.clear();
            return;
        }

        let mut audio = std::mem::take(utterance);
        audio.append(residue);
        if self.buffer.size() > 0 {
            audio.extend(self.buffer.read(None).await);
        }
        segmenter.reset();

        if !audio.is_empty() {
            self.process_utterance(Bytes::from(audio), true).await;
        }
        self.apply_pending_config(segmenter).await;
        self.change_state(SessionState::Idle).await;
    }

    /// Hand an utterance to the transcription collaborator and forward the
    /// result. `expect_final` marks a completed utterance (boundary or
    /// stop); interim calls pass the utterance-so-far.
    async fn process_utterance(&self, audio: Bytes, expect_final: bool) {
        if audio.is_empty() {
            return;
        }

        let (language, interim_enabled, voice, target_language) = {
            let config = self.config.read();
            (
                config.language.clone(),
                config.interim_results,
                config.voice_profile_id.clone(),
                config.target_language.clone(),
            )
        };

        if expect_final {
            self.change_state(SessionState::Processing).await;
        }

        let started = Instant::now();
        let result = self
            .collaborators
            .transcriber
            .transcribe(audio, &language, !expect_final)
            .await;
        self.metrics.record_latency(started.elapsed().as_secs_f64());

        // The session may have reached teardown while the call was in
        // flight; its result is discarded, never delivered late.
        if self.cancel.is_cancelled() {
            return;
        }

        match result {
            Ok(transcription) if transcription.text.is_empty() => {
                debug!(session_id = %self.id, "empty transcription, nothing to forward");
            }
            Ok(transcription) => {
                self.metrics.incr_transcripts();
                if transcription.is_final || expect_final {
                    self.send(OutboundMessage::TranscriptFinal {
                        text: transcription.text.clone(),
                        language: language.clone(),
                        timestamp: unix_now(),
                    })
                    .await;

                    if let Some(voice) = voice {
                        let synth_language = target_language.as_deref().unwrap_or(&language);
                        self.respond_with_audio(&transcription.text, &voice, synth_language)
                            .await;
                    }
                } else if interim_enabled {
                    self.send(OutboundMessage::TranscriptPartial {
                        text: transcription.text,
                        stability: transcription.stability,
                        timestamp: unix_now(),
                    })
                    .await;
                }
            }
            Err(e) => {
                warn!(session_id = %self.id, error = %e, "transcription failed");
                self.metrics.incr_errors();
                self.report_error(format!("transcription failed: {e}")).await;
            }
        }

        if expect_final && self.state.get() == SessionState::Processing {
            self.change_state(SessionState::Listening).await;
        }
    }

    /// Synthesize a reply for a final transcript and stream it back in
    /// bounded binary pieces.
    async fn respond_with_audio(&self, text: &str, voice: &str, language: &str) {
        self.change_state(SessionState::Speaking).await;

        let result = self
            .collaborators
            .synthesizer
            .synthesize(text, voice, language)
            .await;

        if self.cancel.is_cancelled() {
            return;
        }

        match result {
            Ok(audio) => {
                let total = audio.len();
                // Chunking keeps one large payload from starving other
                // pending messages in the outbound queue.
                let mut offset = 0;
                while offset < total {
                    let end = (offset + self.limits.audio_response_chunk_size).min(total);
                    let _ = self
                        .outbound_tx
                        .send(MessageRoute::Binary(audio.slice(offset..end)))
                        .await;
                    offset = end;
                }
                self.send(OutboundMessage::AudioResponse {
                    status: "complete".to_string(),
                    bytes_sent: total,
                    timestamp: unix_now(),
                })
                .await;
            }
            Err(e) => {
                warn!(session_id = %self.id, error = %e, "synthesis failed");
                self.metrics.incr_errors();
                self.report_error(format!("synthesis failed: {e}")).await;
            }
        }

        self.change_state(SessionState::Listening).await;
    }

    /// Drain the parked config update, if any. Callers guarantee the
    /// session is between utterances.
    async fn apply_pending_config(&self, segmenter: &mut UtteranceSegmenter) {
        let Some(update) = self.pending_config.lock().take() else {
            return;
        };

        let result = self.config.write().apply(update);
        match result {
            Ok(()) => {
                segmenter.reset();
                let config = self.config.read().clone();
                info!(session_id = %self.id, "stream reconfigured");
                self.send(OutboundMessage::Ack { config }).await;
            }
            Err(e) => {
                self.metrics.incr_errors();
                self.report_error(format!("invalid config: {e}")).await;
            }
        }
    }

    // ---------------------------------------------------------------------
    // Egress loop
    // ---------------------------------------------------------------------

    async fn egress_loop(
        self: Arc<Self>,
        mut outbound_rx: mpsc::Receiver<MessageRoute>,
        transport: mpsc::Sender<MessageRoute>,
    ) {
        loop {
            let depth = self.outbound_tx.max_capacity() - self.outbound_tx.capacity();
            if depth > self.limits.high_water_mark {
                if !self.send_queue_high.swap(true, Ordering::Relaxed) {
                    debug!(session_id = %self.id, depth, "send queue high, throttling");
                }
                // Self-throttle before the next send.
                tokio::time::sleep(self.limits.backpressure_delay).await;
            } else if depth < self.limits.low_water_mark {
                self.send_queue_high.store(false, Ordering::Relaxed);
            }

            tokio::select! {
                _ = self.cancel.cancelled() => {
                    // Best-effort drain of whatever was already enqueued,
                    // including the final metrics snapshot.
                    while let Ok(route) = outbound_rx.try_recv() {
                        if !self.forward(route, &transport).await {
                            break;
                        }
                    }
                    break;
                }
                route = outbound_rx.recv() => {
                    match route {
                        None => break,
                        Some(route) => {
                            if !self.forward(route, &transport).await {
                                break;
                            }
                        }
                    }
                }
            }
        }
    }

    /// Push one routed payload at the transport. Returns false when the
    /// transport side is gone.
    async fn forward(&self, route: MessageRoute, transport: &mpsc::Sender<MessageRoute>) -> bool {
        if let MessageRoute::Binary(data) = &route {
            self.metrics.add_audio_bytes_sent(data.len());
        }
        self.metrics.incr_messages_sent();
        self.collaborators
            .metrics_sink
            .record_message(MessageDirection::Sent);
        transport.send(route).await.is_ok()
    }

    // ---------------------------------------------------------------------
    // Shared helpers
    // ---------------------------------------------------------------------

    async fn send(&self, message: OutboundMessage) {
        let _ = self.outbound_tx.send(MessageRoute::Outbound(message)).await;
    }

    async fn report_error(&self, error: String) {
        self.send(OutboundMessage::Error {
            error,
            timestamp: unix_now(),
        })
        .await;
    }

    async fn change_state(&self, new: SessionState) {
        let previous = self.state.swap(new);
        self.send(OutboundMessage::StateChange {
            state: new,
            previous_state: previous,
            timestamp: unix_now(),
        })
        .await;
    }

    /// Unrecoverable internal fault: surface a diagnostic and tear the
    /// session down.
    async fn fail_fatal(&self, fault: &SegmenterFault) {
        error!(session_id = %self.id, %fault, "fatal session fault");
        self.metrics.incr_errors();
        self.change_state(SessionState::Error).await;
        self.report_error(format!("internal fault: {fault}")).await;
        self.cancel.cancel();
    }

    async fn shutdown(&self) {
        // Enqueue the final snapshot before cancelling so the egress drain
        // can still deliver it.
        let _ = self.outbound_tx.try_send(MessageRoute::Outbound(
            OutboundMessage::MetricsSnapshot(self.metrics.snapshot()),
        ));
        self.cancel.cancel();
        self.buffer.clear();
        self.collaborators.metrics_sink.record_connection(false);
    }

    async fn sleep_or_cancelled(&self, duration: Duration) {
        tokio::select! {
            _ = self.cancel.cancelled() => {}
            _ = tokio::time::sleep(duration) => {}
        }
    }
}
