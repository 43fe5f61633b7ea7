use bytes::Bytes;

/// Error types for synthesis calls. Recoverable at the session level.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SynthesisError {
    #[error("connection failed: {0}")]
    ConnectionFailed(String),
    #[error("provider error: {0}")]
    ProviderError(String),
    #[error("unknown voice '{0}'")]
    UnknownVoice(String),
}

/// Text-to-speech collaborator.
///
/// Same non-blocking contract as [`crate::core::stt::Transcriber`]: calls
/// may be slow and are awaited at a suspension point, and implementations
/// must be safely callable concurrently by multiple sessions.
#[async_trait::async_trait]
pub trait Synthesizer: Send + Sync {
    /// Synthesize `text` in the referenced voice, returning encoded audio.
    async fn synthesize(
        &self,
        text: &str,
        voice_profile_id: &str,
        language: &str,
    ) -> Result<Bytes, SynthesisError>;
}
