use bytes::Bytes;
use serde::Deserialize;

/// Result structure containing recognition data from a transcription
/// service.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Transcription {
    /// The transcribed text for the submitted audio.
    pub text: String,
    /// Whether this is the service's settled result rather than an interim
    /// one.
    pub is_final: bool,
    /// How unlikely an interim result is to be revised (0.0 to 1.0).
    /// Meaningless for final results.
    #[serde(default = "default_stability")]
    pub stability: f32,
}

fn default_stability() -> f32 {
    0.5
}

impl Transcription {
    pub fn new(text: impl Into<String>, is_final: bool, stability: f32) -> Self {
        Self {
            text: text.into(),
            is_final,
            stability: stability.clamp(0.0, 1.0),
        }
    }
}

/// Error types for transcription calls.
///
/// All variants are recoverable at the session level: the coordinator
/// reports them to the client and returns to listening.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TranscribeError {
    #[error("connection failed: {0}")]
    ConnectionFailed(String),
    #[error("provider error: {0}")]
    ProviderError(String),
    #[error("invalid audio: {0}")]
    InvalidAudio(String),
    #[error("malformed provider response: {0}")]
    MalformedResponse(String),
}

/// Speech-to-text collaborator.
///
/// Calls may take hundreds of milliseconds to seconds; the coordinator
/// awaits them at a suspension point so the session's other loops keep
/// running.
#[async_trait::async_trait]
pub trait Transcriber: Send + Sync {
    /// Transcribe a complete or partial utterance.
    ///
    /// # Arguments
    /// * `audio` - Raw audio bytes in the session's configured encoding
    /// * `language` - Language tag for recognition
    /// * `interim` - Whether an interim (revisable) result is acceptable
    async fn transcribe(
        &self,
        audio: Bytes,
        language: &str,
        interim: bool,
    ) -> Result<Transcription, TranscribeError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stability_clamped() {
        assert_eq!(Transcription::new("hi", false, 1.5).stability, 1.0);
        assert_eq!(Transcription::new("hi", false, -0.5).stability, 0.0);
    }

    #[test]
    fn test_deserialize_defaults_stability() {
        let t: Transcription =
            serde_json::from_str(r#"{"text": "hello", "is_final": true}"#).unwrap();
        assert_eq!(t.text, "hello");
        assert!(t.is_final);
        assert_eq!(t.stability, 0.5);
    }
}
