//! HTTP call-through to an external speech synthesis service.

use bytes::Bytes;
use serde_json::json;
use tracing::debug;

use super::base::{SynthesisError, Synthesizer};

/// Thin adapter posting a synthesis request and returning the audio body.
///
/// The service contract is a POST of `{text, voice_profile_id, language}`
/// JSON, answered with the encoded audio as the raw response body.
pub struct HttpSynthesizer {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpSynthesizer {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait::async_trait]
impl Synthesizer for HttpSynthesizer {
    async fn synthesize(
        &self,
        text: &str,
        voice_profile_id: &str,
        language: &str,
    ) -> Result<Bytes, SynthesisError> {
        debug!(chars = text.len(), voice_profile_id, language, "synthesis request");

        let response = self
            .client
            .post(&self.endpoint)
            .json(&json!({
                "text": text,
                "voice_profile_id": voice_profile_id,
                "language": language,
            }))
            .send()
            .await
            .map_err(|e| SynthesisError::ConnectionFailed(e.to_string()))?;

        match response.status() {
            status if status.is_success() => response
                .bytes()
                .await
                .map_err(|e| SynthesisError::ProviderError(e.to_string())),
            reqwest::StatusCode::NOT_FOUND => {
                Err(SynthesisError::UnknownVoice(voice_profile_id.to_string()))
            }
            status => Err(SynthesisError::ProviderError(format!(
                "synthesis service returned {status}"
            ))),
        }
    }
}
