//! HTTP call-through to an external transcription service.

use bytes::Bytes;
use tracing::debug;

use super::base::{TranscribeError, Transcriber, Transcription};

/// Thin adapter posting raw audio to a transcription endpoint.
///
/// The service contract is a POST of the audio body with `language` and
/// `interim` query parameters, answered with a JSON
/// `{text, is_final, stability?}` document.
pub struct HttpTranscriber {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpTranscriber {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait::async_trait]
impl Transcriber for HttpTranscriber {
    async fn transcribe(
        &self,
        audio: Bytes,
        language: &str,
        interim: bool,
    ) -> Result<Transcription, TranscribeError> {
        if audio.is_empty() {
            return Err(TranscribeError::InvalidAudio("empty audio".to_string()));
        }
        debug!(bytes = audio.len(), language, interim, "transcribe request");

        let response = self
            .client
            .post(&self.endpoint)
            .query(&[("language", language), ("interim", &interim.to_string())])
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(audio)
            .send()
            .await
            .map_err(|e| TranscribeError::ConnectionFailed(e.to_string()))?;

        if !response.status().is_success() {
            return Err(TranscribeError::ProviderError(format!(
                "transcription service returned {}",
                response.status()
            )));
        }

        response
            .json::<Transcription>()
            .await
            .map_err(|e| TranscribeError::MalformedResponse(e.to_string()))
    }
}
