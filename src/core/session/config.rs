//! Stream configuration and the whitelisted update path.
//!
//! Configuration mutates only through [`StreamConfigUpdate`], a struct of
//! named optional fields applied by [`StreamConfig::apply`]. The session
//! coordinator drains pending updates between utterances so a
//! reconfiguration can never land mid-utterance.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Sample rates accepted from clients, in Hz.
pub const MIN_SAMPLE_RATE: u32 = 8_000;
pub const MAX_SAMPLE_RATE: u32 = 48_000;

/// Encodings the wire protocol advertises. Only PCM is segmented; the
/// others pass through to the transcription service untouched.
pub const SUPPORTED_ENCODINGS: &[&str] = &["pcm_s16le", "opus", "mp3"];

/// Per-session stream configuration.
///
/// Immutable between explicit `config` messages. Defaults follow the wire
/// protocol's documented baseline: 16 kHz mono PCM, interim results and
/// voice activity detection enabled, no synthesis voice.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StreamConfig {
    /// BCP-47-ish language tag passed to the transcription service.
    pub language: String,
    pub sample_rate: u32,
    pub channels: u16,
    pub encoding: String,
    /// Forward interim transcription results to the client.
    pub interim_results: bool,
    /// Segment utterances with the adaptive VAD. When disabled every
    /// drained slice goes straight to transcription as a final utterance.
    pub voice_activity_detection: bool,
    /// Synthesis voice reference. Synthesis only runs when this is set.
    pub voice_profile_id: Option<String>,
    /// Target language for translated synthesis; falls back to `language`.
    pub target_language: Option<String>,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            language: "en".to_string(),
            sample_rate: 16_000,
            channels: 1,
            encoding: "pcm_s16le".to_string(),
            interim_results: true,
            voice_activity_detection: true,
            voice_profile_id: None,
            target_language: None,
        }
    }
}

impl StreamConfig {
    /// Bytes in one 100 ms segmenter chunk of 16-bit PCM at the configured
    /// rate and channel count.
    pub fn chunk_bytes(&self) -> usize {
        (self.sample_rate as usize / 10) * self.channels as usize * 2
    }

    /// Apply a whitelisted update in place.
    pub fn apply(&mut self, update: StreamConfigUpdate) -> Result<(), ConfigError> {
        update.validate()?;

        if let Some(language) = update.language {
            self.language = language;
        }
        if let Some(sample_rate) = update.sample_rate {
            self.sample_rate = sample_rate;
        }
        if let Some(channels) = update.channels {
            self.channels = channels;
        }
        if let Some(encoding) = update.encoding {
            self.encoding = encoding;
        }
        if let Some(interim_results) = update.interim_results {
            self.interim_results = interim_results;
        }
        if let Some(vad) = update.voice_activity_detection {
            self.voice_activity_detection = vad;
        }
        if let Some(voice_profile_id) = update.voice_profile_id {
            self.voice_profile_id = voice_profile_id;
        }
        if let Some(target_language) = update.target_language {
            self.target_language = target_language;
        }
        Ok(())
    }
}

/// Named-field configuration update. Absent fields keep their current
/// values; `voice_profile_id`/`target_language` use a double `Option` so a
/// client can explicitly clear them with `null`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StreamConfigUpdate {
    pub language: Option<String>,
    pub sample_rate: Option<u32>,
    pub channels: Option<u16>,
    pub encoding: Option<String>,
    pub interim_results: Option<bool>,
    pub voice_activity_detection: Option<bool>,
    #[serde(default, with = "double_option")]
    pub voice_profile_id: Option<Option<String>>,
    #[serde(default, with = "double_option")]
    pub target_language: Option<Option<String>>,
}

impl StreamConfigUpdate {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(rate) = self.sample_rate
            && !(MIN_SAMPLE_RATE..=MAX_SAMPLE_RATE).contains(&rate)
        {
            return Err(ConfigError::SampleRateOutOfRange(rate));
        }
        if let Some(channels) = self.channels
            && !(1..=2).contains(&channels)
        {
            return Err(ConfigError::UnsupportedChannelCount(channels));
        }
        if let Some(encoding) = &self.encoding
            && !SUPPORTED_ENCODINGS.contains(&encoding.as_str())
        {
            return Err(ConfigError::UnsupportedEncoding(encoding.clone()));
        }
        Ok(())
    }
}

mod double_option {
    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
    where
        D: Deserializer<'de>,
        T: Deserialize<'de>,
    {
        Option::<T>::deserialize(deserializer).map(Some)
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    #[error("sample rate {0} outside supported range {MIN_SAMPLE_RATE}-{MAX_SAMPLE_RATE} Hz")]
    SampleRateOutOfRange(u32),
    #[error("unsupported channel count {0}")]
    UnsupportedChannelCount(u16),
    #[error("unsupported encoding '{0}'")]
    UnsupportedEncoding(String),
}

/// Session-level tunables with the deployment defaults.
///
/// The watermark and delay values are heuristic backpressure parameters,
/// surfaced as configuration rather than constants so deployments can tune
/// them against their own egress characteristics.
#[derive(Debug, Clone)]
pub struct SessionLimits {
    /// Audio buffer capacity in bytes.
    pub buffer_max_size: usize,
    /// Minimum buffered bytes before the process loop drains a slice.
    pub chunk_size: usize,
    /// Outbound queue depth that starts egress throttling.
    pub high_water_mark: usize,
    /// Outbound queue depth that stops egress throttling.
    pub low_water_mark: usize,
    /// Delay applied by throttled loops.
    pub backpressure_delay: Duration,
    /// Process loop polling interval while the buffer is under-filled.
    pub flush_interval: Duration,
    /// Ingest inactivity window before a keepalive pong is emitted.
    pub heartbeat_timeout: Duration,
    /// Outbound queue capacity. Must exceed `high_water_mark`.
    pub outbound_queue_capacity: usize,
    /// Synthesized audio is split into pieces of this size before enqueue
    /// so one large payload cannot starve other pending messages.
    pub audio_response_chunk_size: usize,
    /// Accumulated speech chunks between interim transcription calls when
    /// interim results are enabled.
    pub interim_chunk_interval: u32,
}

impl Default for SessionLimits {
    fn default() -> Self {
        Self {
            buffer_max_size: 1024 * 1024,
            chunk_size: 4096,
            high_water_mark: 100,
            low_water_mark: 50,
            backpressure_delay: Duration::from_millis(50),
            flush_interval: Duration::from_millis(100),
            heartbeat_timeout: Duration::from_secs(30),
            outbound_queue_capacity: 1024,
            audio_response_chunk_size: 8192,
            interim_chunk_interval: 10,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_chunk_bytes() {
        let config = StreamConfig::default();
        // 100 ms of 16 kHz mono 16-bit PCM.
        assert_eq!(config.chunk_bytes(), 3200);
    }

    #[test]
    fn test_apply_partial_update() {
        let mut config = StreamConfig::default();
        let update = StreamConfigUpdate {
            language: Some("es".to_string()),
            interim_results: Some(false),
            ..Default::default()
        };
        config.apply(update).unwrap();
        assert_eq!(config.language, "es");
        assert!(!config.interim_results);
        // Untouched fields keep their values.
        assert_eq!(config.sample_rate, 16_000);
        assert!(config.voice_activity_detection);
    }

    #[test]
    fn test_apply_rejects_bad_sample_rate() {
        let mut config = StreamConfig::default();
        let before = config.clone();
        let update = StreamConfigUpdate {
            sample_rate: Some(4_000),
            language: Some("fr".to_string()),
            ..Default::default()
        };
        assert!(config.apply(update).is_err());
        // A rejected update must not half-apply.
        assert_eq!(config, before);
    }

    #[test]
    fn test_apply_rejects_unknown_encoding() {
        let mut config = StreamConfig::default();
        let update = StreamConfigUpdate {
            encoding: Some("flac".to_string()),
            ..Default::default()
        };
        assert!(config.apply(update).is_err());
    }

    #[test]
    fn test_voice_profile_set_and_clear() {
        let mut config = StreamConfig::default();

        let update: StreamConfigUpdate =
            serde_json::from_str(r#"{"voice_profile_id": "voice-1"}"#).unwrap();
        config.apply(update).unwrap();
        assert_eq!(config.voice_profile_id.as_deref(), Some("voice-1"));

        let clear: StreamConfigUpdate =
            serde_json::from_str(r#"{"voice_profile_id": null}"#).unwrap();
        config.apply(clear).unwrap();
        assert_eq!(config.voice_profile_id, None);

        // Absent field leaves the value alone.
        config.voice_profile_id = Some("voice-2".to_string());
        let untouched: StreamConfigUpdate = serde_json::from_str(r#"{}"#).unwrap();
        config.apply(untouched).unwrap();
        assert_eq!(config.voice_profile_id.as_deref(), Some("voice-2"));
    }
}
