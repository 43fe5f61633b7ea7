//! Configuration module for the voicebridge server
//!
//! Server configuration is read from environment variables (with a `.env`
//! file honored when present). Session tuning knobs that rarely change
//! carry defaults matched to 16 kHz mono PCM streaming and can be
//! overridden per deployment.

use std::env;
use std::time::Duration;

use crate::core::session::SessionLimits;

/// Server configuration
///
/// Contains all configuration needed to run the voicebridge server:
/// - Server settings (host, port)
/// - Collaborator endpoints (transcription, synthesis)
/// - Session tuning (buffer sizing, water marks, backpressure delay)
#[derive(Debug, Clone)]
pub struct ServerConfig {
    // Server settings
    pub host: String,
    pub port: u16,

    // Collaborator endpoints
    pub stt_url: String,
    pub tts_url: String,

    // Session tuning
    pub buffer_max_size: usize,
    pub high_water_mark: usize,
    pub low_water_mark: usize,
    pub backpressure_delay_ms: u64,
    pub heartbeat_timeout_seconds: u64,
}

impl ServerConfig {
    /// Load configuration from environment variables
    ///
    /// Reads configuration from environment variables, with sensible
    /// defaults. Also loads from .env file if present using dotenvy.
    ///
    /// # Errors
    /// Returns an error if a variable is present but malformed, or if the
    /// water marks are inconsistent.
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        // Load .env file if it exists
        let _ = dotenvy::dotenv();

        let host = env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = env::var("PORT")
            .unwrap_or_else(|_| "3001".to_string())
            .parse::<u16>()
            .map_err(|e| format!("Invalid port number: {e}"))?;

        let stt_url = env::var("STT_URL")
            .unwrap_or_else(|_| "http://localhost:8000/v1/transcribe".to_string());
        let tts_url = env::var("TTS_URL")
            .unwrap_or_else(|_| "http://localhost:8001/v1/synthesize".to_string());

        let buffer_max_size = env::var("BUFFER_MAX_SIZE")
            .unwrap_or_else(|_| (1024 * 1024).to_string())
            .parse::<usize>()
            .map_err(|e| format!("Invalid BUFFER_MAX_SIZE: {e}"))?;
        let high_water_mark = env::var("SEND_QUEUE_HIGH_WATER")
            .unwrap_or_else(|_| "100".to_string())
            .parse::<usize>()
            .map_err(|e| format!("Invalid SEND_QUEUE_HIGH_WATER: {e}"))?;
        let low_water_mark = env::var("SEND_QUEUE_LOW_WATER")
            .unwrap_or_else(|_| "50".to_string())
            .parse::<usize>()
            .map_err(|e| format!("Invalid SEND_QUEUE_LOW_WATER: {e}"))?;
        let backpressure_delay_ms = env::var("BACKPRESSURE_DELAY_MS")
            .unwrap_or_else(|_| "50".to_string())
            .parse::<u64>()
            .map_err(|e| format!("Invalid BACKPRESSURE_DELAY_MS: {e}"))?;
        let heartbeat_timeout_seconds = env::var("HEARTBEAT_TIMEOUT_SECONDS")
            .unwrap_or_else(|_| "30".to_string())
            .parse::<u64>()
            .map_err(|e| format!("Invalid HEARTBEAT_TIMEOUT_SECONDS: {e}"))?;

        let config = ServerConfig {
            host,
            port,
            stt_url,
            tts_url,
            buffer_max_size,
            high_water_mark,
            low_water_mark,
            backpressure_delay_ms,
            heartbeat_timeout_seconds,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), Box<dyn std::error::Error>> {
        if self.buffer_max_size == 0 {
            return Err("BUFFER_MAX_SIZE must be greater than zero".into());
        }
        if self.low_water_mark >= self.high_water_mark {
            return Err(format!(
                "SEND_QUEUE_LOW_WATER ({}) must be below SEND_QUEUE_HIGH_WATER ({})",
                self.low_water_mark, self.high_water_mark
            )
            .into());
        }
        Ok(())
    }

    /// Get the server address as a string
    ///
    /// Returns the address in the format "host:port"
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Session limits derived from this configuration. Knobs without an
    /// environment override keep their defaults.
    pub fn session_limits(&self) -> SessionLimits {
        SessionLimits {
            buffer_max_size: self.buffer_max_size,
            high_water_mark: self.high_water_mark,
            low_water_mark: self.low_water_mark,
            backpressure_delay: Duration::from_millis(self.backpressure_delay_ms),
            heartbeat_timeout: Duration::from_secs(self.heartbeat_timeout_seconds),
            ..SessionLimits::default()
        }
    }
}
