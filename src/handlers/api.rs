use std::sync::Arc;

use axum::{extract::State, http::StatusCode, response::Json};
use serde_json::{Value, json};

use crate::core::session::config::SUPPORTED_ENCODINGS;
use crate::state::AppState;

/// Health check handler
/// Returns a simple JSON response indicating the server is running
pub async fn health_check() -> Result<Json<Value>, StatusCode> {
    Ok(Json(json!({
        "status": "OK"
    })))
}

/// Streaming status handler
/// Reports server-wide connection counters and the session tuning in
/// effect, for dashboards and smoke tests.
pub async fn ws_status(State(state): State<Arc<AppState>>) -> Result<Json<Value>, StatusCode> {
    Ok(Json(json!({
        "active_connections": state.metrics.active_connections(),
        "messages_received": state.metrics.messages_received(),
        "messages_sent": state.metrics.messages_sent(),
        "supported_encodings": SUPPORTED_ENCODINGS,
        "features": {
            "partial_transcripts": true,
            "backpressure": true,
            "voice_activity_detection": true,
        },
        "limits": {
            "buffer_max_size": state.config.buffer_max_size,
            "high_water_mark": state.config.high_water_mark,
            "low_water_mark": state.config.low_water_mark,
            "backpressure_delay_ms": state.config.backpressure_delay_ms,
        }
    })))
}
