use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
    routing::get,
};
use serde_json::Value;
use tower::util::ServiceExt;

use voicebridge::{ServerConfig, routes, state::AppState};

fn test_config() -> ServerConfig {
    ServerConfig {
        host: "0.0.0.0".to_string(),
        port: 3001,
        stt_url: "http://localhost:8000/v1/transcribe".to_string(),
        tts_url: "http://localhost:8001/v1/synthesize".to_string(),
        buffer_max_size: 1024 * 1024,
        high_water_mark: 100,
        low_water_mark: 50,
        backpressure_delay_ms: 50,
        heartbeat_timeout_seconds: 30,
    }
}

#[tokio::test]
async fn test_health_check() {
    let app_state = AppState::new(test_config());

    let app = Router::new()
        .route("/", get(voicebridge::handlers::api::health_check))
        .with_state(app_state);

    let request = Request::builder().uri("/").body(Body::empty()).unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json: Value = serde_json::from_slice(&body).unwrap();

    assert_eq!(json["status"], "OK");
}

#[tokio::test]
async fn test_status_reports_counters_and_limits() {
    let app_state = AppState::new(test_config());

    let app = routes::api::create_api_router().with_state(app_state);

    let request = Request::builder()
        .uri("/status")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json: Value = serde_json::from_slice(&body).unwrap();

    assert_eq!(json["active_connections"], 0);
    assert_eq!(json["messages_received"], 0);
    assert_eq!(json["supported_encodings"][0], "pcm_s16le");
    assert_eq!(json["features"]["voice_activity_detection"], true);
    assert_eq!(json["limits"]["buffer_max_size"], 1024 * 1024);
    assert_eq!(json["limits"]["high_water_mark"], 100);
    assert_eq!(json["limits"]["low_water_mark"], 50);
}

#[tokio::test]
async fn test_unknown_route_is_not_found() {
    let app_state = AppState::new(test_config());

    let app = routes::api::create_api_router().with_state(app_state);

    let request = Request::builder()
        .uri("/nonexistent")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
