use axum::Router;
use tokio::net::TcpListener;

use anyhow::anyhow;

use voicebridge::{ServerConfig, routes, state::AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "voicebridge=info,tower_http=info".into()),
        )
        .init();

    // Load configuration
    let config = ServerConfig::from_env().map_err(|e| anyhow!(e.to_string()))?;
    let address = config.address();

    // Create application state
    let app_state = AppState::new(config);

    // Public health check route plus API and WebSocket routers
    let public_routes = Router::new().route(
        "/",
        axum::routing::get(voicebridge::handlers::api::health_check),
    );

    let app = public_routes
        .merge(routes::api::create_api_router())
        .merge(routes::ws::create_ws_router())
        .with_state(app_state);

    let listener = TcpListener::bind(&address).await?;
    tracing::info!("Server listening on {address}");

    axum::serve(listener, app).await?;

    Ok(())
}
