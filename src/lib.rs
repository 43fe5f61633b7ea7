pub mod config;
pub mod core;
pub mod handlers;
pub mod metrics;
pub mod routes;
pub mod state;

// Re-export commonly used items for convenience
pub use config::ServerConfig;
pub use crate::core::*;
pub use state::AppState;
