use std::sync::Arc;

use crate::config::ServerConfig;
use crate::core::session::Collaborators;
use crate::core::stt::HttpTranscriber;
use crate::core::tts::HttpSynthesizer;
use crate::metrics::{MetricsSink, TracingMetricsSink};

/// Application state that can be shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: ServerConfig,
    /// Injected into every session coordinator. Cloned per connection,
    /// shared behind the Arcs inside.
    pub collaborators: Collaborators,
    /// Server-wide counters, also reachable through `collaborators`.
    pub metrics: Arc<TracingMetricsSink>,
}

impl AppState {
    pub fn new(config: ServerConfig) -> Arc<Self> {
        let metrics = Arc::new(TracingMetricsSink::new());
        let collaborators = Collaborators {
            transcriber: Arc::new(HttpTranscriber::new(config.stt_url.clone())),
            synthesizer: Arc::new(HttpSynthesizer::new(config.tts_url.clone())),
            metrics_sink: metrics.clone() as Arc<dyn MetricsSink>,
        };
        Arc::new(Self {
            config,
            collaborators,
            metrics,
        })
    }

    /// Build state around custom collaborators, used by tests and
    /// embedders that bring their own services.
    pub fn with_collaborators(config: ServerConfig, collaborators: Collaborators) -> Arc<Self> {
        Arc::new(Self {
            config,
            collaborators,
            metrics: Arc::new(TracingMetricsSink::new()),
        })
    }
}
