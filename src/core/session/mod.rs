//! Streaming session: wire messages, per-session configuration, state
//! machine, metrics, and the coordinator that ties them together.

pub mod config;
pub mod coordinator;
pub mod messages;
pub mod metrics;
pub mod state;

pub use config::{SessionLimits, StreamConfig, StreamConfigUpdate};
pub use coordinator::{Collaborators, SessionCoordinator, SessionError};
pub use messages::{InboundFrame, InboundMessage, MessageRoute, OutboundMessage, unix_now};
pub use metrics::{MetricsSnapshot, SessionMetrics};
pub use state::SessionState;
