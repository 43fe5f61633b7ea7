//! Transcription collaborator interface.
//!
//! The session coordinator treats transcription as an opaque, possibly slow
//! external service behind the [`Transcriber`] trait. Implementations must
//! be safely callable concurrently by multiple sessions.

mod base;
mod http;

pub use base::{TranscribeError, Transcriber, Transcription};
pub use http::HttpTranscriber;
