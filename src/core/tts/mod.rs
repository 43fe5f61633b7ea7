//! Speech synthesis collaborator interface.

mod base;
mod http;

pub use base::{SynthesisError, Synthesizer};
pub use http::HttpSynthesizer;
