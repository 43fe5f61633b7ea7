pub mod buffer;
pub mod capture;
pub mod session;
pub mod stt;
pub mod tts;
pub mod vad;

pub use buffer::BoundedAudioBuffer;
pub use session::{Collaborators, SessionCoordinator, SessionError, SessionState};
pub use stt::Transcriber;
pub use tts::Synthesizer;
pub use vad::UtteranceSegmenter;
