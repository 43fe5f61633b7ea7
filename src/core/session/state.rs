//! Session state machine.

use serde::Serialize;

/// Lifecycle state of a streaming session.
///
/// `Idle` is the initial state; teardown is reachable from any state and is
/// not itself a state (a torn-down session no longer exists). `Error` is
/// reserved for unrecoverable internal faults; transient overload and
/// collaborator failures never enter it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Idle,
    Listening,
    Processing,
    Speaking,
    Error,
}

/// Shared cell holding the current session state.
///
/// Written only by the owning session's loops; read freely. The lock is
/// held for nanoseconds so `parking_lot` suffices.
pub struct StateCell {
    inner: parking_lot::RwLock<SessionState>,
}

impl StateCell {
    pub fn new() -> Self {
        Self {
            inner: parking_lot::RwLock::new(SessionState::Idle),
        }
    }

    pub fn get(&self) -> SessionState {
        *self.inner.read()
    }

    /// Replace the state, returning the previous value.
    pub fn swap(&self, new: SessionState) -> SessionState {
        std::mem::replace(&mut *self.inner.write(), new)
    }
}

impl Default for StateCell {
    fn default() -> Self {
        Self::new()
    }
}
