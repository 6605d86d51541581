use shared::domain::SessionState;
use thiserror::Error;

/// Guard violations. Engine failures never surface here; they become
/// user-facing messages instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("engine is not ready (state: {state})")]
    NotReady { state: SessionState },
    #[error("a generation is already in flight")]
    Busy,
}
