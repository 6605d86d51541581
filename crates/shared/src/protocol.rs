use serde::{Deserialize, Serialize};

use crate::{
    domain::{SessionId, SessionState},
    error::FailureKind,
};

/// One engine load progress report. `fraction` is in `[0, 1]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct LoadProgress {
    pub fraction: f32,
    pub text: String,
}

impl LoadProgress {
    pub fn new(fraction: f32, text: impl Into<String>) -> Self {
        Self {
            fraction,
            text: text.into(),
        }
    }

    pub fn percent(&self) -> u8 {
        (self.fraction.clamp(0.0, 1.0) * 100.0).round() as u8
    }
}

/// Notifications a presenter renders. Progress is delivered separately as a
/// stream so slow presenters never block state changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum SessionEvent {
    StateChanged {
        session_id: SessionId,
        state: SessionState,
        status: String,
    },
    PromptGenerated {
        session_id: SessionId,
        text: String,
    },
    Failed {
        session_id: SessionId,
        kind: FailureKind,
        message: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_events_use_tagged_wire_shape() {
        let session_id = SessionId::new();
        let event = SessionEvent::StateChanged {
            session_id,
            state: SessionState::LoadFailed,
            status: "모델 로딩 실패".into(),
        };

        let value = serde_json::to_value(&event).expect("serialize");
        assert_eq!(value["type"], "state_changed");
        assert_eq!(value["payload"]["state"], "load_failed");

        let decoded: SessionEvent = serde_json::from_value(value).expect("deserialize");
        assert_eq!(decoded, event);
    }

    #[test]
    fn percent_rounds_and_clamps() {
        assert_eq!(LoadProgress::new(0.426, "x").percent(), 43);
        assert_eq!(LoadProgress::new(1.5, "x").percent(), 100);
        assert_eq!(LoadProgress::new(-0.2, "x").percent(), 0);
    }
}
