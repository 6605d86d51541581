use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Load,
    Generation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    Transport,
    ModelUnavailable,
    MalformedResponse,
    Internal,
}

/// A collaborator failure, reduced to what is safe to log and classify.
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
#[error("{kind:?} failure ({code:?}): {message}")]
pub struct SessionFailure {
    pub kind: FailureKind,
    pub code: ErrorCode,
    pub message: String,
}

impl SessionFailure {
    pub fn new(kind: FailureKind, code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            kind,
            code,
            message: message.into(),
        }
    }
}
