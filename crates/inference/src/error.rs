use shared::error::ErrorCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid engine base url '{url}': {source}")]
    InvalidBaseUrl {
        url: String,
        source: url::ParseError,
    },
    #[error("engine transport failure: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("engine returned status {status} for {endpoint}")]
    Status { status: u16, endpoint: String },
    #[error("model '{model_id}' is not available: {reason}")]
    ModelUnavailable { model_id: String, reason: String },
    #[error("malformed engine response: {0}")]
    MalformedResponse(String),
}

impl EngineError {
    pub fn code(&self) -> ErrorCode {
        match self {
            EngineError::Transport(_) | EngineError::Status { .. } => ErrorCode::Transport,
            EngineError::ModelUnavailable { .. } => ErrorCode::ModelUnavailable,
            EngineError::MalformedResponse(_) => ErrorCode::MalformedResponse,
            EngineError::InvalidBaseUrl { .. } => ErrorCode::Internal,
        }
    }
}

/// Classifies an error coming back through an engine trait object.
pub fn error_code(err: &anyhow::Error) -> ErrorCode {
    err.downcast_ref::<EngineError>()
        .map(EngineError::code)
        .unwrap_or(ErrorCode::Internal)
}
