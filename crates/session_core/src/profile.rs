use std::{fmt, str::FromStr};

use inference::EngineOptions;
use serde::{Deserialize, Serialize};

use crate::prompt::PromptTemplate;

pub const DEFAULT_MODEL_ID: &str = "Qwen3-0.6B-q4f16_1-MLC";

/// What happens to the next user intent after a failed load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RetryPolicy {
    /// Each new intent starts a fresh load attempt.
    #[default]
    OnNextIntent,
    /// A failed load is final for the session.
    Never,
}

impl FromStr for RetryPolicy {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "on_next_intent" | "retry" => Ok(RetryPolicy::OnNextIntent),
            "never" => Ok(RetryPolicy::Never),
            other => Err(format!("unknown retry policy '{other}'")),
        }
    }
}

impl fmt::Display for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetryPolicy::OnNextIntent => f.write_str("on_next_intent"),
            RetryPolicy::Never => f.write_str("never"),
        }
    }
}

/// User-facing strings, in the presenter's language.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionMessages {
    pub initializing: String,
    pub loading: String,
    pub ready: String,
    pub generating: String,
    /// Short status label for the failed state; the full message travels
    /// with the failure notification.
    pub error: String,
    pub load_failed: String,
    pub generation_failed: String,
}

impl Default for SessionMessages {
    fn default() -> Self {
        Self {
            initializing: "모델 초기화 중...".into(),
            loading: "로딩 중".into(),
            ready: "준비 완료".into(),
            generating: "프롬프트 생성 중...".into(),
            error: "오류".into(),
            load_failed: "모델 로딩 실패".into(),
            generation_failed: "오류: 프롬프트를 생성할 수 없습니다.".into(),
        }
    }
}

impl SessionMessages {
    pub fn english() -> Self {
        Self {
            initializing: "Initializing model...".into(),
            loading: "Loading".into(),
            ready: "Ready".into(),
            generating: "Generating prompt...".into(),
            error: "Error".into(),
            load_failed: "Model loading failed".into(),
            generation_failed: "Error: could not generate a prompt.".into(),
        }
    }
}

/// Everything that distinguishes one front-end variant from another.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptProfile {
    pub model_id: String,
    pub engine_options: EngineOptions,
    pub template: PromptTemplate,
    pub messages: SessionMessages,
}

impl Default for PromptProfile {
    fn default() -> Self {
        Self {
            model_id: DEFAULT_MODEL_ID.to_string(),
            engine_options: EngineOptions::default(),
            template: PromptTemplate::default(),
            messages: SessionMessages::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_retry_policy_spellings() {
        assert_eq!("never".parse::<RetryPolicy>(), Ok(RetryPolicy::Never));
        assert_eq!(
            "On-Next-Intent".parse::<RetryPolicy>(),
            Ok(RetryPolicy::OnNextIntent)
        );
        assert!("sometimes".parse::<RetryPolicy>().is_err());
        assert_eq!(RetryPolicy::Never.to_string(), "never");
    }
}
