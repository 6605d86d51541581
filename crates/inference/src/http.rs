//! Connector for OpenAI-compatible inference servers (llama.cpp server,
//! Ollama, vLLM and friends).

use std::{sync::Arc, time::Duration};

use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use shared::domain::ChatMessage;
use tracing::{info, warn};
use url::Url;

use crate::{EngineConnector, EngineError, EngineOptions, InferenceEngine, ProgressReporter};

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, Clone)]
pub struct HttpEngineConnector {
    http: Client,
    base_url: Url,
}

impl HttpEngineConnector {
    pub fn new(base_url: &str, request_timeout: Duration) -> Result<Self, EngineError> {
        let base_url = Url::parse(base_url.trim()).map_err(|source| EngineError::InvalidBaseUrl {
            url: base_url.to_string(),
            source,
        })?;
        let http = Client::builder().timeout(request_timeout).build()?;
        Ok(Self { http, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }
}

/// `Url::join` drops the last path segment unless it ends with a slash.
fn endpoint(base_url: &Url, path: &str) -> String {
    format!("{}/{}", base_url.as_str().trim_end_matches('/'), path)
}

fn validate_model_id(model_id: &str) -> Result<(), EngineError> {
    if model_id.trim().is_empty() || model_id.chars().any(char::is_whitespace) {
        return Err(EngineError::ModelUnavailable {
            model_id: model_id.to_string(),
            reason: "malformed model identifier".to_string(),
        });
    }
    Ok(())
}

#[derive(Debug, Deserialize)]
struct ModelListResponse {
    #[serde(default)]
    data: Vec<ModelEntry>,
}

#[derive(Debug, Deserialize)]
struct ModelEntry {
    id: String,
}

#[async_trait]
impl EngineConnector for HttpEngineConnector {
    async fn acquire(
        &self,
        model_id: &str,
        options: &EngineOptions,
        progress: ProgressReporter,
    ) -> Result<Arc<dyn InferenceEngine>> {
        validate_model_id(model_id)?;
        if options.has_source_overrides() {
            warn!(
                model_id,
                "engine: alternate model sources are managed by the inference server; ignoring overrides"
            );
        }

        progress.report(0.0, format!("Connecting to {}", self.base_url));
        let url = endpoint(&self.base_url, "models");
        let response = self.http.get(&url).send().await.map_err(EngineError::from)?;
        let status = response.status();
        if !status.is_success() {
            return Err(EngineError::Status {
                status: status.as_u16(),
                endpoint: url,
            }
            .into());
        }

        progress.report(0.5, "Fetching model list");
        let listing: ModelListResponse = response
            .json()
            .await
            .map_err(|err| EngineError::MalformedResponse(err.to_string()))?;
        if !listing.data.iter().any(|entry| entry.id == model_id) {
            return Err(EngineError::ModelUnavailable {
                model_id: model_id.to_string(),
                reason: format!("not served by {}", self.base_url),
            }
            .into());
        }

        progress.report(1.0, format!("Model {model_id} ready"));
        info!(model_id, base_url = %self.base_url, "engine: model available");

        Ok(Arc::new(HttpInferenceEngine {
            http: self.http.clone(),
            base_url: self.base_url.clone(),
            model_id: model_id.to_string(),
            context_window_size: options.context_window_size,
            max_tokens: options.max_tokens,
        }))
    }
}

pub struct HttpInferenceEngine {
    http: Client,
    base_url: Url,
    model_id: String,
    context_window_size: Option<u32>,
    max_tokens: Option<u32>,
}

#[derive(Debug, Serialize)]
struct WireMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<RuntimeOptions>,
}

#[derive(Debug, Serialize)]
struct RuntimeOptions {
    num_ctx: u32,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ReplyMessage,
}

#[derive(Debug, Deserialize)]
struct ReplyMessage {
    #[serde(default)]
    content: Option<String>,
}

#[async_trait]
impl InferenceEngine for HttpInferenceEngine {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        let request = ChatCompletionRequest {
            model: &self.model_id,
            messages: messages
                .iter()
                .map(|message| WireMessage {
                    role: message.role.as_str(),
                    content: &message.content,
                })
                .collect(),
            stream: false,
            max_tokens: self.max_tokens,
            options: self
                .context_window_size
                .map(|num_ctx| RuntimeOptions { num_ctx }),
        };

        let url = endpoint(&self.base_url, "chat/completions");
        let response = self
            .http
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(EngineError::from)?;
        let status = response.status();
        if !status.is_success() {
            return Err(EngineError::Status {
                status: status.as_u16(),
                endpoint: url,
            }
            .into());
        }

        let reply: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|err| EngineError::MalformedResponse(err.to_string()))?;
        let content = reply
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| EngineError::MalformedResponse("reply has no message content".into()))?;
        Ok(content)
    }
}

#[cfg(test)]
#[path = "tests/http_tests.rs"]
mod tests;
