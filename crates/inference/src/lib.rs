use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use shared::{domain::ChatMessage, protocol::LoadProgress};
use tokio::sync::watch;

pub mod error;
pub mod http;

pub use error::EngineError;
pub use http::{HttpEngineConnector, HttpInferenceEngine};

/// Per-model overrides handed to the connector alongside the model identifier.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineOptions {
    pub context_window_size: Option<u32>,
    /// Upper bound on completion length, when the engine supports one.
    pub max_tokens: Option<u32>,
    /// Alternate location of the model weights.
    pub model_url: Option<String>,
    /// Alternate location of the compiled model library.
    pub model_lib_url: Option<String>,
}

impl EngineOptions {
    pub fn has_source_overrides(&self) -> bool {
        self.model_url.is_some() || self.model_lib_url.is_some()
    }
}

/// Write side of a load progress channel.
///
/// Fractions are clamped to `[0, 1]` and never move backwards, so connectors
/// may report whatever their runtime gives them.
#[derive(Clone)]
pub struct ProgressReporter {
    tx: Arc<watch::Sender<LoadProgress>>,
}

impl ProgressReporter {
    pub fn new(tx: Arc<watch::Sender<LoadProgress>>) -> Self {
        Self { tx }
    }

    /// A reporter nobody listens to.
    pub fn detached() -> Self {
        let (tx, _rx) = watch::channel(LoadProgress::default());
        Self { tx: Arc::new(tx) }
    }

    pub fn report(&self, fraction: f32, text: impl Into<String>) {
        let fraction = if fraction.is_finite() {
            fraction.clamp(0.0, 1.0)
        } else {
            0.0
        };
        let text = text.into();
        self.tx.send_modify(|current| {
            current.fraction = current.fraction.max(fraction);
            current.text = text;
        });
    }

    pub fn current(&self) -> LoadProgress {
        self.tx.borrow().clone()
    }
}

#[async_trait]
pub trait InferenceEngine: Send + Sync {
    fn model_id(&self) -> &str;
    /// Single non-streaming chat completion; returns the full reply text.
    async fn complete(&self, messages: &[ChatMessage]) -> anyhow::Result<String>;
}

#[async_trait]
pub trait EngineConnector: Send + Sync {
    async fn acquire(
        &self,
        model_id: &str,
        options: &EngineOptions,
        progress: ProgressReporter,
    ) -> anyhow::Result<Arc<dyn InferenceEngine>>;
}
