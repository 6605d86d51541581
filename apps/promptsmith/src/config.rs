use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::Context;
use inference::EngineOptions;
use session_core::{PromptProfile, PromptTemplate, RetryPolicy, SessionMessages};
use tracing::warn;

pub const DEFAULT_CONFIG_FILE: &str = "promptsmith.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub base_url: String,
    pub model_id: String,
    pub context_window_size: Option<u32>,
    pub max_tokens: Option<u32>,
    pub model_url: Option<String>,
    pub model_lib_url: Option<String>,
    pub system_prompt: String,
    pub user_template: Option<String>,
    pub language: String,
    pub load_failed_message: Option<String>,
    pub generation_failed_message: Option<String>,
    pub retry_policy: RetryPolicy,
    pub request_timeout_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        let template = PromptTemplate::default();
        Self {
            base_url: "http://127.0.0.1:8080/v1".into(),
            model_id: session_core::DEFAULT_MODEL_ID.into(),
            context_window_size: None,
            max_tokens: None,
            model_url: None,
            model_lib_url: None,
            system_prompt: template.system_prompt,
            user_template: template.user_template,
            language: "ko".into(),
            load_failed_message: None,
            generation_failed_message: None,
            retry_policy: RetryPolicy::default(),
            request_timeout_secs: 300,
        }
    }
}

impl Settings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn profile(&self) -> PromptProfile {
        let mut messages = if self.language.eq_ignore_ascii_case("en") {
            SessionMessages::english()
        } else {
            SessionMessages::default()
        };
        if let Some(v) = &self.load_failed_message {
            messages.load_failed = v.clone();
        }
        if let Some(v) = &self.generation_failed_message {
            messages.generation_failed = v.clone();
        }

        PromptProfile {
            model_id: self.model_id.clone(),
            engine_options: EngineOptions {
                context_window_size: self.context_window_size,
                max_tokens: self.max_tokens,
                model_url: self.model_url.clone(),
                model_lib_url: self.model_lib_url.clone(),
            },
            template: PromptTemplate {
                system_prompt: self.system_prompt.clone(),
                user_template: self.user_template.clone(),
            },
            messages,
        }
    }
}

/// Defaults, then the TOML file (explicit path or `promptsmith.toml` in the
/// working directory), then environment variables.
pub fn load_settings(config_path: Option<&Path>) -> anyhow::Result<Settings> {
    let mut settings = Settings::default();

    let path = config_path
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
    match fs::read_to_string(&path) {
        Ok(raw) => apply_file_overrides(&mut settings, &raw)
            .with_context(|| format!("failed to parse config file '{}'", path.display()))?,
        Err(err) if config_path.is_some() => {
            return Err(err)
                .with_context(|| format!("failed to read config file '{}'", path.display()));
        }
        Err(_) => {}
    }

    apply_env_overrides(&mut settings, |key| std::env::var(key).ok());
    Ok(settings)
}

pub fn apply_file_overrides(settings: &mut Settings, raw: &str) -> anyhow::Result<()> {
    let table = toml::from_str::<toml::Table>(raw)?;
    let file_cfg: HashMap<String, String> = table
        .into_iter()
        .map(|(key, value)| {
            let value = match value {
                toml::Value::String(s) => s,
                other => other.to_string(),
            };
            (key, value)
        })
        .collect();

    apply_overrides(settings, |key| file_cfg.get(key).cloned());
    Ok(())
}

pub fn apply_env_overrides(settings: &mut Settings, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(v) = lookup("PROMPTSMITH_BASE_URL") {
        settings.base_url = v;
    }
    apply_overrides(settings, |key| {
        lookup(&format!("APP__{}", key.to_ascii_uppercase()))
    });
}

fn apply_overrides(settings: &mut Settings, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(v) = lookup("base_url") {
        settings.base_url = v;
    }
    if let Some(v) = lookup("model_id") {
        settings.model_id = v;
    }
    if let Some(v) = lookup("context_window_size") {
        match v.trim().parse::<u32>() {
            Ok(parsed) => settings.context_window_size = Some(parsed),
            Err(_) => warn!(value = %v, "config: ignoring invalid context_window_size"),
        }
    }
    if let Some(v) = lookup("max_tokens") {
        match v.trim().parse::<u32>() {
            Ok(parsed) if parsed > 0 => settings.max_tokens = Some(parsed),
            _ => warn!(value = %v, "config: ignoring invalid max_tokens"),
        }
    }
    if let Some(v) = lookup("model_url") {
        settings.model_url = Some(v);
    }
    if let Some(v) = lookup("model_lib_url") {
        settings.model_lib_url = Some(v);
    }
    if let Some(v) = lookup("system_prompt") {
        settings.system_prompt = v;
    }
    if let Some(v) = lookup("user_template") {
        settings.user_template = (!v.trim().is_empty()).then_some(v);
    }
    if let Some(v) = lookup("language") {
        settings.language = v;
    }
    if let Some(v) = lookup("load_failed_message") {
        settings.load_failed_message = Some(v);
    }
    if let Some(v) = lookup("generation_failed_message") {
        settings.generation_failed_message = Some(v);
    }
    if let Some(v) = lookup("retry_policy") {
        match v.parse::<RetryPolicy>() {
            Ok(parsed) => settings.retry_policy = parsed,
            Err(err) => warn!(%err, "config: ignoring invalid retry_policy"),
        }
    }
    if let Some(v) = lookup("request_timeout_secs") {
        match v.trim().parse::<u64>() {
            Ok(parsed) if parsed > 0 => settings.request_timeout_secs = parsed,
            _ => warn!(value = %v, "config: ignoring invalid request_timeout_secs"),
        }
    }
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
