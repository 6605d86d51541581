use super::*;

use std::{
    env,
    time::{SystemTime, UNIX_EPOCH},
};

fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let vars: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    move |key: &str| vars.get(key).cloned()
}

#[test]
fn default_profile_matches_builtin_variant() {
    let profile = Settings::default().profile();
    assert_eq!(profile, PromptProfile::default());
}

#[test]
fn file_overrides_replace_defaults() {
    let mut settings = Settings::default();
    apply_file_overrides(
        &mut settings,
        r#"
base_url = "http://gpu-box:11434/v1"
model_id = "Llama-3.2-1B-Instruct-q4f16_1-MLC"
context_window_size = 4096
max_tokens = 768
user_template = ""
language = "en"
retry_policy = "never"
"#,
    )
    .expect("parse");

    assert_eq!(settings.base_url, "http://gpu-box:11434/v1");
    assert_eq!(settings.context_window_size, Some(4096));
    assert_eq!(settings.user_template, None);
    assert_eq!(settings.retry_policy, RetryPolicy::Never);

    let profile = settings.profile();
    assert_eq!(profile.model_id, "Llama-3.2-1B-Instruct-q4f16_1-MLC");
    assert_eq!(profile.engine_options.context_window_size, Some(4096));
    assert_eq!(profile.engine_options.max_tokens, Some(768));
    assert_eq!(profile.messages, SessionMessages::english());
}

#[test]
fn malformed_file_is_an_error() {
    let mut settings = Settings::default();
    assert!(apply_file_overrides(&mut settings, "base_url = ").is_err());
}

#[test]
fn env_overrides_win_and_invalid_values_are_ignored() {
    let mut settings = Settings::default();
    apply_env_overrides(
        &mut settings,
        env_from(&[
            ("PROMPTSMITH_BASE_URL", "http://first/v1"),
            ("APP__BASE_URL", "http://second/v1"),
            ("APP__CONTEXT_WINDOW_SIZE", "lots"),
            ("APP__REQUEST_TIMEOUT_SECS", "0"),
            ("APP__MAX_TOKENS", "-5"),
            ("APP__GENERATION_FAILED_MESSAGE", "no prompt today"),
            ("APP__MODEL_URL", "https://mirror.example/weights"),
        ]),
    );

    assert_eq!(settings.base_url, "http://second/v1");
    assert_eq!(settings.context_window_size, None);
    assert_eq!(settings.request_timeout_secs, 300);
    assert_eq!(settings.max_tokens, None);

    let profile = settings.profile();
    assert_eq!(profile.messages.generation_failed, "no prompt today");
    assert_eq!(
        profile.engine_options.model_url.as_deref(),
        Some("https://mirror.example/weights")
    );
}

#[test]
fn explicit_missing_config_file_is_an_error() {
    let suffix = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock")
        .as_nanos();
    let missing = env::temp_dir().join(format!("promptsmith_missing_{suffix}.toml"));

    assert!(load_settings(Some(&missing)).is_err());
}

#[test]
fn explicit_config_file_is_loaded() {
    let suffix = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock")
        .as_nanos();
    let path = env::temp_dir().join(format!("promptsmith_config_{suffix}.toml"));
    fs::write(&path, "system_prompt = \"You write haiku prompts.\"\n").expect("write config");

    let settings = load_settings(Some(&path)).expect("load");
    assert_eq!(settings.system_prompt, "You write haiku prompts.");

    fs::remove_file(path).expect("cleanup");
}
