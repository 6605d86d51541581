use std::sync::LazyLock;

use regex::Regex;

static THINK_SPAN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<think>.*?</think>").expect("think span pattern is valid")
});

/// Removes every `<think>…</think>` reasoning span and trims what is left.
pub fn strip_think_tags(text: &str) -> String {
    THINK_SPAN.replace_all(text, "").trim().to_string()
}

#[cfg(test)]
#[path = "tests/filter_tests.rs"]
mod tests;
