use serde::{Deserialize, Serialize};
use shared::domain::ChatMessage;

pub const KEYWORD_PLACEHOLDER: &str = "{keyword}";

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a professional AI image prompt engineer. Your role is to expand user keywords into detailed, creative, and visually descriptive image prompts in English. Focus on composition, lighting, style, mood, and artistic details. Output ONLY the Prompt and Negative Prompt in a clear format.";

pub const DEFAULT_USER_TEMPLATE: &str = "Create a detailed image prompt for: {keyword}";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptTemplate {
    pub system_prompt: String,
    /// Wrapper around the keyword. `None` sends the keyword as-is.
    pub user_template: Option<String>,
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self {
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            user_template: Some(DEFAULT_USER_TEMPLATE.to_string()),
        }
    }
}

impl PromptTemplate {
    pub fn user_content(&self, keyword: &str) -> String {
        let keyword = keyword.trim();
        match self.user_template.as_deref() {
            Some(template) if template.contains(KEYWORD_PLACEHOLDER) => {
                template.replace(KEYWORD_PLACEHOLDER, keyword)
            }
            Some(template) if !template.trim().is_empty() => {
                format!("{} {keyword}", template.trim_end())
            }
            _ => keyword.to_string(),
        }
    }

    /// The `[system, user]` pair sent for one generation.
    pub fn build_messages(&self, keyword: &str) -> [ChatMessage; 2] {
        [
            ChatMessage::system(self.system_prompt.clone()),
            ChatMessage::user(self.user_content(keyword)),
        ]
    }
}
