//! Prompt templates sent to executors on the bot's own behalf.

/// A builder for rendering prompts with context.
pub struct PromptRenderer<'a> {
    template: &'a str,
    replacements: Vec<(&'a str, String)>,
}

impl<'a> PromptRenderer<'a> {
    pub fn new(template: &'a str) -> Self {
        Self {
            template,
            replacements: Vec::new(),
        }
    }

    pub fn set(mut self, key: &'a str, value: impl Into<String>) -> Self {
        self.replacements.push((key, value.into()));
        self
    }

    pub fn render(self) -> String {
        let mut result = self.template.to_string();
        for (key, value) in self.replacements {
            result = result.replace(key, &value);
        }

        if let Some(start) = result.find("{{MESSAGE") {
            tracing::error!(
                "[PROMPT RENDER ERROR] Unreplaced placeholder at offset {}",
                start
            );
        }

        result
    }
}

/// Asks an API executor whether a message needs local code access.
/// The answer is a JSON object with a boolean `needs_cli`.
pub const INTENT_CLASSIFICATION: &str = r#"You are a routing assistant. Decide whether the user's request needs access to a local code base.

Needs the local code base (CLI layer):
- viewing, analysing or modifying existing source files
- reading specific files from the project
- analysing project structure or architecture
- running local commands or scripts
- refactoring or optimising existing code

Does not need the local code base (API layer):
- general questions ("who are you", "what is Python")
- explaining concepts and theory
- generating new code without looking at existing code
- translation, writing, summarising
- explaining algorithms with example code

Reply with JSON only:
{"needs_cli": true or false, "reason": "short reason"}

User request: {{MESSAGE}}"#;

pub fn intent_classification(message: &str) -> String {
    PromptRenderer::new(INTENT_CLASSIFICATION)
        .set("{{MESSAGE}}", message)
        .render()
}

/// Frames a quoted message ahead of the user's own text.
pub fn with_quote(quoted: &str, current: &str) -> String {
    format!("Quoted message: {quoted}\n\nCurrent message: {current}")
}
