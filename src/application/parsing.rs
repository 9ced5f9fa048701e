//! # Command Parsing
//!
//! Turns raw message text into a `Command`: either a session-control command, or a prompt
//! carrying an optional provider/layer directive taken from a leading `@prefix`.

use crate::domain::config::PrefixEntry;
use crate::domain::types::{Command, Layer, ParsedCommand, Provider, SessionCommand};

/// Built-in prefix table. Configuration may add entries or override these.
const DEFAULT_PREFIXES: &[(&str, Provider, Option<Layer>)] = &[
    ("@claude-api", Provider::Claude, Some(Layer::Api)),
    ("@claude", Provider::Claude, Some(Layer::Api)),
    ("@gemini-api", Provider::Gemini, Some(Layer::Api)),
    ("@gemini", Provider::Gemini, Some(Layer::Api)),
    ("@openai", Provider::OpenAI, Some(Layer::Api)),
    ("@gpt", Provider::OpenAI, Some(Layer::Api)),
    ("@claude-cli", Provider::Claude, Some(Layer::Cli)),
    ("@code", Provider::Claude, Some(Layer::Cli)),
    ("@gemini-cli", Provider::Gemini, Some(Layer::Cli)),
];

const SESSION_COMMANDS: &[(&str, SessionCommand)] = &[
    ("/new", SessionCommand::New),
    ("新会话", SessionCommand::New),
    ("/session", SessionCommand::Info),
    ("会话信息", SessionCommand::Info),
    ("/history", SessionCommand::History),
    ("历史记录", SessionCommand::History),
    ("/help", SessionCommand::Help),
    ("帮助", SessionCommand::Help),
    ("help", SessionCommand::Help),
];

#[derive(Debug, Clone)]
struct PrefixRule {
    prefix: String,
    provider: Provider,
    layer: Option<Layer>,
}

/// Prefix table resolved by longest match.
#[derive(Debug, Clone)]
pub struct CommandParser {
    rules: Vec<PrefixRule>,
}

impl Default for CommandParser {
    fn default() -> Self {
        Self::new(&[])
    }
}

impl CommandParser {
    pub fn new(extra: &[PrefixEntry]) -> Self {
        let mut rules: Vec<PrefixRule> = DEFAULT_PREFIXES
            .iter()
            .map(|(prefix, provider, layer)| PrefixRule {
                prefix: prefix.to_string(),
                provider: *provider,
                layer: *layer,
            })
            .collect();

        for entry in extra {
            let prefix = entry.prefix.trim().to_lowercase();
            rules.retain(|r| r.prefix != prefix);
            rules.push(PrefixRule {
                prefix,
                provider: entry.provider,
                layer: entry.layer,
            });
        }

        // Stable sort keeps table order among equal lengths.
        rules.sort_by(|a, b| b.prefix.chars().count().cmp(&a.prefix.chars().count()));
        Self { rules }
    }

    /// Session-control commands first, then prefix parsing.
    pub fn classify(&self, raw_text: &str) -> Command {
        match Self::session_command(raw_text) {
            Some(cmd) => Command::Session(cmd),
            None => Command::Prompt(self.parse(raw_text)),
        }
    }

    pub fn parse(&self, raw_text: &str) -> ParsedCommand {
        let text = raw_text.trim();
        for rule in &self.rules {
            if let Some(rest) = strip_prefix_ignore_case(text, &rule.prefix) {
                return ParsedCommand {
                    provider: Some(rule.provider),
                    layer: rule.layer,
                    remaining_text: rest.trim().to_string(),
                };
            }
        }
        ParsedCommand::unspecified(text)
    }

    pub fn session_command(raw_text: &str) -> Option<SessionCommand> {
        let text = raw_text.trim().to_lowercase();
        SESSION_COMMANDS
            .iter()
            .find(|(token, _)| *token == text)
            .map(|(_, cmd)| *cmd)
    }
}

fn strip_prefix_ignore_case<'a>(text: &'a str, prefix: &str) -> Option<&'a str> {
    let mut chars = text.char_indices();
    for expected in prefix.chars() {
        let (_, actual) = chars.next()?;
        if !actual.to_lowercase().eq(expected.to_lowercase()) {
            return None;
        }
    }
    match chars.next() {
        Some((idx, _)) => Some(&text[idx..]),
        None => Some(""),
    }
}
