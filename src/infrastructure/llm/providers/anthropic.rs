//! Anthropic (Claude) messages API

use serde::{Deserialize, Serialize};

use super::{ProviderConfig, error_message, http_client};
use crate::domain::types::{ErrorKind, Provider};
use crate::infrastructure::llm::{Context, Error, MessageRole, Response};

const API_VERSION: &str = "2023-06-01";

/// Anthropic API request format
#[derive(Debug, Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: u32,
    messages: Vec<AnthropicMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Serialize)]
struct AnthropicMessage {
    role: String,
    content: String,
}

/// Anthropic API response format
#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    model: String,
    content: Vec<AnthropicResponseContent>,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponseContent {
    #[serde(rename = "type")]
    content_type: String,
    #[serde(default)]
    text: String,
}

fn build_request(model: String, context: Context) -> AnthropicRequest {
    let mut system: Option<String> = None;
    let mut messages = Vec::new();

    for msg in context.messages {
        match msg.role {
            MessageRole::System => {
                system = Some(match system {
                    Some(s) => format!("{}\n\n{}", s, msg.content),
                    None => msg.content,
                });
            }
            role => messages.push(AnthropicMessage {
                role: role.as_str().to_string(),
                content: msg.content,
            }),
        }
    }

    AnthropicRequest {
        model,
        max_tokens: context.max_tokens.unwrap_or(4096),
        messages,
        system,
        temperature: context.temperature,
    }
}

/// Execute a chat request using Anthropic's API
pub async fn chat(config: ProviderConfig, context: Context) -> Result<Response, Error> {
    let base_url = config
        .base_url
        .clone()
        .unwrap_or_else(|| "https://api.anthropic.com".to_string());
    let model = config.model_or(&context, "claude-3-5-sonnet-20241022");
    let url = format!("{}/v1/messages", base_url.trim_end_matches('/'));
    let request = build_request(model, context);

    let response = http_client()
        .post(&url)
        .header("x-api-key", &config.api_key)
        .header("anthropic-version", API_VERSION)
        .json(&request)
        .send()
        .await
        .map_err(|e| Error::transport(Provider::Claude, e))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(Error::status(
            Provider::Claude,
            status.as_u16(),
            format!("HTTP {}: {}", status, error_message(&body)),
        ));
    }

    let parsed: AnthropicResponse = response.json().await.map_err(|e| {
        Error::new(
            Provider::Claude,
            ErrorKind::Malformed,
            format!("Failed to parse response: {}", e),
        )
    })?;

    let content: String = parsed
        .content
        .into_iter()
        .filter(|block| block.content_type == "text")
        .map(|block| block.text)
        .collect();
    if content.is_empty() {
        return Err(Error::new(
            Provider::Claude,
            ErrorKind::Malformed,
            "No text content in response",
        ));
    }

    Ok(Response {
        content,
        model: parsed.model,
    })
}
