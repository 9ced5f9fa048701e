//! OpenAI-compatible chat completions API

use serde::{Deserialize, Serialize};

use super::{ProviderConfig, error_message, http_client};
use crate::domain::types::{ErrorKind, Provider};
use crate::infrastructure::llm::{Context, Error, Response};

/// OpenAI API request format
#[derive(Debug, Serialize)]
struct OpenAIRequest {
    model: String,
    messages: Vec<OpenAIMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Serialize)]
struct OpenAIMessage {
    role: String,
    content: String,
}

/// OpenAI API response format
#[derive(Debug, Deserialize)]
struct OpenAIResponse {
    #[serde(default)]
    model: String,
    choices: Vec<OpenAIChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAIChoice {
    message: OpenAIChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAIChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

fn build_request(model: String, context: Context) -> OpenAIRequest {
    OpenAIRequest {
        model,
        messages: context
            .messages
            .into_iter()
            .map(|m| OpenAIMessage {
                role: m.role.as_str().to_string(),
                content: m.content,
            })
            .collect(),
        temperature: context.temperature,
        max_tokens: context.max_tokens,
    }
}

/// Execute a chat request using an OpenAI-compatible API
pub async fn chat(config: ProviderConfig, context: Context) -> Result<Response, Error> {
    let base_url = config
        .base_url
        .clone()
        .unwrap_or_else(|| "https://api.openai.com/v1".to_string());
    let model = config.model_or(&context, "gpt-4o");
    let url = format!("{}/chat/completions", base_url.trim_end_matches('/'));
    let request = build_request(model.clone(), context);

    let response = http_client()
        .post(&url)
        .bearer_auth(&config.api_key)
        .json(&request)
        .send()
        .await
        .map_err(|e| Error::transport(Provider::OpenAI, e))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(Error::status(
            Provider::OpenAI,
            status.as_u16(),
            format!("HTTP {}: {}", status, error_message(&body)),
        ));
    }

    let parsed: OpenAIResponse = response.json().await.map_err(|e| {
        Error::new(
            Provider::OpenAI,
            ErrorKind::Malformed,
            format!("Failed to parse response: {}", e),
        )
    })?;

    let content = parsed
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .ok_or_else(|| Error::new(Provider::OpenAI, ErrorKind::Malformed, "No choices in response"))?;

    Ok(Response {
        content,
        model: if parsed.model.is_empty() { model } else { parsed.model },
    })
}
