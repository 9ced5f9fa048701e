//! Gemini generateContent API

use serde::{Deserialize, Serialize};

use super::{ProviderConfig, error_message, http_client};
use crate::domain::types::{ErrorKind, Provider};
use crate::infrastructure::llm::{Context, Error, MessageRole, Response};

/// Gemini API request format
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

/// Gemini content (message)
#[derive(Debug, Serialize, Deserialize)]
struct GeminiContent {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    role: String,
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiPart {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
}

/// Gemini API response format
#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: GeminiContent,
}

fn build_request(context: Context) -> GeminiRequest {
    let mut system = Vec::new();
    let mut contents = Vec::new();

    for msg in context.messages {
        let role = match msg.role {
            MessageRole::System => {
                system.push(GeminiPart { text: msg.content });
                continue;
            }
            MessageRole::User => "user",
            MessageRole::Assistant => "model",
        };
        contents.push(GeminiContent {
            role: role.to_string(),
            parts: vec![GeminiPart { text: msg.content }],
        });
    }

    let generation_config = if context.temperature.is_some() || context.max_tokens.is_some() {
        Some(GenerationConfig {
            temperature: context.temperature,
            max_output_tokens: context.max_tokens,
        })
    } else {
        None
    };

    GeminiRequest {
        contents,
        system_instruction: (!system.is_empty()).then(|| GeminiContent {
            role: String::new(),
            parts: system,
        }),
        generation_config,
    }
}

/// Execute a chat request using Gemini's API
pub async fn chat(config: ProviderConfig, context: Context) -> Result<Response, Error> {
    let base_url = config
        .base_url
        .clone()
        .unwrap_or_else(|| "https://generativelanguage.googleapis.com".to_string());
    let model = config.model_or(&context, "gemini-1.5-pro");
    let url = format!(
        "{}/v1beta/models/{}:generateContent",
        base_url.trim_end_matches('/'),
        model
    );
    let request = build_request(context);

    let response = http_client()
        .post(&url)
        .header("x-goog-api-key", &config.api_key)
        .json(&request)
        .send()
        .await
        .map_err(|e| Error::transport(Provider::Gemini, e))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(Error::status(
            Provider::Gemini,
            status.as_u16(),
            format!("HTTP {}: {}", status, error_message(&body)),
        ));
    }

    let parsed: GeminiResponse = response.json().await.map_err(|e| {
        Error::new(
            Provider::Gemini,
            ErrorKind::Malformed,
            format!("Failed to parse response: {}", e),
        )
    })?;

    let Some(candidate) = parsed.candidates.into_iter().next() else {
        return Err(Error::new(
            Provider::Gemini,
            ErrorKind::Malformed,
            "No candidates in response",
        ));
    };

    let content = candidate
        .content
        .parts
        .into_iter()
        .map(|part| part.text)
        .collect::<Vec<_>>()
        .join("\n");

    Ok(Response { content, model })
}
