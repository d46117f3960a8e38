use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::LlmError;
use crate::config::LlmConfig;
use crate::improve::{Improvement, TranscriptImprover, IMPROVE_INSTRUCTIONS};
use crate::pages::{Chunk, SmartSplitter, SplitRequest};

/// Chat-completions client for any OpenAI-compatible endpoint. Every call
/// asks for a JSON object and decodes it into the caller's type.
pub struct OpenAiClient {
    http: Client,
    api_base: String,
    api_key: String,
    model: String,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    response_format: ResponseFormat,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: AssistantMessage,
}

#[derive(Deserialize)]
struct AssistantMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SplitResponse {
    chunks: Vec<Chunk>,
}

impl OpenAiClient {
    pub fn new(config: &LlmConfig, timeout: Duration) -> Result<Self, LlmError> {
        let api_key = config
            .api_key
            .clone()
            .filter(|key| !key.trim().is_empty())
            .ok_or(LlmError::MissingApiKey)?;

        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LlmError::ApiRequestFailed(e.to_string()))?;

        Ok(Self {
            http,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            api_key,
            model: config.model.clone(),
            temperature: config.temperature,
        })
    }

    pub async fn complete_json<T: DeserializeOwned>(
        &self,
        system: &str,
        user: &str,
    ) -> Result<T, LlmError> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: user,
                },
            ],
            temperature: self.temperature,
            response_format: ResponseFormat {
                kind: "json_object",
            },
        };

        let response = self
            .http
            .post(format!("{}/chat/completions", self.api_base))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await
            .map_err(|e| LlmError::ApiRequestFailed(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(LlmError::RateLimited);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::ServerError {
                status: status.as_u16(),
                body,
            });
        }

        let chat: ChatResponse = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;
        let content = chat
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| LlmError::InvalidResponse("empty completion".to_string()))?;

        parse_json_content(&content)
    }
}

/// Models occasionally wrap JSON in a markdown fence despite being asked not to.
fn parse_json_content<T: DeserializeOwned>(content: &str) -> Result<T, LlmError> {
    let trimmed = content.trim();
    let body = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.trim_end().strip_suffix("```"))
        .unwrap_or(trimmed);

    serde_json::from_str(body.trim()).map_err(|e| LlmError::InvalidResponse(e.to_string()))
}

#[async_trait]
impl SmartSplitter for OpenAiClient {
    async fn split(&self, request: &SplitRequest) -> Result<Vec<Chunk>, LlmError> {
        let response: SplitResponse = self
            .complete_json(&request.instructions(), &request.long_text)
            .await?;
        Ok(response.chunks)
    }
}

#[async_trait]
impl TranscriptImprover for OpenAiClient {
    async fn improve(&self, text: &str) -> Result<Improvement, LlmError> {
        self.complete_json(IMPROVE_INSTRUCTIONS, text).await
    }
}
