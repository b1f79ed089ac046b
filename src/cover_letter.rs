//! Cover letter generation through an OpenAI-compatible chat completions API.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::errors::PipelineError;

pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo-1106";
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const TEMPERATURE: f32 = 0.7;

/// Builds the prompt sent for a job posting.
pub fn build_prompt(title: &str, description: &str) -> String {
    format!(
        "Generate a professional cover letter for the position of {title}. Job description: {description}"
    )
}

#[async_trait]
pub trait CoverLetterGenerator: Send + Sync {
    /// One call, no retries. Errors go back to the caller.
    async fn generate(&self, title: &str, description: &str) -> Result<String, PipelineError>;
}

#[derive(Debug, Clone)]
pub struct LlmCfg {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessageResponse,
}

#[derive(Debug, Deserialize)]
struct ChatMessageResponse {
    content: Option<String>,
}

#[derive(Clone)]
pub struct OpenAiGenerator {
    http_client: Client,
    cfg: LlmCfg,
}

impl OpenAiGenerator {
    pub fn new(cfg: LlmCfg, timeout: Duration) -> Result<Self, reqwest::Error> {
        let http_client = Client::builder().timeout(timeout).build()?;
        Ok(OpenAiGenerator { http_client, cfg })
    }
}

#[async_trait]
impl CoverLetterGenerator for OpenAiGenerator {
    async fn generate(&self, title: &str, description: &str) -> Result<String, PipelineError> {
        let start = std::time::Instant::now();
        let prompt = build_prompt(title, description);
        let request = ChatRequest {
            model: &self.cfg.model,
            messages: vec![ChatMessage {
                role: "user",
                content: &prompt,
            }],
            temperature: TEMPERATURE,
        };

        let response = self
            .http_client
            .post(format!("{}/chat/completions", self.cfg.base_url.trim_end_matches('/')))
            .bearer_auth(&self.cfg.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                tracing::warn!(error = %e, "Cover letter request failed");
                PipelineError::Generation(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            tracing::warn!(status = %status, error = %error_text, "Language model API error");
            return Err(PipelineError::Generation(format!("{status}: {error_text}")));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| PipelineError::Generation(format!("unexpected response: {e}")))?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| PipelineError::Generation("empty response".into()))?;

        tracing::debug!(
            model = %self.cfg.model,
            duration_ms = start.elapsed().as_millis() as u64,
            "Cover letter generated"
        );
        Ok(content)
    }
}
