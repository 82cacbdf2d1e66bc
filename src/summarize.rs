use std::time::Duration;

use log::{debug, error, info};
use serde::Serialize;

use crate::config::Config;
use crate::error::{FetchError, FetchResult};

const TEMPERATURE: f32 = 0.7;
const MAX_TOKENS: u32 = 1000;

/// What the model is asked to summarize
#[derive(Debug, Clone)]
pub struct SummaryRequest<'a> {
    pub title: &'a str,
    pub description: &'a str,
    pub transcript: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: String,
}

#[derive(Debug, Serialize)]
struct ChatPayload<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

/// Summarizer backed by an OpenAI-compatible chat completion endpoint
#[derive(Debug, Clone)]
pub struct ChatSummarizer {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    model: String,
    system_prompt: String,
}

impl ChatSummarizer {
    pub fn new(config: &Config) -> FetchResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        Ok(Self {
            client,
            api_url: config.chat_api_url.clone(),
            api_key: config.chat_api_key.trim().to_string(),
            model: config.chat_model.clone(),
            system_prompt: config.summary_prompt.clone(),
        })
    }

    pub async fn summarize(&self, request: &SummaryRequest<'_>) -> FetchResult<String> {
        if self.api_key.is_empty() {
            return Err(FetchError::NotConfigured("chat API key".to_string()));
        }

        debug!("Summarizing via {} with model {}", self.api_url, self.model);
        let body = build_payload(&self.model, &self.system_prompt, request);

        let resp = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        if resp.status() != reqwest::StatusCode::OK {
            let err = FetchError::from_response(resp).await;
            error!("Chat completion failed: {err}");
            return Err(err);
        }

        let json: serde_json::Value = resp.json().await?;
        let summary = extract_completion(&json)?;
        info!("Summary generated ({} chars)", summary.chars().count());
        Ok(summary)
    }
}

/// Labelled blocks for title, optional description, and transcript
fn user_content(request: &SummaryRequest<'_>) -> String {
    let mut content = format!("Title: {}\n\n", request.title);
    if !request.description.trim().is_empty() {
        content.push_str(&format!("Description: {}\n\n", request.description));
    }
    content.push_str(&format!("Captions:\n{}", request.transcript));
    content
}

fn build_payload<'a>(model: &'a str, system_prompt: &str, request: &SummaryRequest<'_>) -> ChatPayload<'a> {
    ChatPayload {
        model,
        messages: vec![
            ChatMessage {
                role: "system",
                content: system_prompt.to_string(),
            },
            ChatMessage {
                role: "user",
                content: user_content(request),
            },
        ],
        temperature: TEMPERATURE,
        max_tokens: MAX_TOKENS,
    }
}

fn extract_completion(json: &serde_json::Value) -> FetchResult<String> {
    let choice = json
        .get("choices")
        .and_then(|c| c.get(0))
        .ok_or_else(|| FetchError::Protocol("completion has no choices".to_string()))?;

    let text = choice
        .get("message")
        .and_then(|m| m.get("content"))
        .and_then(|t| t.as_str())
        .map(str::trim)
        .unwrap_or_default();

    if text.is_empty() {
        return Err(FetchError::EmptyCompletion);
    }
    Ok(text.to_string())
}
