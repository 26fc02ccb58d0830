use crate::core::config::{AIService, Capability, ServiceSelection, Settings};
use crate::error::{StoryError, StoryResult};
use crate::utils::text::excerpt;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

#[cfg(target_arch = "wasm32")]
pub trait ProviderBounds {}
#[cfg(target_arch = "wasm32")]
impl<T> ProviderBounds for T {}

#[cfg(not(target_arch = "wasm32"))]
pub trait ProviderBounds: Send + Sync {}
#[cfg(not(target_arch = "wasm32"))]
impl<T: Send + Sync> ProviderBounds for T {}

/// A text-generation backend asked for a single JSON document.
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
pub trait TextProvider: ProviderBounds + Debug {
    async fn chat(&self, system: &str, user: &str) -> Result<String>;
    fn name(&self) -> &'static str;
}

pub fn create_text_provider(
    selection: &ServiceSelection,
    settings: &Settings,
) -> StoryResult<Box<dyn TextProvider>> {
    let api_key = selection
        .usable_key()
        .ok_or(StoryError::MissingApiKey(Capability::Text))?;
    match selection.service {
        AIService::OpenAI => Ok(Box::new(OpenAIClient::new(
            api_key,
            &settings.openai.text_model,
            &settings.openai.base_url,
        ))),
        AIService::Anthropic => Ok(Box::new(AnthropicClient::new(
            api_key,
            &settings.anthropic.model,
            &settings.anthropic.base_url,
            settings.anthropic.max_tokens,
            settings.anthropic.temperature,
        ))),
        AIService::Google => Ok(Box::new(GeminiClient::new(
            api_key,
            &settings.google.model,
            &settings.google.base_url,
        ))),
        AIService::Stability | AIService::Replicate => Err(StoryError::UnsupportedProvider {
            capability: Capability::Text,
            service: selection.service,
        }),
    }
}

// --- OpenAI ---

#[derive(Debug)]
struct OpenAIClient {
    api_key: String,
    model: String,
    base_url: String,
    client: reqwest::Client,
}

impl OpenAIClient {
    fn new(api_key: &str, model: &str, base_url: &str) -> Self {
        Self {
            api_key: api_key.to_string(),
            model: model.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }
}

#[derive(Serialize)]
struct OpenAIRequest {
    model: String,
    messages: Vec<ChatMessage>,
    response_format: OpenAIResponseFormat,
}

#[derive(Serialize)]
struct OpenAIResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Deserialize)]
struct OpenAIResponse {
    choices: Vec<OpenAIChoice>,
}

#[derive(Deserialize)]
struct OpenAIChoice {
    message: OpenAIMessageResponse,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct OpenAIMessageResponse {
    content: Option<String>,
    #[serde(default)]
    refusal: Option<String>,
}

impl OpenAIResponse {
    fn into_text(self) -> Result<String> {
        let choice = self
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("OpenAI response contained no choices"))?;
        if let Some(refusal) = choice.message.refusal {
            return Err(anyhow!("OpenAI refused the request: {}", refusal));
        }
        choice.message.content.ok_or_else(|| {
            anyhow!(
                "OpenAI response empty. Finish reason: {}",
                choice.finish_reason.as_deref().unwrap_or("UNKNOWN")
            )
        })
    }
}

#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
impl TextProvider for OpenAIClient {
    async fn chat(&self, system: &str, user: &str) -> Result<String> {
        let url = format!("{}/chat/completions", self.base_url);

        let request_body = OpenAIRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage { role: "system", content: system.to_string() },
                ChatMessage { role: "user", content: user.to_string() },
            ],
            response_format: OpenAIResponseFormat { kind: "json_object" },
        };

        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request_body)
            .send()
            .await
            .context("Failed to reach OpenAI")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let error_text = resp.text().await?;
            return Err(anyhow!("OpenAI API error ({}): {}", status, excerpt(&error_text, 500)));
        }

        let result: OpenAIResponse = resp.json().await.context("Failed to parse OpenAI response")?;
        result.into_text()
    }

    fn name(&self) -> &'static str {
        "openai"
    }
}

// --- Anthropic ---

const ANTHROPIC_VERSION: &str = "2023-06-01";

#[derive(Debug)]
struct AnthropicClient {
    api_key: String,
    model: String,
    base_url: String,
    max_tokens: u32,
    temperature: f32,
    client: reqwest::Client,
}

impl AnthropicClient {
    fn new(api_key: &str, model: &str, base_url: &str, max_tokens: u32, temperature: f32) -> Self {
        Self {
            api_key: api_key.to_string(),
            model: model.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            max_tokens,
            temperature,
            client: reqwest::Client::new(),
        }
    }
}

#[derive(Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: u32,
    temperature: f32,
    system: String,
    messages: Vec<ChatMessage>,
}

#[derive(Deserialize)]
struct AnthropicResponse {
    #[serde(default)]
    content: Vec<AnthropicBlock>,
    #[serde(default)]
    stop_reason: Option<String>,
}

#[derive(Deserialize)]
struct AnthropicBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

impl AnthropicResponse {
    fn into_text(self) -> Result<String> {
        let text: String = self
            .content
            .into_iter()
            .filter(|block| block.kind == "text")
            .filter_map(|block| block.text)
            .collect();
        if text.trim().is_empty() {
            return Err(anyhow!(
                "Anthropic response empty. Stop reason: {}",
                self.stop_reason.as_deref().unwrap_or("UNKNOWN")
            ));
        }
        Ok(text)
    }
}

#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
impl TextProvider for AnthropicClient {
    async fn chat(&self, system: &str, user: &str) -> Result<String> {
        let url = format!("{}/messages", self.base_url);

        let request_body = AnthropicRequest {
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            system: system.to_string(),
            messages: vec![ChatMessage { role: "user", content: user.to_string() }],
        };

        let resp = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("anthropic-dangerous-direct-browser-access", "true")
            .json(&request_body)
            .send()
            .await
            .context("Failed to reach Anthropic")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let error_text = resp.text().await?;
            return Err(anyhow!("Anthropic API error ({}): {}", status, excerpt(&error_text, 500)));
        }

        let result: AnthropicResponse =
            resp.json().await.context("Failed to parse Anthropic response")?;
        result.into_text()
    }

    fn name(&self) -> &'static str {
        "anthropic"
    }
}

// --- Gemini ---

#[derive(Debug)]
struct GeminiClient {
    api_key: String,
    model: String,
    base_url: String,
    client: reqwest::Client,
}

impl GeminiClient {
    fn new(api_key: &str, model: &str, base_url: &str) -> Self {
        Self {
            api_key: api_key.to_string(),
            model: model.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }
}

#[derive(Serialize)]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    system_instruction: GeminiSystemInstruction,
    #[serde(rename = "generationConfig")]
    generation_config: GeminiGenerationConfig,
}

#[derive(Serialize)]
struct GeminiContent {
    role: &'static str,
    parts: Vec<GeminiPart>,
}

#[derive(Serialize)]
struct GeminiSystemInstruction {
    parts: Vec<GeminiPart>,
}

#[derive(Serialize)]
struct GeminiPart {
    text: String,
}

#[derive(Serialize)]
struct GeminiGenerationConfig {
    #[serde(rename = "responseMimeType")]
    response_mime_type: &'static str,
}

#[derive(Deserialize)]
struct GeminiResponse {
    candidates: Option<Vec<GeminiCandidate>>,
    error: Option<GeminiError>,
}

#[derive(Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiContentResponse>,
    #[serde(rename = "finishReason")]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct GeminiContentResponse {
    #[serde(default)]
    parts: Vec<GeminiPartResponse>,
}

#[derive(Deserialize)]
struct GeminiPartResponse {
    #[serde(default)]
    text: String,
}

#[derive(Deserialize, Debug)]
struct GeminiError {
    message: String,
}

impl GeminiResponse {
    fn into_text(self) -> Result<String> {
        if let Some(err) = self.error {
            return Err(anyhow!("Gemini API returned error: {}", err.message));
        }

        let first = self
            .candidates
            .and_then(|c| c.into_iter().next())
            .ok_or_else(|| anyhow!("Gemini response contained no candidates"))?;

        let text: String = first
            .content
            .map(|c| c.parts.into_iter().map(|p| p.text).collect())
            .unwrap_or_default();
        if text.is_empty() {
            let reason = first.finish_reason.as_deref().unwrap_or("UNKNOWN");
            return Err(anyhow!("Gemini response empty. Finish reason: {}", reason));
        }
        Ok(text)
    }
}

#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
impl TextProvider for GeminiClient {
    async fn chat(&self, system: &str, user: &str) -> Result<String> {
        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url, self.model, self.api_key
        );

        let request_body = GeminiRequest {
            contents: vec![GeminiContent {
                role: "user",
                parts: vec![GeminiPart { text: user.to_string() }],
            }],
            system_instruction: GeminiSystemInstruction {
                parts: vec![GeminiPart { text: system.to_string() }],
            },
            generation_config: GeminiGenerationConfig {
                response_mime_type: "application/json",
            },
        };

        let resp = self
            .client
            .post(&url)
            .json(&request_body)
            .send()
            .await
            .context("Failed to reach Gemini")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let error_text = resp.text().await?;
            return Err(anyhow!("Gemini API error ({}): {}", status, excerpt(&error_text, 500)));
        }

        let response_text = resp.text().await?;
        let result: GeminiResponse = serde_json::from_str(&response_text).with_context(|| {
            format!("Failed to parse Gemini response. Body: {}", excerpt(&response_text, 500))
        })?;
        result.into_text()
    }

    fn name(&self) -> &'static str {
        "google"
    }
}
