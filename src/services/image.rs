use crate::core::config::{
    AIService, Capability, ImageBatchSettings, ReplicateSettings, ServiceSelection, Settings,
};
use crate::error::{StoryError, StoryResult};
use crate::services::llm::ProviderBounds;
use crate::utils::text::excerpt;
use crate::utils::time::sleep;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::time::Duration;

/// How requests to a provider must be spread out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pacing {
    /// At most `batch_size` requests in flight, then wait `delay` before the next batch.
    Batched { batch_size: usize, delay: Duration },
    /// Everything at once.
    Unbounded,
}

impl From<&ImageBatchSettings> for Pacing {
    fn from(settings: &ImageBatchSettings) -> Self {
        Pacing::Batched {
            batch_size: settings.batch_size.max(1),
            delay: settings.delay(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePrompt {
    pub prompt: String,
    pub negative_prompt: String,
}

#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
pub trait ImageProvider: ProviderBounds + Debug {
    /// Returns a locator (usually a URL) for the generated image.
    async fn generate(&self, prompt: &ImagePrompt) -> Result<String>;
    fn pacing(&self) -> Pacing;
    fn name(&self) -> &'static str;
}

/// `Ok(None)` when no usable image key is set; the story is then generated without pictures.
pub fn create_image_provider(
    selection: &ServiceSelection,
    settings: &Settings,
) -> StoryResult<Option<Box<dyn ImageProvider>>> {
    if let AIService::Anthropic | AIService::Stability | AIService::Google = selection.service {
        return Err(StoryError::UnsupportedProvider {
            capability: Capability::Image,
            service: selection.service,
        });
    }
    let Some(api_key) = selection.usable_key() else {
        return Ok(None);
    };

    let provider: Box<dyn ImageProvider> = match selection.service {
        AIService::Replicate => Box::new(ReplicateClient::new(api_key, &settings.replicate)),
        _ => Box::new(DalleClient::new(
            api_key,
            &settings.openai.image_model,
            &settings.openai.base_url,
            &settings.openai.image_size,
            Pacing::from(&settings.image_batch),
        )),
    };
    Ok(Some(provider))
}

// --- OpenAI (DALL-E) ---

#[derive(Debug)]
struct DalleClient {
    api_key: String,
    model: String,
    base_url: String,
    size: String,
    pacing: Pacing,
    client: reqwest::Client,
}

impl DalleClient {
    fn new(api_key: &str, model: &str, base_url: &str, size: &str, pacing: Pacing) -> Self {
        Self {
            api_key: api_key.to_string(),
            model: model.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            size: size.to_string(),
            pacing,
            client: reqwest::Client::new(),
        }
    }
}

#[derive(Serialize)]
struct DalleRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    n: u32,
    size: &'a str,
    response_format: &'a str,
}

#[derive(Deserialize)]
struct DalleResponse {
    #[serde(default)]
    data: Vec<DalleImage>,
}

#[derive(Deserialize)]
struct DalleImage {
    #[serde(default)]
    url: Option<String>,
}

impl DalleResponse {
    fn into_url(self) -> Result<String> {
        self.data
            .into_iter()
            .find_map(|image| image.url)
            .filter(|url| !url.is_empty())
            .ok_or_else(|| anyhow!("DALL-E response contained no image URL"))
    }
}

#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
impl ImageProvider for DalleClient {
    async fn generate(&self, prompt: &ImagePrompt) -> Result<String> {
        let url = format!("{}/images/generations", self.base_url);

        let request_body = DalleRequest {
            model: &self.model,
            prompt: &prompt.prompt,
            n: 1,
            size: &self.size,
            response_format: "url",
        };

        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request_body)
            .send()
            .await
            .context("Failed to reach OpenAI images endpoint")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let error_text = resp.text().await?;
            return Err(anyhow!("DALL-E API error ({}): {}", status, excerpt(&error_text, 500)));
        }

        let result: DalleResponse = resp.json().await.context("Failed to parse DALL-E response")?;
        result.into_url()
    }

    fn pacing(&self) -> Pacing {
        self.pacing
    }

    fn name(&self) -> &'static str {
        "openai"
    }
}

// --- Replicate ---

#[derive(Debug)]
struct ReplicateClient {
    api_key: String,
    version: String,
    base_url: String,
    width: u32,
    height: u32,
    poll_interval: Duration,
    client: reqwest::Client,
}

impl ReplicateClient {
    fn new(api_key: &str, settings: &ReplicateSettings) -> Self {
        Self {
            api_key: api_key.to_string(),
            version: settings.model_version.clone(),
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            width: settings.width,
            height: settings.height,
            poll_interval: Duration::from_millis(settings.poll_interval_ms),
            client: reqwest::Client::new(),
        }
    }

    fn request_body<'a>(&'a self, prompt: &'a ImagePrompt) -> PredictionRequest<'a> {
        PredictionRequest {
            version: &self.version,
            input: PredictionInput {
                prompt: &prompt.prompt,
                negative_prompt: &prompt.negative_prompt,
                width: self.width,
                height: self.height,
            },
        }
    }

    async fn fetch(&self, url: &str) -> Result<Prediction> {
        let resp = self
            .client
            .get(url)
            .bearer_auth(&self.api_key)
            .send()
            .await
            .context("Failed to poll Replicate prediction")?;
        if !resp.status().is_success() {
            let status = resp.status();
            let error_text = resp.text().await?;
            return Err(anyhow!("Replicate API error ({}): {}", status, excerpt(&error_text, 500)));
        }
        resp.json().await.context("Failed to parse Replicate prediction")
    }
}

#[derive(Serialize)]
struct PredictionRequest<'a> {
    version: &'a str,
    input: PredictionInput<'a>,
}

#[derive(Serialize)]
struct PredictionInput<'a> {
    prompt: &'a str,
    negative_prompt: &'a str,
    width: u32,
    height: u32,
}

#[derive(Deserialize, Debug)]
struct Prediction {
    status: String,
    #[serde(default)]
    output: Option<serde_json::Value>,
    #[serde(default)]
    error: Option<serde_json::Value>,
    #[serde(default)]
    urls: Option<PredictionUrls>,
}

#[derive(Deserialize, Debug)]
struct PredictionUrls {
    get: Option<String>,
}

enum PredictionState {
    Done(String),
    Pending(String),
}

impl Prediction {
    fn state(self) -> Result<PredictionState> {
        match self.status.as_str() {
            "succeeded" => {
                // SDXL returns a list of URLs; some models return a bare string.
                let url = match self.output {
                    Some(serde_json::Value::Array(items)) => {
                        items.into_iter().find_map(|v| v.as_str().map(str::to_string))
                    }
                    Some(serde_json::Value::String(s)) => Some(s),
                    _ => None,
                };
                url.filter(|u| !u.is_empty())
                    .map(PredictionState::Done)
                    .ok_or_else(|| anyhow!("Replicate prediction succeeded without output"))
            }
            "failed" | "canceled" => Err(anyhow!(
                "Replicate prediction {}: {}",
                self.status,
                self.error.map(|e| e.to_string()).unwrap_or_else(|| "no details".to_string())
            )),
            _ => self
                .urls
                .and_then(|u| u.get)
                .map(PredictionState::Pending)
                .ok_or_else(|| anyhow!("Replicate prediction is {} without a poll URL", self.status)),
        }
    }
}

#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
impl ImageProvider for ReplicateClient {
    async fn generate(&self, prompt: &ImagePrompt) -> Result<String> {
        let url = format!("{}/predictions", self.base_url);

        let request_body = self.request_body(prompt);

        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .header("Prefer", "wait")
            .json(&request_body)
            .send()
            .await
            .context("Failed to reach Replicate")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let error_text = resp.text().await?;
            return Err(anyhow!("Replicate API error ({}): {}", status, excerpt(&error_text, 500)));
        }

        let mut prediction: Prediction =
            resp.json().await.context("Failed to parse Replicate prediction")?;
        loop {
            match prediction.state()? {
                PredictionState::Done(url) => return Ok(url),
                PredictionState::Pending(poll_url) => {
                    log::debug!("Replicate prediction pending, polling {}", poll_url);
                    sleep(self.poll_interval).await;
                    prediction = self.fetch(&poll_url).await?;
                }
            }
        }
    }

    fn pacing(&self) -> Pacing {
        Pacing::Unbounded
    }

    fn name(&self) -> &'static str {
        "replicate"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> Settings {
        Settings::default()
    }

    #[test]
    fn test_dispatch_image_services() {
        let provider = create_image_provider(&ServiceSelection::new(AIService::OpenAI, "k"), &settings())
            .unwrap()
            .unwrap();
        assert_eq!(provider.name(), "openai");
        assert_eq!(
            provider.pacing(),
            Pacing::Batched { batch_size: 6, delay: Duration::from_secs(60) }
        );

        let provider =
            create_image_provider(&ServiceSelection::new(AIService::Replicate, "k"), &settings())
                .unwrap()
                .unwrap();
        assert_eq!(provider.name(), "replicate");
        assert_eq!(provider.pacing(), Pacing::Unbounded);
    }

    #[test]
    fn test_missing_image_key_disables_images() {
        let provider =
            create_image_provider(&ServiceSelection::new(AIService::OpenAI, ""), &settings()).unwrap();
        assert!(provider.is_none());

        let provider =
            create_image_provider(&ServiceSelection::new(AIService::Replicate, "  "), &settings()).unwrap();
        assert!(provider.is_none());
    }

    #[test]
    fn test_unsupported_image_service_is_config_error() {
        for service in [AIService::Stability, AIService::Anthropic, AIService::Google] {
            let err = create_image_provider(&ServiceSelection::new(service, "k"), &settings()).unwrap_err();
            assert!(matches!(
                err,
                StoryError::UnsupportedProvider { capability: Capability::Image, .. }
            ));
        }
    }

    #[test]
    fn test_batch_settings_never_yield_empty_batches() {
        let pacing = Pacing::from(&ImageBatchSettings { batch_size: 0, delay_seconds: 5 });
        assert_eq!(pacing, Pacing::Batched { batch_size: 1, delay: Duration::from_secs(5) });
    }

    #[test]
    fn test_dalle_response_parsing() {
        let json = r#"{"created": 1, "data": [{"url": "https://img/1.png", "revised_prompt": "x"}]}"#;
        let result: DalleResponse = serde_json::from_str(json).unwrap();
        assert_eq!(result.into_url().unwrap(), "https://img/1.png");

        let json = r#"{"created": 1, "data": [{"b64_json": "AAAA"}]}"#;
        let result: DalleResponse = serde_json::from_str(json).unwrap();
        assert!(result.into_url().is_err());
    }

    #[test]
    fn test_replicate_prediction_states() {
        let json = r#"{"id": "p1", "status": "succeeded", "output": ["https://rep/1.png"]}"#;
        let prediction: Prediction = serde_json::from_str(json).unwrap();
        assert!(matches!(prediction.state().unwrap(), PredictionState::Done(u) if u == "https://rep/1.png"));

        let json = r#"{"id": "p2", "status": "processing", "output": null,
                       "urls": {"get": "https://api.replicate.com/v1/predictions/p2"}}"#;
        let prediction: Prediction = serde_json::from_str(json).unwrap();
        assert!(matches!(prediction.state().unwrap(), PredictionState::Pending(u) if u.ends_with("/p2")));

        let json = r#"{"id": "p3", "status": "failed", "error": "NSFW content detected"}"#;
        let prediction: Prediction = serde_json::from_str(json).unwrap();
        let err = prediction.state().err().unwrap();
        assert!(err.to_string().contains("NSFW"));
    }

    #[test]
    fn test_replicate_request_uses_configured_resolution() {
        let mut config = settings();
        config.replicate.width = 512;
        config.replicate.height = 768;
        config.replicate.model_version = "abc".to_string();
        let client = ReplicateClient::new("k", &config.replicate);

        let prompt = ImagePrompt { prompt: "p".to_string(), negative_prompt: "n".to_string() };
        let value = serde_json::to_value(client.request_body(&prompt)).unwrap();
        assert_eq!(value["version"], "abc");
        assert_eq!(value["input"]["prompt"], "p");
        assert_eq!(value["input"]["negative_prompt"], "n");
        assert_eq!(value["input"]["width"], 512);
        assert_eq!(value["input"]["height"], 768);
    }
}
