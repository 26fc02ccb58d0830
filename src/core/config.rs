use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;
use std::time::Duration;

pub const SETTINGS_FILE: &str = "storynator.yml";

/// The external services a user can pick from, per capability.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum AIService {
    OpenAI,
    Anthropic,
    Stability,
    Google,
    Replicate,
}

impl AIService {
    pub fn as_str(&self) -> &'static str {
        match self {
            AIService::OpenAI => "openai",
            AIService::Anthropic => "anthropic",
            AIService::Stability => "stability",
            AIService::Google => "google",
            AIService::Replicate => "replicate",
        }
    }
}

impl fmt::Display for AIService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    Text,
    Image,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Capability::Text => f.write_str("text"),
            Capability::Image => f.write_str("image"),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ServiceSelection {
    pub service: AIService,
    #[serde(default)]
    pub api_key: String,
}

impl ServiceSelection {
    pub fn new(service: AIService, api_key: impl Into<String>) -> Self {
        Self {
            service,
            api_key: api_key.into(),
        }
    }

    pub fn has_key(&self) -> bool {
        !self.api_key.is_empty()
    }

    /// The key as sent to the provider; whitespace-only keys are unusable.
    pub fn usable_key(&self) -> Option<&str> {
        Some(self.api_key.trim()).filter(|k| !k.is_empty())
    }
}

/// Provider choice and credentials, as entered by the user and persisted under `ai_config`.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AIServiceConfig {
    pub text_service: ServiceSelection,
    pub image_service: ServiceSelection,
}

impl Default for AIServiceConfig {
    fn default() -> Self {
        Self {
            text_service: ServiceSelection::new(AIService::OpenAI, ""),
            image_service: ServiceSelection::new(AIService::OpenAI, ""),
        }
    }
}

impl AIServiceConfig {
    pub fn is_configured(&self) -> bool {
        self.text_service.has_key() && self.image_service.has_key()
    }

    pub fn selection(&self, capability: Capability) -> &ServiceSelection {
        match capability {
            Capability::Text => &self.text_service,
            Capability::Image => &self.image_service,
        }
    }
}

// --- Settings file ---

/// Deployment settings: endpoints, models and the image pacing policy.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct Settings {
    #[serde(default)]
    pub openai: OpenAISettings,
    #[serde(default)]
    pub anthropic: AnthropicSettings,
    #[serde(default)]
    pub google: GoogleSettings,
    #[serde(default)]
    pub replicate: ReplicateSettings,
    #[serde(default)]
    pub image_batch: ImageBatchSettings,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct OpenAISettings {
    #[serde(default = "default_openai_base_url")]
    pub base_url: String,
    #[serde(default = "default_openai_text_model")]
    pub text_model: String,
    #[serde(default = "default_openai_image_model")]
    pub image_model: String,
    #[serde(default = "default_image_size")]
    pub image_size: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct AnthropicSettings {
    #[serde(default = "default_anthropic_base_url")]
    pub base_url: String,
    #[serde(default = "default_anthropic_model")]
    pub model: String,
    #[serde(default = "default_anthropic_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct GoogleSettings {
    #[serde(default = "default_google_base_url")]
    pub base_url: String,
    #[serde(default = "default_google_model")]
    pub model: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ReplicateSettings {
    #[serde(default = "default_replicate_base_url")]
    pub base_url: String,
    #[serde(default = "default_replicate_version")]
    pub model_version: String,
    #[serde(default = "default_image_dimension")]
    pub width: u32,
    #[serde(default = "default_image_dimension")]
    pub height: u32,
    #[serde(default = "default_replicate_poll_interval")]
    pub poll_interval_ms: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ImageBatchSettings {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_batch_delay")]
    pub delay_seconds: u64,
}

impl ImageBatchSettings {
    pub fn delay(&self) -> Duration {
        Duration::from_secs(self.delay_seconds)
    }
}

fn default_openai_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_openai_text_model() -> String {
    "o3-mini".to_string()
}
fn default_openai_image_model() -> String {
    "dall-e-3".to_string()
}
fn default_image_size() -> String {
    "1024x1024".to_string()
}
fn default_anthropic_base_url() -> String {
    "https://api.anthropic.com/v1".to_string()
}
fn default_anthropic_model() -> String {
    "claude-3-opus-20240229".to_string()
}
fn default_anthropic_max_tokens() -> u32 {
    4096
}
fn default_temperature() -> f32 {
    0.7
}
fn default_google_base_url() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}
fn default_google_model() -> String {
    "gemini-2.0-flash".to_string()
}
fn default_replicate_base_url() -> String {
    "https://api.replicate.com/v1".to_string()
}
fn default_replicate_version() -> String {
    // stability-ai/sdxl
    "39ed52f2a78e934b3ba6e2a89f5b1c712de7dfea535525255b1aa35c5565e08b".to_string()
}
fn default_image_dimension() -> u32 {
    1024
}
fn default_replicate_poll_interval() -> u64 {
    1000
}
// DALL-E allows 7 requests per minute; stay one below.
fn default_batch_size() -> usize {
    6
}
fn default_batch_delay() -> u64 {
    60
}

impl Default for OpenAISettings {
    fn default() -> Self {
        Self {
            base_url: default_openai_base_url(),
            text_model: default_openai_text_model(),
            image_model: default_openai_image_model(),
            image_size: default_image_size(),
        }
    }
}

impl Default for AnthropicSettings {
    fn default() -> Self {
        Self {
            base_url: default_anthropic_base_url(),
            model: default_anthropic_model(),
            max_tokens: default_anthropic_max_tokens(),
            temperature: default_temperature(),
        }
    }
}

impl Default for GoogleSettings {
    fn default() -> Self {
        Self {
            base_url: default_google_base_url(),
            model: default_google_model(),
        }
    }
}

impl Default for ReplicateSettings {
    fn default() -> Self {
        Self {
            base_url: default_replicate_base_url(),
            model_version: default_replicate_version(),
            width: default_image_dimension(),
            height: default_image_dimension(),
            poll_interval_ms: default_replicate_poll_interval(),
        }
    }
}

impl Default for ImageBatchSettings {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            delay_seconds: default_batch_delay(),
        }
    }
}

impl Settings {
    /// Loads `storynator.yml` from the working directory, falling back to defaults when absent.
    pub fn load() -> Result<Self> {
        let path = Path::new(SETTINGS_FILE);
        if !path.exists() {
            log::debug!("{} not found, using default settings", SETTINGS_FILE);
            return Ok(Self::default());
        }
        Self::load_from(path)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::from_yaml(&content).with_context(|| format!("Failed to parse {}", path.display()))
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        let settings: Settings = serde_yaml_ng::from_str(content)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        let content = serde_yaml_ng::to_string(self)?;
        fs::write(path, content).with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        for (name, base_url) in [
            ("openai", &self.openai.base_url),
            ("anthropic", &self.anthropic.base_url),
            ("google", &self.google.base_url),
            ("replicate", &self.replicate.base_url),
        ] {
            url::Url::parse(base_url)
                .with_context(|| format!("Invalid {} base_url: {}", name, base_url))?;
        }
        if self.image_batch.batch_size == 0 {
            anyhow::bail!("image_batch.batch_size must be at least 1");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_configured_requires_both_keys() {
        let mut config = AIServiceConfig::default();
        assert!(!config.is_configured());

        config.text_service.api_key = "sk-text".to_string();
        assert!(!config.is_configured());

        config.image_service.api_key = "sk-image".to_string();
        assert!(config.is_configured());

        config.text_service.api_key = String::new();
        assert!(!config.is_configured());

        // Any non-empty string counts; usability is checked when providers are built.
        config.text_service.api_key = " ".to_string();
        config.image_service.api_key = " ".to_string();
        assert!(config.is_configured());
        assert_eq!(config.text_service.usable_key(), None);
    }

    #[test]
    fn test_config_json_shape() {
        let json = r#"{
            "textService": { "service": "anthropic", "apiKey": "a" },
            "imageService": { "service": "replicate", "apiKey": "r" }
        }"#;
        let config: AIServiceConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.text_service.service, AIService::Anthropic);
        assert_eq!(config.image_service.service, AIService::Replicate);
        assert_eq!(config.selection(Capability::Image).api_key, "r");

        let out = serde_json::to_string(&config).unwrap();
        assert!(out.contains("\"textService\""));
        assert!(out.contains("\"apiKey\":\"a\""));
    }

    #[test]
    fn test_unknown_service_is_rejected() {
        let json = r#"{
            "textService": { "service": "cohere", "apiKey": "a" },
            "imageService": { "service": "openai", "apiKey": "b" }
        }"#;
        assert!(serde_json::from_str::<AIServiceConfig>(json).is_err());
    }

    #[test]
    fn test_settings_defaults_from_partial_yaml() {
        let yaml = "image_batch:\n  delay_seconds: 30\nopenai:\n  text_model: gpt-4o\n";
        let settings = Settings::from_yaml(yaml).unwrap();
        assert_eq!(settings.image_batch.batch_size, 6);
        assert_eq!(settings.image_batch.delay(), Duration::from_secs(30));
        assert_eq!(settings.openai.text_model, "gpt-4o");
        assert_eq!(settings.openai.image_model, "dall-e-3");
        assert_eq!(settings.anthropic, AnthropicSettings::default());
    }

    #[test]
    fn test_settings_rejects_bad_url_and_zero_batch() {
        let yaml = "google:\n  base_url: not a url\n";
        assert!(Settings::from_yaml(yaml).is_err());

        let yaml = "image_batch:\n  batch_size: 0\n";
        assert!(Settings::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_settings_file_round_trip() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join(SETTINGS_FILE);

        let mut settings = Settings::default();
        settings.replicate.poll_interval_ms = 250;
        settings.save_to(&path)?;

        let loaded = Settings::load_from(&path)?;
        assert_eq!(loaded, settings);
        Ok(())
    }
}
