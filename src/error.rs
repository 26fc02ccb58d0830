use crate::core::config::{AIService, Capability};
use thiserror::Error;

pub type StoryResult<T> = std::result::Result<T, StoryError>;

#[derive(Debug, Error)]
pub enum StoryError {
    #[error("AI services not configured. Please set up your API keys.")]
    NotConfigured,

    #[error("No API key configured for the {0} service")]
    MissingApiKey(Capability),

    #[error("Unsupported {capability} service: {service}")]
    UnsupportedProvider {
        capability: Capability,
        service: AIService,
    },

    #[error("Invalid generation options: {0}")]
    InvalidOptions(String),

    #[error("Story generation failed: {0:#}")]
    TextGeneration(anyhow::Error),

    #[error("Story response did not match the expected schema: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Story response has {actual} pages, expected {expected}")]
    PageCountMismatch { expected: u8, actual: usize },

    #[error("Storage error: {0:#}")]
    Storage(anyhow::Error),

    #[error("Invalid settings: {0:#}")]
    Settings(anyhow::Error),
}

impl StoryError {
    /// Errors the user fixes by revisiting the settings dialog.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            StoryError::NotConfigured
                | StoryError::MissingApiKey(_)
                | StoryError::UnsupportedProvider { .. }
                | StoryError::Settings(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configuration_classification() {
        assert!(StoryError::NotConfigured.is_configuration());
        assert!(StoryError::MissingApiKey(Capability::Image).is_configuration());
        assert!(StoryError::UnsupportedProvider {
            capability: Capability::Text,
            service: AIService::Stability,
        }
        .is_configuration());
        assert!(!StoryError::TextGeneration(anyhow::anyhow!("boom")).is_configuration());
    }

    #[test]
    fn test_messages_name_the_problem() {
        let err = StoryError::UnsupportedProvider {
            capability: Capability::Text,
            service: AIService::Replicate,
        };
        assert_eq!(err.to_string(), "Unsupported text service: replicate");

        let err = StoryError::TextGeneration(anyhow::anyhow!("inner").context("outer"));
        assert_eq!(err.to_string(), "Story generation failed: outer: inner");
    }
}
