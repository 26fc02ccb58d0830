use crate::core::config::AIServiceConfig;
use crate::core::io::KeyValueStore;
use crate::core::model::Story;
use anyhow::{Context, Result};
use std::sync::Arc;

pub const CONFIG_KEY: &str = "ai_config";
pub const STORIES_KEY: &str = "stories";

/// The user's provider choice and keys, one record in the key-value store.
#[derive(Clone)]
pub struct ConfigStore {
    store: Arc<dyn KeyValueStore>,
}

impl ConfigStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    pub async fn get(&self) -> Result<Option<AIServiceConfig>> {
        match self.store.read(CONFIG_KEY).await? {
            Some(content) => {
                let config = serde_json::from_str(&content)
                    .with_context(|| format!("Failed to parse stored {}", CONFIG_KEY))?;
                Ok(Some(config))
            }
            None => Ok(None),
        }
    }

    pub async fn set(&self, config: &AIServiceConfig) -> Result<()> {
        let content = serde_json::to_string(config)?;
        self.store.write(CONFIG_KEY, &content).await
    }

    pub async fn is_configured(&self) -> Result<bool> {
        Ok(self.get().await?.is_some_and(|c| c.is_configured()))
    }
}

/// Previously generated stories, most recent first. Append-only.
#[derive(Clone)]
pub struct StoryStore {
    store: Arc<dyn KeyValueStore>,
}

impl StoryStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    pub async fn list(&self) -> Result<Vec<Story>> {
        match self.store.read(STORIES_KEY).await? {
            Some(content) => serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse stored {}", STORIES_KEY)),
            None => Ok(Vec::new()),
        }
    }

    pub async fn append(&self, story: Story) -> Result<()> {
        let mut stories = self.list().await?;
        log::debug!("Saving story {} ({} stored)", story.id, stories.len());
        stories.insert(0, story);
        let content = serde_json::to_string(&stories)?;
        self.store.write(STORIES_KEY, &content).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::{AIService, ServiceSelection};
    use crate::core::io::MemoryStore;
    use crate::core::model::{fixtures, GenerationOptions, StoryMetadata};
    use chrono::Utc;

    fn story(id: &str) -> Story {
        Story {
            id: id.to_string(),
            title: format!("Story {}", id),
            metadata: StoryMetadata {
                options: GenerationOptions::default(),
                created_at: Utc::now(),
            },
            pages: vec![fixtures::page("p", &["Finn"])],
        }
    }

    #[tokio::test]
    async fn test_config_store_absent_then_set() -> Result<()> {
        let configs = ConfigStore::new(Arc::new(MemoryStore::new()));
        assert_eq!(configs.get().await?, None);
        assert!(!configs.is_configured().await?);

        let mut config = AIServiceConfig {
            text_service: ServiceSelection::new(AIService::Anthropic, "a-key"),
            image_service: ServiceSelection::new(AIService::OpenAI, ""),
        };
        configs.set(&config).await?;
        assert_eq!(configs.get().await?, Some(config.clone()));
        assert!(!configs.is_configured().await?);

        config.image_service.api_key = "i-key".to_string();
        configs.set(&config).await?;
        assert!(configs.is_configured().await?);
        Ok(())
    }

    #[tokio::test]
    async fn test_config_store_reports_corrupt_record() {
        let kv = Arc::new(MemoryStore::new());
        kv.write(CONFIG_KEY, "{not json").await.unwrap();
        let configs = ConfigStore::new(kv);
        assert!(configs.get().await.is_err());
    }

    #[tokio::test]
    async fn test_story_store_appends_most_recent_first() -> Result<()> {
        let stories = StoryStore::new(Arc::new(MemoryStore::new()));
        assert!(stories.list().await?.is_empty());

        let first = story("1");
        let second = story("2");
        stories.append(first.clone()).await?;
        stories.append(second.clone()).await?;

        let listed = stories.list().await?;
        assert_eq!(listed, vec![second, first]);
        Ok(())
    }
}
