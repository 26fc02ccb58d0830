use crate::core::config::{AIServiceConfig, Settings};
use crate::core::io::KeyValueStore;
use crate::core::model::{GenerationOptions, Story};
use crate::core::store::{ConfigStore, StoryStore};
use crate::error::{StoryError, StoryResult};
use crate::services::events::EventSink;
use crate::services::generator::StoryGenerator;
use log::{info, warn};
use std::sync::Arc;

/// The two operations the UI calls into: configuration read/write and "generate a story".
pub struct StoryWorkflow {
    configs: ConfigStore,
    stories: StoryStore,
    settings: Settings,
    events: Option<EventSink>,
}

impl StoryWorkflow {
    pub fn new(store: Arc<dyn KeyValueStore>, settings: Settings) -> StoryResult<Self> {
        settings.validate().map_err(StoryError::Settings)?;
        Ok(Self {
            configs: ConfigStore::new(store.clone()),
            stories: StoryStore::new(store),
            settings,
            events: None,
        })
    }

    pub fn with_events(mut self, events: EventSink) -> Self {
        self.events = Some(events);
        self
    }

    pub async fn load_config(&self) -> StoryResult<Option<AIServiceConfig>> {
        self.configs.get().await.map_err(StoryError::Storage)
    }

    pub async fn save_config(&self, config: &AIServiceConfig) -> StoryResult<()> {
        if !config.is_configured() {
            warn!("Saving configuration with a missing API key");
        }
        self.configs.set(config).await.map_err(StoryError::Storage)
    }

    pub async fn is_configured(&self) -> StoryResult<bool> {
        self.configs.is_configured().await.map_err(StoryError::Storage)
    }

    pub async fn list_stories(&self) -> StoryResult<Vec<Story>> {
        self.stories.list().await.map_err(StoryError::Storage)
    }

    /// Generates with the configured providers and stores the result.
    pub async fn generate_story(&self, prompt: &str, options: &GenerationOptions) -> StoryResult<Story> {
        let config = self.require_config().await?;
        let mut generator = StoryGenerator::from_config(&config, &self.settings)?;
        if let Some(events) = &self.events {
            generator = generator.with_events(events.clone());
        }
        self.generate_and_store(&generator, prompt, options).await
    }

    /// Same as [`generate_story`](Self::generate_story) with a caller-supplied generator.
    pub async fn generate_story_with(
        &self,
        generator: &StoryGenerator,
        prompt: &str,
        options: &GenerationOptions,
    ) -> StoryResult<Story> {
        self.require_config().await?;
        self.generate_and_store(generator, prompt, options).await
    }

    async fn require_config(&self) -> StoryResult<AIServiceConfig> {
        self.load_config()
            .await?
            .filter(AIServiceConfig::is_configured)
            .ok_or(StoryError::NotConfigured)
    }

    async fn generate_and_store(
        &self,
        generator: &StoryGenerator,
        prompt: &str,
        options: &GenerationOptions,
    ) -> StoryResult<Story> {
        let story = generator.generate_story(prompt, options).await?;
        info!(
            "Story {} ready: {} pages, {} illustrated",
            story.id,
            story.pages.len(),
            story.illustrated_pages()
        );
        self.stories
            .append(story.clone())
            .await
            .map_err(StoryError::Storage)?;
        Ok(story)
    }
}
