use crate::core::config::{AIServiceConfig, Capability, Settings};
use crate::core::model::{GenerationOptions, Story, StoryDraft, StoryMetadata};
use crate::error::{StoryError, StoryResult};
use crate::services::events::{emit, EventSink, GenerationEvent, GenerationStage};
use crate::services::image::{create_image_provider, ImageProvider};
use crate::services::images::ImageBatchGenerator;
use crate::services::llm::{create_text_provider, TextProvider};
use crate::services::prompts::{system_prompt, user_prompt};
use crate::utils::text::{excerpt, strip_code_blocks};
use chrono::Utc;
use log::{error, info};
use uuid::Uuid;

/// Turns a prompt into a [`Story`]: one structured text call, then optional illustrations.
pub struct StoryGenerator {
    text: Box<dyn TextProvider>,
    images: ImageBatchGenerator,
    events: Option<EventSink>,
}

impl StoryGenerator {
    pub fn new(text: Box<dyn TextProvider>, image: Option<Box<dyn ImageProvider>>) -> Self {
        Self {
            text,
            images: ImageBatchGenerator::new(image),
            events: None,
        }
    }

    /// Resolves both provider bindings up front, so a bad selection fails before any request.
    pub fn from_config(config: &AIServiceConfig, settings: &Settings) -> StoryResult<Self> {
        info!(
            "Initializing AI services: text={}, image={}",
            config.text_service.service, config.image_service.service
        );
        let text = create_text_provider(config.selection(Capability::Text), settings)?;
        let image = create_image_provider(config.selection(Capability::Image), settings)?;
        Ok(Self::new(text, image))
    }

    pub fn with_events(mut self, events: EventSink) -> Self {
        self.images = self.images.with_events(events.clone());
        self.events = Some(events);
        self
    }

    pub async fn generate_story(&self, prompt: &str, options: &GenerationOptions) -> StoryResult<Story> {
        options.validate()?;
        if prompt.trim().is_empty() {
            return Err(StoryError::InvalidOptions("prompt must not be empty".to_string()));
        }
        info!("Generating story with options: {:?} (prompt: {:?})", options, prompt);

        emit(self.events.as_ref(), GenerationEvent::Stage(GenerationStage::Story));
        let draft = self.request_draft(prompt, options).await?;

        if draft.pages.len() != usize::from(options.page_count) {
            error!(
                "Story response has {} pages, expected {}",
                draft.pages.len(),
                options.page_count
            );
            return Err(StoryError::PageCountMismatch {
                expected: options.page_count,
                actual: draft.pages.len(),
            });
        }

        let StoryDraft { title, characters, mut pages } = draft;

        if options.include_images {
            info!("Generating images for story pages...");
            emit(self.events.as_ref(), GenerationEvent::Stage(GenerationStage::Images));
            self.images.generate_images(&mut pages, &characters).await;
        }

        Ok(Story {
            id: Uuid::new_v4().to_string(),
            title,
            metadata: StoryMetadata {
                options: options.clone(),
                created_at: Utc::now(),
            },
            pages,
        })
    }

    async fn request_draft(&self, prompt: &str, options: &GenerationOptions) -> StoryResult<StoryDraft> {
        info!("Sending request to {}...", self.text.name());
        let response = self
            .text
            .chat(&system_prompt(), &user_prompt(prompt, options))
            .await
            .map_err(|e| {
                error!("Error generating story: {:#}", e);
                StoryError::TextGeneration(e)
            })?;
        info!("Received response from {}", self.text.name());

        StoryDraft::from_json(&strip_code_blocks(&response)).map_err(|e| {
            error!("{}. Body: {}", e, excerpt(&response, 500));
            e
        })
    }
}


#[cfg(test)]
mod tests {
    use super::mocks::MockTextProvider;
    use super::*;
    use crate::core::config::{AIService, ServiceSelection};
    use crate::core::model::fixtures::draft_json;
    use crate::core::model::AgeRange;
    use crate::services::image::Pacing;
    use crate::services::images::mocks::MockImageProvider;
    use std::sync::{Arc, Mutex};

    fn options(page_count: u8, include_images: bool) -> GenerationOptions {
        GenerationOptions {
            page_count,
            age_range: AgeRange::EarlyReader,
            include_images,
            theme: Some("Adventure".to_string()),
        }
    }

    #[tokio::test]
    async fn test_returns_exactly_page_count_pages() {
        for page_count in 1..=20u8 {
            let text = MockTextProvider::replying(draft_json(page_count.into(), "Finn"));
            let generator = StoryGenerator::new(Box::new(text), None);

            let story = generator
                .generate_story("a brave fox", &options(page_count, false))
                .await
                .unwrap();
            assert_eq!(story.pages.len(), usize::from(page_count));
            assert_eq!(story.title, "The Brave Fox");
            assert_eq!(story.metadata.options.page_count, page_count);
        }
    }

    #[tokio::test]
    async fn test_sends_templated_prompts() {
        let text = MockTextProvider::replying(draft_json(2, "Finn"));
        let calls = text.calls.clone();
        let generator = StoryGenerator::new(Box::new(text), None);

        generator.generate_story("a brave fox", &options(2, false)).await.unwrap();

        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        let (system, user) = &calls[0];
        assert!(system.contains("children's stories"));
        assert!(user.contains("Write a 2 page story suitable for ages 5-8."));
        assert!(user.contains("a brave fox"));
        assert!(user.contains("Theme: Adventure"));
    }

    #[tokio::test]
    async fn test_page_count_mismatch_is_an_error() {
        let text = MockTextProvider::replying(draft_json(2, "Finn"));
        let generator = StoryGenerator::new(Box::new(text), None);

        let err = generator.generate_story("fox", &options(3, false)).await.unwrap_err();
        assert!(matches!(err, StoryError::PageCountMismatch { expected: 3, actual: 2 }));
    }

    #[tokio::test]
    async fn test_schema_violation_returns_no_story() {
        let text = MockTextProvider::replying(r#"{"title": "No pages", "characters": []}"#);
        let image = MockImageProvider::new(Pacing::Unbounded);
        let image_calls = image.calls.clone();
        let generator = StoryGenerator::new(Box::new(text), Some(Box::new(image)));

        let err = generator.generate_story("fox", &options(1, true)).await.unwrap_err();
        assert!(matches!(err, StoryError::Decode(_)));
        assert!(image_calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_code_fenced_response_is_accepted() {
        let fenced = format!("```json\n{}\n```", draft_json(1, "Finn"));
        let generator = StoryGenerator::new(Box::new(MockTextProvider::replying(fenced)), None);

        let story = generator.generate_story("fox", &options(1, false)).await.unwrap();
        assert_eq!(story.pages.len(), 1);
    }

    #[tokio::test]
    async fn test_text_failure_is_surfaced() {
        let generator = StoryGenerator::new(Box::new(MockTextProvider::failing("rate limited")), None);

        let err = generator.generate_story("fox", &options(1, false)).await.unwrap_err();
        assert!(matches!(err, StoryError::TextGeneration(_)));
        assert!(err.to_string().contains("rate limited"));
    }

    #[tokio::test]
    async fn test_invalid_options_fail_before_any_request() {
        let text = MockTextProvider::replying(draft_json(1, "Finn"));
        let calls = text.calls.clone();
        let generator = StoryGenerator::new(Box::new(text), None);

        let err = generator.generate_story("fox", &options(0, false)).await.unwrap_err();
        assert!(matches!(err, StoryError::InvalidOptions(_)));
        let err = generator.generate_story("   ", &options(1, false)).await.unwrap_err();
        assert!(matches!(err, StoryError::InvalidOptions(_)));
        assert!(calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_images_skipped_when_not_requested() {
        let image = MockImageProvider::new(Pacing::Unbounded);
        let image_calls = image.calls.clone();
        let text = MockTextProvider::replying(draft_json(2, "Finn"));
        let generator = StoryGenerator::new(Box::new(text), Some(Box::new(image)));

        let story = generator.generate_story("fox", &options(2, false)).await.unwrap();
        assert!(image_calls.lock().unwrap().is_empty());
        assert_eq!(story.illustrated_pages(), 0);
    }

    #[tokio::test]
    async fn test_stage_events_in_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink_seen = seen.clone();
        let sink: EventSink = Arc::new(move |e: &GenerationEvent| {
            if let GenerationEvent::Stage(stage) = e {
                sink_seen.lock().unwrap().push(*stage);
            }
        });
        let generator = StoryGenerator::new(
            Box::new(MockTextProvider::replying(draft_json(2, "Finn"))),
            Some(Box::new(MockImageProvider::new(Pacing::Unbounded))),
        )
        .with_events(sink);

        let story = generator.generate_story("fox", &options(2, true)).await.unwrap();
        assert_eq!(story.illustrated_pages(), 2);
        assert_eq!(
            *seen.lock().unwrap(),
            vec![GenerationStage::Story, GenerationStage::Images]
        );
    }

    #[test]
    fn test_from_config_rejects_unsupported_text_service() {
        let config = AIServiceConfig {
            text_service: ServiceSelection::new(AIService::Stability, "key"),
            image_service: ServiceSelection::new(AIService::OpenAI, "key"),
        };
        let err = StoryGenerator::from_config(&config, &Settings::default()).err().unwrap();
        assert!(matches!(
            err,
            StoryError::UnsupportedProvider { capability: Capability::Text, service: AIService::Stability }
        ));
    }

    #[test]
    fn test_from_config_builds_supported_pair() {
        let config = AIServiceConfig {
            text_service: ServiceSelection::new(AIService::Anthropic, "key"),
            image_service: ServiceSelection::new(AIService::Replicate, "key"),
        };
        let generator = StoryGenerator::from_config(&config, &Settings::default()).unwrap();
        assert!(generator.images.is_enabled());
    }
}
