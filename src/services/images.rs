use crate::core::model::{Character, Page};
use crate::services::events::{emit, EventSink, GenerationEvent};
use crate::services::image::{ImagePrompt, ImageProvider, Pacing};
use crate::services::prompts::compose_image_prompt;
use crate::utils::time::sleep;
use anyhow::Result;
use futures_util::future::join_all;
use log::{error, info, warn};

/// Fills in `Page::image_url` for a story's pages, pacing requests per the provider's limits.
pub struct ImageBatchGenerator {
    provider: Option<Box<dyn ImageProvider>>,
    events: Option<EventSink>,
}

impl ImageBatchGenerator {
    pub fn new(provider: Option<Box<dyn ImageProvider>>) -> Self {
        Self { provider, events: None }
    }

    pub fn with_events(mut self, events: EventSink) -> Self {
        self.events = Some(events);
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.provider.is_some()
    }

    /// Never fails: a page whose request fails keeps `image_url == None`.
    pub async fn generate_images(&self, pages: &mut [Page], characters: &[Character]) {
        let Some(provider) = self.provider.as_deref() else {
            warn!("No image service API key provided, skipping image generation");
            return;
        };
        if pages.is_empty() {
            return;
        }

        let prompts: Vec<(usize, ImagePrompt)> = pages
            .iter()
            .map(|page| compose_image_prompt(page, characters))
            .enumerate()
            .collect();

        let (batch_size, delay) = match provider.pacing() {
            Pacing::Batched { batch_size, delay } => (batch_size.max(1), Some(delay)),
            Pacing::Unbounded => (prompts.len(), None),
        };
        let total_batches = prompts.len().div_ceil(batch_size);
        info!(
            "Generating {} images with {} in {} batch(es)",
            prompts.len(),
            provider.name(),
            total_batches
        );

        for (batch_index, batch) in prompts.chunks(batch_size).enumerate() {
            info!("Processing batch {}/{}", batch_index + 1, total_batches);
            emit(
                self.events.as_ref(),
                GenerationEvent::ImageBatchStarted {
                    batch: batch_index + 1,
                    total: total_batches,
                    size: batch.len(),
                },
            );

            let results = run_batch(provider, batch, pages.len()).await;
            for (index, result) in results {
                self.apply(pages, index, result);
            }

            let is_last = batch_index + 1 == total_batches;
            if let (Some(delay), false) = (delay, is_last) {
                info!("Waiting {} seconds before processing next batch...", delay.as_secs());
                emit(self.events.as_ref(), GenerationEvent::Pacing(delay));
                sleep(delay).await;
            }
        }
    }

    fn apply(&self, pages: &mut [Page], index: usize, result: Result<String>) {
        let success = match result {
            Ok(url) if !url.trim().is_empty() => {
                pages[index].image_url = Some(url);
                true
            }
            Ok(_) => {
                error!("Error generating image {}: provider returned an empty locator", index + 1);
                false
            }
            Err(e) => {
                error!("Error generating image {}: {:#}", index + 1, e);
                false
            }
        };
        emit(self.events.as_ref(), GenerationEvent::ImageSettled { page: index, success });
    }
}

/// Issues every request in the batch at once and waits for all of them to settle.
async fn run_batch(
    provider: &dyn ImageProvider,
    batch: &[(usize, ImagePrompt)],
    total_pages: usize,
) -> Vec<(usize, Result<String>)> {
    join_all(batch.iter().map(|(index, prompt)| async move {
        info!("Generating image {}/{}...", index + 1, total_pages);
        (*index, provider.generate(prompt).await)
    }))
    .await
}
