use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationStage {
    Story,
    Images,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerationEvent {
    Stage(GenerationStage),
    /// `batch` is 1-based.
    ImageBatchStarted { batch: usize, total: usize, size: usize },
    Pacing(Duration),
    ImageSettled { page: usize, success: bool },
}

#[cfg(not(target_arch = "wasm32"))]
pub type EventSink = Arc<dyn Fn(&GenerationEvent) + Send + Sync>;
#[cfg(target_arch = "wasm32")]
pub type EventSink = Arc<dyn Fn(&GenerationEvent)>;

pub(crate) fn emit(sink: Option<&EventSink>, event: GenerationEvent) {
    if let Some(sink) = sink {
        sink(&event);
    }
}
