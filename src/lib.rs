pub mod core;
pub mod error;
pub mod services;
pub mod utils;
#[cfg(target_arch = "wasm32")]
pub mod web;

pub use crate::core::config::{AIService, AIServiceConfig, Capability, ServiceSelection, Settings};
pub use crate::core::io::{KeyValueStore, MemoryStore};
#[cfg(not(target_arch = "wasm32"))]
pub use crate::core::io::FileStore;
pub use crate::core::model::{AgeRange, Character, GenerationOptions, Page, Story};
pub use crate::error::{StoryError, StoryResult};
pub use crate::services::events::{EventSink, GenerationEvent, GenerationStage};
pub use crate::services::generator::StoryGenerator;
pub use crate::services::workflow::StoryWorkflow;
