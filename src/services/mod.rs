pub mod events;
pub mod generator;
pub mod image;
pub mod images;
pub mod llm;
pub mod prompts;
pub mod workflow;
