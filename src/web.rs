//! Browser bindings. Everything is persisted in `localStorage`; JSON goes in and out as strings.

use crate::core::config::{AIServiceConfig, Settings};
use crate::core::io::LocalStore;
use crate::core::model::GenerationOptions;
use crate::error::StoryError;
use crate::services::workflow::StoryWorkflow;
use std::sync::Arc;
use wasm_bindgen::prelude::*;

#[wasm_bindgen]
pub fn start() {
    console_error_panic_hook::set_once();
    console_log::init_with_level(log::Level::Info).unwrap_or(());
}

fn to_js(e: impl std::fmt::Display) -> JsValue {
    JsValue::from_str(&e.to_string())
}

fn story_error_to_js(e: StoryError) -> JsValue {
    // The UI opens the settings dialog for configuration errors.
    let kind = if e.is_configuration() { "configuration" } else { "generation" };
    let payload = serde_json::json!({ "kind": kind, "message": e.to_string() });
    JsValue::from_str(&payload.to_string())
}

fn workflow() -> Result<StoryWorkflow, JsValue> {
    let store = LocalStore::new().map_err(to_js)?;
    StoryWorkflow::new(Arc::new(store), Settings::default()).map_err(story_error_to_js)
}

#[wasm_bindgen]
pub async fn save_config(config_json: String) -> Result<(), JsValue> {
    let config: AIServiceConfig = serde_json::from_str(&config_json).map_err(to_js)?;
    workflow()?.save_config(&config).await.map_err(story_error_to_js)
}

/// Returns the stored configuration as JSON, or `null` when none was saved.
#[wasm_bindgen]
pub async fn load_config() -> Result<JsValue, JsValue> {
    match workflow()?.load_config().await.map_err(story_error_to_js)? {
        Some(config) => Ok(JsValue::from_str(&serde_json::to_string(&config).map_err(to_js)?)),
        None => Ok(JsValue::NULL),
    }
}

#[wasm_bindgen]
pub async fn is_configured() -> Result<bool, JsValue> {
    workflow()?.is_configured().await.map_err(story_error_to_js)
}

#[wasm_bindgen]
pub async fn list_stories() -> Result<String, JsValue> {
    let stories = workflow()?.list_stories().await.map_err(story_error_to_js)?;
    serde_json::to_string(&stories).map_err(to_js)
}

#[wasm_bindgen]
pub async fn generate_story(prompt: String, options_json: String) -> Result<String, JsValue> {
    let options: GenerationOptions = serde_json::from_str(&options_json).map_err(to_js)?;
    let story = workflow()?
        .generate_story(&prompt, &options)
        .await
        .map_err(story_error_to_js)?;
    serde_json::to_string(&story).map_err(to_js)
}
