use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use inquire::{Confirm, CustomType, Password, Select, Text};
use std::sync::Arc;
use std::time::Duration;
use storynator::{
    AIService, AIServiceConfig, AgeRange, EventSink, FileStore, GenerationEvent, GenerationOptions,
    GenerationStage, ServiceSelection, Settings, StoryError, StoryWorkflow,
};

const DATA_DIR: &str = ".storynator";

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let settings = Settings::load()?;
    let store = Arc::new(FileStore::new(DATA_DIR));

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(ProgressStyle::default_spinner().template("{spinner:.green} {msg}")?);
    let workflow = StoryWorkflow::new(store, settings)?.with_events(progress_sink(spinner.clone()));

    if !workflow.is_configured().await? {
        println!("AI services not configured. Please set up your API keys.");
        let current = workflow.load_config().await?.unwrap_or_default();
        workflow.save_config(&ask_config(&current)?).await?;
    }

    let prompt = Text::new("What should the story be about?").prompt()?;
    let options = ask_options()?;

    spinner.enable_steady_tick(Duration::from_millis(120));
    let result = workflow.generate_story(&prompt, &options).await;
    spinner.finish_and_clear();

    match result {
        Ok(story) => {
            println!("\n{}\n", story.title);
            for (i, page) in story.pages.iter().enumerate() {
                println!("--- Page {} ---", i + 1);
                println!("{}", page.content);
                match &page.image_url {
                    Some(url) => println!("[illustration: {}]", url),
                    None if options.include_images => println!("[no illustration]"),
                    None => {}
                }
                println!();
            }
            println!("Saved as {} in {}/", story.id, DATA_DIR);
            Ok(())
        }
        Err(e @ StoryError::NotConfigured)
        | Err(e @ StoryError::MissingApiKey(_))
        | Err(e @ StoryError::UnsupportedProvider { .. }) => {
            eprintln!("{}", e);
            eprintln!("Delete {}/ai_config.json or pick a different service and try again.", DATA_DIR);
            Err(e.into())
        }
        Err(e) => {
            eprintln!("An error occurred while generating the story: {}", e);
            Err(e.into())
        }
    }
}

fn progress_sink(spinner: ProgressBar) -> EventSink {
    Arc::new(move |event: &GenerationEvent| match event {
        GenerationEvent::Stage(GenerationStage::Story) => spinner.set_message("Writing the story..."),
        GenerationEvent::Stage(GenerationStage::Images) => spinner.set_message("Painting the pictures..."),
        GenerationEvent::ImageBatchStarted { batch, total, size } => {
            spinner.set_message(format!("Painting batch {}/{} ({} images)...", batch, total, size))
        }
        GenerationEvent::Pacing(delay) => spinner.set_message(format!(
            "Waiting {}s for the image service rate limit...",
            delay.as_secs()
        )),
        GenerationEvent::ImageSettled { page, success: false } => {
            spinner.println(format!("Illustration for page {} failed", page + 1))
        }
        GenerationEvent::ImageSettled { .. } => {}
    })
}

fn ask_config(current: &AIServiceConfig) -> Result<AIServiceConfig> {
    let text_service = Select::new(
        "Text service:",
        vec![AIService::OpenAI, AIService::Anthropic, AIService::Google],
    )
    .prompt()?;
    let text_key = ask_key(text_service, &current.text_service)?;

    let image_service =
        Select::new("Image service:", vec![AIService::OpenAI, AIService::Replicate]).prompt()?;
    let image_key = ask_key(image_service, &current.image_service)?;

    Ok(AIServiceConfig {
        text_service: ServiceSelection::new(text_service, text_key),
        image_service: ServiceSelection::new(image_service, image_key),
    })
}

fn ask_key(service: AIService, current: &ServiceSelection) -> Result<String> {
    if current.service == service && current.has_key() {
        return Ok(current.api_key.clone());
    }
    Ok(Password::new(&format!("{} API key:", service))
        .without_confirmation()
        .prompt()?)
}

fn ask_options() -> Result<GenerationOptions> {
    let page_count = CustomType::<u8>::new("Number of pages (1-20):")
        .with_default(5)
        .with_validator(|n: &u8| {
            Ok(if (1..=20).contains(n) {
                inquire::validator::Validation::Valid
            } else {
                inquire::validator::Validation::Invalid("Pick between 1 and 20 pages".into())
            })
        })
        .prompt()?;
    let age_range = Select::new("Age range:", AgeRange::ALL.to_vec())
        .with_starting_cursor(1)
        .prompt()?;
    let theme = Text::new("Theme (optional):").prompt()?;
    let include_images = Confirm::new("Include illustrations?").with_default(true).prompt()?;

    Ok(GenerationOptions {
        page_count,
        age_range,
        include_images,
        theme: Some(theme).filter(|t| !t.trim().is_empty()),
    })
}
