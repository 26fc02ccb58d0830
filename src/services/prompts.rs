use crate::core::model::{Character, GenerationOptions, Page};
use crate::services::image::ImagePrompt;

pub const BASE_STYLE: &str = "Digital art in the style of modern children's book illustrations, soft colors, detailed but not overly complex";

pub const QUALITY_REQUIREMENTS: &str =
    "highly detailed, masterpiece, professional, high quality, sharp focus";

pub const NEGATIVE_PROMPT: &str = "low quality, blurry, distorted, disfigured, bad anatomy, inconsistent style, photorealistic, out of character designs, incorrect species features";

pub const DEFAULT_MOOD: &str = "neutral";
pub const DEFAULT_TIME_OF_DAY: &str = "daytime";

const SYSTEM_TEMPLATE: &str = r#"You are a creative storyteller who writes engaging children's stories.
Your task is to write stories that are:
- Age-appropriate and engaging
- Well-structured with natural page breaks
- Clear and easy to understand
- Educational and entertaining

Before writing the story, you must first create detailed character descriptions that will be used consistently throughout the story. For each character, include:
- Name and role in the story
- Physical appearance (height, build, distinguishing features)
- Clothing style and typical outfit
- Facial features and expressions
- Any accessories or props they commonly use

When writing the story and image prompts:
1. Always reference the character descriptions exactly as established, paying close attention to the character's species, physical traits, and outfit.
2. Maintain consistent scale and proportions between characters
3. Keep clothing and accessories consistent unless the story specifically mentions changes
4. Use the same art style descriptors for all images

For visual consistency, every image prompt must:
1. Start with the base style: "{base_style}"
2. Include specific character details from the character sheet
3. Describe the exact camera angle and composition
4. Specify lighting and atmosphere
5. Include environmental details that remain consistent throughout the story

Respond with a single JSON object and nothing else. It must have exactly this shape:
{schema}"#;

const STORY_SCHEMA: &str = r#"{
  "title": string,
  "characters": [
    {
      "name": string,                      // the name of the character
      "species": string,                   // the species of the character
      "role": string,                      // the role of the character in the story
      "physicalTraits": {
        "height": string,
        "build": string,
        "age": string (optional),
        "mainColor": string,
        "texture": string (optional),
        "pattern": string (optional),
        "distinguishingFeatures": string,
        "eyes": string,
        "expression": string,
        "otherFeatures": string (optional)
      },
      "outfit": {                          // optional
        "clothing": string,
        "accessories": string (optional),
        "colors": string (optional)
      },
      "characterization": {                // optional
        "defaultPose": string,
        "personality": string
      }
    }
  ],
  "pages": [
    {
      "content": string,                   // the text of the page
      "image": string,                     // the image prompt for the page
      "characters": [string],              // names of the characters in the scene, as in the character sheet
      "mood": string (optional),
      "timeOfDay": string (optional)
    }
  ]
}"#;

const USER_TEMPLATE: &str = r#"Write a {page_count} page story suitable for ages {age_range}.
The story should be about: {prompt}
Theme: {theme}

Make sure each page's content is appropriate in length for a children's book page, given the age range.
For example, older audiences should get a couple paragraphs per page, while younger audiences might do better with a short single paragraph per page.
The tone and complexity should also reflect the age range.
First, provide a detailed character sheet for all main characters.
Then, for each page's image prompt:
1. Start with the base art style
2. Include relevant character details from the character sheet, paying close attention to the character's species, physical traits, and outfit.
3. Describe the specific scene composition, camera angle, and lighting
4. Maintain consistency with previous scenes
The "pages" array must contain exactly {page_count} entries."#;

pub fn system_prompt() -> String {
    SYSTEM_TEMPLATE
        .replace("{base_style}", BASE_STYLE)
        .replace("{schema}", STORY_SCHEMA)
}

pub fn user_prompt(prompt: &str, options: &GenerationOptions) -> String {
    USER_TEMPLATE
        .replace("{page_count}", &options.page_count.to_string())
        .replace("{age_range}", options.age_range.as_str())
        .replace("{theme}", options.theme_or_default())
        .replace("{prompt}", prompt.trim())
}

fn non_empty(s: &str) -> Option<&str> {
    let s = s.trim();
    (!s.is_empty()).then_some(s)
}

/// One line of appearance for a character, e.g.
/// `Finn (fox): small, slender build, orange, white-tipped tail. green eyes, curious expression`.
pub fn describe_character(character: &Character) -> String {
    let traits = &character.physical_traits;

    let color = match traits.pattern.as_deref().and_then(non_empty) {
        Some(pattern) => format!("{} with {}", traits.main_color, pattern),
        None => traits.main_color.clone(),
    };
    let physical: Vec<String> = [
        traits.age.as_deref().and_then(non_empty).map(str::to_string),
        non_empty(&traits.height).map(str::to_string),
        non_empty(&traits.build).map(|b| format!("{} build", b)),
        non_empty(&color).map(str::to_string),
        traits.texture.as_deref().and_then(non_empty).map(|t| format!("{} texture", t)),
        non_empty(&traits.distinguishing_features).map(str::to_string),
        traits.other_features.as_deref().and_then(non_empty).map(str::to_string),
    ]
    .into_iter()
    .flatten()
    .collect();

    let mut description = format!(
        "{} ({}): {}. {}, {} expression",
        character.name,
        character.species,
        physical.join(", "),
        traits.eyes,
        traits.expression
    );

    if let Some(outfit) = &character.outfit {
        description.push_str(&format!(", wearing {}", outfit.clothing));
        if let Some(accessories) = outfit.accessories.as_deref().and_then(non_empty) {
            description.push_str(&format!(" with {}", accessories));
        }
        if let Some(colors) = outfit.colors.as_deref().and_then(non_empty) {
            description.push_str(&format!(" in {}", colors));
        }
    }

    if let Some(c) = &character.characterization {
        description.push_str(&format!(". {}, {}", c.default_pose, c.personality));
    }

    description
}

/// Descriptions for the characters named on a page, in page order.
/// Names missing from the sheet are skipped.
pub fn describe_scene_characters(names: &[String], sheet: &[Character]) -> String {
    names
        .iter()
        .filter_map(|name| sheet.iter().find(|c| &c.name == name))
        .map(describe_character)
        .collect::<Vec<_>>()
        .join(".\n")
}

pub fn compose_image_prompt(page: &Page, sheet: &[Character]) -> ImagePrompt {
    let characters = describe_scene_characters(&page.characters, sheet);
    let mood = page.mood.as_deref().and_then(non_empty).unwrap_or(DEFAULT_MOOD);
    let time_of_day = page
        .time_of_day
        .as_deref()
        .and_then(non_empty)
        .unwrap_or(DEFAULT_TIME_OF_DAY);

    let prompt = format!(
        "{BASE_STYLE}.\n\n\
         Characters in scene:\n{characters}\n\n\
         Scene mood: {mood}\n\
         Time of day: {time_of_day}\n\n\
         Quality requirements: {QUALITY_REQUIREMENTS}.\n\
         Negative prompt: {NEGATIVE_PROMPT}.\n\n\
         Scene description: {scene}",
        scene = page.image
    );

    ImagePrompt {
        prompt,
        negative_prompt: NEGATIVE_PROMPT.to_string(),
    }
}
