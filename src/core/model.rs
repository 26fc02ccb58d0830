use crate::error::{StoryError, StoryResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

pub const MIN_PAGES: u8 = 1;
pub const MAX_PAGES: u8 = 20;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum AgeRange {
    #[serde(rename = "3-5")]
    Toddler,
    #[serde(rename = "5-8")]
    EarlyReader,
    #[serde(rename = "8-12")]
    MiddleGrade,
    #[serde(rename = "12+")]
    Teen,
}

impl AgeRange {
    pub const ALL: [AgeRange; 4] = [
        AgeRange::Toddler,
        AgeRange::EarlyReader,
        AgeRange::MiddleGrade,
        AgeRange::Teen,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AgeRange::Toddler => "3-5",
            AgeRange::EarlyReader => "5-8",
            AgeRange::MiddleGrade => "8-12",
            AgeRange::Teen => "12+",
        }
    }
}

impl fmt::Display for AgeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct GenerationOptions {
    pub page_count: u8,
    pub age_range: AgeRange,
    pub include_images: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub theme: Option<String>,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            page_count: 5,
            age_range: AgeRange::EarlyReader,
            include_images: true,
            theme: None,
        }
    }
}

impl GenerationOptions {
    pub fn validate(&self) -> StoryResult<()> {
        if !(MIN_PAGES..=MAX_PAGES).contains(&self.page_count) {
            return Err(StoryError::InvalidOptions(format!(
                "page count must be between {} and {}, got {}",
                MIN_PAGES, MAX_PAGES, self.page_count
            )));
        }
        Ok(())
    }

    /// The theme as it goes into the prompt; blank counts as unset.
    pub fn theme_or_default(&self) -> &str {
        match self.theme.as_deref().map(str::trim) {
            Some(theme) if !theme.is_empty() => theme,
            _ => "none specified",
        }
    }
}

// --- Character sheet ---

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Character {
    pub name: String,
    pub species: String,
    pub role: String,
    pub physical_traits: PhysicalTraits,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outfit: Option<Outfit>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub characterization: Option<Characterization>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PhysicalTraits {
    pub height: String,
    pub build: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub age: Option<String>,
    pub main_color: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub texture: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    pub distinguishing_features: String,
    pub eyes: String,
    pub expression: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub other_features: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Outfit {
    pub clothing: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accessories: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub colors: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Characterization {
    pub default_pose: String,
    pub personality: String,
}

// --- Pages and stories ---

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Page {
    pub content: String,
    /// Scene description used as the tail of the image prompt.
    pub image: String,
    pub characters: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mood: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_of_day: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StoryMetadata {
    #[serde(flatten)]
    pub options: GenerationOptions,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Story {
    pub id: String,
    pub title: String,
    pub metadata: StoryMetadata,
    pub pages: Vec<Page>,
}

impl Story {
    pub fn illustrated_pages(&self) -> usize {
        self.pages.iter().filter(|p| p.image_url.is_some()).count()
    }
}

/// What the text provider must return. Every non-optional field is required.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct StoryDraft {
    pub title: String,
    pub characters: Vec<Character>,
    pub pages: Vec<Page>,
}

impl StoryDraft {
    pub fn from_json(json: &str) -> StoryResult<Self> {
        let mut draft: StoryDraft = serde_json::from_str(json)?;
        // A URL is only ever set by a successful image request.
        for page in &mut draft.pages {
            page.image_url = None;
        }
        Ok(draft)
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn character(name: &str) -> Character {
        Character {
            name: name.to_string(),
            species: "fox".to_string(),
            role: "hero".to_string(),
            physical_traits: PhysicalTraits {
                height: "small".to_string(),
                build: "slender".to_string(),
                age: None,
                main_color: "orange".to_string(),
                texture: None,
                pattern: None,
                distinguishing_features: "white-tipped tail".to_string(),
                eyes: "bright green eyes".to_string(),
                expression: "curious".to_string(),
                other_features: None,
            },
            outfit: None,
            characterization: None,
        }
    }

    pub fn page(content: &str, characters: &[&str]) -> Page {
        Page {
            content: content.to_string(),
            image: format!("scene for {}", content),
            characters: characters.iter().map(|c| c.to_string()).collect(),
            mood: None,
            time_of_day: None,
            image_url: None,
        }
    }

    pub fn draft_json(page_count: usize, character_name: &str) -> String {
        let pages: Vec<serde_json::Value> = (0..page_count)
            .map(|i| {
                serde_json::json!({
                    "content": format!("Page {} text", i + 1),
                    "image": format!("Scene {}", i + 1),
                    "characters": [character_name],
                    "mood": "cheerful"
                })
            })
            .collect();
        serde_json::json!({
            "title": "The Brave Fox",
            "characters": [{
                "name": character_name,
                "species": "fox",
                "role": "protagonist",
                "physicalTraits": {
                    "height": "small",
                    "build": "nimble",
                    "mainColor": "russet orange",
                    "distinguishingFeatures": "a white-tipped tail",
                    "eyes": "amber eyes",
                    "expression": "determined"
                },
                "outfit": { "clothing": "a green scarf" }
            }],
            "pages": pages
        })
        .to_string()
    }
}
