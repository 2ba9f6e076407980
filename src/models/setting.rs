use std::collections::{BTreeMap, HashMap};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::FieldError;

/// Settings the admin console may write. Anything else is rejected.
pub const KNOWN_KEYS: &[&str] = &[
    "site.title",
    "site.description",
    "site.hero_heading",
    "site.hero_subheading",
    "site.hero_cta_text",
    "site.hero_paragraphs",
    "site.hero_image_path",
    "site.hero_image_alt",
    "site.about_html",
    "site.about_long_html",
    "site.appeared_on",
    "site.recent_essays",
    "site.newsletter_embed_url",
    "site.about_help_cards",
    "site.social_links",
    "integrations.github_user",
    "integrations.youtube_channel_id",
    "integrations.substack_feed_url",
    "integrations.summarizer_model",
    "mailgun.domain",
    "mailgun.from",
    "mailgun.base_url",
];

pub const REQUIRED_KEYS: &[&str] = &[
    "site.title",
    "site.description",
    "site.hero_heading",
    "site.hero_subheading",
    "site.hero_cta_text",
];

/// Keys whose values are structured and stored as JSON.
pub const JSON_KEYS: &[&str] = &[
    "site.hero_paragraphs",
    "site.appeared_on",
    "site.recent_essays",
    "site.about_help_cards",
    "site.social_links",
];

/// A stored setting value, tagged at the schema level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum SettingValue {
    Text(String),
    Json(Value),
}

impl SettingValue {
    pub fn kind(&self) -> &'static str {
        match self {
            SettingValue::Text(_) => "text",
            SettingValue::Json(_) => "json",
        }
    }

    /// The column representation: raw text, or serialized JSON.
    pub fn to_column(&self) -> String {
        match self {
            SettingValue::Text(text) => text.clone(),
            SettingValue::Json(value) => value.to_string(),
        }
    }

    pub fn from_column(kind: &str, raw: String) -> Self {
        if kind == "json" {
            match serde_json::from_str(&raw) {
                Ok(value) => SettingValue::Json(value),
                Err(e) => {
                    tracing::warn!("Stored JSON setting is not valid JSON: {}", e);
                    SettingValue::Text(raw)
                }
            }
        } else {
            SettingValue::Text(raw)
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            SettingValue::Text(text) => Some(text),
            SettingValue::Json(_) => None,
        }
    }

    /// Decodes structured values. Plain text holding JSON (legacy rows) is decoded too.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        match self {
            SettingValue::Json(value) => serde_json::from_value(value.clone()),
            SettingValue::Text(text) => serde_json::from_str(text),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FeatureLink {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub alt: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Essay {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub url: String,
}

/// Typed view over the settings table, built once per request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SiteSettings {
    pub title: String,
    pub description: String,
    pub hero_heading: String,
    pub hero_subheading: String,
    pub hero_cta_text: String,
    pub hero_paragraphs: Vec<String>,
    pub hero_image_path: String,
    pub hero_image_alt: String,
    pub about_html: String,
    pub about_long_html: String,
    pub appeared_on: Vec<FeatureLink>,
    pub recent_essays: Vec<Essay>,
    pub newsletter_embed_url: String,
    pub about_help_cards: Vec<Value>,
    pub social_links: Vec<Value>,
    pub github_user: Option<String>,
    pub youtube_channel_id: Option<String>,
    pub substack_feed_url: Option<String>,
    pub summarizer_model: Option<String>,
    pub mailgun_domain: Option<String>,
    pub mailgun_from: Option<String>,
    pub mailgun_base_url: Option<String>,
}

impl SiteSettings {
    pub fn from_map(map: &HashMap<String, SettingValue>) -> Self {
        let text = |key: &str, default: &str| -> String {
            map.get(key)
                .and_then(|v| v.as_text())
                .filter(|v| !v.trim().is_empty())
                .unwrap_or(default)
                .to_string()
        };
        let optional = |key: &str| -> Option<String> {
            map.get(key)
                .and_then(|v| v.as_text())
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        Self {
            title: text("site.title", "Personal Hub"),
            description: text("site.description", ""),
            hero_heading: text("site.hero_heading", "Hi, welcome."),
            hero_subheading: text("site.hero_subheading", ""),
            hero_cta_text: text("site.hero_cta_text", "Read the latest"),
            hero_paragraphs: json_or_default(map, "site.hero_paragraphs"),
            hero_image_path: text("site.hero_image_path", "/images/hero.png"),
            hero_image_alt: text("site.hero_image_alt", ""),
            about_html: text("site.about_html", ""),
            about_long_html: text("site.about_long_html", ""),
            appeared_on: json_or_default(map, "site.appeared_on"),
            recent_essays: json_or_default(map, "site.recent_essays"),
            newsletter_embed_url: text("site.newsletter_embed_url", ""),
            about_help_cards: json_or_default(map, "site.about_help_cards"),
            social_links: json_or_default(map, "site.social_links"),
            github_user: optional("integrations.github_user"),
            youtube_channel_id: optional("integrations.youtube_channel_id"),
            substack_feed_url: optional("integrations.substack_feed_url"),
            summarizer_model: optional("integrations.summarizer_model"),
            mailgun_domain: optional("mailgun.domain"),
            mailgun_from: optional("mailgun.from"),
            mailgun_base_url: optional("mailgun.base_url"),
        }
    }
}

fn json_or_default<T: DeserializeOwned + Default>(map: &HashMap<String, SettingValue>, key: &str) -> T {
    match map.get(key) {
        None => T::default(),
        Some(SettingValue::Text(text)) if text.trim().is_empty() => T::default(),
        Some(value) => value.decode().unwrap_or_else(|e| {
            tracing::warn!("Failed to parse JSON setting {}: {}", key, e);
            T::default()
        }),
    }
}

/// Validate an admin settings payload into typed values.
///
/// Values may be JSON strings, or for structured keys the structure itself.
pub fn parse_settings_update(
    payload: BTreeMap<String, Value>,
) -> Result<Vec<(String, SettingValue)>, Vec<FieldError>> {
    let mut errors = Vec::new();
    let mut updates = Vec::new();

    for required in REQUIRED_KEYS {
        let present = payload
            .get(*required)
            .and_then(|v| v.as_str())
            .map(|v| !v.trim().is_empty())
            .unwrap_or(false);
        if !present {
            errors.push(FieldError::new(*required, "Required"));
        }
    }

    for (key, value) in payload {
        if !KNOWN_KEYS.contains(&key.as_str()) {
            errors.push(FieldError::new(key, "Unknown setting"));
            continue;
        }
        if value.is_null() {
            continue;
        }

        if JSON_KEYS.contains(&key.as_str()) {
            let parsed = match value {
                Value::String(raw) if raw.trim().is_empty() => Ok(Value::Array(Vec::new())),
                Value::String(raw) => serde_json::from_str::<Value>(&raw),
                other => Ok(other),
            };
            match parsed {
                Ok(json) => updates.push((key, SettingValue::Json(json))),
                Err(e) => errors.push(FieldError::new(key, format!("Invalid JSON: {}", e))),
            }
        } else {
            match value {
                Value::String(text) => updates.push((key, SettingValue::Text(text))),
                _ => errors.push(FieldError::new(key, "Expected a string")),
            }
        }
    }

    if errors.is_empty() {
        Ok(updates)
    } else {
        Err(errors)
    }
}
