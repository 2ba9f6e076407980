use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::FieldError;

string_enum!(ItemType, "item type", {
    Github => "github",
    Youtube => "youtube",
    Substack => "substack",
    Product => "product",
    App => "app",
    Feature => "feature",
    XPost => "x_post",
    LinkedinPost => "linkedin_post",
});

impl ItemType {
    /// Types whose rows come from a remote feed and are keyed by (type, source_url).
    pub fn is_synced(&self) -> bool {
        matches!(self, ItemType::Github | ItemType::Youtube | ItemType::Substack)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Item {
    pub id: i64,
    #[serde(rename = "type")]
    pub item_type: ItemType,
    pub source_id: Option<String>,
    pub source_url: String,
    pub title: String,
    pub description: Option<String>,
    pub blurb: Option<String>,
    pub image_url: Option<String>,
    pub embed_html: Option<String>,
    pub tags: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub featured: bool,
    pub visible: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Tags arrive either as a JSON array or as an already comma-joined string.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum TagsInput {
    List(Vec<String>),
    Csv(String),
}

impl TagsInput {
    pub fn to_csv(&self) -> String {
        match self {
            TagsInput::List(tags) => tags
                .iter()
                .map(|t| t.trim())
                .filter(|t| !t.is_empty())
                .collect::<Vec<_>>()
                .join(","),
            TagsInput::Csv(csv) => csv.clone(),
        }
    }

    pub fn into_vec(self) -> Vec<String> {
        match self {
            TagsInput::List(tags) => tags
                .into_iter()
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .collect(),
            TagsInput::Csv(csv) => super::split_tags(&csv),
        }
    }
}

/// Admin-created item. Missing `visible` defaults to true, missing `published_at` to now.
#[derive(Debug, Clone, Deserialize)]
pub struct NewItem {
    #[serde(rename = "type")]
    pub item_type: ItemType,
    #[serde(default)]
    pub source_id: Option<String>,
    #[serde(default)]
    pub source_url: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub blurb: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub embed_html: Option<String>,
    #[serde(default)]
    pub tags: Option<TagsInput>,
    #[serde(default)]
    pub published_at: Option<String>,
    #[serde(default, deserialize_with = "flexible_bool")]
    pub featured: Option<bool>,
    #[serde(default, deserialize_with = "flexible_bool")]
    pub visible: Option<bool>,
}

impl NewItem {
    pub fn validate(&self) -> Vec<FieldError> {
        let mut errors = Vec::new();
        if self.title.trim().is_empty() {
            errors.push(FieldError::new("title", "Title is required"));
        }
        if self.source_url.trim().is_empty() {
            errors.push(FieldError::new("source_url", "Source URL is required"));
        }
        if let Some(published) = &self.published_at {
            if crate::db::parse_datetime(published).is_none() {
                errors.push(FieldError::new("published_at", "Unrecognised date"));
            }
        }
        errors
    }
}

/// Partial update; `None` leaves the column untouched.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ItemPatch {
    #[serde(default, rename = "type")]
    pub item_type: Option<ItemType>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub blurb: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub embed_html: Option<String>,
    #[serde(default)]
    pub tags: Option<TagsInput>,
    #[serde(default)]
    pub published_at: Option<String>,
    #[serde(default, deserialize_with = "flexible_bool")]
    pub featured: Option<bool>,
    #[serde(default, deserialize_with = "flexible_bool")]
    pub visible: Option<bool>,
    #[serde(default)]
    pub source_url: Option<String>,
}

impl ItemPatch {
    pub fn validate(&self) -> Vec<FieldError> {
        let mut errors = Vec::new();
        if matches!(&self.title, Some(t) if t.trim().is_empty()) {
            errors.push(FieldError::new("title", "Title cannot be empty"));
        }
        if matches!(&self.source_url, Some(u) if u.trim().is_empty()) {
            errors.push(FieldError::new("source_url", "Source URL cannot be empty"));
        }
        if let Some(published) = &self.published_at {
            if crate::db::parse_datetime(published).is_none() {
                errors.push(FieldError::new("published_at", "Unrecognised date"));
            }
        }
        errors
    }

    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.blurb.is_none()
            && self.image_url.is_none()
            && self.embed_html.is_none()
            && self.tags.is_none()
            && self.published_at.is_none()
            && self.featured.is_none()
            && self.visible.is_none()
            && self.source_url.is_none()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ItemQuery {
    pub featured_only: bool,
    pub include_hidden: bool,
    pub limit: Option<u32>,
}

impl ItemQuery {
    pub fn limit(limit: u32) -> Self {
        Self {
            limit: Some(limit),
            ..Self::default()
        }
    }

    pub fn featured(limit: u32) -> Self {
        Self {
            featured_only: true,
            limit: Some(limit),
            ..Self::default()
        }
    }

    pub fn all_including_hidden() -> Self {
        Self {
            include_hidden: true,
            ..Self::default()
        }
    }
}

/// A remote record normalised into item shape, ready for upsert by (type, source_url).
#[derive(Debug, Clone, PartialEq)]
pub struct SyncedItem {
    pub item_type: ItemType,
    pub source_id: Option<String>,
    pub source_url: String,
    pub title: String,
    pub description: Option<String>,
    /// Only written when the row is first inserted.
    pub blurb: Option<String>,
    pub image_url: Option<String>,
    pub embed_html: Option<String>,
    pub tags: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
}

/// Accepts `true`/`false` as booleans or as the strings HTML forms submit.
pub(crate) fn flexible_bool<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum BoolOrString {
        Bool(bool),
        Text(String),
    }

    Ok(
        match Option::<BoolOrString>::deserialize(deserializer)? {
            None => None,
            Some(BoolOrString::Bool(b)) => Some(b),
            Some(BoolOrString::Text(s)) => Some(!matches!(
                s.trim().to_ascii_lowercase().as_str(),
                "false" | "0" | "off" | "no" | ""
            )),
        },
    )
}
