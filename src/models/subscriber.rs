use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// UTM attribution captured at signup or on a tracked event.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Utm {
    #[serde(default)]
    pub utm_source: Option<String>,
    #[serde(default)]
    pub utm_medium: Option<String>,
    #[serde(default)]
    pub utm_campaign: Option<String>,
    #[serde(default)]
    pub utm_content: Option<String>,
    #[serde(default)]
    pub utm_term: Option<String>,
}

impl Utm {
    /// Blank strings are treated as absent.
    pub fn normalized(self) -> Self {
        fn clean(value: Option<String>) -> Option<String> {
            value
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        }
        Self {
            utm_source: clean(self.utm_source),
            utm_medium: clean(self.utm_medium),
            utm_campaign: clean(self.utm_campaign),
            utm_content: clean(self.utm_content),
            utm_term: clean(self.utm_term),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Subscriber {
    pub id: i64,
    pub email: String,
    pub name: Option<String>,
    pub source: Option<String>,
    pub tags: String,
    #[serde(flatten)]
    pub utm: Utm,
    pub referer_at_signup: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_seen_at: Option<DateTime<Utc>>,
    pub verified_at: Option<DateTime<Utc>>,
    pub unsubscribed_at: Option<DateTime<Utc>>,
}

impl Subscriber {
    pub fn tag_list(&self) -> Vec<String> {
        super::split_tags(&self.tags)
    }

    pub fn is_subscribed(&self) -> bool {
        self.unsubscribed_at.is_none()
    }
}

#[derive(Debug, Clone, Default)]
pub struct SubscriberUpsert {
    pub email: String,
    pub name: Option<String>,
    pub source: String,
    pub tags: Vec<String>,
    pub utm: Utm,
    pub referer: Option<String>,
}

/// Trimmed, lowercased email, or `None` when nothing is left.
pub fn normalize_email(email: &str) -> Option<String> {
    let normalized = email.trim().to_lowercase();
    (!normalized.is_empty()).then_some(normalized)
}
