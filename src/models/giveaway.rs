use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::FieldError;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Giveaway {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub rules: Option<String>,
    pub winner_subscriber_id: Option<i64>,
    pub fulfilled_at: Option<DateTime<Utc>>,
    pub fulfillment_notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GiveawayEntry {
    pub id: i64,
    pub giveaway_id: i64,
    pub subscriber_id: i64,
    pub source: Option<String>,
    pub email: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewGiveaway {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub start_date: Option<String>,
    #[serde(default)]
    pub end_date: Option<String>,
    #[serde(default)]
    pub rules: Option<String>,
}

impl NewGiveaway {
    pub fn validate(&self) -> Vec<FieldError> {
        if self.name.trim().is_empty() {
            vec![FieldError::new("name", "Name is required")]
        } else {
            Vec::new()
        }
    }
}
