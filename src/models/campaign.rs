use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::FieldError;

string_enum!(CampaignStatus, "campaign status", {
    Draft => "draft",
    Sending => "sending",
    Sent => "sent",
});

string_enum!(RecipientStatus, "recipient status", {
    Queued => "queued",
    Sent => "sent",
    Opened => "opened",
    Clicked => "clicked",
    Bounced => "bounced",
    Complained => "complained",
    Unsubscribed => "unsubscribed",
    Failed => "failed",
});

impl RecipientStatus {
    /// Recipient status for a provider webhook event name; `None` leaves the status alone.
    pub fn from_mail_event(event: &str) -> Option<Self> {
        match event {
            "delivered" | "accepted" => Some(RecipientStatus::Sent),
            "opened" => Some(RecipientStatus::Opened),
            "clicked" => Some(RecipientStatus::Clicked),
            "bounced" | "failed" => Some(RecipientStatus::Bounced),
            "complained" => Some(RecipientStatus::Complained),
            "unsubscribed" => Some(RecipientStatus::Unsubscribed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Campaign {
    pub id: i64,
    pub name: String,
    pub subject: String,
    pub html_body: String,
    pub text_body: Option<String>,
    pub status: CampaignStatus,
    pub scheduled_for: Option<String>,
    pub sent_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewCampaign {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub html_body: String,
    #[serde(default)]
    pub text_body: Option<String>,
    #[serde(default)]
    pub scheduled_for: Option<String>,
}

impl NewCampaign {
    pub fn validate(&self) -> Vec<FieldError> {
        let mut errors = Vec::new();
        for (field, value) in [
            ("name", &self.name),
            ("subject", &self.subject),
            ("html_body", &self.html_body),
        ] {
            if value.trim().is_empty() {
                errors.push(FieldError::new(field, format!("{} is required", field)));
            }
        }
        errors
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CampaignRecipient {
    pub id: i64,
    pub campaign_id: i64,
    pub subscriber_id: i64,
    pub status: RecipientStatus,
    pub message_id: Option<String>,
    pub error: Option<String>,
    pub opened_at: Option<DateTime<Utc>>,
    pub clicked_at: Option<DateTime<Utc>>,
    pub bounced_at: Option<DateTime<Utc>>,
    pub complained_at: Option<DateTime<Utc>>,
    pub unsubscribed_at: Option<DateTime<Utc>>,
    pub last_event_at: Option<DateTime<Utc>>,
}

/// Comma separated include/exclude tag lists chosen when sending.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SendFilters {
    #[serde(default)]
    pub tag_include: Option<String>,
    #[serde(default)]
    pub tag_exclude: Option<String>,
}

impl SendFilters {
    /// Must carry every include tag and none of the exclude tags.
    pub fn matches(&self, tags: &[String]) -> bool {
        let include = self.tag_include.as_deref().map(super::split_tags).unwrap_or_default();
        let exclude = self.tag_exclude.as_deref().map(super::split_tags).unwrap_or_default();

        include.iter().all(|tag| tags.contains(tag)) && !exclude.iter().any(|tag| tags.contains(tag))
    }
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct SendReport {
    pub sent: usize,
    pub failed: usize,
}

/// A provider webhook normalised from either the nested or the legacy flat shape.
#[derive(Debug, Clone, PartialEq)]
pub struct MailEvent {
    pub event: String,
    pub email: Option<String>,
    pub message_id: Option<String>,
    pub campaign_id: Option<String>,
    pub timestamp: Option<String>,
    pub payload: Value,
}
