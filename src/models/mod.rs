/// Closed string enums stored as TEXT columns and exchanged as snake_case JSON.
macro_rules! string_enum {
    ($name:ident, $kind:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
        pub enum $name {
            $(#[serde(rename = $text)] $variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = $crate::models::ParseEnumError;

            fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err($crate::models::ParseEnumError {
                        kind: $kind,
                        value: other.to_string(),
                    }),
                }
            }
        }

        impl rusqlite::types::ToSql for $name {
            fn to_sql(&self) -> rusqlite::Result<rusqlite::types::ToSqlOutput<'_>> {
                Ok(self.as_str().into())
            }
        }

        impl rusqlite::types::FromSql for $name {
            fn column_result(
                value: rusqlite::types::ValueRef<'_>,
            ) -> rusqlite::types::FromSqlResult<Self> {
                value
                    .as_str()?
                    .parse()
                    .map_err(|e| rusqlite::types::FromSqlError::Other(Box::new(e)))
            }
        }
    };
}

mod analytics;
mod campaign;
mod giveaway;
mod item;
mod setting;
mod subscriber;
mod summary;

pub use analytics::{AnalyticsSummary, DailyCount, NewEvent, PathCount, SourceCount, Totals};
pub use campaign::{
    Campaign, CampaignRecipient, CampaignStatus, MailEvent, NewCampaign, RecipientStatus,
    SendFilters, SendReport,
};
pub use giveaway::{Giveaway, GiveawayEntry, NewGiveaway};
pub use item::{Item, ItemPatch, ItemQuery, ItemType, NewItem, SyncedItem, TagsInput};
pub(crate) use item::flexible_bool;
pub use setting::{parse_settings_update, Essay, FeatureLink, SettingValue, SiteSettings};
pub use subscriber::{normalize_email, Subscriber, SubscriberUpsert, Utm};
pub use summary::{SummarizationLogEntry, SummaryOutcome, SyncError, SyncStats};

/// Returned when a stored or submitted string does not name a known variant.
#[derive(Debug, Clone, thiserror::Error)]
#[error("unknown {kind}: {value}")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

/// Split a comma separated tag string into trimmed, non-empty tags.
pub fn split_tags(csv: &str) -> Vec<String> {
    csv.split(',')
        .map(|tag| tag.trim())
        .filter(|tag| !tag.is_empty())
        .map(|tag| tag.to_string())
        .collect()
}

/// Set union preserving first-seen order.
pub fn merge_tags<'a, I>(lists: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let mut merged: Vec<String> = Vec::new();
    for list in lists {
        for tag in list.split([',', ';']) {
            let tag = tag.trim();
            if !tag.is_empty() && !merged.iter().any(|t| t == tag) {
                merged.push(tag.to_string());
            }
        }
    }
    merged.join(",")
}
