use serde::{Deserialize, Serialize};

use super::Utm;

/// One tracked event before hashing; `ip` never reaches the database.
#[derive(Debug, Clone, Default)]
pub struct NewEvent {
    pub event: String,
    pub path: String,
    pub referer: Option<String>,
    pub utm: Utm,
    pub fp_id: Option<String>,
    pub ip: Option<String>,
    pub ua: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DailyCount {
    pub day: String,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PathCount {
    pub path: String,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SourceCount {
    pub source: String,
    pub count: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Totals {
    pub visitors: i64,
    pub subscribers: i64,
    pub unsubscribed: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsSummary {
    pub totals: Totals,
    pub sparkline: Vec<DailyCount>,
    pub top_pages: Vec<PathCount>,
    pub utm_breakdown: Vec<SourceCount>,
}
