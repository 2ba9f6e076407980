use chrono::{Duration, NaiveDate, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::db::{timestamp, Repository};
use crate::error::Result;
use crate::models::{AnalyticsSummary, DailyCount, NewEvent, Totals};

type HmacSha256 = Hmac<Sha256>;

const TOP_LIMIT: u32 = 5;
const MAX_DAYS: u32 = 365;

#[derive(Clone)]
pub struct Analytics {
    repository: Repository,
    salt: String,
}

impl Analytics {
    pub fn new(repository: Repository, salt: impl Into<String>) -> Self {
        Self {
            repository,
            salt: salt.into(),
        }
    }

    /// Hex HMAC of the client address; this is all that is ever stored.
    pub fn hash_ip(&self, ip: &str) -> Option<String> {
        if ip.is_empty() {
            return None;
        }
        let mut mac = HmacSha256::new_from_slice(self.salt.as_bytes()).ok()?;
        mac.update(ip.as_bytes());
        Some(
            mac.finalize()
                .into_bytes()
                .iter()
                .map(|b| format!("{:02x}", b))
                .collect(),
        )
    }

    pub async fn track(&self, mut event: NewEvent) -> Result<()> {
        let ip_hash = event.ip.take().and_then(|ip| self.hash_ip(&ip));
        self.repository.insert_event(event, ip_hash).await
    }

    /// Rollups over the trailing `days` calendar days, today included. `days` is clamped
    /// to 1..=365.
    pub async fn summary(&self, days: u32) -> Result<AnalyticsSummary> {
        let days = days.clamp(1, MAX_DAYS);
        let start = window_start(Utc::now().date_naive(), days);
        let since = start
            .and_hms_opt(0, 0, 0)
            .map(|naive| timestamp(naive.and_utc()))
            .unwrap_or_default();

        let counts = self.repository.subscriber_counts().await?;
        let daily = self.repository.daily_pageviews(since.clone()).await?;

        Ok(AnalyticsSummary {
            totals: Totals {
                visitors: self.repository.distinct_visitors(since.clone()).await?,
                subscribers: counts.subscribed,
                unsubscribed: counts.unsubscribed,
            },
            sparkline: fill_days(start, days, &daily),
            top_pages: self.repository.top_paths(since.clone(), TOP_LIMIT).await?,
            utm_breakdown: self.repository.utm_breakdown(since, TOP_LIMIT).await?,
        })
    }
}

fn window_start(today: NaiveDate, days: u32) -> NaiveDate {
    today
        .checked_sub_signed(Duration::days(i64::from(days) - 1))
        .unwrap_or(NaiveDate::MIN)
}

/// Exactly `days` entries in ascending order, zero where nothing was recorded.
fn fill_days(start: NaiveDate, days: u32, counts: &[DailyCount]) -> Vec<DailyCount> {
    (0..i64::from(days))
        .map(|offset| {
            let day = (start + Duration::days(offset)).format("%Y-%m-%d").to_string();
            let count = counts
                .iter()
                .find(|c| c.day == day)
                .map(|c| c.count)
                .unwrap_or(0);
            DailyCount { day, count }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Utm;

    fn pageview(path: &str, fp: &str) -> NewEvent {
        NewEvent {
            event: "pageview".into(),
            path: path.into(),
            fp_id: Some(fp.into()),
            ip: Some("203.0.113.7".into()),
            utm: Utm {
                utm_source: Some("newsletter".into()),
                ..Utm::default()
            },
            ..NewEvent::default()
        }
    }

    #[test]
    fn test_fill_days_pads_gaps() {
        let start = NaiveDate::from_ymd_opt(2024, 2, 27).unwrap();
        let counts = vec![DailyCount {
            day: "2024-02-29".into(),
            count: 4,
        }];

        let filled = fill_days(start, 7, &counts);
        assert_eq!(filled.len(), 7);
        assert_eq!(filled[0].day, "2024-02-27");
        assert_eq!(filled[2], DailyCount { day: "2024-02-29".into(), count: 4 });
        assert_eq!(filled[3].day, "2024-03-01");
        assert_eq!(filled.iter().map(|d| d.count).sum::<i64>(), 4);
    }

    #[test]
    fn test_window_start_includes_today() {
        let today = NaiveDate::from_ymd_opt(2024, 1, 7).unwrap();
        assert_eq!(window_start(today, 7), NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        assert_eq!(window_start(today, 1), today);
    }

    #[tokio::test]
    async fn test_summary_over_recorded_events() {
        let repo = Repository::open_in_memory().await.unwrap();
        let analytics = Analytics::new(repo.clone(), "salt");

        analytics.track(pageview("/", "fp-1")).await.unwrap();
        analytics.track(pageview("/", "fp-2")).await.unwrap();
        analytics.track(pageview("/projects", "fp-1")).await.unwrap();

        let summary = analytics.summary(7).await.unwrap();
        assert_eq!(summary.sparkline.len(), 7);
        assert_eq!(summary.sparkline.last().unwrap().count, 3);
        assert!(summary.sparkline.windows(2).all(|w| w[0].day < w[1].day));
        assert_eq!(summary.totals.visitors, 2);
        assert_eq!(summary.top_pages[0].path, "/");
        assert_eq!(summary.top_pages[0].count, 2);
        assert_eq!(summary.utm_breakdown[0].source, "newsletter");
    }

    #[test]
    fn test_window_start_saturates() {
        let today = NaiveDate::from_ymd_opt(2024, 1, 7).unwrap();
        assert_eq!(window_start(today, u32::MAX), NaiveDate::MIN);
    }

    #[tokio::test]
    async fn test_oversized_window_is_clamped() {
        let repo = Repository::open_in_memory().await.unwrap();
        let analytics = Analytics::new(repo, "salt");

        let summary = analytics.summary(u32::MAX).await.unwrap();
        assert_eq!(summary.sparkline.len(), 365);

        let summary = analytics.summary(0).await.unwrap();
        assert_eq!(summary.sparkline.len(), 1);
    }

    #[tokio::test]
    async fn test_raw_ip_is_never_stored() {
        let repo = Repository::open_in_memory().await.unwrap();
        let analytics = Analytics::new(repo.clone(), "salt");
        analytics.track(pageview("/", "fp-1")).await.unwrap();

        let stored: (Option<String>, i64) = repo
            .conn()
            .call(|conn| {
                Ok(conn.query_row(
                    "SELECT ip_hash, (SELECT COUNT(*) FROM events WHERE ip_hash LIKE '%203.0.113%') FROM events",
                    [],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )?)
            })
            .await
            .unwrap();

        assert_eq!(stored.0, analytics.hash_ip("203.0.113.7"));
        assert_eq!(stored.0.unwrap().len(), 64);
        assert_eq!(stored.1, 0);
    }
}
