use rusqlite::params;

use crate::error::Result;
use crate::models::{DailyCount, NewEvent, PathCount, SourceCount};

use super::{now_timestamp, Repository};

impl Repository {
    /// Append one analytics row. The caller hashes the IP; the raw address is never written.
    pub async fn insert_event(&self, event: NewEvent, ip_hash: Option<String>) -> Result<()> {
        self.conn()
            .call(move |conn| {
                let utm = event.utm.normalized();
                conn.execute(
                    r#"INSERT INTO events (event, path, referer, utm_source, utm_medium, utm_campaign,
                                           utm_content, utm_term, fp_id, ip_hash, ua, ts)
                       VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)"#,
                    params![
                        event.event,
                        event.path,
                        event.referer.filter(|r| !r.is_empty()),
                        utm.utm_source,
                        utm.utm_medium,
                        utm.utm_campaign,
                        utm.utm_content,
                        utm.utm_term,
                        event.fp_id.filter(|f| !f.is_empty()),
                        ip_hash,
                        event.ua.filter(|u| !u.is_empty()),
                        now_timestamp(),
                    ],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    /// Pageviews per day since `since`, only for days that have any.
    pub async fn daily_pageviews(&self, since: String) -> Result<Vec<DailyCount>> {
        let rows = self
            .conn()
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    r#"SELECT strftime('%Y-%m-%d', ts) AS day, COUNT(*)
                       FROM events
                       WHERE ts >= ?1 AND event = 'pageview'
                       GROUP BY day
                       ORDER BY day ASC"#,
                )?;
                let rows = stmt
                    .query_map(params![since], |row| {
                        Ok(DailyCount {
                            day: row.get(0)?,
                            count: row.get(1)?,
                        })
                    })?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await?;
        Ok(rows)
    }

    pub async fn top_paths(&self, since: String, limit: u32) -> Result<Vec<PathCount>> {
        let rows = self
            .conn()
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    r#"SELECT path, COUNT(*) AS count
                       FROM events
                       WHERE ts >= ?1 AND event = 'pageview'
                       GROUP BY path
                       ORDER BY count DESC, path ASC
                       LIMIT ?2"#,
                )?;
                let rows = stmt
                    .query_map(params![since, limit], |row| {
                        Ok(PathCount {
                            path: row.get(0)?,
                            count: row.get(1)?,
                        })
                    })?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await?;
        Ok(rows)
    }

    /// Pageviews grouped by `utm_source`, unattributed traffic bucketed as `direct`.
    pub async fn utm_breakdown(&self, since: String, limit: u32) -> Result<Vec<SourceCount>> {
        let rows = self
            .conn()
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    r#"SELECT COALESCE(utm_source, 'direct') AS source, COUNT(*) AS count
                       FROM events
                       WHERE ts >= ?1 AND event = 'pageview'
                       GROUP BY source
                       ORDER BY count DESC, source ASC
                       LIMIT ?2"#,
                )?;
                let rows = stmt
                    .query_map(params![since, limit], |row| {
                        Ok(SourceCount {
                            source: row.get(0)?,
                            count: row.get(1)?,
                        })
                    })?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await?;
        Ok(rows)
    }

    pub async fn distinct_visitors(&self, since: String) -> Result<i64> {
        let count = self
            .conn()
            .call(move |conn| {
                let count = conn.query_row(
                    r#"SELECT COUNT(DISTINCT fp_id) FROM events
                       WHERE ts >= ?1 AND event = 'pageview'"#,
                    params![since],
                    |row| row.get(0),
                )?;
                Ok(count)
            })
            .await?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Utm;

    fn pageview(path: &str, fp: &str, source: Option<&str>) -> NewEvent {
        NewEvent {
            event: "pageview".into(),
            path: path.into(),
            fp_id: Some(fp.into()),
            utm: Utm {
                utm_source: source.map(|s| s.to_string()),
                ..Utm::default()
            },
            ..NewEvent::default()
        }
    }

    #[tokio::test]
    async fn test_aggregates_ignore_other_events() {
        let repo = Repository::open_in_memory().await.unwrap();
        repo.insert_event(pageview("/", "a", None), Some("hash".into())).await.unwrap();
        repo.insert_event(pageview("/", "b", Some("newsletter")), None).await.unwrap();
        repo.insert_event(pageview("/about", "a", Some("")), None).await.unwrap();
        repo.insert_event(
            NewEvent {
                event: "click".into(),
                path: "/".into(),
                ..NewEvent::default()
            },
            None,
        )
        .await
        .unwrap();

        let since = "2000-01-01 00:00:00".to_string();
        let top = repo.top_paths(since.clone(), 5).await.unwrap();
        assert_eq!(top[0], PathCount { path: "/".into(), count: 2 });

        let sources = repo.utm_breakdown(since.clone(), 5).await.unwrap();
        assert_eq!(sources[0], SourceCount { source: "direct".into(), count: 2 });
        assert_eq!(sources[1].source, "newsletter");

        assert_eq!(repo.distinct_visitors(since.clone()).await.unwrap(), 2);
        let days = repo.daily_pageviews(since).await.unwrap();
        assert_eq!(days.len(), 1);
        assert_eq!(days[0].count, 3);
    }
}
