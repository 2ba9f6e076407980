use chrono::{DateTime, Utc};
use rusqlite::{params, Connection as SqliteConnection, OptionalExtension, Row};
use serde::Serialize;

use crate::error::{AppError, Result};
use crate::models::{merge_tags, normalize_email, Subscriber, SubscriberUpsert, Utm};

use super::repository::{optional_datetime, required_datetime};
use super::{now_timestamp, timestamp, Repository};

const SUBSCRIBER_COLUMNS: &str = "id, email, name, source, tags, utm_source, utm_medium, utm_campaign, \
     utm_content, utm_term, referer_at_signup, created_at, last_seen_at, verified_at, unsubscribed_at";

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct SubscriberCounts {
    pub total: i64,
    pub subscribed: i64,
    pub unsubscribed: i64,
}

impl Repository {
    pub async fn get_subscriber_by_email(&self, email: &str) -> Result<Option<Subscriber>> {
        let Some(email) = normalize_email(email) else {
            return Ok(None);
        };
        let subscriber = self
            .conn()
            .call(move |conn| Ok(find_subscriber(conn, &email)?))
            .await?;
        Ok(subscriber)
    }

    pub async fn get_subscriber(&self, id: i64) -> Result<Option<Subscriber>> {
        let subscriber = self
            .conn()
            .call(move |conn| {
                let subscriber = conn
                    .query_row(
                        &format!("SELECT {} FROM subscribers WHERE id = ?1", SUBSCRIBER_COLUMNS),
                        params![id],
                        subscriber_from_row,
                    )
                    .optional()?;
                Ok(subscriber)
            })
            .await?;
        Ok(subscriber)
    }

    /// Insert or merge by case-insensitive email.
    ///
    /// On an existing row tags are unioned, name/referer/utm are only filled when provided,
    /// `source` and `created_at` are kept and `last_seen_at` is refreshed.
    pub async fn upsert_subscriber(&self, upsert: SubscriberUpsert) -> Result<Subscriber> {
        let email = normalize_email(&upsert.email).ok_or_else(|| {
            AppError::validation(
                "Email is required",
                vec![crate::error::FieldError::new("email", "Email is required")],
            )
        })?;

        let subscriber = self
            .conn()
            .call(move |conn| {
                let tx = conn.transaction()?;
                let now = now_timestamp();
                let utm = upsert.utm.normalized();
                let name = upsert.name.filter(|n| !n.trim().is_empty());
                let referer = upsert.referer.filter(|r| !r.trim().is_empty());
                let incoming = upsert.tags.join(",");

                match find_subscriber(&tx, &email)? {
                    Some(existing) => {
                        let tags = merge_tags([existing.tags.as_str(), incoming.as_str()]);
                        tx.execute(
                            r#"UPDATE subscribers
                               SET name = COALESCE(?1, name),
                                   source = COALESCE(source, ?2),
                                   tags = ?3,
                                   referer_at_signup = COALESCE(?4, referer_at_signup),
                                   utm_source = COALESCE(?5, utm_source),
                                   utm_medium = COALESCE(?6, utm_medium),
                                   utm_campaign = COALESCE(?7, utm_campaign),
                                   utm_content = COALESCE(?8, utm_content),
                                   utm_term = COALESCE(?9, utm_term),
                                   last_seen_at = ?10
                               WHERE id = ?11"#,
                            params![
                                name,
                                upsert.source,
                                tags,
                                referer,
                                utm.utm_source,
                                utm.utm_medium,
                                utm.utm_campaign,
                                utm.utm_content,
                                utm.utm_term,
                                now,
                                existing.id,
                            ],
                        )?;
                    }
                    None => {
                        tx.execute(
                            r#"INSERT INTO subscribers (email, name, source, tags, referer_at_signup,
                                                        utm_source, utm_medium, utm_campaign, utm_content, utm_term,
                                                        created_at, last_seen_at)
                               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?11)"#,
                            params![
                                email,
                                name,
                                upsert.source,
                                merge_tags([incoming.as_str()]),
                                referer,
                                utm.utm_source,
                                utm.utm_medium,
                                utm.utm_campaign,
                                utm.utm_content,
                                utm.utm_term,
                                now,
                            ],
                        )?;
                    }
                }

                let subscriber = find_subscriber(&tx, &email)?;
                tx.commit()?;
                subscriber.ok_or(rusqlite::Error::QueryReturnedNoRows.into())
            })
            .await?;
        Ok(subscriber)
    }

    /// Stamp `unsubscribed_at` (first time only). Returns the subscriber when one exists.
    pub async fn mark_unsubscribed(&self, email: &str) -> Result<Option<Subscriber>> {
        let Some(email) = normalize_email(email) else {
            return Ok(None);
        };
        let subscriber = self
            .conn()
            .call(move |conn| {
                conn.execute(
                    r#"UPDATE subscribers SET unsubscribed_at = COALESCE(unsubscribed_at, ?1)
                       WHERE email = ?2 COLLATE NOCASE"#,
                    params![now_timestamp(), email],
                )?;
                Ok(find_subscriber(conn, &email)?)
            })
            .await?;
        Ok(subscriber)
    }

    pub async fn list_recent_subscribers(&self, limit: u32) -> Result<Vec<Subscriber>> {
        let subscribers = self
            .conn()
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {} FROM subscribers ORDER BY created_at DESC, id DESC LIMIT ?1",
                    SUBSCRIBER_COLUMNS
                ))?;
                let subscribers = stmt
                    .query_map(params![limit], subscriber_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(subscribers)
            })
            .await?;
        Ok(subscribers)
    }

    /// Every subscriber without an unsubscribe timestamp, oldest first.
    pub async fn active_subscribers(&self) -> Result<Vec<Subscriber>> {
        let subscribers = self
            .conn()
            .call(|conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {} FROM subscribers WHERE unsubscribed_at IS NULL ORDER BY id",
                    SUBSCRIBER_COLUMNS
                ))?;
                let subscribers = stmt
                    .query_map([], subscriber_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(subscribers)
            })
            .await?;
        Ok(subscribers)
    }

    pub async fn subscriber_counts(&self) -> Result<SubscriberCounts> {
        let counts = self
            .conn()
            .call(|conn| {
                let counts = conn.query_row(
                    r#"SELECT COUNT(*),
                              COALESCE(SUM(CASE WHEN unsubscribed_at IS NULL THEN 1 ELSE 0 END), 0),
                              COALESCE(SUM(CASE WHEN unsubscribed_at IS NOT NULL THEN 1 ELSE 0 END), 0)
                       FROM subscribers"#,
                    [],
                    |row| {
                        Ok(SubscriberCounts {
                            total: row.get(0)?,
                            subscribed: row.get(1)?,
                            unsubscribed: row.get(2)?,
                        })
                    },
                )?;
                Ok(counts)
            })
            .await?;
        Ok(counts)
    }
}

pub(crate) fn find_subscriber(
    conn: &SqliteConnection,
    email: &str,
) -> rusqlite::Result<Option<Subscriber>> {
    conn.query_row(
        &format!(
            "SELECT {} FROM subscribers WHERE email = ?1 COLLATE NOCASE",
            SUBSCRIBER_COLUMNS
        ),
        params![email],
        subscriber_from_row,
    )
    .optional()
}

/// Merge an imported row into an existing subscriber: union tags, keep the earlier `created_at`.
/// `source` only fills a missing one.
pub(crate) fn merge_imported_subscriber(
    conn: &SqliteConnection,
    existing: &Subscriber,
    name: Option<&str>,
    source: &str,
    tags: &str,
    created_at: Option<DateTime<Utc>>,
) -> rusqlite::Result<()> {
    let earliest = match created_at {
        Some(created_at) if created_at < existing.created_at => created_at,
        _ => existing.created_at,
    };
    conn.execute(
        r#"UPDATE subscribers
           SET name = COALESCE(?1, name), source = COALESCE(NULLIF(source, ''), ?2),
               tags = ?3, created_at = ?4
           WHERE id = ?5"#,
        params![
            name,
            source,
            merge_tags([existing.tags.as_str(), tags]),
            timestamp(earliest),
            existing.id
        ],
    )?;
    Ok(())
}

pub(crate) fn insert_imported_subscriber(
    conn: &SqliteConnection,
    email: &str,
    name: Option<&str>,
    source: &str,
    tags: &str,
    created_at: Option<DateTime<Utc>>,
) -> rusqlite::Result<()> {
    let created_at = created_at.map(timestamp).unwrap_or_else(now_timestamp);
    conn.execute(
        "INSERT INTO subscribers (email, name, source, tags, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
        params![email, name, source, tags, created_at],
    )?;
    Ok(())
}

pub(crate) fn subscriber_from_row(row: &Row) -> rusqlite::Result<Subscriber> {
    Ok(Subscriber {
        id: row.get(0)?,
        email: row.get(1)?,
        name: row.get(2)?,
        source: row.get(3)?,
        tags: row.get::<_, Option<String>>(4)?.unwrap_or_default(),
        utm: Utm {
            utm_source: row.get(5)?,
            utm_medium: row.get(6)?,
            utm_campaign: row.get(7)?,
            utm_content: row.get(8)?,
            utm_term: row.get(9)?,
        },
        referer_at_signup: row.get(10)?,
        created_at: required_datetime(row, 11)?,
        last_seen_at: optional_datetime(row, 12)?,
        verified_at: optional_datetime(row, 13)?,
        unsubscribed_at: optional_datetime(row, 14)?,
    })
}
