use rand::seq::SliceRandom;
use rusqlite::{params, Connection as SqliteConnection, OptionalExtension, Row};

use crate::error::{AppError, Result};
use crate::models::{Giveaway, GiveawayEntry, NewGiveaway};

use super::repository::{optional_datetime, required_datetime};
use super::{now_timestamp, Repository};

const GIVEAWAY_COLUMNS: &str = "id, name, description, start_date, end_date, rules, \
     winner_subscriber_id, fulfilled_at, fulfillment_notes, created_at";

const ENTRY_SELECT: &str = "SELECT ge.id, ge.giveaway_id, ge.subscriber_id, ge.source, s.email, ge.created_at \
     FROM giveaway_entries ge JOIN subscribers s ON s.id = ge.subscriber_id";

fn blank_to_none(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl Repository {
    pub async fn create_giveaway(&self, giveaway: NewGiveaway) -> Result<Giveaway> {
        let created = self
            .conn()
            .call(move |conn| {
                conn.execute(
                    r#"INSERT INTO giveaways (name, description, start_date, end_date, rules, created_at)
                       VALUES (?1, ?2, ?3, ?4, ?5, ?6)"#,
                    params![
                        giveaway.name.trim(),
                        blank_to_none(giveaway.description),
                        blank_to_none(giveaway.start_date),
                        blank_to_none(giveaway.end_date),
                        blank_to_none(giveaway.rules),
                        now_timestamp(),
                    ],
                )?;
                let id = conn.last_insert_rowid();
                query_giveaway(conn, id)?.ok_or(rusqlite::Error::QueryReturnedNoRows.into())
            })
            .await?;
        Ok(created)
    }

    pub async fn get_giveaway(&self, id: i64) -> Result<Option<Giveaway>> {
        let giveaway = self
            .conn()
            .call(move |conn| Ok(query_giveaway(conn, id)?))
            .await?;
        Ok(giveaway)
    }

    pub async fn list_giveaways(&self) -> Result<Vec<Giveaway>> {
        let giveaways = self
            .conn()
            .call(|conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {} FROM giveaways ORDER BY created_at DESC, id DESC",
                    GIVEAWAY_COLUMNS
                ))?;
                let giveaways = stmt
                    .query_map([], giveaway_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(giveaways)
            })
            .await?;
        Ok(giveaways)
    }

    /// Most recent entries across all giveaways, joined with subscriber email.
    pub async fn latest_giveaway_entries(&self, limit: u32) -> Result<Vec<GiveawayEntry>> {
        let entries = self
            .conn()
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "{} ORDER BY ge.created_at DESC, ge.id DESC LIMIT ?1",
                    ENTRY_SELECT
                ))?;
                let entries = stmt
                    .query_map(params![limit], entry_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(entries)
            })
            .await?;
        Ok(entries)
    }

    /// Returns false when the subscriber had already entered.
    pub async fn add_giveaway_entry(
        &self,
        giveaway_id: i64,
        subscriber_id: i64,
        source: Option<String>,
    ) -> Result<bool> {
        let inserted = self
            .conn()
            .call(move |conn| {
                let inserted = conn.execute(
                    r#"INSERT OR IGNORE INTO giveaway_entries (giveaway_id, subscriber_id, source, created_at)
                       VALUES (?1, ?2, ?3, ?4)"#,
                    params![
                        giveaway_id,
                        subscriber_id,
                        blank_to_none(source).unwrap_or_else(|| "manual".to_string()),
                        now_timestamp(),
                    ],
                )?;
                Ok(inserted > 0)
            })
            .await?;
        Ok(inserted)
    }

    /// Pick a uniformly random entry and persist it as the winner.
    pub async fn draw_giveaway_winner(&self, giveaway_id: i64) -> Result<GiveawayEntry> {
        let winner = self
            .conn()
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!("{} WHERE ge.giveaway_id = ?1", ENTRY_SELECT))?;
                let entries = stmt
                    .query_map(params![giveaway_id], entry_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;

                let Some(winner) = entries.choose(&mut rand::thread_rng()).cloned() else {
                    return Ok(None);
                };
                conn.execute(
                    "UPDATE giveaways SET winner_subscriber_id = ?1 WHERE id = ?2",
                    params![winner.subscriber_id, giveaway_id],
                )?;
                Ok(Some(winner))
            })
            .await?;

        winner.ok_or_else(|| AppError::BadRequest("No entries to draw from.".to_string()))
    }

    /// Returns false when no giveaway has this id.
    pub async fn fulfill_giveaway(&self, giveaway_id: i64, notes: Option<String>) -> Result<bool> {
        let updated = self
            .conn()
            .call(move |conn| {
                let updated = conn.execute(
                    "UPDATE giveaways SET fulfilled_at = ?1, fulfillment_notes = ?2 WHERE id = ?3",
                    params![now_timestamp(), blank_to_none(notes), giveaway_id],
                )?;
                Ok(updated > 0)
            })
            .await?;
        Ok(updated)
    }
}

fn query_giveaway(conn: &SqliteConnection, id: i64) -> rusqlite::Result<Option<Giveaway>> {
    conn.query_row(
        &format!("SELECT {} FROM giveaways WHERE id = ?1", GIVEAWAY_COLUMNS),
        params![id],
        giveaway_from_row,
    )
    .optional()
}

fn giveaway_from_row(row: &Row) -> rusqlite::Result<Giveaway> {
    Ok(Giveaway {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        start_date: row.get(3)?,
        end_date: row.get(4)?,
        rules: row.get(5)?,
        winner_subscriber_id: row.get(6)?,
        fulfilled_at: optional_datetime(row, 7)?,
        fulfillment_notes: row.get(8)?,
        created_at: required_datetime(row, 9)?,
    })
}

fn entry_from_row(row: &Row) -> rusqlite::Result<GiveawayEntry> {
    Ok(GiveawayEntry {
        id: row.get(0)?,
        giveaway_id: row.get(1)?,
        subscriber_id: row.get(2)?,
        source: row.get(3)?,
        email: row.get(4)?,
        created_at: required_datetime(row, 5)?,
    })
}
