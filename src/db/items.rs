use chrono::Utc;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection as SqliteConnection, OptionalExtension, Row};

use crate::error::{AppError, Result};
use crate::models::{Item, ItemPatch, ItemQuery, ItemType, NewItem, SyncedItem};

use super::repository::{optional_datetime, required_datetime};
use super::{now_timestamp, parse_datetime, timestamp, Repository};

const ITEM_COLUMNS: &str = "id, type, source_id, source_url, title, description, blurb, image_url, \
     embed_html, tags, published_at, featured, visible, created_at, updated_at";

impl Repository {
    /// Items of one type, undated rows last, newest first.
    pub async fn list_items(&self, item_type: ItemType, query: ItemQuery) -> Result<Vec<Item>> {
        let items = self
            .conn()
            .call(move |conn| {
                let mut sql = format!("SELECT {} FROM items WHERE type = ?1", ITEM_COLUMNS);
                if !query.include_hidden {
                    sql.push_str(" AND visible = 1");
                }
                if query.featured_only {
                    sql.push_str(" AND featured = 1");
                }
                sql.push_str(
                    " ORDER BY (published_at IS NULL) ASC, published_at DESC, created_at DESC, id DESC",
                );
                // SQLite treats a negative LIMIT as unbounded.
                sql.push_str(" LIMIT ?2");
                let limit = query.limit.map(i64::from).unwrap_or(-1);

                let mut stmt = conn.prepare(&sql)?;
                let items = stmt
                    .query_map(params![item_type, limit], item_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(items)
            })
            .await?;
        Ok(items)
    }

    pub async fn get_item(&self, id: i64) -> Result<Option<Item>> {
        let item = self
            .conn()
            .call(move |conn| Ok(query_item(conn, id)?))
            .await?;
        Ok(item)
    }

    pub async fn create_item(&self, item: NewItem) -> Result<Item> {
        let now = Utc::now();
        let published_at = item
            .published_at
            .as_deref()
            .and_then(parse_datetime)
            .unwrap_or(now);

        let created = self
            .conn()
            .call(move |conn| {
                conn.execute(
                    r#"INSERT INTO items (type, source_id, source_url, title, description, blurb, image_url,
                                          embed_html, tags, published_at, featured, visible, created_at, updated_at)
                       VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?13)"#,
                    params![
                        item.item_type,
                        item.source_id,
                        item.source_url.trim(),
                        item.title.trim(),
                        item.description,
                        item.blurb,
                        item.image_url,
                        item.embed_html,
                        item.tags.map(|t| t.to_csv()),
                        timestamp(published_at),
                        item.featured.unwrap_or(false),
                        item.visible.unwrap_or(true),
                        timestamp(now),
                    ],
                )?;
                let id = conn.last_insert_rowid();
                query_item(conn, id)?.ok_or(rusqlite::Error::QueryReturnedNoRows.into())
            })
            .await
            .map_err(duplicate_source)?;
        Ok(created)
    }

    /// Apply only the provided fields; an empty patch returns the row unchanged.
    /// The item type is fixed at creation.
    pub async fn update_item(&self, id: i64, patch: ItemPatch) -> Result<Item> {
        if let Some(item_type) = patch.item_type {
            let existing = self
                .get_item(id)
                .await?
                .ok_or_else(|| AppError::not_found("Item not found"))?;
            if existing.item_type != item_type {
                return Err(AppError::BadRequest("Item type cannot be changed".to_string()));
            }
        }

        let updated = self
            .conn()
            .call(move |conn| {
                let Some(existing) = query_item(conn, id)? else {
                    return Ok(None);
                };
                if patch.is_empty() {
                    return Ok(Some(existing));
                }

                let mut fields: Vec<&str> = Vec::new();
                let mut values: Vec<Value> = Vec::new();
                let mut set = |field: &'static str, value: Value| {
                    fields.push(field);
                    values.push(value);
                };

                if let Some(title) = patch.title {
                    set("title", Value::Text(title));
                }
                if let Some(description) = patch.description {
                    set("description", Value::Text(description));
                }
                if let Some(blurb) = patch.blurb {
                    set("blurb", Value::Text(blurb));
                }
                if let Some(image_url) = patch.image_url {
                    set("image_url", Value::Text(image_url));
                }
                if let Some(embed_html) = patch.embed_html {
                    set("embed_html", Value::Text(embed_html));
                }
                if let Some(tags) = patch.tags {
                    set("tags", Value::Text(tags.to_csv()));
                }
                if let Some(published_at) = patch.published_at.as_deref().and_then(parse_datetime) {
                    set("published_at", Value::Text(timestamp(published_at)));
                }
                if let Some(featured) = patch.featured {
                    set("featured", Value::Integer(featured.into()));
                }
                if let Some(visible) = patch.visible {
                    set("visible", Value::Integer(visible.into()));
                }
                if let Some(source_url) = patch.source_url {
                    set("source_url", Value::Text(source_url));
                }
                set("updated_at", Value::Text(now_timestamp()));

                let assignments = fields
                    .iter()
                    .map(|field| format!("{} = ?", field))
                    .collect::<Vec<_>>()
                    .join(", ");
                values.push(Value::Integer(id));

                conn.execute(
                    &format!("UPDATE items SET {} WHERE id = ?", assignments),
                    params_from_iter(values.iter()),
                )?;
                Ok(query_item(conn, id)?)
            })
            .await
            .map_err(duplicate_source)?;

        updated.ok_or_else(|| AppError::not_found("Item not found"))
    }

    /// Permanent delete. Returns whether a row existed.
    pub async fn delete_item(&self, id: i64) -> Result<bool> {
        let deleted = self
            .conn()
            .call(move |conn| {
                let deleted = conn.execute("DELETE FROM items WHERE id = ?1", params![id])?;
                Ok(deleted > 0)
            })
            .await?;
        Ok(deleted)
    }

    pub async fn set_featured(&self, id: i64, featured: bool) -> Result<Item> {
        self.update_item(
            id,
            ItemPatch {
                featured: Some(featured),
                ..ItemPatch::default()
            },
        )
        .await
    }

    pub async fn set_visibility(&self, id: i64, visible: bool) -> Result<Item> {
        self.update_item(
            id,
            ItemPatch {
                visible: Some(visible),
                ..ItemPatch::default()
            },
        )
        .await
    }

    /// Insert or refresh a synced row keyed by (type, source_url). Returns the row id.
    ///
    /// Re-syncs refresh the remote-owned fields and `updated_at` but never touch the
    /// blurb, flags or `created_at`.
    pub async fn upsert_synced_item(&self, item: SyncedItem) -> Result<i64> {
        let id = self
            .conn()
            .call(move |conn| {
                let now = now_timestamp();
                let published_at = item.published_at.map(timestamp);
                let existing: Option<i64> = conn
                    .query_row(
                        "SELECT id FROM items WHERE type = ?1 AND source_url = ?2",
                        params![item.item_type, item.source_url],
                        |row| row.get(0),
                    )
                    .optional()?;

                if let Some(id) = existing {
                    conn.execute(
                        r#"UPDATE items
                           SET title = ?1, description = ?2, image_url = ?3,
                               embed_html = COALESCE(?4, embed_html), tags = COALESCE(?5, tags),
                               published_at = ?6, updated_at = ?7
                           WHERE id = ?8"#,
                        params![
                            item.title,
                            item.description,
                            item.image_url,
                            item.embed_html,
                            item.tags,
                            published_at,
                            now,
                            id,
                        ],
                    )?;
                    return Ok(id);
                }

                conn.execute(
                    r#"INSERT INTO items (type, source_id, source_url, title, description, blurb, image_url,
                                          embed_html, tags, published_at, created_at, updated_at)
                       VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?11)"#,
                    params![
                        item.item_type,
                        item.source_id,
                        item.source_url,
                        item.title,
                        item.description,
                        item.blurb,
                        item.image_url,
                        item.embed_html,
                        item.tags,
                        published_at,
                        now,
                    ],
                )?;
                Ok(conn.last_insert_rowid())
            })
            .await?;
        Ok(id)
    }

    pub async fn set_item_blurb(&self, id: i64, blurb: String) -> Result<()> {
        self.conn()
            .call(move |conn| {
                conn.execute(
                    "UPDATE items SET blurb = ?1, updated_at = ?2 WHERE id = ?3",
                    params![blurb, now_timestamp(), id],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    pub async fn set_item_image(&self, id: i64, image_url: String) -> Result<()> {
        self.conn()
            .call(move |conn| {
                conn.execute(
                    "UPDATE items SET image_url = ?1, updated_at = ?2 WHERE id = ?3",
                    params![image_url, now_timestamp(), id],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    pub async fn count_items(&self, item_type: ItemType) -> Result<i64> {
        let count = self
            .conn()
            .call(move |conn| {
                let count = conn.query_row(
                    "SELECT COUNT(*) FROM items WHERE type = ?1",
                    params![item_type],
                    |row| row.get(0),
                )?;
                Ok(count)
            })
            .await?;
        Ok(count)
    }
}

fn query_item(conn: &SqliteConnection, id: i64) -> rusqlite::Result<Option<Item>> {
    conn.query_row(
        &format!("SELECT {} FROM items WHERE id = ?1", ITEM_COLUMNS),
        params![id],
        item_from_row,
    )
    .optional()
}

fn item_from_row(row: &Row) -> rusqlite::Result<Item> {
    Ok(Item {
        id: row.get(0)?,
        item_type: row.get(1)?,
        source_id: row.get(2)?,
        source_url: row.get(3)?,
        title: row.get(4)?,
        description: row.get(5)?,
        blurb: row.get(6)?,
        image_url: row.get(7)?,
        embed_html: row.get(8)?,
        tags: row.get(9)?,
        published_at: optional_datetime(row, 10)?,
        featured: row.get(11)?,
        visible: row.get(12)?,
        created_at: required_datetime(row, 13)?,
        updated_at: required_datetime(row, 14)?,
    })
}

/// A synced type may hold each source URL once; report a clash as a bad request.
fn duplicate_source(err: tokio_rusqlite::Error) -> AppError {
    match err {
        tokio_rusqlite::Error::Rusqlite(rusqlite::Error::SqliteFailure(e, _))
            if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE =>
        {
            AppError::BadRequest("An item with this source URL already exists".to_string())
        }
        other => other.into(),
    }
}
