use rusqlite::{params, OptionalExtension};

use crate::error::Result;
use crate::models::SummarizationLogEntry;

use super::repository::required_datetime;
use super::{now_timestamp, Repository};

/// A fresh summarizer response ready to be cached.
#[derive(Debug, Clone)]
pub struct NewSummary {
    pub item_id: i64,
    pub model: String,
    pub source_hash: String,
    pub summary: String,
    pub prompt_version: String,
    pub tokens_in: i64,
    pub tokens_out: i64,
    pub cost_cents: i64,
}

impl Repository {
    /// Latest cached summary for (item, model, source hash).
    pub async fn cached_summary(
        &self,
        item_id: i64,
        model: &str,
        source_hash: &str,
    ) -> Result<Option<SummarizationLogEntry>> {
        let model = model.to_string();
        let source_hash = source_hash.to_string();
        let entry = self
            .conn()
            .call(move |conn| {
                let entry = conn
                    .query_row(
                        r#"SELECT id, item_id, model, source_hash, summary, prompt_version,
                                  tokens_in, tokens_out, cost_cents, created_at
                           FROM summarization_log
                           WHERE item_id = ?1 AND model = ?2 AND source_hash = ?3
                           ORDER BY id DESC
                           LIMIT 1"#,
                        params![item_id, model, source_hash],
                        |row| {
                            Ok(SummarizationLogEntry {
                                id: row.get(0)?,
                                item_id: row.get(1)?,
                                model: row.get(2)?,
                                source_hash: row.get(3)?,
                                summary: row.get(4)?,
                                prompt_version: row.get(5)?,
                                tokens_in: row.get(6)?,
                                tokens_out: row.get(7)?,
                                cost_cents: row.get(8)?,
                                created_at: required_datetime(row, 9)?,
                            })
                        },
                    )
                    .optional()?;
                Ok(entry)
            })
            .await?;
        Ok(entry)
    }

    pub async fn store_summary(&self, summary: NewSummary) -> Result<()> {
        self.conn()
            .call(move |conn| {
                conn.execute(
                    r#"INSERT INTO summarization_log (item_id, model, source_hash, summary, prompt_version,
                                                      tokens_in, tokens_out, cost_cents, created_at)
                       VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"#,
                    params![
                        summary.item_id,
                        summary.model,
                        summary.source_hash,
                        summary.summary,
                        summary.prompt_version,
                        summary.tokens_in,
                        summary.tokens_out,
                        summary.cost_cents,
                        now_timestamp(),
                    ],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }
}
