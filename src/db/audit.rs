use rusqlite::params;
use serde::Serialize;
use serde_json::Value;

use crate::error::Result;

use super::{now_timestamp, Repository};

#[derive(Debug, Clone, Serialize)]
pub struct AuditEntry {
    pub id: i64,
    pub action: String,
    pub meta: Value,
    pub created_at: String,
}

impl Repository {
    pub async fn insert_audit(&self, action: &str, meta: Value) -> Result<()> {
        let action = action.to_string();
        self.conn()
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO admin_audit (action, meta_json, created_at) VALUES (?1, ?2, ?3)",
                    params![action, meta.to_string(), now_timestamp()],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    pub async fn recent_audit(&self, limit: u32) -> Result<Vec<AuditEntry>> {
        let entries = self
            .conn()
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, action, meta_json, created_at FROM admin_audit ORDER BY id DESC LIMIT ?1",
                )?;
                let entries = stmt
                    .query_map(params![limit], |row| {
                        let meta: String = row.get(2)?;
                        Ok(AuditEntry {
                            id: row.get(0)?,
                            action: row.get(1)?,
                            meta: serde_json::from_str(&meta).unwrap_or(Value::Null),
                            created_at: row.get(3)?,
                        })
                    })?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(entries)
            })
            .await?;
        Ok(entries)
    }
}
