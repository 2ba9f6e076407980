use std::collections::HashMap;

use rusqlite::{params, OptionalExtension};
use serde::de::DeserializeOwned;

use crate::error::Result;
use crate::models::{SettingValue, SiteSettings};

use super::Repository;

impl Repository {
    pub async fn all_settings(&self) -> Result<HashMap<String, SettingValue>> {
        let settings = self
            .conn()
            .call(|conn| {
                let mut stmt = conn.prepare("SELECT key, kind, value FROM settings")?;
                let rows = stmt
                    .query_map([], |row| {
                        let key: String = row.get(0)?;
                        let kind: String = row.get(1)?;
                        let value: Option<String> = row.get(2)?;
                        Ok((key, SettingValue::from_column(&kind, value.unwrap_or_default())))
                    })?
                    .collect::<std::result::Result<HashMap<_, _>, _>>()?;
                Ok(rows)
            })
            .await?;
        Ok(settings)
    }

    pub async fn get_setting(&self, key: &str) -> Result<Option<SettingValue>> {
        let key = key.to_string();
        let value = self
            .conn()
            .call(move |conn| {
                let value = conn
                    .query_row(
                        "SELECT kind, value FROM settings WHERE key = ?1",
                        params![key],
                        |row| {
                            let kind: String = row.get(0)?;
                            let value: Option<String> = row.get(1)?;
                            Ok(SettingValue::from_column(&kind, value.unwrap_or_default()))
                        },
                    )
                    .optional()?;
                Ok(value)
            })
            .await?;
        Ok(value)
    }

    pub async fn get_text_setting(&self, key: &str, default: &str) -> Result<String> {
        Ok(match self.get_setting(key).await? {
            Some(SettingValue::Text(text)) if !text.is_empty() => text,
            _ => default.to_string(),
        })
    }

    /// Decode a structured setting, falling back to `default` when missing or malformed.
    pub async fn get_json_setting<T: DeserializeOwned>(&self, key: &str, default: T) -> Result<T> {
        let Some(value) = self.get_setting(key).await? else {
            return Ok(default);
        };
        Ok(value.decode().unwrap_or_else(|e| {
            tracing::warn!("Failed to parse JSON setting {}: {}", key, e);
            default
        }))
    }

    /// Upsert every entry in one transaction.
    pub async fn update_settings(&self, updates: Vec<(String, SettingValue)>) -> Result<()> {
        self.conn()
            .call(move |conn| {
                let tx = conn.transaction()?;
                {
                    let mut stmt = tx.prepare(
                        r#"INSERT INTO settings (key, kind, value) VALUES (?1, ?2, ?3)
                           ON CONFLICT(key) DO UPDATE SET kind = excluded.kind, value = excluded.value"#,
                    )?;
                    for (key, value) in &updates {
                        stmt.execute(params![key, value.kind(), value.to_column()])?;
                    }
                }
                tx.commit()?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    pub async fn site_settings(&self) -> Result<SiteSettings> {
        Ok(SiteSettings::from_map(&self.all_settings().await?))
    }
}
