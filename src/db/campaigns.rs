use rusqlite::{params, Connection as SqliteConnection, OptionalExtension, Row};

use crate::error::Result;
use crate::models::{
    Campaign, CampaignRecipient, CampaignStatus, MailEvent, NewCampaign, RecipientStatus, Subscriber,
};

use super::repository::{optional_datetime, required_datetime};
use super::subscribers::subscriber_from_row;
use super::{now_timestamp, Repository};

const CAMPAIGN_COLUMNS: &str =
    "id, name, subject, html_body, text_body, status, scheduled_for, sent_at, created_at";

const RECIPIENT_COLUMNS: &str = "id, campaign_id, subscriber_id, status, message_id, error, opened_at, \
     clicked_at, bounced_at, complained_at, unsubscribed_at, last_event_at";

impl Repository {
    pub async fn create_campaign(&self, campaign: NewCampaign) -> Result<Campaign> {
        let created = self
            .conn()
            .call(move |conn| {
                conn.execute(
                    r#"INSERT INTO campaigns (name, subject, html_body, text_body, status, scheduled_for, created_at)
                       VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"#,
                    params![
                        campaign.name.trim(),
                        campaign.subject.trim(),
                        campaign.html_body,
                        campaign.text_body.filter(|t| !t.trim().is_empty()),
                        CampaignStatus::Draft,
                        campaign.scheduled_for.filter(|s| !s.trim().is_empty()),
                        now_timestamp(),
                    ],
                )?;
                let id = conn.last_insert_rowid();
                query_campaign(conn, id)?.ok_or(rusqlite::Error::QueryReturnedNoRows.into())
            })
            .await?;
        Ok(created)
    }

    pub async fn get_campaign(&self, id: i64) -> Result<Option<Campaign>> {
        let campaign = self
            .conn()
            .call(move |conn| Ok(query_campaign(conn, id)?))
            .await?;
        Ok(campaign)
    }

    pub async fn list_campaigns(&self, limit: u32) -> Result<Vec<Campaign>> {
        let campaigns = self
            .conn()
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {} FROM campaigns ORDER BY created_at DESC, id DESC LIMIT ?1",
                    CAMPAIGN_COLUMNS
                ))?;
                let campaigns = stmt
                    .query_map(params![limit], campaign_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(campaigns)
            })
            .await?;
        Ok(campaigns)
    }

    /// Queue recipient rows and flip the campaign to `sending` in one transaction.
    ///
    /// Existing rows for the same subscriber are left alone, so a resumed send never
    /// re-queues someone already sent to.
    pub async fn queue_recipients(&self, campaign_id: i64, subscriber_ids: Vec<i64>) -> Result<()> {
        self.conn()
            .call(move |conn| {
                let tx = conn.transaction()?;
                {
                    let mut insert = tx.prepare(
                        r#"INSERT OR IGNORE INTO campaign_recipients (campaign_id, subscriber_id, status)
                           VALUES (?1, ?2, ?3)"#,
                    )?;
                    for subscriber_id in &subscriber_ids {
                        insert.execute(params![campaign_id, subscriber_id, RecipientStatus::Queued])?;
                    }
                }
                tx.execute(
                    "UPDATE campaigns SET status = ?1 WHERE id = ?2",
                    params![CampaignStatus::Sending, campaign_id],
                )?;
                tx.commit()?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    /// Subscribers whose recipient row for this campaign is still `queued`.
    pub async fn queued_recipients(&self, campaign_id: i64) -> Result<Vec<Subscriber>> {
        let subscribers = self
            .conn()
            .call(move |conn| {
                let columns = "s.id, s.email, s.name, s.source, s.tags, s.utm_source, s.utm_medium, \
                     s.utm_campaign, s.utm_content, s.utm_term, s.referer_at_signup, s.created_at, \
                     s.last_seen_at, s.verified_at, s.unsubscribed_at";
                let mut stmt = conn.prepare(&format!(
                    r#"SELECT {} FROM campaign_recipients cr
                       JOIN subscribers s ON s.id = cr.subscriber_id
                       WHERE cr.campaign_id = ?1 AND cr.status = ?2
                       ORDER BY cr.id"#,
                    columns
                ))?;
                let subscribers = stmt
                    .query_map(
                        params![campaign_id, RecipientStatus::Queued],
                        subscriber_from_row,
                    )?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(subscribers)
            })
            .await?;
        Ok(subscribers)
    }

    pub async fn mark_recipient_sent(
        &self,
        campaign_id: i64,
        subscriber_id: i64,
        message_id: Option<String>,
    ) -> Result<()> {
        self.conn()
            .call(move |conn| {
                conn.execute(
                    r#"UPDATE campaign_recipients
                       SET status = ?1, message_id = ?2, error = NULL, last_event_at = ?3
                       WHERE campaign_id = ?4 AND subscriber_id = ?5"#,
                    params![
                        RecipientStatus::Sent,
                        message_id,
                        now_timestamp(),
                        campaign_id,
                        subscriber_id
                    ],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    pub async fn mark_recipient_failed(
        &self,
        campaign_id: i64,
        subscriber_id: i64,
        error: String,
    ) -> Result<()> {
        self.conn()
            .call(move |conn| {
                conn.execute(
                    r#"UPDATE campaign_recipients
                       SET status = ?1, error = ?2, last_event_at = ?3
                       WHERE campaign_id = ?4 AND subscriber_id = ?5"#,
                    params![
                        RecipientStatus::Failed,
                        error,
                        now_timestamp(),
                        campaign_id,
                        subscriber_id
                    ],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    pub async fn finish_campaign(&self, campaign_id: i64) -> Result<()> {
        self.conn()
            .call(move |conn| {
                conn.execute(
                    "UPDATE campaigns SET status = ?1, sent_at = ?2 WHERE id = ?3",
                    params![CampaignStatus::Sent, now_timestamp(), campaign_id],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    pub async fn list_recipients(&self, campaign_id: i64) -> Result<Vec<CampaignRecipient>> {
        let recipients = self
            .conn()
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {} FROM campaign_recipients WHERE campaign_id = ?1 ORDER BY id",
                    RECIPIENT_COLUMNS
                ))?;
                let recipients = stmt
                    .query_map(params![campaign_id], recipient_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(recipients)
            })
            .await?;
        Ok(recipients)
    }

    pub async fn get_recipient_by_message_id(
        &self,
        message_id: &str,
    ) -> Result<Option<CampaignRecipient>> {
        let message_id = message_id.to_string();
        let recipient = self
            .conn()
            .call(move |conn| {
                let recipient = conn
                    .query_row(
                        &format!(
                            "SELECT {} FROM campaign_recipients WHERE message_id = ?1",
                            RECIPIENT_COLUMNS
                        ),
                        params![message_id],
                        recipient_from_row,
                    )
                    .optional()?;
                Ok(recipient)
            })
            .await?;
        Ok(recipient)
    }

    /// Move matching recipients to `status` and stamp that status's timestamp once.
    /// Returns the number of rows touched.
    pub async fn apply_mail_event(&self, message_id: &str, status: RecipientStatus) -> Result<usize> {
        let message_id = message_id.to_string();
        let updated = self
            .conn()
            .call(move |conn| {
                let now = now_timestamp();
                let updated = conn.execute(
                    r#"UPDATE campaign_recipients
                       SET status = ?1,
                           last_event_at = ?2,
                           opened_at = CASE WHEN ?1 = 'opened' AND opened_at IS NULL THEN ?2 ELSE opened_at END,
                           clicked_at = CASE WHEN ?1 = 'clicked' AND clicked_at IS NULL THEN ?2 ELSE clicked_at END,
                           bounced_at = CASE WHEN ?1 = 'bounced' AND bounced_at IS NULL THEN ?2 ELSE bounced_at END,
                           complained_at = CASE WHEN ?1 = 'complained' AND complained_at IS NULL THEN ?2 ELSE complained_at END,
                           unsubscribed_at = CASE WHEN ?1 = 'unsubscribed' AND unsubscribed_at IS NULL THEN ?2 ELSE unsubscribed_at END
                       WHERE message_id = ?3"#,
                    params![status, now, message_id],
                )?;
                Ok(updated)
            })
            .await?;
        Ok(updated)
    }

    /// Append the raw provider event.
    pub async fn record_mail_event(&self, provider: &str, event: &MailEvent) -> Result<()> {
        let provider = provider.to_string();
        let event = event.clone();
        self.conn()
            .call(move |conn| {
                conn.execute(
                    r#"INSERT INTO mail_events (provider, event_type, message_id, email, campaign_id,
                                                payload_json, happened_at, created_at)
                       VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"#,
                    params![
                        provider,
                        event.event,
                        event.message_id,
                        event.email,
                        event.campaign_id,
                        event.payload.to_string(),
                        event.timestamp,
                        now_timestamp(),
                    ],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    pub async fn count_mail_events(&self) -> Result<i64> {
        let count = self
            .conn()
            .call(|conn| Ok(conn.query_row("SELECT COUNT(*) FROM mail_events", [], |row| row.get(0))?))
            .await?;
        Ok(count)
    }
}

fn query_campaign(conn: &SqliteConnection, id: i64) -> rusqlite::Result<Option<Campaign>> {
    conn.query_row(
        &format!("SELECT {} FROM campaigns WHERE id = ?1", CAMPAIGN_COLUMNS),
        params![id],
        campaign_from_row,
    )
    .optional()
}

fn campaign_from_row(row: &Row) -> rusqlite::Result<Campaign> {
    Ok(Campaign {
        id: row.get(0)?,
        name: row.get(1)?,
        subject: row.get(2)?,
        html_body: row.get(3)?,
        text_body: row.get(4)?,
        status: row.get(5)?,
        scheduled_for: row.get(6)?,
        sent_at: optional_datetime(row, 7)?,
        created_at: required_datetime(row, 8)?,
    })
}

fn recipient_from_row(row: &Row) -> rusqlite::Result<CampaignRecipient> {
    Ok(CampaignRecipient {
        id: row.get(0)?,
        campaign_id: row.get(1)?,
        subscriber_id: row.get(2)?,
        status: row.get(3)?,
        message_id: row.get(4)?,
        error: row.get(5)?,
        opened_at: optional_datetime(row, 6)?,
        clicked_at: optional_datetime(row, 7)?,
        bounced_at: optional_datetime(row, 8)?,
        complained_at: optional_datetime(row, 9)?,
        unsubscribed_at: optional_datetime(row, 10)?,
        last_event_at: optional_datetime(row, 11)?,
    })
}
