use std::collections::BTreeMap;

use chrono::{TimeZone, Utc};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::{AppError, Result};
use crate::models::MailEvent;

pub const PROVIDER: &str = "mailgun";

/// Resolved sending identity; every field is required to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailgunSettings {
    pub api_key: String,
    pub domain: String,
    pub from: String,
    pub base_url: String,
}

/// One outgoing message.
#[derive(Debug, Clone, Default)]
pub struct OutgoingMessage<'a> {
    pub to: &'a str,
    pub subject: &'a str,
    pub html: &'a str,
    pub text: Option<&'a str>,
    pub tags: Vec<&'a str>,
    pub campaign_id: Option<i64>,
    pub variables: BTreeMap<&'static str, Value>,
}

#[derive(Debug, Deserialize)]
struct SendResponse {
    id: Option<String>,
    #[allow(dead_code)]
    message: Option<String>,
}

#[derive(Clone)]
pub struct MailgunClient {
    client: Client,
    settings: MailgunSettings,
}

/// Provider ids come back as `<id@domain>` but webhooks carry `id@domain`.
pub fn normalize_message_id(id: &str) -> String {
    id.trim().trim_start_matches('<').trim_end_matches('>').to_string()
}

impl MailgunClient {
    pub fn new(client: Client, settings: MailgunSettings) -> Self {
        Self { client, settings }
    }

    /// Send one message; returns the normalised provider message id.
    pub async fn send(&self, message: &OutgoingMessage<'_>) -> Result<Option<String>> {
        let mut form: Vec<(&str, String)> = vec![
            ("from", self.settings.from.clone()),
            ("to", message.to.to_string()),
            ("subject", message.subject.to_string()),
            ("html", message.html.to_string()),
        ];
        if let Some(text) = message.text.filter(|t| !t.trim().is_empty()) {
            form.push(("text", text.to_string()));
        }
        for tag in &message.tags {
            form.push(("o:tag", tag.to_string()));
        }
        if let Some(campaign_id) = message.campaign_id {
            form.push(("o:campaign", campaign_id.to_string()));
        }
        if !message.variables.is_empty() {
            form.push(("h:X-Mailgun-Variables", serde_json::to_string(&message.variables)?));
        }

        let response = self
            .client
            .post(format!(
                "{}/v3/{}/messages",
                self.settings.base_url.trim_end_matches('/'),
                self.settings.domain
            ))
            .basic_auth("api", Some(&self.settings.api_key))
            .form(&form)
            .send()
            .await
            .map_err(|e| AppError::Mail(format!("Mailgun request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let error_text = response.text().await.unwrap_or_default();
            return Err(AppError::Mail(format!(
                "Mailgun send failed ({}): {}",
                status, error_text
            )));
        }

        let send_response: SendResponse = response.json().await?;
        Ok(send_response.id.map(|id| normalize_message_id(&id)))
    }
}

fn string_at(value: &Value, pointer: &str) -> Option<String> {
    match value.pointer(pointer)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Normalise either the signed `event-data` envelope or the legacy flat form.
pub fn normalize_webhook(body: &Value) -> Option<MailEvent> {
    if !body.is_object() {
        return None;
    }

    if let Some(data) = body.get("event-data") {
        let timestamp = data
            .get("timestamp")
            .and_then(Value::as_f64)
            .and_then(|secs| Utc.timestamp_opt(secs as i64, 0).single())
            .map(|dt| dt.to_rfc3339());
        return Some(MailEvent {
            event: string_at(data, "/event").unwrap_or_default(),
            email: string_at(data, "/recipient"),
            message_id: string_at(data, "/message/headers/message-id")
                .or_else(|| string_at(data, "/message/headers/Message-Id"))
                .or_else(|| string_at(data, "/message-id"))
                .map(|id| normalize_message_id(&id)),
            campaign_id: string_at(data, "/campaigns/0"),
            timestamp,
            payload: data.clone(),
        });
    }

    Some(MailEvent {
        event: string_at(body, "/event").unwrap_or_default(),
        email: string_at(body, "/recipient"),
        message_id: string_at(body, "/Message-Id")
            .or_else(|| string_at(body, "/message-id"))
            .or_else(|| string_at(body, "/messageId"))
            .map(|id| normalize_message_id(&id)),
        campaign_id: string_at(body, "/campaign"),
        timestamp: string_at(body, "/timestamp").or_else(|| Some(Utc::now().to_rfc3339())),
        payload: body.clone(),
    })
}

/// Template variables attached to each campaign message.
pub fn campaign_variables(subscriber_id: i64, email: &str, unsubscribe_token: String) -> BTreeMap<&'static str, Value> {
    BTreeMap::from([
        ("subscriber_id", json!(subscriber_id)),
        ("email", json!(email)),
        ("unsubscribe_token", json!(unsubscribe_token)),
    ])
}
