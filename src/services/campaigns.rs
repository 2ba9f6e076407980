use serde_json::Value;

use crate::db::Repository;
use crate::error::{AppError, Result};
use crate::models::{CampaignStatus, RecipientStatus, SendFilters, SendReport};

use super::auth::UnsubscribeTokens;
use super::mailgun::{self, campaign_variables, MailgunClient, OutgoingMessage};

/// Send a campaign to every matching subscriber, one message at a time.
///
/// A `draft` campaign gets its recipients queued and flips to `sending` before the first network
/// call. A campaign left in `sending` resumes with its still-queued recipients. Each send is
/// isolated: a failure marks that recipient `failed` and the loop moves on.
pub async fn send_campaign(
    repository: &Repository,
    mailgun: Option<&MailgunClient>,
    tokens: &UnsubscribeTokens,
    campaign_id: i64,
    filters: &SendFilters,
) -> Result<SendReport> {
    let Some(mailgun) = mailgun else {
        return Err(AppError::BadRequest("Mailgun is not configured.".to_string()));
    };
    let campaign = repository
        .get_campaign(campaign_id)
        .await?
        .ok_or_else(|| AppError::not_found("Campaign not found"))?;

    match campaign.status {
        CampaignStatus::Sent => {
            return Err(AppError::BadRequest("Campaign has already been sent.".to_string()));
        }
        CampaignStatus::Sending => {
            tracing::info!("Resuming campaign {} ({})", campaign.id, campaign.name);
        }
        CampaignStatus::Draft => {
            let recipients: Vec<i64> = repository
                .active_subscribers()
                .await?
                .into_iter()
                .filter(|s| filters.matches(&s.tag_list()))
                .map(|s| s.id)
                .collect();
            if recipients.is_empty() {
                return Err(AppError::BadRequest(
                    "No matching subscribers to send to.".to_string(),
                ));
            }
            repository.queue_recipients(campaign.id, recipients).await?;
        }
    }

    let mut report = SendReport::default();
    for subscriber in repository.queued_recipients(campaign.id).await? {
        let variables = campaign_variables(
            subscriber.id,
            &subscriber.email,
            tokens.generate(&subscriber.email).unwrap_or_default(),
        );
        let message = OutgoingMessage {
            to: &subscriber.email,
            subject: &campaign.subject,
            html: &campaign.html_body,
            text: campaign.text_body.as_deref(),
            tags: vec!["campaign"],
            campaign_id: Some(campaign.id),
            variables,
        };

        match mailgun.send(&message).await {
            Ok(message_id) => {
                repository
                    .mark_recipient_sent(campaign.id, subscriber.id, message_id)
                    .await?;
                report.sent += 1;
            }
            Err(e) => {
                tracing::warn!(
                    "Campaign {}: send to {} failed: {}",
                    campaign.id,
                    subscriber.email,
                    e
                );
                repository
                    .mark_recipient_failed(campaign.id, subscriber.id, e.to_string())
                    .await?;
                report.failed += 1;
            }
        }
    }

    repository.finish_campaign(campaign.id).await?;
    tracing::info!(
        "Campaign {} sent: {} delivered to provider, {} failed",
        campaign.id,
        report.sent,
        report.failed
    );
    Ok(report)
}

/// Record a provider webhook and apply it to the matching recipient.
///
/// Unknown event names are recorded only. The global unsubscribe an `unsubscribed` event
/// triggers is best-effort.
pub async fn handle_mail_webhook(repository: &Repository, body: &Value) -> Result<()> {
    let Some(event) = mailgun::normalize_webhook(body) else {
        return Ok(());
    };
    repository.record_mail_event(mailgun::PROVIDER, &event).await?;

    let status = RecipientStatus::from_mail_event(&event.event);
    if let (Some(message_id), Some(status)) = (event.message_id.as_deref(), status) {
        let touched = repository.apply_mail_event(message_id, status).await?;
        tracing::debug!("Mail event {} for {} touched {} rows", event.event, message_id, touched);
    }

    if status == Some(RecipientStatus::Unsubscribed) {
        if let Some(email) = event.email.as_deref() {
            if let Err(e) = repository.mark_unsubscribed(email).await {
                tracing::warn!("Failed to unsubscribe {} from webhook: {}", email, e);
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NewCampaign, SubscriberUpsert};
    use crate::services::mailgun::MailgunSettings;
    use axum::routing::post;
    use axum::{Form, Json, Router};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    async fn mock_mailgun() -> (String, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let router = Router::new().route(
            "/v3/:domain/messages",
            post(move |Form(form): Form<Vec<(String, String)>>| {
                let counter = counter.clone();
                async move {
                    let n = counter.fetch_add(1, Ordering::SeqCst);
                    let to = form
                        .iter()
                        .find(|(k, _)| k == "to")
                        .map(|(_, v)| v.clone())
                        .unwrap_or_default();
                    if to.starts_with("fail") {
                        return (axum::http::StatusCode::BAD_REQUEST, Json(json!({"message": "rejected"})));
                    }
                    (
                        axum::http::StatusCode::OK,
                        Json(json!({ "id": format!("<{}@mg.test>", n), "message": "Queued. Thank you." })),
                    )
                }
            }),
        );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        (format!("http://{}", addr), calls)
    }

    fn client(base_url: String) -> MailgunClient {
        MailgunClient::new(
            reqwest::Client::new(),
            MailgunSettings {
                api_key: "key".into(),
                domain: "mg.test".into(),
                from: "Hub <hub@mg.test>".into(),
                base_url,
            },
        )
    }

    async fn subscribe(repo: &Repository, email: &str, tags: &[&str]) {
        repo.upsert_subscriber(SubscriberUpsert {
            email: email.into(),
            source: "site".into(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            ..SubscriberUpsert::default()
        })
        .await
        .unwrap();
    }

    async fn draft(repo: &Repository) -> i64 {
        repo.create_campaign(NewCampaign {
            name: "Launch".into(),
            subject: "Hello".into(),
            html_body: "<p>Hi</p>".into(),
            text_body: None,
            scheduled_for: None,
        })
        .await
        .unwrap()
        .id
    }

    #[tokio::test]
    async fn test_send_isolates_failures() {
        let repo = Repository::open_in_memory().await.unwrap();
        subscribe(&repo, "ok@example.com", &["site"]).await;
        subscribe(&repo, "fail@example.com", &["site"]).await;
        subscribe(&repo, "skip@example.com", &["site", "test"]).await;
        let campaign_id = draft(&repo).await;

        let (base_url, calls) = mock_mailgun().await;
        let mailgun = client(base_url);
        let filters = SendFilters {
            tag_include: Some("site".into()),
            tag_exclude: Some("test".into()),
        };
        let report = send_campaign(&repo, Some(&mailgun), &UnsubscribeTokens::new("s"), campaign_id, &filters)
            .await
            .unwrap();

        assert_eq!(report, SendReport { sent: 1, failed: 1 });
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        let recipients = repo.list_recipients(campaign_id).await.unwrap();
        assert_eq!(recipients.len(), 2);
        let sent = recipients.iter().find(|r| r.status == RecipientStatus::Sent).unwrap();
        assert!(!sent.message_id.as_deref().unwrap().contains('<'));
        let failed = recipients.iter().find(|r| r.status == RecipientStatus::Failed).unwrap();
        assert!(failed.error.as_deref().unwrap().contains("Mailgun send failed (400)"));

        let campaign = repo.get_campaign(campaign_id).await.unwrap().unwrap();
        assert_eq!(campaign.status, CampaignStatus::Sent);
        assert!(campaign.sent_at.is_some());

        let again = send_campaign(&repo, Some(&mailgun), &UnsubscribeTokens::new("s"), campaign_id, &filters).await;
        assert!(matches!(again, Err(AppError::BadRequest(_))));
    }

    #[tokio::test]
    async fn test_empty_segment_queues_nothing() {
        let repo = Repository::open_in_memory().await.unwrap();
        subscribe(&repo, "a@example.com", &["site"]).await;
        let campaign_id = draft(&repo).await;
        let mailgun = client("http://127.0.0.1:9".into());

        let filters = SendFilters {
            tag_include: Some("vip".into()),
            tag_exclude: None,
        };
        let err = send_campaign(&repo, Some(&mailgun), &UnsubscribeTokens::new("s"), campaign_id, &filters)
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "No matching subscribers to send to.");
        assert!(repo.list_recipients(campaign_id).await.unwrap().is_empty());
        let campaign = repo.get_campaign(campaign_id).await.unwrap().unwrap();
        assert_eq!(campaign.status, CampaignStatus::Draft);
    }

    #[tokio::test]
    async fn test_unconfigured_and_missing() {
        let repo = Repository::open_in_memory().await.unwrap();
        let tokens = UnsubscribeTokens::new("s");
        let filters = SendFilters::default();

        let err = send_campaign(&repo, None, &tokens, 1, &filters).await.unwrap_err();
        assert_eq!(err.to_string(), "Mailgun is not configured.");

        let mailgun = client("http://127.0.0.1:9".into());
        let err = send_campaign(&repo, Some(&mailgun), &tokens, 99, &filters).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_webhook_updates_recipient_and_unsubscribes() {
        let repo = Repository::open_in_memory().await.unwrap();
        subscribe(&repo, "reader@example.com", &["site"]).await;
        let campaign_id = draft(&repo).await;
        let subscriber = repo.get_subscriber_by_email("reader@example.com").await.unwrap().unwrap();
        repo.queue_recipients(campaign_id, vec![subscriber.id]).await.unwrap();
        repo.mark_recipient_sent(campaign_id, subscriber.id, Some("m1@mg.test".into()))
            .await
            .unwrap();

        let event = |name: &str| {
            json!({ "event-data": {
                "event": name,
                "recipient": "reader@example.com",
                "timestamp": 1_700_000_000,
                "message": { "headers": { "message-id": "m1@mg.test" } }
            }})
        };

        handle_mail_webhook(&repo, &event("opened")).await.unwrap();
        let first = repo.get_recipient_by_message_id("m1@mg.test").await.unwrap().unwrap();
        handle_mail_webhook(&repo, &event("opened")).await.unwrap();
        let second = repo.get_recipient_by_message_id("m1@mg.test").await.unwrap().unwrap();
        assert_eq!(second.status, RecipientStatus::Opened);
        assert_eq!(first.opened_at, second.opened_at);

        handle_mail_webhook(&repo, &event("stored")).await.unwrap();
        let unchanged = repo.get_recipient_by_message_id("m1@mg.test").await.unwrap().unwrap();
        assert_eq!(unchanged.status, RecipientStatus::Opened);

        handle_mail_webhook(&repo, &event("unsubscribed")).await.unwrap();
        let gone = repo.get_subscriber_by_email("reader@example.com").await.unwrap().unwrap();
        assert!(gone.unsubscribed_at.is_some());
        assert_eq!(repo.count_mail_events().await.unwrap(), 4);
    }
}
