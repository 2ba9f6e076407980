//! Integration tests for the HTTP surface
//!
//! Tests cover:
//! - Health endpoint (no auth required)
//! - Public subscribe/unsubscribe/track API and its rate limits
//! - Admin authentication (bearer token and session cookie)
//! - Campaign send guard, CSV import dry run, settings validation, giveaways
//! - Mailgun webhook idempotency

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::util::ServiceExt; // for `oneshot` method

use personal_hub::db::Repository;
use personal_hub::models::{NewCampaign, RecipientStatus};
use personal_hub::web::RateLimits;
use personal_hub::{build_router, App, AppState, Config};

const ADMIN_TOKEN: &str = "test-admin-token";

/// Test helper: in-memory app with an admin token and Mailgun pointed nowhere
async fn setup_state(limits: RateLimits) -> AppState {
    let mut config = Config::default();
    config.admin_token = ADMIN_TOKEN.to_string();
    config.unsubscribe_secret = "test-secret".to_string();
    config.mailgun.api_key = Some("key".to_string());
    config.mailgun.domain = Some("mg.test".to_string());
    config.mailgun.from = Some("Hub <hub@mg.test>".to_string());
    config.mailgun.base_url = "http://127.0.0.1:9".to_string();

    let repository = Repository::open_in_memory().await.unwrap();
    let app = App::with_repository(config, repository).unwrap();
    AppState::with_limits(app, limits)
}

async fn setup() -> (Router, AppState) {
    let state = setup_state(RateLimits::default()).await;
    (build_router(state.clone()), state)
}

/// Test helper: Create request with no body
fn test_request(method: &str, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn admin_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::AUTHORIZATION, format!("Bearer {}", ADMIN_TOKEN))
        .body(Body::from(body.to_string()))
        .unwrap()
}

/// Test helper: Extract JSON body from response
async fn extract_json(body: Body) -> Value {
    let bytes = axum::body::to_bytes(body, usize::MAX)
        .await
        .expect("Should read body");
    serde_json::from_slice(&bytes).expect("Should parse JSON")
}

// =============================================================================
// Health
// =============================================================================

#[tokio::test]
async fn test_health_endpoint_no_auth_required() {
    let (router, _) = setup().await;

    let response = router.oneshot(test_request("GET", "/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = extract_json(response.into_body()).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}

// =============================================================================
// Public API
// =============================================================================

#[tokio::test]
async fn test_subscribe_twice_merges_tags() {
    let (router, state) = setup().await;

    let first = router
        .clone()
        .oneshot(json_request("POST", "/api/subscribe", json!({ "email": "Reader@Example.com" })))
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::OK);
    let body = extract_json(first.into_body()).await;
    assert_eq!(body["success"], true);
    let token = body["unsubscribe_token"].as_str().unwrap().to_string();

    let second = router
        .oneshot(json_request(
            "POST",
            "/api/subscribe",
            json!({ "email": "reader@example.com", "tags": "vip", "utm_source": "twitter" }),
        ))
        .await
        .unwrap();
    assert_eq!(second.status(), StatusCode::OK);

    let subscriber = state
        .app
        .repository
        .get_subscriber_by_email("reader@example.com")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(subscriber.tags, "site,vip");
    assert_eq!(subscriber.source.as_deref(), Some("site"));
    assert_eq!(subscriber.utm.utm_source.as_deref(), Some("twitter"));
    assert_eq!(state.app.repository.subscriber_counts().await.unwrap().total, 1);
    assert_eq!(state.app.tokens.verify(&token).as_deref(), Some("reader@example.com"));
}

#[tokio::test]
async fn test_subscribe_rejects_bad_email() {
    let (router, _) = setup().await;

    let response = router
        .oneshot(json_request("POST", "/api/subscribe", json!({ "email": "not-an-email" })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = extract_json(response.into_body()).await;
    assert_eq!(body["error"], "Invalid payload");
    assert_eq!(body["details"][0]["field"], "email");
}

#[tokio::test]
async fn test_unsubscribe_with_token() {
    let (router, state) = setup().await;

    router
        .clone()
        .oneshot(json_request("POST", "/api/subscribe", json!({ "email": "gone@example.com" })))
        .await
        .unwrap();
    let token = state.app.tokens.generate("gone@example.com").unwrap();

    let response = router
        .clone()
        .oneshot(json_request("POST", "/api/unsubscribe", json!({ "token": token })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let subscriber = state
        .app
        .repository
        .get_subscriber_by_email("gone@example.com")
        .await
        .unwrap()
        .unwrap();
    assert!(subscriber.unsubscribed_at.is_some());

    let forged = router
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/unsubscribe",
            json!({ "token": "Z29uZUBleGFtcGxlLmNvbQ.forgedsignature" }),
        ))
        .await
        .unwrap();
    assert_eq!(forged.status(), StatusCode::BAD_REQUEST);
    assert_eq!(extract_json(forged.into_body()).await["error"], "Invalid unsubscribe token");

    let stranger = state.app.tokens.generate("stranger@example.com").unwrap();
    let missing = router
        .clone()
        .oneshot(json_request("POST", "/api/unsubscribe", json!({ "token": stranger })))
        .await
        .unwrap();
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    assert_eq!(extract_json(missing.into_body()).await["error"], "Subscriber not found");

    let page = router
        .oneshot(test_request("GET", "/unsubscribe?token=bogus.token"))
        .await
        .unwrap();
    assert_eq!(page.status(), StatusCode::OK);
    let body = extract_json(page.into_body()).await;
    assert_eq!(body["invalid"], true);
    assert!(body["email"].is_null());
}

#[tokio::test]
async fn test_track_sets_fingerprint_cookie_once() {
    let (router, state) = setup().await;

    let response = router
        .clone()
        .oneshot(json_request("POST", "/api/track", json!({ "event": "pageview", "path": "/" })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let set_cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(set_cookie.starts_with("fp_id="));
    assert!(set_cookie.contains("Max-Age=34560000"));
    assert!(set_cookie.contains("SameSite=Lax"));
    assert!(!set_cookie.contains("HttpOnly"));

    let fp_pair = set_cookie.split(';').next().unwrap().to_string();
    let again = router
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/track")
                .header(header::CONTENT_TYPE, "application/json")
                .header(header::COOKIE, fp_pair)
                .body(Body::from(json!({ "event": "pageview", "path": "/about" }).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(again.status(), StatusCode::NO_CONTENT);
    assert!(again.headers().get(header::SET_COOKIE).is_none());

    let summary = state.app.analytics.summary(7).await.unwrap();
    assert_eq!(summary.totals.visitors, 1);
    assert_eq!(summary.sparkline.last().unwrap().count, 2);
}

#[tokio::test]
async fn test_track_validates_payload() {
    let (router, _) = setup().await;

    let response = router
        .oneshot(json_request("POST", "/api/track", json!({ "event": "pageview", "path": "" })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = extract_json(response.into_body()).await;
    assert_eq!(body["details"][0]["field"], "path");
}

#[tokio::test]
async fn test_subscribe_rate_limit_is_per_address() {
    let state = setup_state(RateLimits::per_minute(120, 2)).await;
    let router = build_router(state);

    let subscribe = |ip: &str, n: usize| {
        Request::builder()
            .method("POST")
            .uri("/api/subscribe")
            .header(header::CONTENT_TYPE, "application/json")
            .header("x-forwarded-for", ip)
            .body(Body::from(
                json!({ "email": format!("r{}@example.com", n) }).to_string(),
            ))
            .unwrap()
    };

    for n in 0..2 {
        let response = router.clone().oneshot(subscribe("203.0.113.1", n)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
    let limited = router.clone().oneshot(subscribe("203.0.113.1", 2)).await.unwrap();
    assert_eq!(limited.status(), StatusCode::TOO_MANY_REQUESTS);

    let other = router.oneshot(subscribe("203.0.113.2", 3)).await.unwrap();
    assert_eq!(other.status(), StatusCode::OK);
}

// =============================================================================
// Admin authentication
// =============================================================================

#[tokio::test]
async fn test_admin_requires_token() {
    let (router, _) = setup().await;

    let response = router.clone().oneshot(test_request("GET", "/admin")).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(extract_json(response.into_body()).await["error"], "Unauthorized");

    let wrong = router
        .clone()
        .oneshot(
            Request::builder()
                .uri("/admin/email")
                .header(header::AUTHORIZATION, "Bearer nope")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(wrong.status(), StatusCode::UNAUTHORIZED);

    let ok = router
        .oneshot(admin_request("GET", "/admin", json!({})))
        .await
        .unwrap();
    assert_eq!(ok.status(), StatusCode::OK);
    let body = extract_json(ok.into_body()).await;
    assert_eq!(body["mail_configured"], true);
    assert_eq!(body["analytics"]["sparkline"].as_array().unwrap().len(), 7);
}

#[tokio::test]
async fn test_login_cookie_grants_access() {
    let (router, _) = setup().await;

    let bad = router
        .clone()
        .oneshot(json_request("POST", "/admin/login", json!({ "token": "guess" })))
        .await
        .unwrap();
    assert_eq!(bad.status(), StatusCode::UNAUTHORIZED);

    let login = router
        .clone()
        .oneshot(json_request("POST", "/admin/login", json!({ "token": ADMIN_TOKEN })))
        .await
        .unwrap();
    assert_eq!(login.status(), StatusCode::OK);
    let set_cookie = login
        .headers()
        .get(header::SET_COOKIE)
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(set_cookie.contains("HttpOnly"));
    assert!(set_cookie.contains("Max-Age=604800"));

    let session = set_cookie.split(';').next().unwrap().to_string();
    let response = router
        .oneshot(
            Request::builder()
                .uri("/admin/email")
                .header(header::COOKIE, session)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = extract_json(response.into_body()).await;
    assert_eq!(body["counts"]["total"], 0);
}

// =============================================================================
// Admin operations
// =============================================================================

#[tokio::test]
async fn test_send_with_no_matching_subscribers_is_rejected() {
    let (router, state) = setup().await;
    let campaign = state
        .app
        .repository
        .create_campaign(NewCampaign {
            name: "Launch".into(),
            subject: "Hello".into(),
            html_body: "<p>Hi</p>".into(),
            text_body: None,
            scheduled_for: None,
        })
        .await
        .unwrap();

    let response = router
        .oneshot(admin_request(
            "POST",
            &format!("/admin/campaigns/{}/send", campaign.id),
            json!({}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        extract_json(response.into_body()).await["error"],
        "No matching subscribers to send to."
    );
    assert!(state.app.repository.list_recipients(campaign.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_item_crud_and_public_listing() {
    let (router, _) = setup().await;

    let created = router
        .clone()
        .oneshot(admin_request(
            "POST",
            "/admin/items",
            json!({
                "type": "product",
                "title": "Widget",
                "source_url": "https://example.com/widget",
                "tags": ["tools", "paid"],
            }),
        ))
        .await
        .unwrap();
    assert_eq!(created.status(), StatusCode::OK);
    let id = extract_json(created.into_body()).await["item"]["id"].as_i64().unwrap();

    let hidden = router
        .clone()
        .oneshot(admin_request(
            "POST",
            &format!("/admin/items/{}/visibility", id),
            json!({ "visible": "false" }),
        ))
        .await
        .unwrap();
    assert_eq!(hidden.status(), StatusCode::OK);

    let public = router.clone().oneshot(test_request("GET", "/products")).await.unwrap();
    let body = extract_json(public.into_body()).await;
    assert!(body["items"].as_array().unwrap().is_empty());

    let admin = router
        .clone()
        .oneshot(admin_request("GET", "/admin/items?type=product", json!({})))
        .await
        .unwrap();
    let body = extract_json(admin.into_body()).await;
    assert_eq!(body["items"][0]["tags"], "tools,paid");

    let invalid = router
        .clone()
        .oneshot(admin_request("POST", "/admin/items", json!({ "type": "product", "title": "" })))
        .await
        .unwrap();
    assert_eq!(invalid.status(), StatusCode::BAD_REQUEST);

    let deleted = router
        .clone()
        .oneshot(admin_request("DELETE", &format!("/admin/items/{}", id), json!({})))
        .await
        .unwrap();
    assert_eq!(deleted.status(), StatusCode::OK);
    let again = router
        .oneshot(admin_request("DELETE", &format!("/admin/items/{}", id), json!({})))
        .await
        .unwrap();
    assert_eq!(again.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_duplicate_synced_item_and_type_change_are_bad_requests() {
    let (router, _) = setup().await;
    let repo = json!({
        "type": "github",
        "title": "hub",
        "source_url": "https://github.com/octo/hub",
    });

    let first = router
        .clone()
        .oneshot(admin_request("POST", "/admin/items", repo.clone()))
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::OK);
    let id = extract_json(first.into_body()).await["item"]["id"].as_i64().unwrap();

    let duplicate = router
        .clone()
        .oneshot(admin_request("POST", "/admin/items", repo))
        .await
        .unwrap();
    assert_eq!(duplicate.status(), StatusCode::BAD_REQUEST);
    let body = extract_json(duplicate.into_body()).await;
    assert_eq!(body["error"], "An item with this source URL already exists");

    let retyped = router
        .oneshot(admin_request(
            "PATCH",
            &format!("/admin/items/{}", id),
            json!({ "type": "youtube" }),
        ))
        .await
        .unwrap();
    assert_eq!(retyped.status(), StatusCode::BAD_REQUEST);
    let body = extract_json(retyped.into_body()).await;
    assert_eq!(body["error"], "Item type cannot be changed");
}

#[tokio::test]
async fn test_invalid_settings_are_rejected_with_details() {
    let (router, _) = setup().await;

    let response = router
        .clone()
        .oneshot(admin_request(
            "POST",
            "/admin/settings",
            json!({ "site.title": "", "site.appeared_on": "{not json" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = extract_json(response.into_body()).await;
    assert_eq!(body["error"], "Invalid settings data");
    assert!(!body["details"].as_array().unwrap().is_empty());
}

const CSV: &str = "Email Address,Full Name,Tags\n\
    one@example.com,One,beta\n\
    two@example.com,,\n\
    ,Nobody,\n";

fn import_request(dry_run: bool) -> Request<Body> {
    let boundary = "hubtestboundary";
    let body = format!(
        "--{b}\r\nContent-Disposition: form-data; name=\"dry_run\"\r\n\r\n{dry}\r\n\
         --{b}\r\nContent-Disposition: form-data; name=\"tags\"\r\n\r\nimported\r\n\
         --{b}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"list.csv\"\r\n\
         Content-Type: text/csv\r\n\r\n{csv}\r\n--{b}--\r\n",
        b = boundary,
        dry = dry_run,
        csv = CSV,
    );
    Request::builder()
        .method("POST")
        .uri("/admin/import/subscribers")
        .header(header::AUTHORIZATION, format!("Bearer {}", ADMIN_TOKEN))
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", boundary),
        )
        .body(Body::from(body))
        .unwrap()
}

#[tokio::test]
async fn test_csv_dry_run_reports_real_counts_without_writing() {
    let (router, state) = setup().await;

    let dry = router.clone().oneshot(import_request(true)).await.unwrap();
    assert_eq!(dry.status(), StatusCode::OK);
    let dry = extract_json(dry.into_body()).await;
    assert_eq!(dry["dry_run"], true);
    assert_eq!(state.app.repository.subscriber_counts().await.unwrap().total, 0);

    let real = router.oneshot(import_request(false)).await.unwrap();
    let real = extract_json(real.into_body()).await;
    for key in ["total", "inserted", "updated", "skipped"] {
        assert_eq!(dry["result"][key], real["result"][key], "{} differs", key);
    }
    assert_eq!(real["result"]["inserted"], 2);
    assert_eq!(real["result"]["skipped"], 1);

    let one = state
        .app
        .repository
        .get_subscriber_by_email("one@example.com")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(one.tags, "imported,beta");
}

#[tokio::test]
async fn test_import_without_file_is_bad_request() {
    let (router, _) = setup().await;
    let boundary = "hubtestboundary";
    let request = Request::builder()
        .method("POST")
        .uri("/admin/import/subscribers")
        .header(header::AUTHORIZATION, format!("Bearer {}", ADMIN_TOKEN))
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", boundary),
        )
        .body(Body::from(format!(
            "--{b}\r\nContent-Disposition: form-data; name=\"source\"\r\n\r\nsheet\r\n--{b}--\r\n",
            b = boundary
        )))
        .unwrap();

    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(extract_json(response.into_body()).await["error"], "CSV file is required");
}

#[tokio::test]
async fn test_giveaway_flow() {
    let (router, _) = setup().await;

    let missing = router
        .clone()
        .oneshot(admin_request("POST", "/admin/giveaways/99/draw", json!({})))
        .await
        .unwrap();
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);

    let created = router
        .clone()
        .oneshot(admin_request("POST", "/admin/giveaways", json!({ "name": "Sticker pack" })))
        .await
        .unwrap();
    let id = extract_json(created.into_body()).await["giveaway"]["id"].as_i64().unwrap();

    let empty = router
        .clone()
        .oneshot(admin_request("POST", &format!("/admin/giveaways/{}/draw", id), json!({})))
        .await
        .unwrap();
    assert_eq!(empty.status(), StatusCode::BAD_REQUEST);
    assert_eq!(extract_json(empty.into_body()).await["error"], "No entries to draw from.");

    let stranger = router
        .clone()
        .oneshot(admin_request(
            "POST",
            &format!("/admin/giveaways/{}/entries", id),
            json!({ "email": "nobody@example.com" }),
        ))
        .await
        .unwrap();
    assert_eq!(stranger.status(), StatusCode::NOT_FOUND);

    router
        .clone()
        .oneshot(json_request("POST", "/api/subscribe", json!({ "email": "fan@example.com" })))
        .await
        .unwrap();
    let entry = router
        .clone()
        .oneshot(admin_request(
            "POST",
            &format!("/admin/giveaways/{}/entries", id),
            json!({ "email": "FAN@example.com" }),
        ))
        .await
        .unwrap();
    assert_eq!(extract_json(entry.into_body()).await["added"], true);

    let draw = router
        .clone()
        .oneshot(admin_request("POST", &format!("/admin/giveaways/{}/draw", id), json!({})))
        .await
        .unwrap();
    let body = extract_json(draw.into_body()).await;
    assert_eq!(body["winner"]["email"], "fan@example.com");

    let fulfilled = router
        .oneshot(admin_request(
            "POST",
            &format!("/admin/giveaways/{}/fulfill", id),
            json!({ "delivered_via": "post" }),
        ))
        .await
        .unwrap();
    assert_eq!(fulfilled.status(), StatusCode::OK);
}

// =============================================================================
// Webhooks
// =============================================================================

#[tokio::test]
async fn test_mailgun_webhook_is_idempotent() {
    let (router, state) = setup().await;
    let repository = &state.app.repository;

    router
        .clone()
        .oneshot(json_request("POST", "/api/subscribe", json!({ "email": "reader@example.com" })))
        .await
        .unwrap();
    let subscriber = repository
        .get_subscriber_by_email("reader@example.com")
        .await
        .unwrap()
        .unwrap();
    let campaign = repository
        .create_campaign(NewCampaign {
            name: "Issue 1".into(),
            subject: "Hello".into(),
            html_body: "<p>Hi</p>".into(),
            text_body: None,
            scheduled_for: None,
        })
        .await
        .unwrap();
    repository.queue_recipients(campaign.id, vec![subscriber.id]).await.unwrap();
    repository
        .mark_recipient_sent(campaign.id, subscriber.id, Some("abc@mg.test".into()))
        .await
        .unwrap();

    let opened = json!({ "event-data": {
        "event": "opened",
        "recipient": "reader@example.com",
        "timestamp": 1_700_000_000.5,
        "message": { "headers": { "message-id": "abc@mg.test" } }
    }});

    for _ in 0..2 {
        let response = router
            .clone()
            .oneshot(json_request("POST", "/webhooks/mailgun", opened.clone()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(extract_json(response.into_body()).await["success"], true);
    }

    let recipient = tokio_test::assert_ok!(repository.get_recipient_by_message_id("abc@mg.test").await)
        .unwrap();
    assert_eq!(recipient.status, RecipientStatus::Opened);
    assert!(recipient.opened_at.is_some());
    assert_eq!(repository.count_mail_events().await.unwrap(), 2);
}
