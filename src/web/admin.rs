//! Admin console API.
//!
//! Everything except `/login` requires the admin token, either as `Authorization: Bearer`
//! or through the `admin_session` cookie set at login. Every mutation writes an audit row.

use std::collections::{BTreeMap, HashMap};

use axum::extract::{Multipart, Path, Query, Request, State};
use axum::http::{header, HeaderMap, HeaderValue};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::app::SyncTarget;
use crate::error::{AppError, Result};
use crate::models::{
    flexible_bool, parse_settings_update, ItemPatch, ItemQuery, ItemType, NewCampaign, NewGiveaway,
    NewItem, SendFilters, SettingValue,
};
use crate::services::{audit, verify_admin_token, ImportOptions, ADMIN_COOKIE};

use super::extract::{cookie, read_cookie, JsonBody};
use super::AppState;

const SESSION_MAX_AGE_SECS: i64 = 7 * 24 * 60 * 60;
const DASHBOARD_SUBSCRIBERS: u32 = 10;
const DASHBOARD_CAMPAIGNS: u32 = 5;
const EMAIL_CAMPAIGNS: u32 = 10;
const DEFAULT_SUBSCRIBER_LIMIT: u32 = 50;
const GIVEAWAY_ENTRIES: u32 = 20;
const AUDIT_LIMIT: u32 = 50;

pub fn routes(state: AppState) -> Router<AppState> {
    let protected = Router::new()
        .route("/", get(dashboard))
        .route("/logout", post(logout))
        .route("/analytics/summary", get(analytics_summary))
        .route("/items", get(list_items).post(create_item))
        .route("/items/:id", patch(update_item).delete(delete_item))
        .route("/items/:id/feature", post(feature_item))
        .route("/items/:id/visibility", post(item_visibility))
        .route("/items/:id/resummarize", post(resummarize_item))
        .route("/fetch/:provider", post(fetch_provider))
        .route("/email", get(email_overview))
        .route("/campaigns", post(create_campaign))
        .route("/campaigns/:id", get(campaign_detail))
        .route("/campaigns/:id/send", post(send_campaign))
        .route("/subscribers", get(list_subscribers))
        .route("/subscribers/:id", get(subscriber_detail))
        .route("/import/subscribers", post(import_subscribers))
        .route("/giveaways", get(list_giveaways).post(create_giveaway))
        .route("/giveaways/:id/entries", post(add_giveaway_entry))
        .route("/giveaways/:id/draw", post(draw_giveaway))
        .route("/giveaways/:id/fulfill", post(fulfill_giveaway))
        .route("/settings", get(get_settings).post(update_settings))
        .route("/audit", get(audit_log))
        .layer(middleware::from_fn_with_state(state, require_admin));

    Router::new()
        .route("/login", post(login))
        .merge(protected)
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|v| v.trim().to_string())
}

/// Admin authentication middleware
///
/// Returns 401 unless the bearer token or session cookie matches the configured token.
pub async fn require_admin(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> std::result::Result<Response, AppError> {
    let provided =
        bearer_token(request.headers()).or_else(|| read_cookie(request.headers(), ADMIN_COOKIE));

    if !verify_admin_token(&state.app.config.admin_token, provided.as_deref()) {
        tracing::warn!("Rejected admin request to {}", request.uri().path());
        return Err(AppError::Unauthorized);
    }
    Ok(next.run(request).await)
}

fn with_cookie(body: Value, set_cookie: String) -> Response {
    let mut response = Json(body).into_response();
    if let Ok(value) = HeaderValue::from_str(&set_cookie) {
        response.headers_mut().append(header::SET_COOKIE, value);
    }
    response
}

fn rejected(message: &str, errors: Vec<crate::error::FieldError>) -> Result<()> {
    if errors.is_empty() {
        Ok(())
    } else {
        Err(AppError::validation(message, errors))
    }
}

#[derive(Debug, Deserialize)]
pub struct LoginPayload {
    #[serde(default)]
    pub token: String,
}

async fn login(
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<LoginPayload>,
) -> Result<Response> {
    let config = &state.app.config;
    if !verify_admin_token(&config.admin_token, Some(payload.token.trim())) {
        tracing::warn!("Failed admin login");
        return Err(AppError::Unauthorized);
    }

    audit::record(&state.app.repository, "admin.login", json!({})).await;
    Ok(with_cookie(
        json!({ "success": true }),
        cookie(
            ADMIN_COOKIE,
            payload.token.trim(),
            SESSION_MAX_AGE_SECS,
            true,
            config.secure_cookies,
        ),
    ))
}

async fn logout(State(state): State<AppState>) -> Response {
    with_cookie(
        json!({ "success": true }),
        cookie(ADMIN_COOKIE, "", 0, true, state.app.config.secure_cookies),
    )
}

async fn dashboard(State(state): State<AppState>) -> Result<Json<Value>> {
    let app = &state.app;
    Ok(Json(json!({
        "analytics": app.analytics.summary(7).await?,
        "subscribers": app.repository.list_recent_subscribers(DASHBOARD_SUBSCRIBERS).await?,
        "campaigns": app.repository.list_campaigns(DASHBOARD_CAMPAIGNS).await?,
        "mail_configured": app.mailgun().await?.is_some(),
        "summarizer_configured": app.cache.is_configured(),
    })))
}

#[derive(Debug, Deserialize)]
pub struct DaysQuery {
    pub days: Option<u32>,
}

async fn analytics_summary(
    State(state): State<AppState>,
    Query(query): Query<DaysQuery>,
) -> Result<Json<Value>> {
    let summary = state.app.analytics.summary(query.days.unwrap_or(7)).await?;
    Ok(Json(json!(summary)))
}

#[derive(Debug, Deserialize)]
pub struct ItemsQuery {
    #[serde(rename = "type")]
    pub item_type: Option<ItemType>,
}

async fn list_items(
    State(state): State<AppState>,
    Query(query): Query<ItemsQuery>,
) -> Result<Json<Value>> {
    let item_type = query.item_type.unwrap_or(ItemType::Github);
    let items = state
        .app
        .repository
        .list_items(item_type, ItemQuery::all_including_hidden())
        .await?;
    Ok(Json(json!({
        "type": item_type,
        "synced": item_type.is_synced(),
        "types": ItemType::ALL,
        "items": items,
    })))
}

async fn create_item(
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<NewItem>,
) -> Result<Json<Value>> {
    rejected("Invalid item payload", payload.validate())?;

    let app = &state.app;
    let mut item = app.repository.create_item(payload).await?;
    audit::record(
        &app.repository,
        "item.create",
        json!({ "id": item.id, "type": item.item_type }),
    )
    .await;

    if item.item_type == ItemType::App {
        app.enrich_app(item.id, true).await?;
        if let Some(refreshed) = app.repository.get_item(item.id).await? {
            item = refreshed;
        }
    }
    Ok(Json(json!({ "success": true, "item": item })))
}

async fn update_item(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    JsonBody(patch): JsonBody<ItemPatch>,
) -> Result<Json<Value>> {
    rejected("Invalid item payload", patch.validate())?;

    let app = &state.app;
    let mut item = app.repository.update_item(id, patch).await?;
    audit::record(&app.repository, "item.update", json!({ "id": id })).await;

    if item.item_type == ItemType::App {
        app.enrich_app(id, true).await?;
        if let Some(refreshed) = app.repository.get_item(id).await? {
            item = refreshed;
        }
    }
    Ok(Json(json!({ "success": true, "item": item })))
}

#[derive(Debug, Deserialize)]
pub struct FeaturePayload {
    #[serde(default, deserialize_with = "flexible_bool")]
    pub featured: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct VisibilityPayload {
    #[serde(default, deserialize_with = "flexible_bool")]
    pub visible: Option<bool>,
}

async fn feature_item(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    JsonBody(payload): JsonBody<FeaturePayload>,
) -> Result<Json<Value>> {
    let featured = payload.featured.unwrap_or(false);
    let item = state.app.repository.set_featured(id, featured).await?;
    audit::record(
        &state.app.repository,
        "item.feature",
        json!({ "id": id, "featured": featured }),
    )
    .await;
    Ok(Json(json!({ "success": true, "item": item })))
}

async fn item_visibility(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    JsonBody(payload): JsonBody<VisibilityPayload>,
) -> Result<Json<Value>> {
    let visible = payload.visible.unwrap_or(true);
    let item = state.app.repository.set_visibility(id, visible).await?;
    audit::record(
        &state.app.repository,
        "item.visibility",
        json!({ "id": id, "visible": visible }),
    )
    .await;
    Ok(Json(json!({ "success": true, "item": item })))
}

async fn resummarize_item(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Value>> {
    let outcome = state.app.resummarize_item(id).await?;
    audit::record(
        &state.app.repository,
        "item.resummarize",
        json!({ "id": id, "cached": outcome.cached }),
    )
    .await;
    Ok(Json(json!({ "success": outcome.error.is_none(), "result": outcome })))
}

async fn delete_item(State(state): State<AppState>, Path(id): Path<i64>) -> Result<Json<Value>> {
    if !state.app.repository.delete_item(id).await? {
        return Err(AppError::not_found("Item not found"));
    }
    audit::record(&state.app.repository, "item.delete", json!({ "id": id })).await;
    Ok(Json(json!({ "success": true })))
}

async fn fetch_provider(
    State(state): State<AppState>,
    Path(provider): Path<String>,
) -> Result<Json<Value>> {
    let target: SyncTarget = provider.parse()?;
    let stats = state.app.sync(target).await?;
    audit::record(
        &state.app.repository,
        &format!("fetch.{}", provider.to_ascii_lowercase()),
        json!({
            "processed": stats.processed,
            "summarized": stats.summarized,
            "errors": stats.errors.len(),
        }),
    )
    .await;
    Ok(Json(json!({ "success": true, "stats": stats })))
}

async fn email_overview(State(state): State<AppState>) -> Result<Json<Value>> {
    let app = &state.app;
    Ok(Json(json!({
        "counts": app.repository.subscriber_counts().await?,
        "campaigns": app.repository.list_campaigns(EMAIL_CAMPAIGNS).await?,
        "mail_configured": app.mailgun().await?.is_some(),
    })))
}

async fn create_campaign(
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<NewCampaign>,
) -> Result<Json<Value>> {
    rejected("Invalid campaign payload", payload.validate())?;
    let campaign = state.app.repository.create_campaign(payload).await?;
    audit::record(
        &state.app.repository,
        "campaign.create",
        json!({ "id": campaign.id, "name": campaign.name }),
    )
    .await;
    Ok(Json(json!({ "success": true, "campaign": campaign })))
}

async fn campaign_detail(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Value>> {
    let repository = &state.app.repository;
    let campaign = repository
        .get_campaign(id)
        .await?
        .ok_or_else(|| AppError::not_found("Campaign not found"))?;
    Ok(Json(json!({
        "campaign": campaign,
        "recipients": repository.list_recipients(id).await?,
    })))
}

async fn send_campaign(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    JsonBody(filters): JsonBody<SendFilters>,
) -> Result<Json<Value>> {
    let report = state.app.send_campaign(id, &filters).await?;
    audit::record(
        &state.app.repository,
        "campaign.send",
        json!({ "id": id, "sent": report.sent, "failed": report.failed }),
    )
    .await;
    Ok(Json(json!({
        "success": true,
        "sent": report.sent,
        "failed": report.failed,
    })))
}

#[derive(Debug, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<u32>,
}

async fn list_subscribers(
    State(state): State<AppState>,
    Query(query): Query<LimitQuery>,
) -> Result<Json<Value>> {
    let limit = query.limit.unwrap_or(DEFAULT_SUBSCRIBER_LIMIT).max(1);
    let subscribers = state.app.repository.list_recent_subscribers(limit).await?;
    Ok(Json(json!({ "subscribers": subscribers })))
}

async fn subscriber_detail(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Value>> {
    let subscriber = state
        .app
        .repository
        .get_subscriber(id)
        .await?
        .ok_or_else(|| AppError::not_found("Subscriber not found"))?;
    Ok(Json(json!({
        "subscribed": subscriber.is_subscribed(),
        "subscriber": subscriber,
    })))
}

fn multipart_error(e: axum::extract::multipart::MultipartError) -> AppError {
    AppError::BadRequest(e.body_text())
}

/// Multipart fields: `file` (required), `source`, `tags`, `dry_run`, `mapping` (JSON object).
async fn import_subscribers(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<Value>> {
    let mut data: Option<Vec<u8>> = None;
    let mut options = ImportOptions::default();

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => data = Some(field.bytes().await.map_err(multipart_error)?.to_vec()),
            "source" => {
                let source = field.text().await.map_err(multipart_error)?;
                if !source.trim().is_empty() {
                    options.source = source.trim().to_string();
                }
            }
            "tags" => {
                let tags = field.text().await.map_err(multipart_error)?;
                options.extra_tags = crate::models::split_tags(&tags);
            }
            "dry_run" => {
                let flag = field.text().await.map_err(multipart_error)?;
                options.dry_run = matches!(flag.trim(), "1" | "true" | "on" | "yes");
            }
            "mapping" => {
                let mapping = field.text().await.map_err(multipart_error)?;
                if !mapping.trim().is_empty() {
                    options.mapping = serde_json::from_str::<HashMap<String, String>>(&mapping)
                        .map_err(|e| AppError::BadRequest(format!("Invalid mapping: {}", e)))?;
                }
            }
            _ => {}
        }
    }

    let data = data
        .filter(|d| !d.is_empty())
        .ok_or_else(|| AppError::BadRequest("CSV file is required".to_string()))?;
    let dry_run = options.dry_run;
    let result = state.app.import_csv(&data, options).await?;

    if !dry_run {
        audit::record(
            &state.app.repository,
            "subscribers.import",
            json!({
                "total": result.total,
                "inserted": result.inserted,
                "updated": result.updated,
                "skipped": result.skipped,
            }),
        )
        .await;
    }
    Ok(Json(json!({ "success": true, "dry_run": dry_run, "result": result })))
}

async fn list_giveaways(State(state): State<AppState>) -> Result<Json<Value>> {
    let repository = &state.app.repository;
    Ok(Json(json!({
        "giveaways": repository.list_giveaways().await?,
        "entries": repository.latest_giveaway_entries(GIVEAWAY_ENTRIES).await?,
    })))
}

async fn create_giveaway(
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<NewGiveaway>,
) -> Result<Json<Value>> {
    rejected("Invalid giveaway payload", payload.validate())?;
    let giveaway = state.app.repository.create_giveaway(payload).await?;
    audit::record(
        &state.app.repository,
        "giveaway.create",
        json!({ "id": giveaway.id, "name": giveaway.name }),
    )
    .await;
    Ok(Json(json!({ "success": true, "giveaway": giveaway })))
}

#[derive(Debug, Deserialize)]
pub struct EntryPayload {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub source: Option<String>,
}

async fn add_giveaway_entry(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    JsonBody(payload): JsonBody<EntryPayload>,
) -> Result<Json<Value>> {
    let repository = &state.app.repository;
    repository
        .get_giveaway(id)
        .await?
        .ok_or_else(|| AppError::not_found("Giveaway not found"))?;
    let subscriber = repository
        .get_subscriber_by_email(&payload.email)
        .await?
        .ok_or_else(|| AppError::not_found("Subscriber not found"))?;

    let added = repository
        .add_giveaway_entry(id, subscriber.id, payload.source)
        .await?;
    if added {
        audit::record(
            repository,
            "giveaway.entry",
            json!({ "giveaway_id": id, "subscriber_id": subscriber.id }),
        )
        .await;
    }
    Ok(Json(json!({ "success": true, "added": added })))
}

async fn draw_giveaway(State(state): State<AppState>, Path(id): Path<i64>) -> Result<Json<Value>> {
    let repository = &state.app.repository;
    repository
        .get_giveaway(id)
        .await?
        .ok_or_else(|| AppError::not_found("Giveaway not found"))?;

    let winner = repository.draw_giveaway_winner(id).await?;
    audit::record(
        repository,
        "giveaway.draw",
        json!({ "giveaway_id": id, "subscriber_id": winner.subscriber_id }),
    )
    .await;
    Ok(Json(json!({ "success": true, "winner": winner })))
}

#[derive(Debug, Deserialize)]
pub struct FulfillPayload {
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub delivered_via: Option<String>,
}

async fn fulfill_giveaway(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    JsonBody(payload): JsonBody<FulfillPayload>,
) -> Result<Json<Value>> {
    let notes = payload
        .notes
        .filter(|n| !n.trim().is_empty())
        .or(payload.delivered_via);
    if !state.app.repository.fulfill_giveaway(id, notes).await? {
        return Err(AppError::not_found("Giveaway not found"));
    }
    audit::record(
        &state.app.repository,
        "giveaway.fulfill",
        json!({ "giveaway_id": id }),
    )
    .await;
    Ok(Json(json!({ "success": true })))
}

async fn get_settings(State(state): State<AppState>) -> Result<Json<Value>> {
    let repository = &state.app.repository;
    let settings: BTreeMap<String, Value> = repository
        .all_settings()
        .await?
        .into_iter()
        .map(|(key, value)| {
            let value = match value {
                SettingValue::Text(text) => Value::String(text),
                SettingValue::Json(json) => json,
            };
            (key, value)
        })
        .collect();

    Ok(Json(json!({
        "settings": settings,
        "site": repository.site_settings().await?,
    })))
}

async fn update_settings(
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<BTreeMap<String, Value>>,
) -> Result<Json<Value>> {
    let updates = parse_settings_update(payload)
        .map_err(|errors| AppError::validation("Invalid settings data", errors))?;
    let keys: Vec<String> = updates.iter().map(|(key, _)| key.clone()).collect();

    state.app.repository.update_settings(updates).await?;
    audit::record(&state.app.repository, "settings.update", json!({ "keys": keys })).await;
    Ok(Json(json!({ "success": true })))
}

async fn audit_log(State(state): State<AppState>) -> Result<Json<Value>> {
    let entries = state.app.repository.recent_audit(AUDIT_LIMIT).await?;
    Ok(Json(json!({ "entries": entries })))
}
