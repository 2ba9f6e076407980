use std::net::SocketAddr;

use axum::extract::{ConnectInfo, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::middleware;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::error::{AppError, FieldError, Result};
use crate::models::{NewEvent, SubscriberUpsert, TagsInput, Utm};

use super::extract::{client_ip, cookie, read_cookie, JsonBody};
use super::rate_limit::{limit_subscribe, limit_track};
use super::AppState;

const FP_COOKIE: &str = "fp_id";
const FP_MAX_AGE_SECS: i64 = 400 * 24 * 60 * 60;
const SIGNUP_SOURCE: &str = "site";

pub fn routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route(
            "/track",
            post(track).layer(middleware::from_fn_with_state(state.clone(), limit_track)),
        )
        .route(
            "/subscribe",
            post(subscribe).layer(middleware::from_fn_with_state(state, limit_subscribe)),
        )
        .route("/unsubscribe", post(unsubscribe))
}

#[derive(Debug, Deserialize)]
pub struct TrackPayload {
    #[serde(default)]
    pub event: String,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub referer: Option<String>,
    #[serde(flatten)]
    pub utm: Utm,
}

impl TrackPayload {
    fn validate(&self) -> Vec<FieldError> {
        let mut errors = Vec::new();
        check_len(&mut errors, "event", Some(&self.event), 1, 50);
        check_len(&mut errors, "path", Some(&self.path), 1, 500);
        check_len(&mut errors, "referer", self.referer.as_deref(), 0, 500);
        for (field, value) in [
            ("utm_source", &self.utm.utm_source),
            ("utm_medium", &self.utm.utm_medium),
            ("utm_campaign", &self.utm.utm_campaign),
            ("utm_content", &self.utm.utm_content),
            ("utm_term", &self.utm.utm_term),
        ] {
            check_len(&mut errors, field, value.as_deref(), 0, 100);
        }
        errors
    }
}

#[derive(Debug, Deserialize)]
pub struct SubscribePayload {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub tags: Option<TagsInput>,
    #[serde(flatten)]
    pub utm: Utm,
}

impl SubscribePayload {
    fn validate(&self) -> Vec<FieldError> {
        let mut errors = Vec::new();
        if !looks_like_email(&self.email) {
            errors.push(FieldError::new("email", "Invalid email"));
        }
        check_len(&mut errors, "name", self.name.as_deref(), 0, 120);
        errors
    }
}

#[derive(Debug, Deserialize)]
pub struct UnsubscribePayload {
    #[serde(default)]
    pub token: String,
}

fn check_len(errors: &mut Vec<FieldError>, field: &str, value: Option<&str>, min: usize, max: usize) {
    let Some(value) = value else {
        return;
    };
    let len = value.chars().count();
    if len < min {
        errors.push(FieldError::new(field, format!("{} is required", field)));
    } else if len > max {
        errors.push(FieldError::new(
            field,
            format!("{} must be at most {} characters", field, max),
        ));
    }
}

/// `local@domain.tld` with no whitespace.
fn looks_like_email(email: &str) -> bool {
    let email = email.trim();
    if email.len() > 254 || email.chars().any(char::is_whitespace) {
        return false;
    }
    match email.rsplit_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && domain.contains('.')
        }
        None => false,
    }
}

fn header_text(headers: &HeaderMap, name: header::HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string())
        .filter(|v| !v.is_empty())
}

/// POST /api/track
///
/// Records one event and answers 204. A visitor without an `fp_id` cookie gets a fresh one.
async fn track(
    State(state): State<AppState>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    JsonBody(payload): JsonBody<TrackPayload>,
) -> Result<Response> {
    let errors = payload.validate();
    if !errors.is_empty() {
        return Err(AppError::validation("Invalid payload", errors));
    }

    let existing = read_cookie(&headers, FP_COOKIE);
    let fp_id = existing
        .clone()
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    state
        .app
        .analytics
        .track(NewEvent {
            event: payload.event,
            path: payload.path,
            referer: payload
                .referer
                .filter(|r| !r.is_empty())
                .or_else(|| header_text(&headers, header::REFERER)),
            utm: payload.utm.normalized(),
            fp_id: Some(fp_id.clone()),
            ip: Some(client_ip(&headers, peer.map(|ConnectInfo(addr)| addr))),
            ua: header_text(&headers, header::USER_AGENT),
        })
        .await?;

    let mut response = StatusCode::NO_CONTENT.into_response();
    if existing.is_none() {
        let value = cookie(
            FP_COOKIE,
            &fp_id,
            FP_MAX_AGE_SECS,
            false,
            state.app.config.secure_cookies,
        );
        if let Ok(value) = HeaderValue::from_str(&value) {
            response.headers_mut().append(header::SET_COOKIE, value);
        }
    }
    Ok(response)
}

/// POST /api/subscribe
async fn subscribe(
    State(state): State<AppState>,
    headers: HeaderMap,
    JsonBody(payload): JsonBody<SubscribePayload>,
) -> Result<Json<Value>> {
    let errors = payload.validate();
    if !errors.is_empty() {
        return Err(AppError::validation("Invalid payload", errors));
    }

    let mut tags = payload.tags.map(TagsInput::into_vec).unwrap_or_default();
    if !tags.iter().any(|t| t == SIGNUP_SOURCE) {
        tags.push(SIGNUP_SOURCE.to_string());
    }

    let subscriber = state
        .app
        .repository
        .upsert_subscriber(SubscriberUpsert {
            email: payload.email,
            name: payload.name,
            source: SIGNUP_SOURCE.to_string(),
            tags,
            utm: payload.utm,
            referer: header_text(&headers, header::REFERER),
        })
        .await?;
    tracing::info!("Subscriber {} signed up", subscriber.id);

    Ok(Json(json!({
        "success": true,
        "unsubscribe_token": state.app.tokens.generate(&subscriber.email),
    })))
}

/// POST /api/unsubscribe
async fn unsubscribe(
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<UnsubscribePayload>,
) -> Result<Json<Value>> {
    if payload.token.chars().count() < 10 {
        return Err(AppError::validation(
            "Invalid payload",
            vec![FieldError::new("token", "token is required")],
        ));
    }

    let email = state
        .app
        .tokens
        .verify(&payload.token)
        .ok_or_else(|| AppError::BadRequest("Invalid unsubscribe token".to_string()))?;

    state
        .app
        .repository
        .mark_unsubscribed(&email)
        .await?
        .ok_or_else(|| AppError::not_found("Subscriber not found"))?;

    Ok(Json(json!({ "success": true })))
}
