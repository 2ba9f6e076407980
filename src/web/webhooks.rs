use axum::body::Bytes;
use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{json, Map, Value};

use crate::error::Result;
use crate::services::handle_mail_webhook;

use super::AppState;

pub fn routes() -> Router<AppState> {
    Router::new().route("/mailgun", post(mailgun))
}

/// JSON bodies are taken as-is; anything else is read as a urlencoded form.
fn parse_body(body: &[u8]) -> Value {
    if let Ok(value) = serde_json::from_slice::<Value>(body) {
        return value;
    }
    let form: Map<String, Value> = url::form_urlencoded::parse(body)
        .map(|(key, value)| (key.into_owned(), Value::String(value.into_owned())))
        .collect();
    Value::Object(form)
}

/// POST /webhooks/mailgun
async fn mailgun(State(state): State<AppState>, body: Bytes) -> Result<Json<Value>> {
    let payload = parse_body(&body);
    handle_mail_webhook(&state.app.repository, &payload).await?;
    Ok(Json(json!({ "success": true })))
}
