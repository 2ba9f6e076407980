//! HTTP surface: public pages, the tracking/subscribe API, admin and provider webhooks.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use tower_http::trace::TraceLayer;

use crate::app::App;

mod admin;
mod api;
mod extract;
mod health;
mod public;
mod rate_limit;
mod webhooks;

pub use extract::{client_ip, read_cookie, JsonBody};
pub use health::{health_routes, HealthResponse};
pub use rate_limit::RateLimits;

const LIMITER_PRUNE_INTERVAL: Duration = Duration::from_secs(300);

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub app: Arc<App>,
    pub limits: Arc<RateLimits>,
}

impl AppState {
    pub fn new(app: App) -> Self {
        Self::with_limits(app, RateLimits::default())
    }

    pub fn with_limits(app: App, limits: RateLimits) -> Self {
        Self {
            app: Arc::new(app),
            limits: Arc::new(limits),
        }
    }
}

/// Build the application router.
///
/// `/health` and the public pages need nothing; `/admin/*` (except login) sits behind the
/// admin session check; `/api/track` and `/api/subscribe` are rate limited per client address.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(public::routes())
        .nest("/api", api::routes(state.clone()))
        .nest("/admin", admin::routes(state.clone()))
        .nest("/webhooks", webhooks::routes())
        .merge(health_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind and serve until the process is stopped.
pub async fn serve(state: AppState, bind_addr: &str) -> anyhow::Result<()> {
    let limits = state.limits.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(LIMITER_PRUNE_INTERVAL);
        loop {
            interval.tick().await;
            limits.prune();
        }
    });

    let router = build_router(state);
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    tracing::info!("personal-hub listening on http://{}", listener.local_addr()?);
    tracing::info!("Health check: http://{}/health", listener.local_addr()?);

    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;
    Ok(())
}
