use std::num::NonZeroU32;

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use governor::{DefaultKeyedRateLimiter, Quota, RateLimiter};

use crate::error::{AppError, Result};

use super::extract::request_ip;
use super::AppState;

const TRACK_PER_MINUTE: u32 = 120;
const SUBSCRIBE_PER_MINUTE: u32 = 10;

/// Per-address quotas for the unauthenticated write endpoints.
pub struct RateLimits {
    track: DefaultKeyedRateLimiter<String>,
    subscribe: DefaultKeyedRateLimiter<String>,
}

fn per_minute(n: u32) -> DefaultKeyedRateLimiter<String> {
    RateLimiter::keyed(Quota::per_minute(
        NonZeroU32::new(n).unwrap_or(NonZeroU32::MIN),
    ))
}

impl RateLimits {
    pub fn per_minute(track: u32, subscribe: u32) -> Self {
        Self {
            track: per_minute(track),
            subscribe: per_minute(subscribe),
        }
    }

    pub fn check_track(&self, ip: &str) -> Result<()> {
        self.track
            .check_key(&ip.to_string())
            .map_err(|_| AppError::RateLimited)
    }

    pub fn check_subscribe(&self, ip: &str) -> Result<()> {
        self.subscribe
            .check_key(&ip.to_string())
            .map_err(|_| AppError::RateLimited)
    }

    /// Drop keys whose quota has fully replenished.
    pub fn prune(&self) {
        self.track.retain_recent();
        self.subscribe.retain_recent();
    }
}

impl Default for RateLimits {
    fn default() -> Self {
        Self::per_minute(TRACK_PER_MINUTE, SUBSCRIBE_PER_MINUTE)
    }
}

pub(super) async fn limit_track(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> std::result::Result<Response, AppError> {
    let ip = request_ip(&request);
    if let Err(e) = state.limits.check_track(&ip) {
        tracing::debug!("Track rate limit hit for {}", ip);
        return Err(e);
    }
    Ok(next.run(request).await)
}

pub(super) async fn limit_subscribe(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> std::result::Result<Response, AppError> {
    let ip = request_ip(&request);
    if let Err(e) = state.limits.check_subscribe(&ip) {
        tracing::warn!("Subscribe rate limit hit for {}", ip);
        return Err(e);
    }
    Ok(next.run(request).await)
}
