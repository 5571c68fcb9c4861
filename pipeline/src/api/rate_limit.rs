//! Per-key token bucket throttling.
//!
//! Each API key owns a bucket holding up to `burst` tokens that refills at
//! `requests_per_second`. A request takes one token or is rejected with
//! `RateLimit`; nothing waits.

use crate::api::auth::ApiKey;
use crate::services::AppError;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use common::config::RateLimitSettings;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::warn;

const ANONYMOUS: &str = "";

#[derive(Debug, Clone, Copy)]
struct TokenBucket {
    tokens: f64,
    last_refill: Instant,
}

#[derive(Debug)]
pub struct RateLimiter {
    rate: f64,
    burst: f64,
    buckets: DashMap<String, TokenBucket>,
}

impl RateLimiter {
    pub fn new(requests_per_second: f64, burst: u32) -> Self {
        Self {
            rate: requests_per_second.max(0.0),
            burst: f64::from(burst.max(1)),
            buckets: DashMap::new(),
        }
    }

    pub fn from_settings(settings: &RateLimitSettings) -> Self {
        Self::new(settings.requests_per_second, settings.burst)
    }

    pub fn try_acquire(&self, key: &str) -> bool {
        self.try_acquire_at(key, Instant::now())
    }

    pub fn try_acquire_at(&self, key: &str, now: Instant) -> bool {
        let mut bucket = self
            .buckets
            .entry(key.to_string())
            .or_insert(TokenBucket {
                tokens: self.burst,
                last_refill: now,
            });

        let elapsed = now.saturating_duration_since(bucket.last_refill).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.rate).min(self.burst);
        bucket.last_refill = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

pub async fn throttle(
    State(limiter): State<Arc<RateLimiter>>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let key = request
        .extensions()
        .get::<ApiKey>()
        .map(|k| k.0.as_str())
        .unwrap_or(ANONYMOUS);

    if !limiter.try_acquire(key) {
        warn!(path = %request.uri().path(), "Request throttled");
        return Err(AppError(common::Error::RateLimit));
    }

    Ok(next.run(request).await)
}
