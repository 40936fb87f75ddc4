//! Rate limiting for vote casting and vote lookups
//!
//! Each voter may cast a bounded number of votes per time window
//! (10 per minute by default) and look up their own vote somewhat more
//! often (240 per minute). Results and catalog reads are not limited.

use axum::{
    body::Body,
    extract::State,
    http::{header, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};
use tokio::sync::RwLock;

use crate::api::ErrorBody;
use crate::identity::Voter;
use crate::state::AppState;

/// Rate limiter state
#[derive(Debug, Clone)]
pub struct RateLimiter {
    /// Map of voter id to (request count, window start)
    requests: Arc<RwLock<HashMap<String, (u32, Instant)>>>,
    /// Maximum requests per window
    max_requests: u32,
    /// Time window duration
    window: Duration,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(10, Duration::from_secs(60)) // 10 votes per minute
    }
}

impl RateLimiter {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            requests: Arc::new(RwLock::new(HashMap::new())),
            max_requests,
            window,
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Check if a request should be allowed
    /// Returns true if allowed, false if rate limited
    pub async fn check(&self, key: &str) -> bool {
        let now = Instant::now();
        let mut requests = self.requests.write().await;

        match requests.get_mut(key) {
            Some((count, window_start)) => {
                // Check if we're in a new window
                if now.duration_since(*window_start) >= self.window {
                    *count = 1;
                    *window_start = now;
                    true
                } else if *count >= self.max_requests {
                    false
                } else {
                    *count += 1;
                    true
                }
            }
            None => {
                requests.insert(key.to_string(), (1, now));
                true
            }
        }
    }

    /// Clean up old entries (call periodically)
    pub async fn cleanup(&self) {
        let now = Instant::now();
        let mut requests = self.requests.write().await;
        requests.retain(|_, (_, window_start)| now.duration_since(*window_start) < self.window * 2);
    }

    pub async fn tracked_keys(&self) -> usize {
        self.requests.read().await.len()
    }
}

/// Anti-abuse configuration
#[derive(Debug, Clone)]
pub struct AbuseConfig {
    /// Limiter for vote casts (None = disabled)
    pub vote_limiter: Option<RateLimiter>,
    /// Limiter for a voter's own vote lookups (None = disabled)
    pub lookup_limiter: Option<RateLimiter>,
}

impl Default for AbuseConfig {
    fn default() -> Self {
        Self {
            vote_limiter: Some(RateLimiter::default()),
            lookup_limiter: Some(RateLimiter::new(240, Duration::from_secs(60))),
        }
    }
}

impl AbuseConfig {
    /// No limits at all
    pub fn disabled() -> Self {
        Self {
            vote_limiter: None,
            lookup_limiter: None,
        }
    }

    /// Load config from environment variables
    pub fn from_env() -> Self {
        let rate_limit_enabled = std::env::var("RATE_LIMIT")
            .map(|v| v != "0" && v.to_lowercase() != "false")
            .unwrap_or(true);

        if !rate_limit_enabled {
            tracing::warn!("Rate limiting DISABLED");
            return Self::disabled();
        }

        Self {
            vote_limiter: Some(limiter_from_env("VOTE", 10)),
            lookup_limiter: Some(limiter_from_env("LOOKUP", 240)),
        }
    }

    /// Spawn tasks that periodically drop expired limiter entries
    pub fn spawn_cleanup(&self) {
        for limiter in [&self.vote_limiter, &self.lookup_limiter]
            .into_iter()
            .flatten()
            .cloned()
        {
            tokio::spawn(async move {
                let period = (limiter.window() * 2).max(Duration::from_secs(1));
                let mut interval = tokio::time::interval(period);
                loop {
                    interval.tick().await;
                    limiter.cleanup().await;
                }
            });
        }
    }
}

/// Read RATE_LIMIT_<kind>_MAX and RATE_LIMIT_<kind>_WINDOW (seconds)
fn limiter_from_env(kind: &str, default_max: u32) -> RateLimiter {
    let max_requests = std::env::var(format!("RATE_LIMIT_{}_MAX", kind))
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default_max);

    let window_secs = std::env::var(format!("RATE_LIMIT_{}_WINDOW", kind))
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(60);

    tracing::info!(kind, max_requests, window_secs, "Rate limit enabled");
    RateLimiter::new(max_requests, Duration::from_secs(window_secs))
}

/// Build a 429 Too Many Requests response
fn rate_limited(retry_after: Duration) -> Response {
    let mut response = (
        StatusCode::TOO_MANY_REQUESTS,
        Json(ErrorBody {
            code: "RATE_LIMITED".to_string(),
            msg: "Too many requests. Please slow down.".to_string(),
        }),
    )
        .into_response();
    if let Ok(value) = retry_after.as_secs().max(1).to_string().parse() {
        response.headers_mut().insert(header::RETRY_AFTER, value);
    }
    response
}

/// Middleware limiting vote casts per voter
pub async fn vote_rate_limit_middleware(
    State(state): State<AppState>,
    voter: Voter,
    request: Request<Body>,
    next: Next,
) -> Response {
    enforce(state.abuse.vote_limiter.as_ref(), &voter, request, next).await
}

/// Middleware limiting vote lookups per voter
pub async fn lookup_rate_limit_middleware(
    State(state): State<AppState>,
    voter: Voter,
    request: Request<Body>,
    next: Next,
) -> Response {
    enforce(state.abuse.lookup_limiter.as_ref(), &voter, request, next).await
}

async fn enforce(
    limiter: Option<&RateLimiter>,
    voter: &Voter,
    request: Request<Body>,
    next: Next,
) -> Response {
    if let Some(limiter) = limiter {
        if !limiter.check(&voter.0).await {
            tracing::warn!(voter_id = %voter.0, uri = %request.uri(), "Rate limited");
            return rate_limited(limiter.window());
        }
    }

    next.run(request).await
}
