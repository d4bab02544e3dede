//! Token-bucket rate limiting (SPEC_FULL.md §9.5), grounded in the
//! teacher's `GlobalRateLimiter`/`rate_limit_middleware` pair in
//! `matric-api::main`: one process-wide, unkeyed bucket rather than
//! per-client buckets, matching this server's single-tenant deployment
//! shape.

use std::num::NonZeroU32;
use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use governor::{Quota, RateLimiter};

use crate::state::ServerContext;

pub type GlobalRateLimiter =
    RateLimiter<governor::state::NotKeyed, governor::state::InMemoryState, governor::clock::DefaultClock>;

pub fn build(max_requests: u32, period_secs: u64) -> Arc<GlobalRateLimiter> {
    let per_period = NonZeroU32::new(max_requests.max(1)).unwrap();
    let quota = Quota::with_period(std::time::Duration::from_secs(period_secs.max(1)))
        .unwrap()
        .allow_burst(per_period);
    Arc::new(RateLimiter::direct(quota))
}

pub async fn rate_limit_middleware(State(ctx): State<ServerContext>, request: Request, next: Next) -> Response {
    match &ctx.rate_limiter {
        Some(limiter) if limiter.check().is_err() => (
            StatusCode::TOO_MANY_REQUESTS,
            Json(serde_json::json!({
                "error": "rate_limit_exceeded",
                "error_description": "too many requests, slow down",
            })),
        )
            .into_response(),
        _ => next.run(request).await,
    }
}
