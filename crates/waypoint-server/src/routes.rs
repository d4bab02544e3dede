//! HTTP router assembly: the full route table across streamable-HTTP,
//! SSE, and WebSocket transports.
//!
//! A flat `Router::new()...with_state(state)` chain: a `.route()` list
//! followed by `.layer()`s applied in a fixed order (auth, then rate
//! limiting, then tracing/request-id, then CORS, then a body-size cap).

use std::sync::Arc;
use std::time::Duration;

use axum::http::{header, HeaderValue, Method, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use waypoint_core::{defaults, TransportKind};
use waypoint_transport::capabilities::{required_scope, SUPPORTED_PROTOCOL_VERSIONS};

use crate::auth::AuthPrincipal;
use crate::middleware::auth::{auth_middleware, check_scope};
use crate::middleware::rate_limit::rate_limit_middleware;
use crate::rpc_handler::{self, tool_name};
use crate::sse;
use crate::state::ServerContext;
use crate::ws::ws_handler;

fn parse_allowed_origins(raw: &[String]) -> Vec<HeaderValue> {
    raw.iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(origin = %origin, error = %e, "invalid CORS origin, dropping");
                None
            }
        })
        .collect()
}

/// `POST /mcp`: the streamable-HTTP transport. One JSON-RPC request in,
/// one JSON-RPC response out, no SSE upgrade — the default transport
/// for a non-streaming client.
async fn mcp_post(
    axum::extract::State(ctx): axum::extract::State<ServerContext>,
    Extension(principal): Extension<AuthPrincipal>,
    Json(request): Json<waypoint_transport::rpc::RpcRequest>,
) -> impl IntoResponse {
    let required = required_scope(&request.method, tool_name(&request).as_deref());
    if let Err(err) = check_scope(&principal, required) {
        return (
            StatusCode::FORBIDDEN,
            Json(serde_json::json!({"error": err.to_string()})),
        )
            .into_response();
    }
    let response = rpc_handler::dispatch(&ctx, TransportKind::Http, None, request).await;
    Json(response).into_response()
}

/// `GET /health`: pings the database and the embedder and reports each
/// independently rather than collapsing to a single liveness bit — an
/// operator needs to know *which* dependency degraded.
async fn health(axum::extract::State(ctx): axum::extract::State<ServerContext>) -> impl IntoResponse {
    let db_ok = sqlx::query("SELECT 1").execute(ctx.db.pool()).await.is_ok();
    let embedder_ok = ctx.embedder.embed("health check").await.is_ok();

    let status = if db_ok && embedder_ok { "healthy" } else { "degraded" };
    let body = serde_json::json!({
        "status": status,
        "version": env!("CARGO_PKG_VERSION"),
        "checks": {"database": db_ok, "embedder": embedder_ok},
    });

    let code = if db_ok && embedder_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (code, Json(body))
}

async fn about(axum::extract::State(ctx): axum::extract::State<ServerContext>) -> impl IntoResponse {
    Json(serde_json::json!({
        "name": "waypoint",
        "version": env!("CARGO_PKG_VERSION"),
        "mode": format!("{:?}", ctx.config.mode),
        "protocol_versions": SUPPORTED_PROTOCOL_VERSIONS,
    }))
}

/// `GET /metrics`: a JSON snapshot over HTTP, not the Prometheus text
/// exposition format — queue depth and connection counts logged
/// periodically are also surfaced here for an operator polling over HTTP.
async fn metrics(axum::extract::State(ctx): axum::extract::State<ServerContext>) -> impl IntoResponse {
    let pending_jobs: i64 = sqlx::query_scalar(
        "SELECT count(*) FROM jobs WHERE status IN ('queued', 'running')",
    )
    .fetch_one(ctx.db.pool())
    .await
    .unwrap_or(0);

    Json(serde_json::json!({
        "db_pool_size": ctx.db.pool().size(),
        "db_pool_idle": ctx.db.pool().num_idle(),
        "pending_jobs": pending_jobs,
        "sessions_cached": ctx.sessions.cached_count(),
    }))
}

async fn well_known_mcp_server(axum::extract::State(ctx): axum::extract::State<ServerContext>) -> impl IntoResponse {
    Json(serde_json::json!({
        "name": "waypoint",
        "version": env!("CARGO_PKG_VERSION"),
        "protocol_versions": SUPPORTED_PROTOCOL_VERSIONS,
        "transports": ["stdio", "http", "websocket", "sse"],
        "mode": format!("{:?}", ctx.config.mode),
    }))
}

async fn oauth_protected_resource(axum::extract::State(ctx): axum::extract::State<ServerContext>) -> impl IntoResponse {
    Json(serde_json::json!({
        "resource": ctx.config.issuer,
        "authorization_servers": [ctx.config.issuer],
        "bearer_methods_supported": ["header", "query"],
    }))
}

pub fn router(ctx: Arc<ServerContext>) -> Router {
    let state = (*ctx).clone();
    let allowed_origins = parse_allowed_origins(&state.config.allowed_origins);

    Router::new()
        .route("/mcp", post(mcp_post))
        .route("/mcp/ws", get(ws_handler))
        .route("/sse", get(sse::sse_connect))
        .route("/messages", post(sse::messages))
        .route("/messages/:connection_id", post(sse::messages_with_id))
        .route("/jobs", post(sse::submit_job))
        .route("/jobs/:id/events", get(sse::job_events))
        .route("/health", get(health))
        .route("/about", get(about))
        .route("/metrics", get(metrics))
        .route("/.well-known/mcp-server", get(well_known_mcp_server))
        .route(
            "/.well-known/oauth-protected-resource",
            get(oauth_protected_resource),
        )
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            rate_limit_middleware,
        ))
        .layer(axum::middleware::from_fn_with_state(state.clone(), auth_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(AllowOrigin::list(allowed_origins))
                .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
                .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE, header::ACCEPT])
                .max_age(Duration::from_secs(defaults::CORS_MAX_AGE_SECS)),
        )
        .layer(RequestBodyLimitLayer::new(10 * 1024 * 1024))
        .with_state(state)
}
