//! Axum middleware wrapping `crate::auth::authorize` (SPEC_FULL.md §9.4),
//! grounded in the teacher's `auth_middleware`/`is_public_route` pair in
//! `matric-api::main`.
//!
//! This layer only authenticates: it resolves the bearer token to an
//! `AuthPrincipal` and stashes it as a request extension. The specific
//! scope a method/tool requires isn't known until the handler parses the
//! JSON-RPC body, so the per-call scope check happens there, via
//! `check_scope` below, against the principal this layer already
//! verified.

use axum::extract::{Request, State};
use axum::http::{header, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;

use waypoint_core::{Error, Result};

use crate::auth::{bearer_token, insufficient_scope_challenge, unauthorized_challenge, AuthPrincipal, Authenticator};
use crate::state::ServerContext;

fn is_public_route(path: &str) -> bool {
    matches!(path, "/health" | "/about" | "/metrics")
        || path.starts_with("/.well-known/")
}

/// WebSocket clients (browsers in particular) can't always set a custom
/// `Authorization` header on the upgrade request, so `/mcp/ws` also
/// accepts the token as an `access_token` query parameter (spec.md §4.1
/// "WebSocket's bearer-in-query-or-header").
fn token_from_request(request: &Request) -> Option<String> {
    if let Some(token) = bearer_token(request.headers()) {
        return Some(token.to_string());
    }
    if request.uri().path() == "/mcp/ws" {
        let query = request.uri().query()?;
        return query.split('&').find_map(|pair| {
            let (key, value) = pair.split_once('=')?;
            (key == "access_token").then(|| value.to_string())
        });
    }
    None
}

fn unauthorized_response(issuer: &str, err: Error) -> Response {
    let status = match &err {
        Error::Unauthorized(_) => StatusCode::UNAUTHORIZED,
        Error::Forbidden(_) => StatusCode::FORBIDDEN,
        _ => StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
    };
    let challenge = match status {
        StatusCode::FORBIDDEN => insufficient_scope_challenge("mcp:*"),
        _ => unauthorized_challenge(issuer),
    };
    let mut response = (
        status,
        Json(serde_json::json!({"error": status.canonical_reason(), "message": err.to_string()})),
    )
        .into_response();
    if let Ok(value) = header::HeaderValue::from_str(&challenge) {
        response.headers_mut().insert(header::WWW_AUTHENTICATE, value);
    }
    response
}

pub async fn auth_middleware(State(ctx): State<ServerContext>, mut request: Request, next: Next) -> Response {
    let path = request.uri().path().to_string();
    if is_public_route(&path) {
        return next.run(request).await;
    }

    let token = token_from_request(&request);
    match ctx.authenticator.authenticate(token.as_deref()).await {
        Ok(principal) => {
            request.extensions_mut().insert(principal);
            next.run(request).await
        }
        Err(err) => unauthorized_response(&ctx.config.issuer, err),
    }
}

/// Check a principal already authenticated by [`auth_middleware`] against
/// the scope a specific method/tool requires, once the handler has
/// parsed enough of the request body to know it.
pub fn check_scope(principal: &AuthPrincipal, required_scope: Option<&str>) -> Result<()> {
    if let Some(scope) = required_scope {
        if !principal.has_scope(scope) {
            return Err(Error::Forbidden(format!("missing required scope: {scope}")));
        }
    }
    Ok(())
}
