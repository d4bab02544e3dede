//! Legacy HTTP+SSE transport and the `/jobs/:id/events` resumable
//! job-event stream.
//!
//! Built on the `Sse`/`KeepAlive` plumbing `axum`/`tower-http` provide,
//! generalized from a single event-bus firehose to per-job and
//! per-connection streams.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use dashmap::DashMap;
use futures::stream::{self, Stream, StreamExt};
use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

use waypoint_core::{EventType, TransportKind};
use waypoint_transport::capabilities::required_scope;
use waypoint_transport::resume::replay_and_subscribe;
use waypoint_transport::rpc::{RpcRequest, RpcResponse};

use crate::auth::AuthPrincipal;
use crate::middleware::auth::check_scope;
use crate::rpc_handler::{self, tool_name};
use crate::state::ServerContext;

/// Routes an RPC response back to the SSE stream it belongs to, keyed by
/// the server-issued connection id the client learned from the initial
/// `endpoint` event.
pub type LegacyConnectionRegistry = Arc<DashMap<Uuid, tokio::sync::mpsc::UnboundedSender<RpcResponse>>>;

pub fn new_registry() -> LegacyConnectionRegistry {
    Arc::new(DashMap::new())
}

/// `GET /sse`: opens a connection, hands the client an `endpoint` event
/// pointing at where to POST its RPC calls, then forwards whatever
/// `/messages/:id` pushes onto this connection's channel.
pub async fn sse_connect(State(ctx): State<ServerContext>) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let connection_id = waypoint_core::uuid_utils::new_v7();
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<RpcResponse>();
    ctx.legacy_connections.insert(connection_id, tx);

    let endpoint = stream::once(async move {
        Ok(Event::default()
            .event("endpoint")
            .data(format!("/messages/{connection_id}")))
    });

    let registry = ctx.legacy_connections.clone();
    let forwarded = async_stream::stream! {
        while let Some(response) = rx.recv().await {
            match serde_json::to_string(&response) {
                Ok(body) => yield Ok(Event::default().event("message").data(body)),
                Err(_) => continue,
            }
        }
        registry.remove(&connection_id);
    };

    Sse::new(endpoint.chain(forwarded)).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)).text("keepalive"))
}

#[derive(Debug, Deserialize)]
pub struct MessagesQuery {
    #[serde(rename = "connectionId")]
    connection_id: Option<Uuid>,
}

async fn post_message(
    ctx: &ServerContext,
    principal: Option<&AuthPrincipal>,
    connection_id: Uuid,
    request: RpcRequest,
) -> Response {
    if let Some(principal) = principal {
        let required = required_scope(&request.method, tool_name(&request).as_deref());
        if let Err(err) = check_scope(principal, required) {
            return (StatusCode::FORBIDDEN, Json(serde_json::json!({"error": err.to_string()}))).into_response();
        }
    }

    let response = rpc_handler::dispatch(ctx, TransportKind::Http, None, request).await;
    if let Some(sender) = ctx.legacy_connections.get(&connection_id) {
        let _ = sender.send(response);
    }
    StatusCode::ACCEPTED.into_response()
}

/// `POST /messages/:id`.
pub async fn messages_with_id(
    State(ctx): State<ServerContext>,
    Extension(principal): Extension<AuthPrincipal>,
    Path(connection_id): Path<Uuid>,
    Json(request): Json<RpcRequest>,
) -> Response {
    post_message(&ctx, Some(&principal), connection_id, request).await
}

/// `POST /messages` (connection id passed as a query param instead of a
/// path segment — some legacy clients prefer this shape).
pub async fn messages(
    State(ctx): State<ServerContext>,
    Extension(principal): Extension<AuthPrincipal>,
    Query(query): Query<MessagesQuery>,
    Json(request): Json<RpcRequest>,
) -> Response {
    let Some(connection_id) = query.connection_id else {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({"error": "missing connectionId"})),
        )
            .into_response();
    };
    post_message(&ctx, Some(&principal), connection_id, request).await
}

#[derive(Debug, Deserialize)]
pub struct JobEventsQuery {
    since_event_id: Option<i64>,
}

/// `GET /jobs/:id/events`: replays the journal from the caller's cursor
/// (`since_event_id` query param or a `Last-Event-ID` header, the latter
/// winning when both are present), then follows live events until the
/// job reaches a terminal event type.
pub async fn job_events(
    State(ctx): State<ServerContext>,
    Path(job_id): Path<Uuid>,
    Query(query): Query<JobEventsQuery>,
    headers: HeaderMap,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, Response> {
    let since_event_id = headers
        .get("last-event-id")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<i64>().ok())
        .or(query.since_event_id)
        .unwrap_or(0);

    let job_events = replay_and_subscribe(ctx.job_events.as_ref(), &ctx.events, job_id, since_event_id)
        .await
        .map_err(|err| {
            (
                StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
                Json(serde_json::json!({"error": err.to_string()})),
            )
                .into_response()
        })?;

    let mapped = job_events.map(|result| match result {
        Ok(event) => {
            let terminal = matches!(
                event.event_type,
                EventType::Completed | EventType::Canceled | EventType::Abandoned | EventType::Error
            );
            let payload: Value = serde_json::json!({
                "id": event.id,
                "jobId": event.job_id,
                "eventType": event.event_type,
                "payload": event.payload,
            });
            let sse_event = Event::default()
                .id(event.id.to_string())
                .event(event.event_type.as_str())
                .data(payload.to_string());
            (sse_event, terminal)
        }
        Err(err) => (
            Event::default().event("error").data(err.to_string()),
            true,
        ),
    });

    let stream = async_stream::stream! {
        futures::pin_mut!(mapped);
        while let Some((event, terminal)) = mapped.next().await {
            yield Ok(event);
            if terminal {
                // spec.md §4.3 "Event fan-out": one final sentinel after the
                // journal's own terminal event, distinct from it, so clients
                // have an unambiguous close signal instead of having to
                // special-case every terminal event type.
                yield Ok(Event::default().event("complete").data(""));
                break;
            }
        }
    };

    Ok(Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)).text("keepalive")))
}

/// `POST /jobs`: the plain-REST submission surface from spec.md §6 —
/// body is the tool's params directly, no JSON-RPC envelope. Only the
/// `research` tool spawns an async job this way.
pub async fn submit_job(
    State(ctx): State<ServerContext>,
    Extension(principal): Extension<AuthPrincipal>,
    Json(params): Json<waypoint_orchestrator::ResearchParams>,
) -> Response {
    if let Err(err) = check_scope(&principal, Some("mcp:research:write")) {
        return (StatusCode::FORBIDDEN, Json(serde_json::json!({"error": err.to_string()}))).into_response();
    }
    match crate::tools::research(&ctx, params).await {
        Ok(value) => Json(value).into_response(),
        Err(err) => (
            StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            Json(serde_json::json!({"error": err.to_string()})),
        )
            .into_response(),
    }
}
