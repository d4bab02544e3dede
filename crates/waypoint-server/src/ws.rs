//! WebSocket transport (spec.md §4.1 "WebSocket", SPEC_FULL.md §9.7).
//!
//! Grounded in the teacher's `ws_handler`/`handle_ws_connection` pair in
//! `matric-api::main`: one reader task, one writer task, a periodic
//! ping. Generalized from the teacher's one-way event fan-out to
//! full-duplex JSON-RPC frame dispatch through the same
//! `rpc_handler::dispatch` the HTTP transport uses.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Extension, State};
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use tokio::time::{interval, Duration};
use tracing::{debug, warn};

use waypoint_core::{defaults, TransportKind};
use waypoint_transport::capabilities::required_scope;
use waypoint_transport::rpc::{RpcError, RpcRequest, RpcResponse};

use crate::auth::AuthPrincipal;
use crate::middleware::auth::check_scope;
use crate::rpc_handler::{self, tool_name};
use crate::state::ServerContext;

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(ctx): State<ServerContext>,
    Extension(principal): Extension<AuthPrincipal>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_connection(socket, ctx, principal))
}

async fn handle_connection(socket: WebSocket, ctx: ServerContext, principal: AuthPrincipal) {
    let (mut sender, mut receiver) = socket.split();
    let mut session_id: Option<String> = None;
    let mut heartbeat = interval(Duration::from_secs(defaults::WS_HEARTBEAT_SECS));
    heartbeat.tick().await; // first tick fires immediately

    loop {
        tokio::select! {
            _ = heartbeat.tick() => {
                if sender.send(Message::Ping(Vec::new())).await.is_err() {
                    break;
                }
            }
            frame = receiver.next() => {
                let Some(frame) = frame else { break };
                match frame {
                    Ok(Message::Text(text)) => {
                        let response = handle_frame(&ctx, &principal, &mut session_id, &text).await;
                        let Ok(payload) = serde_json::to_string(&response) else { continue };
                        if sender.send(Message::Text(payload)).await.is_err() {
                            break;
                        }
                    }
                    Ok(Message::Close(_)) => break,
                    Ok(Message::Ping(data)) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!(error = %e, "websocket read error");
                        break;
                    }
                }
            }
        }
    }

    debug!(session_id = ?session_id, "websocket connection closed");
}

async fn handle_frame(
    ctx: &ServerContext,
    principal: &AuthPrincipal,
    session_id: &mut Option<String>,
    text: &str,
) -> RpcResponse {
    let request: RpcRequest = match serde_json::from_str(text) {
        Ok(r) => r,
        Err(e) => return RpcResponse::err(serde_json::Value::Null, RpcError::parse_error(e.to_string())),
    };
    let id = request.id.clone().unwrap_or(serde_json::Value::Null);

    let required = required_scope(&request.method, tool_name(&request).as_deref());
    if let Err(err) = check_scope(principal, required) {
        return RpcResponse::err(id, RpcError::from(err));
    }

    let response = rpc_handler::dispatch(ctx, TransportKind::WebSocket, session_id.as_deref(), request).await;
    if let Some(result) = &response.result {
        if let Some(sid) = result.get("sessionId").and_then(|v| v.as_str()) {
            *session_id = Some(sid.to_string());
        }
    }
    response
}
