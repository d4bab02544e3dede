//! Method dispatch for one JSON-RPC call, shared by every transport
//! (spec.md §4.1 "normalize them into a common RPC shape", §4.2 "Tool
//! catalog").
//!
//! `routes.rs`/`ws.rs`/`stdio.rs` each parse a line or frame into an
//! [`RpcRequest`], resolve the scope it requires via [`required_scope`]
//! (needed before this module runs, since the principal's scope is
//! checked by the caller), and then call [`dispatch`]. Nothing here
//! touches axum or stdio directly, so the same dispatch logic backs all
//! four transports without duplication.

use serde::Deserialize;
use serde_json::{json, Value};

use waypoint_core::{Error, Result, TransportKind};
use waypoint_transport::capabilities::{self, ClientCapabilities};
use waypoint_transport::catalog::{self, NoArgs, JobIdArgs, ToolDescriptor};
use waypoint_transport::dispatch::normalize;
use waypoint_transport::rpc::{RpcError, RpcRequest, RpcResponse};
use waypoint_orchestrator::{AgentRequest, FollowUpParams, GraphQueryParams, ResearchParams, RetrieveParams};

use crate::state::ServerContext;
use crate::tools;

/// The tool name a `tools/call` request targets, or `None` for every
/// other method. The route layer needs this *before* calling
/// [`dispatch`] to look up the scope the call requires.
pub fn tool_name(request: &RpcRequest) -> Option<String> {
    if request.method != "tools/call" {
        return None;
    }
    request.params.get("name")?.as_str().map(str::to_string)
}

fn find_tool<'a>(tools: &'a [ToolDescriptor], name: &str) -> Option<&'a ToolDescriptor> {
    tools.iter().find(|t| t.name == name)
}

#[derive(Debug, Deserialize)]
struct InitializeParams {
    #[serde(rename = "protocolVersion")]
    protocol_version: String,
    #[serde(default)]
    capabilities: InitializeCapabilities,
    #[serde(rename = "clientInfo", default)]
    client_info: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
struct InitializeCapabilities {
    #[serde(default)]
    sampling: Option<Value>,
    #[serde(default)]
    roots: Option<Value>,
}

async fn handle_initialize(ctx: &ServerContext, transport: TransportKind, params: Value) -> Result<Value> {
    let parsed: InitializeParams =
        serde_json::from_value(params).map_err(|e| Error::Validation(format!("bad initialize params: {e}")))?;

    let result = capabilities::initialize(
        &ctx.session_repo,
        transport,
        &parsed.protocol_version,
        ClientCapabilities {
            sampling: parsed.capabilities.sampling,
            roots: parsed.capabilities.roots,
        },
        parsed.client_info,
    )
    .await?;

    ctx.sessions.insert(waypoint_core::Session {
        id: result.session_id.clone(),
        transport,
        protocol_version: result.protocol_version.clone(),
        client_info: None,
        subscriptions: Vec::new(),
        created_at: chrono::Utc::now(),
        last_seen_at: chrono::Utc::now(),
    });

    Ok(serde_json::to_value(result)?)
}

fn handle_tools_list(ctx: &ServerContext) -> Value {
    let tools: Vec<Value> = catalog::for_mode(ctx.config.mode)
        .into_iter()
        .map(|t| {
            json!({
                "name": t.name,
                "description": t.description,
                "inputSchema": t.input_schema,
            })
        })
        .collect();
    json!({"tools": tools})
}

#[derive(Debug, Deserialize)]
struct ToolCallParams {
    name: String,
    #[serde(default)]
    arguments: Value,
}

/// Normalize a tool call's arguments against its declared schema, then
/// hand the validated, typed struct to the matching `tools::*` function.
async fn handle_tools_call(ctx: &ServerContext, params: Value) -> Result<Value> {
    let parsed: ToolCallParams =
        serde_json::from_value(params).map_err(|e| Error::Validation(format!("bad tools/call params: {e}")))?;

    let catalog = catalog::for_mode(ctx.config.mode);
    let descriptor = find_tool(&catalog, &parsed.name)
        .ok_or_else(|| Error::Validation(format!("unknown tool: {}", parsed.name)))?;

    let arguments = if matches!(parsed.arguments, Value::Null) {
        Value::Object(Default::default())
    } else {
        parsed.arguments
    };
    let normalized = normalize(descriptor.category, &descriptor.input_schema, arguments)?;

    match parsed.name.as_str() {
        "agent" => {
            let request: AgentRequest = serde_json::from_value(normalized)?;
            tools::agent(ctx, request).await
        }
        "research" => {
            let request: ResearchParams = serde_json::from_value(normalized)?;
            tools::research(ctx, request).await
        }
        "retrieve" => {
            let request: RetrieveParams = serde_json::from_value(normalized)?;
            tools::retrieve(ctx, request).await
        }
        "follow_up" => {
            let request: FollowUpParams = serde_json::from_value(normalized)?;
            tools::follow_up(ctx, request).await
        }
        "graph_query" => {
            let request: GraphQueryParams = serde_json::from_value(normalized)?;
            tools::graph_query(ctx, request).await
        }
        "job_status" | "get_job_status" => {
            let args: JobIdArgs = serde_json::from_value(normalized)?;
            tools::job_status(ctx, &args.id).await
        }
        "cancel_job" => {
            let args: JobIdArgs = serde_json::from_value(normalized)?;
            tools::cancel_job(ctx, &args.id).await
        }
        "ping" => {
            let _args: NoArgs = serde_json::from_value(normalized)?;
            Ok(tools::ping().await)
        }
        "get_server_status" => {
            let _args: NoArgs = serde_json::from_value(normalized)?;
            Ok(tools::get_server_status(ctx).await)
        }
        other => Err(Error::Internal(format!("tool {other} is cataloged but has no handler"))),
    }
}

/// `report://<id>` is the only resource URI scheme this server
/// understands (spec.md §4.1 "Non-goals" excludes a general resource
/// model — reports are the one durable artifact worth subscribing to).
fn parse_report_uri(uri: &str) -> Result<i64> {
    uri.strip_prefix("report://")
        .and_then(|rest| rest.parse::<i64>().ok())
        .ok_or_else(|| Error::Validation(format!("unrecognized resource uri: {uri}")))
}

async fn handle_resources_read(ctx: &ServerContext, params: Value) -> Result<Value> {
    let uri = params
        .get("uri")
        .and_then(Value::as_str)
        .ok_or_else(|| Error::Validation("resources/read requires a uri".to_string()))?;
    let report_id = parse_report_uri(uri)?;
    let report = ctx.db.reports.get(report_id).await?;
    Ok(json!({
        "contents": [{
            "uri": uri,
            "mimeType": "application/json",
            "text": serde_json::to_string(&report)?,
        }]
    }))
}

async fn handle_resources_subscribe(ctx: &ServerContext, session_id: Option<&str>, params: Value, subscribe: bool) -> Result<Value> {
    let session_id = session_id.ok_or_else(|| Error::Validation("resource subscriptions require a session".to_string()))?;
    let uri = params
        .get("uri")
        .and_then(Value::as_str)
        .ok_or_else(|| Error::Validation("subscription requires a uri".to_string()))?;
    if subscribe {
        ctx.sessions.subscribe_resource(session_id, uri).await?;
    } else {
        ctx.sessions.unsubscribe_resource(session_id, uri).await?;
    }
    Ok(json!({"uri": uri, "subscribed": subscribe}))
}

async fn handle_prompts_get(params: Value) -> Result<Value> {
    let name = params.get("name").and_then(Value::as_str).unwrap_or("");
    Err(Error::NotFound(format!("no prompt named {name}")))
}

/// Dispatch one already-authenticated, already-authorized RPC request.
/// `session_id` is `None` for STDIO (the transport itself is the
/// session boundary) and for the streamable-HTTP transport's very first
/// `initialize` call.
pub async fn dispatch(
    ctx: &ServerContext,
    transport: TransportKind,
    session_id: Option<&str>,
    request: RpcRequest,
) -> RpcResponse {
    let id = request.id.clone().unwrap_or(Value::Null);
    let result = route(ctx, transport, session_id, &request).await;
    match result {
        Ok(value) => RpcResponse::ok(id, value),
        Err(err) => RpcResponse::err(id, RpcError::from(err)),
    }
}

async fn route(
    ctx: &ServerContext,
    transport: TransportKind,
    session_id: Option<&str>,
    request: &RpcRequest,
) -> Result<Value> {
    match request.method.as_str() {
        "initialize" => handle_initialize(ctx, transport, request.params.clone()).await,
        "ping" => Ok(tools::ping().await),
        "tools/list" => Ok(handle_tools_list(ctx)),
        "tools/call" => handle_tools_call(ctx, request.params.clone()).await,
        "prompts/list" => Ok(json!({"prompts": []})),
        "prompts/get" => handle_prompts_get(request.params.clone()).await,
        "resources/list" => Ok(json!({"resources": []})),
        "resources/read" => handle_resources_read(ctx, request.params.clone()).await,
        "resources/subscribe" => handle_resources_subscribe(ctx, session_id, request.params.clone(), true).await,
        "resources/unsubscribe" => handle_resources_subscribe(ctx, session_id, request.params.clone(), false).await,
        other => Err(Error::Protocol {
            code: waypoint_transport::rpc::METHOD_NOT_FOUND,
            message: format!("unknown method: {other}"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_name_extracts_from_tools_call_params() {
        let request = RpcRequest {
            jsonrpc: "2.0".to_string(),
            id: Some(Value::from(1)),
            method: "tools/call".to_string(),
            params: json!({"name": "research", "arguments": {}}),
        };
        assert_eq!(tool_name(&request), Some("research".to_string()));
    }

    #[test]
    fn tool_name_is_none_for_other_methods() {
        let request = RpcRequest {
            jsonrpc: "2.0".to_string(),
            id: Some(Value::from(1)),
            method: "tools/list".to_string(),
            params: Value::Null,
        };
        assert_eq!(tool_name(&request), None);
    }

    #[test]
    fn parse_report_uri_accepts_well_formed_scheme() {
        assert_eq!(parse_report_uri("report://42").unwrap(), 42);
    }

    #[test]
    fn parse_report_uri_rejects_unknown_scheme() {
        assert!(parse_report_uri("graph://rust").is_err());
    }
}
