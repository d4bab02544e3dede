//! Line-delimited JSON-RPC over stdin/stdout (spec.md §4.1 "STDIO").
//!
//! A STDIO-launched client owns the whole process, so there is no
//! separate auth handshake: the session boundary *is* the process, and
//! every call runs as an implicit wildcard-scope principal. `main` makes
//! sure nothing but RPC bytes ever reaches stdout before this loop
//! starts.

use std::sync::Arc;

use tokio::io::{self, AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{error, warn};

use waypoint_core::TransportKind;
use waypoint_transport::rpc::{RpcError, RpcRequest, RpcResponse};

use crate::rpc_handler;
use crate::state::ServerContext;

pub async fn run(ctx: Arc<ServerContext>) -> anyhow::Result<()> {
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut lines = BufReader::new(stdin).lines();

    while let Some(line) = lines.next_line().await? {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let response = match serde_json::from_str::<RpcRequest>(trimmed) {
            Ok(request) => rpc_handler::dispatch(&ctx, TransportKind::Stdio, None, request).await,
            Err(e) => {
                warn!(error = %e, "malformed STDIO request line");
                RpcResponse::err(serde_json::Value::Null, RpcError::parse_error(e.to_string()))
            }
        };

        let mut payload = serde_json::to_string(&response)?;
        payload.push('\n');
        if let Err(e) = stdout.write_all(payload.as_bytes()).await {
            error!(error = %e, "failed writing STDIO response, exiting loop");
            break;
        }
        stdout.flush().await?;
    }

    Ok(())
}
