//! Capability negotiation and a build-time method→scope table, in place
//! of ad-hoc scope checks scattered through handlers.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;

use waypoint_core::{Error, Result, Session, SessionRepository, TransportKind};

/// Protocol versions this server understands, newest first. `initialize`
/// rejects anything outside this set rather than attempting best-effort
/// compatibility.
pub const SUPPORTED_PROTOCOL_VERSIONS: &[&str] = &["2025-06-18", "2025-03-26", "2024-11-05"];

/// Method → required OAuth scope. `tools/call` entries are keyed by
/// `tools/call:<tool name>` since the bare method name is shared by every
/// tool. Methods absent from this table require no scope beyond a valid
/// principal (e.g. `initialize`, `ping`).
pub static SCOPE_MAP: phf::Map<&'static str, &'static str> = phf::phf_map! {
    "tools/call:research" => "mcp:research:write",
    "tools/call:retrieve" => "mcp:retrieve:read",
    "tools/call:follow_up" => "mcp:research:write",
    "tools/call:graph_query" => "mcp:retrieve:read",
    "tools/call:agent" => "mcp:research:write",
    "tools/call:job_status" => "mcp:jobs:read",
    "tools/call:get_job_status" => "mcp:jobs:read",
    "tools/call:cancel_job" => "mcp:jobs:write",
    "resources/read" => "mcp:resources:read",
    "resources/subscribe" => "mcp:resources:read",
    "resources/unsubscribe" => "mcp:resources:read",
};

/// Scope required for a given RPC method, or `None` if the method is open
/// to any authenticated principal.
pub fn required_scope(method: &str, tool_name: Option<&str>) -> Option<&'static str> {
    if method == "tools/call" {
        let tool = tool_name?;
        let key = format!("tools/call:{tool}");
        return SCOPE_MAP.get(key.as_str()).copied();
    }
    SCOPE_MAP.get(method).copied()
}

/// What the client advertised in `initialize`.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct ClientCapabilities {
    #[serde(default)]
    pub sampling: Option<Value>,
    #[serde(default)]
    pub roots: Option<Value>,
}

/// What this server advertises back.
#[derive(Debug, Clone, Serialize)]
pub struct ServerCapabilities {
    pub tools: ToolsCapability,
    pub prompts: ListCapability,
    pub resources: ResourcesCapability,
}

#[derive(Debug, Clone, Serialize)]
pub struct ToolsCapability {
    pub list_changed: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ListCapability {
    pub list_changed: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResourcesCapability {
    pub subscribe: bool,
    pub list_changed: bool,
}

impl Default for ServerCapabilities {
    fn default() -> Self {
        Self {
            tools: ToolsCapability { list_changed: false },
            prompts: ListCapability { list_changed: false },
            resources: ResourcesCapability {
                subscribe: true,
                list_changed: false,
            },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct InitializeResult {
    pub protocol_version: String,
    pub capabilities: ServerCapabilities,
    pub session_id: String,
    pub server_info: ServerInfo,
}

#[derive(Debug, Clone, Serialize)]
pub struct ServerInfo {
    pub name: String,
    pub version: String,
}

/// Negotiate protocol version, create a new session, and return what the
/// client needs to continue. Rejects with an error enumerating the
/// supported set when the client's version isn't one of them.
pub async fn initialize(
    sessions: &Arc<dyn SessionRepository>,
    transport: TransportKind,
    protocol_version: &str,
    _capabilities: ClientCapabilities,
    client_info: Option<Value>,
) -> Result<InitializeResult> {
    if !SUPPORTED_PROTOCOL_VERSIONS.contains(&protocol_version) {
        return Err(Error::Validation(format!(
            "unsupported protocol version {protocol_version}; supported: {}",
            SUPPORTED_PROTOCOL_VERSIONS.join(", ")
        )));
    }

    let session = Session {
        id: waypoint_core::uuid_utils::new_v7().to_string(),
        transport,
        protocol_version: protocol_version.to_string(),
        client_info,
        subscriptions: Vec::new(),
        created_at: Utc::now(),
        last_seen_at: Utc::now(),
    };
    sessions.create(&session).await?;

    Ok(InitializeResult {
        protocol_version: protocol_version.to_string(),
        capabilities: ServerCapabilities::default(),
        session_id: session.id,
        server_info: ServerInfo {
            name: "waypoint".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeSessions {
        created: Mutex<Vec<Session>>,
    }

    #[async_trait]
    impl SessionRepository for FakeSessions {
        async fn create(&self, session: &Session) -> Result<()> {
            self.created.lock().unwrap().push(session.clone());
            Ok(())
        }
        async fn touch(&self, _session_id: &str) -> Result<()> {
            Ok(())
        }
        async fn get(&self, session_id: &str) -> Result<Session> {
            self.created
                .lock()
                .unwrap()
                .iter()
                .find(|s| s.id == session_id)
                .cloned()
                .ok_or_else(|| Error::SessionNotFound(session_id.to_string()))
        }
        async fn delete_expired(&self, _ttl: chrono::Duration) -> Result<u64> {
            Ok(0)
        }
        async fn subscribe_resource(&self, _session_id: &str, _resource: &str) -> Result<()> {
            Ok(())
        }
        async fn unsubscribe_resource(&self, _session_id: &str, _resource: &str) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn initialize_creates_a_session_on_supported_version() {
        let sessions: Arc<dyn SessionRepository> = Arc::new(FakeSessions::default());
        let result = initialize(
            &sessions,
            TransportKind::Http,
            "2025-06-18",
            ClientCapabilities { sampling: None, roots: None },
            None,
        )
        .await
        .unwrap();
        assert!(!result.session_id.is_empty());
        assert_eq!(sessions.get(&result.session_id).await.unwrap().id, result.session_id);
    }

    #[tokio::test]
    async fn initialize_rejects_unsupported_version() {
        let sessions: Arc<dyn SessionRepository> = Arc::new(FakeSessions::default());
        let err = initialize(
            &sessions,
            TransportKind::Http,
            "1999-01-01",
            ClientCapabilities { sampling: None, roots: None },
            None,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn research_tool_call_requires_research_write_scope() {
        assert_eq!(required_scope("tools/call", Some("research")), Some("mcp:research:write"));
    }

    #[test]
    fn ping_requires_no_scope() {
        assert_eq!(required_scope("ping", None), None);
    }
}
