//! Tool catalog and server mode.
//!
//! The exposed tool set is mode-dependent: `agent` mode exposes a
//! six-tool surface meant for an LLM-driven client, `manual` exposes
//! every individual tool, `all` is the union.

use schemars::schema::RootSchema;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use waypoint_orchestrator::{FollowUpParams, GraphQueryParams, ResearchParams, RetrieveParams};

use crate::capabilities::required_scope;
use crate::dispatch::ToolCategory;

/// Process-wide tool-exposure mode, read once from `MODE` at boot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerMode {
    Agent,
    Manual,
    All,
}

impl ServerMode {
    pub fn from_env() -> Self {
        match std::env::var("MODE").unwrap_or_default().to_uppercase().as_str() {
            "MANUAL" => ServerMode::Manual,
            "ALL" => ServerMode::All,
            _ => ServerMode::Agent,
        }
    }
}

/// One entry in the exposed tool set.
#[derive(Debug, Clone)]
pub struct ToolDescriptor {
    pub name: &'static str,
    pub description: &'static str,
    pub category: ToolCategory,
    pub input_schema: RootSchema,
    pub required_scope: Option<&'static str>,
}

fn describe<T: JsonSchema>(
    name: &'static str,
    description: &'static str,
    category: ToolCategory,
) -> ToolDescriptor {
    let input_schema = schemars::schema_for!(T);
    let required_scope = required_scope("tools/call", Some(name));
    ToolDescriptor {
        name,
        description,
        category,
        input_schema,
        required_scope,
    }
}

/// Marker schema for tools that take no arguments.
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct NoArgs {}

/// `cancel_job`/`job_status` share this shape: a job id plus nothing else.
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct JobIdArgs {
    pub id: String,
}

fn agent_tools() -> Vec<ToolDescriptor> {
    vec![
        describe::<waypoint_orchestrator::AgentRequest>("agent", "Route a research request to the right pipeline", ToolCategory::Research),
        describe::<NoArgs>("ping", "Liveness check", ToolCategory::Other),
        describe::<NoArgs>("get_server_status", "Server and queue health summary", ToolCategory::Other),
        describe::<JobIdArgs>("job_status", "Status of a previously submitted job", ToolCategory::Job),
        describe::<JobIdArgs>("get_job_status", "Alias of job_status", ToolCategory::Job),
        describe::<JobIdArgs>("cancel_job", "Cancel a queued or running job", ToolCategory::Job),
    ]
}

fn manual_tools() -> Vec<ToolDescriptor> {
    vec![
        describe::<ResearchParams>("research", "Run the full ensemble research pipeline", ToolCategory::Research),
        describe::<RetrieveParams>("retrieve", "Hybrid BM25 + vector + graph retrieval", ToolCategory::Search),
        describe::<FollowUpParams>("follow_up", "Continue a prior report's research thread", ToolCategory::Research),
        describe::<GraphQueryParams>("graph_query", "Expand the knowledge graph around an entity", ToolCategory::Graph),
        describe::<JobIdArgs>("job_status", "Status of a previously submitted job", ToolCategory::Job),
        describe::<JobIdArgs>("get_job_status", "Alias of job_status", ToolCategory::Job),
        describe::<JobIdArgs>("cancel_job", "Cancel a queued or running job", ToolCategory::Job),
        describe::<NoArgs>("ping", "Liveness check", ToolCategory::Other),
        describe::<NoArgs>("get_server_status", "Server and queue health summary", ToolCategory::Other),
    ]
}

/// Build the exposed tool list for the given mode.
///
/// `ALL` is the union deduplicated by name, agent-surface descriptions
/// winning ties since they're the more specific wording for the shared
/// six tools.
pub fn for_mode(mode: ServerMode) -> Vec<ToolDescriptor> {
    match mode {
        ServerMode::Agent => agent_tools(),
        ServerMode::Manual => manual_tools(),
        ServerMode::All => {
            let mut seen = std::collections::HashSet::new();
            let mut tools = Vec::new();
            for tool in agent_tools().into_iter().chain(manual_tools()) {
                if seen.insert(tool.name) {
                    tools.push(tool);
                }
            }
            tools
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn agent_mode_exposes_exactly_six_tools() {
        assert_eq!(for_mode(ServerMode::Agent).len(), 6);
    }

    #[test]
    fn manual_mode_excludes_the_agent_router_tool() {
        let tools = for_mode(ServerMode::Manual);
        assert!(tools.iter().all(|t| t.name != "agent"));
    }

    #[test]
    fn all_mode_deduplicates_shared_tools() {
        let tools = for_mode(ServerMode::All);
        let names: std::collections::HashSet<_> = tools.iter().map(|t| t.name).collect();
        assert_eq!(names.len(), tools.len());
        assert!(names.contains("agent"));
        assert!(names.contains("research"));
    }

    #[test]
    fn server_mode_defaults_to_agent_on_unset_env() {
        std::env::remove_var("MODE");
        assert_eq!(ServerMode::from_env(), ServerMode::Agent);
    }
}
