//! The closed sum type every `agent` tool invocation resolves to before
//! dispatch — model request variants as a closed sum type to avoid
//! dynamic switch(typeof) style dispatch.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

fn default_cost_preference() -> String {
    "low".to_string()
}

fn default_audience_level() -> String {
    "intermediate".to_string()
}

fn default_output_format() -> String {
    "report".to_string()
}

fn default_true() -> bool {
    true
}

/// Parameters for a full ensemble research run — the only variant that
/// spawns an async job.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResearchParams {
    pub query: String,
    #[serde(default = "default_cost_preference")]
    pub cost_preference: String,
    #[serde(default = "default_audience_level")]
    pub audience_level: String,
    #[serde(default = "default_output_format")]
    pub output_format: String,
    #[serde(default = "default_true")]
    pub include_sources: bool,
    pub max_length: Option<u32>,
    #[serde(default)]
    pub images: Vec<Value>,
    #[serde(default)]
    pub text_documents: Vec<Value>,
    #[serde(default)]
    pub structured_data: Vec<Value>,
    /// Forwarded to every upstream call verbatim when present, for
    /// deterministic replays.
    pub seed: Option<u64>,
}

/// A direct hybrid-retrieval query — answered synchronously against
/// `waypoint-search`, no job is created.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RetrieveParams {
    pub query: String,
    #[serde(default = "default_limit")]
    pub limit: usize,
    pub entity_name: Option<String>,
    #[serde(default)]
    pub rerank: bool,
}

fn default_limit() -> usize {
    10
}

/// Continue a prior report's research thread. Modeled as a new research
/// job whose planning prompt is seeded with the prior report's content,
/// rather than a distinct pipeline; see `DESIGN.md` for the reasoning.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FollowUpParams {
    pub report_id: i64,
    pub query: String,
}

/// A direct knowledge-graph expansion query.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GraphQueryParams {
    pub entity_name: String,
    #[serde(default = "default_max_hops")]
    pub max_hops: u32,
}

fn default_max_hops() -> u32 {
    2
}

/// Every shape the `agent` tool router can resolve its input to.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AgentRequest {
    Research(ResearchParams),
    Retrieve(RetrieveParams),
    FollowUp(FollowUpParams),
    GraphQuery(GraphQueryParams),
}

impl AgentRequest {
    /// Only `Research` (and, by extension, `FollowUp`, which is
    /// implemented as a reseeded research run) produces an async job;
    /// `Retrieve`/`GraphQuery` are answered synchronously.
    pub fn spawns_job(&self) -> bool {
        matches!(self, AgentRequest::Research(_) | AgentRequest::FollowUp(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn research_params_apply_spec_defaults() {
        let params: ResearchParams =
            serde_json::from_value(serde_json::json!({"query": "what is rust?"})).unwrap();
        assert_eq!(params.cost_preference, "low");
        assert_eq!(params.audience_level, "intermediate");
        assert_eq!(params.output_format, "report");
        assert!(params.include_sources);
    }

    #[test]
    fn agent_request_tags_by_kind() {
        let req: AgentRequest = serde_json::from_value(serde_json::json!({
            "kind": "graph_query",
            "entityName": "rust",
        }))
        .unwrap();
        assert!(matches!(req, AgentRequest::GraphQuery(_)));
        assert!(!req.spawns_job());
    }
}
