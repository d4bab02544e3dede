//! Concrete tool implementations backing `tools/call` (spec.md §4.2).
//!
//! Each function takes already-normalized, already-validated arguments
//! (see `waypoint_transport::dispatch::normalize`) and returns the JSON
//! value placed in the RPC response's `result`/`structuredContent`.

use serde_json::{json, Value};
use uuid::Uuid;

use waypoint_core::{Error, GraphRepository, JobRepository, JobType, ReportRepository, Result};
use waypoint_jobs::submission::{submit, SubmissionOutcome};
use waypoint_orchestrator::{AgentRequest, FollowUpParams, GraphQueryParams, ResearchParams, RetrieveParams};
use waypoint_search::hybrid::SearchScope;

use crate::state::ServerContext;

fn parse_job_id(raw: &str) -> Result<Uuid> {
    Uuid::parse_str(raw).map_err(|_| Error::Validation(format!("not a valid job id: {raw}")))
}

pub async fn ping() -> Value {
    json!({"pong": true})
}

pub async fn get_server_status(ctx: &ServerContext) -> Value {
    json!({
        "mode": format!("{:?}", ctx.config.mode),
        "sessions_cached": ctx.sessions.cached_count(),
        "database": {
            "pool_size": ctx.db.pool().size(),
            "pool_idle": ctx.db.pool().num_idle(),
        },
    })
}

pub async fn job_status(ctx: &ServerContext, id: &str) -> Result<Value> {
    let job_id = parse_job_id(id)?;
    let job = ctx.jobs.get(job_id).await?;
    Ok(serde_json::to_value(job)?)
}

/// Cancels both the durable row (so a later poll sees `canceled`) and, if
/// the job is currently executing, the in-flight cancellation token a
/// worker task is watching.
pub async fn cancel_job(ctx: &ServerContext, id: &str) -> Result<Value> {
    let job_id = parse_job_id(id)?;
    if let Some(token) = ctx.cancellations.read().await.get(&job_id) {
        token.cancel();
    }
    let canceled = ctx.jobs.cancel(job_id).await?;
    Ok(json!({"job_id": job_id, "canceled": canceled}))
}

fn submission_response(outcome: SubmissionOutcome) -> Value {
    match outcome {
        SubmissionOutcome::Created(job_id) => json!({"job_id": job_id, "status": "created"}),
        SubmissionOutcome::Existing(job_id) => json!({"job_id": job_id, "status": "existing"}),
        SubmissionOutcome::Cached { job_id, result } => {
            json!({"job_id": job_id, "status": "cached", "result": result})
        }
        SubmissionOutcome::RetriedAsNew { job_id, retry_of } => {
            json!({"job_id": job_id, "status": "retried", "retry_of": retry_of})
        }
        SubmissionOutcome::FailedTerminal { job_id, error } => {
            json!({"job_id": job_id, "status": "failed", "error": error})
        }
    }
}

pub async fn research(ctx: &ServerContext, params: ResearchParams) -> Result<Value> {
    let payload = serde_json::to_value(&params)?;
    let outcome = submit(&ctx.jobs, &ctx.job_events, JobType::Research, payload, false).await?;
    Ok(submission_response(outcome))
}

pub async fn retrieve(ctx: &ServerContext, params: RetrieveParams) -> Result<Value> {
    let scope = SearchScope {
        entity_name: params.entity_name.clone(),
        max_hops: waypoint_core::defaults::GRAPH_MAX_HOPS,
    };
    let response = ctx
        .search
        .search(&params.query, params.limit, scope, params.rerank)
        .await?;
    Ok(serde_json::to_value(response)?)
}

/// Modeled as a fresh research job seeded with the prior report's
/// content, rather than a distinct pipeline (see DESIGN.md's Open
/// Question resolution for `follow_up`).
pub async fn follow_up(ctx: &ServerContext, params: FollowUpParams) -> Result<Value> {
    let prior = ctx.db.reports.get(params.report_id).await?;
    let seeded_query = format!(
        "Continuing from this prior report:\n\n{}\n\nFollow-up question: {}",
        prior.content, params.query
    );
    let research_params = ResearchParams {
        query: seeded_query,
        cost_preference: "low".to_string(),
        audience_level: "intermediate".to_string(),
        output_format: "report".to_string(),
        include_sources: true,
        max_length: None,
        images: Vec::new(),
        text_documents: Vec::new(),
        structured_data: Vec::new(),
        seed: None,
    };
    research(ctx, research_params).await
}

pub async fn graph_query(ctx: &ServerContext, params: GraphQueryParams) -> Result<Value> {
    let node = ctx
        .db
        .graph
        .find_node_by_name(&params.entity_name)
        .await?
        .ok_or_else(|| Error::NotFound(format!("no graph node named {}", params.entity_name)))?;
    let neighbors = ctx.db.graph.neighbors(node.id, params.max_hops).await?;
    Ok(json!({
        "node": node,
        "neighbors": neighbors
            .into_iter()
            .map(|(edge, target)| json!({"edge": edge, "node": target}))
            .collect::<Vec<_>>(),
    }))
}

/// Route an `agent` tool call to the pipeline its `kind` tag names
/// (spec.md §4.2 "agent router").
pub async fn agent(ctx: &ServerContext, request: AgentRequest) -> Result<Value> {
    match request {
        AgentRequest::Research(params) => research(ctx, params).await,
        AgentRequest::Retrieve(params) => retrieve(ctx, params).await,
        AgentRequest::FollowUp(params) => follow_up(ctx, params).await,
        AgentRequest::GraphQuery(params) => graph_query(ctx, params).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_job_id_rejects_non_uuid() {
        assert!(parse_job_id("job_1700000000_ab12cd").is_err());
    }

    #[test]
    fn parse_job_id_accepts_uuid() {
        let id = Uuid::new_v4();
        assert_eq!(parse_job_id(&id.to_string()).unwrap(), id);
    }

    #[test]
    fn submission_response_shapes_created() {
        let outcome = SubmissionOutcome::Created(Uuid::nil());
        let value = submission_response(outcome);
        assert_eq!(value["status"], "created");
    }
}
