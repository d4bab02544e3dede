//! Plan -> bounded fan-out -> streaming synthesis -> persist, the six
//! stages of an ensemble research run.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use waypoint_core::{
    defaults, ChatCompletionProvider, ChatMessage, EmbeddingProvider, Error, EventType, JobType,
    Report, ReportRepository, Result, Usage,
};
use waypoint_inference::model_config::{CostPreference, ModelAssignment, ModelTierTable};
use waypoint_jobs::{JobContext, JobHandler, JobResult};

use crate::executor::BoundedExecutor;
use crate::request::ResearchParams;

/// One angle the planning stage decomposed the query into.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubQuery {
    pub tag: String,
    pub query: String,
    #[serde(default)]
    pub domain_hint: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PlanResponse {
    sub_queries: Vec<SubQuery>,
}

/// Outcome of one sub-agent's call against its assigned model.
#[derive(Debug, Clone, Serialize)]
pub struct SubAgentResult {
    pub tag: String,
    pub query: String,
    pub ok: bool,
    pub content: Option<String>,
    pub usage: Usage,
    pub sources: Vec<String>,
    pub error: Option<String>,
}

/// A transient failure is worth one fallback-model retry; anything else
/// (bad params, auth) is not.
fn is_transient(err: &Error) -> bool {
    matches!(err, Error::Inference(_) | Error::Request(_))
}

/// Stage 1: decompose the query into sub-queries via a single planning
/// call, falling back to a single sub-query equal to the original on any
/// parse failure.
pub async fn plan(
    chat: &dyn ChatCompletionProvider,
    model: &str,
    query: &str,
) -> (Vec<SubQuery>, Usage) {
    let prompt = format!(
        "Decompose the following research question into at most {} distinct \
         sub-questions that together cover it well. Respond with JSON only, \
         shaped exactly as {{\"sub_queries\":[{{\"tag\":string,\"query\":string,\
         \"domain_hint\":string|null}}]}}.\n\nQuestion: {query}",
        defaults::ENSEMBLE_SIZE,
    );
    let messages = vec![ChatMessage {
        role: "user".to_string(),
        content: prompt,
    }];

    match chat.complete(model, &messages).await {
        Ok((text, usage)) => match parse_plan(&text) {
            Some(sub_queries) if !sub_queries.is_empty() => (sub_queries, usage),
            _ => {
                warn!("planning response was not valid JSON, falling back to single sub-query");
                (fallback_plan(query), usage)
            }
        },
        Err(err) => {
            warn!(error = %err, "planning call failed, falling back to single sub-query");
            (fallback_plan(query), Usage::default())
        }
    }
}

fn fallback_plan(query: &str) -> Vec<SubQuery> {
    vec![SubQuery {
        tag: "primary".to_string(),
        query: query.to_string(),
        domain_hint: None,
    }]
}

/// Lenient JSON extraction: models occasionally wrap the object in a
/// code fence or surrounding prose, so this looks for the first `{` and
/// last `}` rather than requiring the whole response to be bare JSON.
fn parse_plan(text: &str) -> Option<Vec<SubQuery>> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end < start {
        return None;
    }
    let candidate = &text[start..=end];
    serde_json::from_str::<PlanResponse>(candidate)
        .ok()
        .map(|p| p.sub_queries)
}

/// Stage 2-4: schedule one task per sub-query through the bounded
/// executor, each calling its assigned primary model with a 90s timeout
/// and one fallback-model retry on a transient failure. Succeeds overall
/// once at least one sub-agent comes back `ok:true`.
pub async fn fan_out(
    chat: Arc<dyn ChatCompletionProvider>,
    assignment: ModelAssignment,
    sub_queries: Vec<SubQuery>,
    ctx: &JobContext,
) -> Vec<SubAgentResult> {
    let capacity = defaults::ENSEMBLE_SIZE * defaults::PARALLELISM;
    let mut executor = BoundedExecutor::new(capacity.max(1));
    let results = Arc::new(Mutex::new(Vec::with_capacity(sub_queries.len())));
    let total = sub_queries.len();

    for sub_query in sub_queries {
        if ctx.is_canceled() {
            break;
        }
        let chat = chat.clone();
        let assignment = assignment.clone();
        let results = results.clone();
        let job_id = ctx.job_id();
        let tag = sub_query.tag.clone();
        let ctx_for_start = ctx.clone();
        let ctx_for_finish = ctx.clone();

        executor
            .submit(
                move || debug!(?job_id, tag = %tag, "sub-agent started"),
                move || async move {
                    let _ = ctx_for_start
                        .emit(EventType::AgentStarted, serde_json::json!({"tag": sub_query.tag}))
                        .await;
                    let result = run_sub_agent(chat.as_ref(), &assignment, &sub_query).await;
                    let _ = ctx_for_finish
                        .emit(
                            EventType::AgentCompleted,
                            serde_json::json!({"tag": result.tag, "ok": result.ok}),
                        )
                        .await;
                    let _ = ctx_for_finish
                        .emit(EventType::AgentUsage, serde_json::json!({"tag": result.tag, "usage": result.usage}))
                        .await;
                    results.lock().await.push(result);
                },
            )
            .await;
    }

    executor.shutdown().await;
    debug!(sub_agents = total, "fan-out batch drained");
    Arc::try_unwrap(results)
        .map(|m| m.into_inner())
        .unwrap_or_default()
}

async fn run_sub_agent(
    chat: &dyn ChatCompletionProvider,
    assignment: &ModelAssignment,
    sub_query: &SubQuery,
) -> SubAgentResult {
    let messages = vec![ChatMessage {
        role: "user".to_string(),
        content: sub_query.query.clone(),
    }];
    let timeout = Duration::from_secs(defaults::SUB_AGENT_TIMEOUT_SECS);

    let primary = tokio::time::timeout(timeout, chat.complete(assignment.primary.as_str(), &messages)).await;

    let outcome = match primary {
        Ok(Ok(ok)) => Ok(ok),
        Ok(Err(err)) if is_transient(&err) => {
            warn!(tag = %sub_query.tag, model = %assignment.primary, error = %err, "primary model failed, retrying against fallback");
            tokio::time::timeout(timeout, chat.complete(assignment.fallback.as_str(), &messages))
                .await
                .unwrap_or_else(|_| Err(Error::Inference("fallback model timed out".to_string())))
        }
        Ok(Err(err)) => Err(err),
        Err(_) => Err(Error::Inference(format!(
            "primary model timed out after {}s",
            defaults::SUB_AGENT_TIMEOUT_SECS
        ))),
    };

    match outcome {
        Ok((content, usage)) => SubAgentResult {
            tag: sub_query.tag.clone(),
            query: sub_query.query.clone(),
            ok: true,
            content: Some(content),
            usage,
            sources: Vec::new(),
            error: None,
        },
        Err(err) => SubAgentResult {
            tag: sub_query.tag.clone(),
            query: sub_query.query.clone(),
            ok: false,
            content: None,
            usage: Usage::default(),
            sources: Vec::new(),
            error: Some(err.to_string()),
        },
    }
}

/// Stage 5: stream the synthesis model's response token by token,
/// buffering every chunk in order so a late subscriber can replay from
/// the start, and journal a `SynthesisToken` event per chunk plus a
/// `Progress` event every `SYNTHESIS_PROGRESS_EVERY_N_TOKENS` tokens.
pub async fn synthesize(
    chat: &dyn ChatCompletionProvider,
    model: &str,
    query: &str,
    sub_results: &[SubAgentResult],
    ctx: &JobContext,
) -> Result<String> {
    let prompt = synthesis_prompt(query, sub_results);
    let messages = vec![ChatMessage {
        role: "user".to_string(),
        content: prompt,
    }];

    let mut stream = chat.complete_stream(model, &messages).await?;
    let mut buffer = String::new();
    let mut token_count = 0usize;
    let deadline = tokio::time::Instant::now() + Duration::from_secs(defaults::SYNTHESIS_TIMEOUT_SECS);

    loop {
        if ctx.is_canceled() {
            drop(stream);
            return Err(Error::Internal("synthesis canceled".to_string()));
        }

        tokio::select! {
            _ = tokio::time::sleep_until(deadline) => {
                return Err(Error::Inference("synthesis stage timed out".to_string()));
            }
            chunk = stream.next() => {
                match chunk {
                    Some(Ok(token)) => {
                        buffer.push_str(&token);
                        token_count += 1;
                        ctx.emit(EventType::SynthesisToken, serde_json::json!({"token": token})).await?;
                        if token_count % defaults::SYNTHESIS_PROGRESS_EVERY_N_TOKENS == 0 {
                            ctx.emit(
                                EventType::Progress,
                                serde_json::json!({"tokens_emitted": token_count}),
                            )
                            .await?;
                        }
                    }
                    Some(Err(err)) => {
                        ctx.emit(EventType::SynthesisError, serde_json::json!({"error": err.to_string()})).await?;
                        return Err(err);
                    }
                    None => break,
                }
            }
        }
    }

    Ok(buffer)
}

fn synthesis_prompt(query: &str, sub_results: &[SubAgentResult]) -> String {
    let mut prompt = format!(
        "Synthesize a single coherent research report answering: {query}\n\n\
         Draw on the following sub-agent findings, ignoring any marked failed:\n\n"
    );
    for result in sub_results {
        if result.ok {
            prompt.push_str(&format!(
                "## {} ({})\n{}\n\n",
                result.tag,
                result.query,
                result.content.as_deref().unwrap_or_default()
            ));
        } else {
            prompt.push_str(&format!("## {} failed: {}\n\n", result.tag, result.error.as_deref().unwrap_or("unknown error")));
        }
    }
    prompt
}

/// Stage 6: embed the report, persist it with aggregated usage and
/// citations, and emit `ReportSaved`.
pub async fn persist(
    reports: &dyn ReportRepository,
    embeddings: Option<&dyn EmbeddingProvider>,
    job_id: Uuid,
    query: &str,
    content: &str,
    sub_results: &[SubAgentResult],
    synthesis_usage: Usage,
    parameters: serde_json::Value,
    ctx: &JobContext,
) -> Result<(i64, Usage)> {
    let total_usage: Usage = sub_results.iter().map(|r| r.usage).sum::<Usage>() + synthesis_usage;

    let citations: Vec<String> = sub_results
        .iter()
        .filter(|r| r.ok)
        .flat_map(|r| r.sources.clone())
        .collect();

    let embedding = match embeddings {
        Some(embedder) => embedder.embed(content).await.ok(),
        None => None,
    };

    let report = Report {
        id: 0,
        job_id,
        query: query.to_string(),
        content: content.to_string(),
        citations: serde_json::json!(citations),
        parameters,
        usage: serde_json::json!(total_usage),
        embedding,
        rating: None,
        created_at: chrono::Utc::now(),
    };

    let report_id = reports.insert(&report).await?;
    ctx.emit(
        EventType::ReportSaved,
        serde_json::json!({"report_id": report_id, "total_tokens": total_usage.total_tokens}),
    )
    .await?;

    Ok((report_id, total_usage))
}

/// Whether the determinism-seed env opt-in is enabled. Read once per
/// call rather than cached, since tests toggle it per-case.
fn deterministic_seed_from_job_id_enabled() -> bool {
    std::env::var("DETERMINISTIC_SEED_FROM_JOB_ID")
        .map(|v| v == "true" || v == "1")
        .unwrap_or(false)
}

/// Resolve the determinism seed: an explicit `seed` wins; otherwise,
/// when opted in, hash the job id.
pub fn resolve_seed(explicit: Option<u64>, job_id: Uuid) -> Option<u64> {
    if explicit.is_some() {
        return explicit;
    }
    if !deterministic_seed_from_job_id_enabled() {
        return None;
    }
    let digest = Sha256::digest(job_id.as_bytes());
    Some(u64::from_le_bytes(digest[0..8].try_into().unwrap()))
}

/// Bridges the pipeline into the job-worker system. Lives here rather
/// than in `waypoint-jobs` so that crate doesn't need to depend on
/// `waypoint-inference`/`waypoint-search`.
pub struct ResearchJobHandler {
    chat: Arc<dyn ChatCompletionProvider>,
    embeddings: Option<Arc<dyn EmbeddingProvider>>,
    reports: Arc<dyn ReportRepository>,
    models: ModelTierTable,
}

impl ResearchJobHandler {
    pub fn new(
        chat: Arc<dyn ChatCompletionProvider>,
        embeddings: Option<Arc<dyn EmbeddingProvider>>,
        reports: Arc<dyn ReportRepository>,
        models: ModelTierTable,
    ) -> Self {
        Self {
            chat,
            embeddings,
            reports,
            models,
        }
    }

    fn cost_preference(params: &ResearchParams) -> CostPreference {
        match params.cost_preference.as_str() {
            "high" => CostPreference::High,
            "low" => CostPreference::Low,
            _ => CostPreference::Medium,
        }
    }
}

#[async_trait::async_trait]
impl JobHandler for ResearchJobHandler {
    fn job_type(&self) -> JobType {
        JobType::Research
    }

    async fn execute(&self, ctx: JobContext) -> JobResult {
        let params: ResearchParams = match serde_json::from_value(ctx.job.params.clone()) {
            Ok(p) => p,
            Err(err) => return JobResult::Failed(format!("invalid research params: {err}")),
        };

        let _seed = resolve_seed(params.seed, ctx.job_id());
        let assignment = self.models.assignment_for(Self::cost_preference(&params));

        if ctx.emit(EventType::Started, serde_json::json!({"query": params.query})).await.is_err() {
            return JobResult::Failed("failed to journal job start".to_string());
        }

        let (sub_queries, plan_usage) = plan(self.chat.as_ref(), assignment.primary.as_str(), &params.query).await;
        if ctx.is_canceled() {
            return JobResult::Canceled;
        }
        let _ = ctx
            .emit(EventType::Progress, serde_json::json!({"stage": "plan", "completed": 1, "total": 4}))
            .await;

        let sub_queries_len = sub_queries.len();
        let sub_results = fan_out(self.chat.clone(), assignment.clone(), sub_queries, &ctx).await;
        if ctx.is_canceled() {
            return JobResult::Canceled;
        }

        let succeeded = sub_results.iter().filter(|r| r.ok).count();
        if succeeded == 0 {
            return JobResult::Failed("every sub-agent failed".to_string());
        }
        debug!(sub_queries = sub_queries_len, succeeded, "fan-out complete");
        let _ = ctx
            .emit(EventType::Progress, serde_json::json!({"stage": "fan_out", "completed": 2, "total": 4}))
            .await;

        let content = match synthesize(self.chat.as_ref(), assignment.primary.as_str(), &params.query, &sub_results, &ctx).await {
            Ok(content) => content,
            Err(err) if ctx.is_canceled() => {
                debug!(error = %err, "synthesis aborted by cancellation");
                return JobResult::Canceled;
            }
            Err(err) => return JobResult::Failed(err.to_string()),
        };
        let _ = ctx
            .emit(EventType::Progress, serde_json::json!({"stage": "synthesize", "completed": 3, "total": 4}))
            .await;

        // synthesize() doesn't surface a token count for non-streaming
        // accounting purposes; the stream itself carries no usage field,
        // so synthesis usage is tracked as zero beyond the plan call.
        let synthesis_usage = plan_usage;

        let (report_id, total_usage) = match persist(
            self.reports.as_ref(),
            self.embeddings.as_deref(),
            ctx.job_id(),
            &params.query,
            &content,
            &sub_results,
            synthesis_usage,
            ctx.job.params.clone(),
            &ctx,
        )
        .await
        {
            Ok(outcome) => outcome,
            Err(err) => return JobResult::Failed(err.to_string()),
        };
        let _ = ctx
            .emit(EventType::Progress, serde_json::json!({"stage": "persist", "completed": 4, "total": 4}))
            .await;

        info!(job_id = %ctx.job_id(), report_id, total_tokens = total_usage.total_tokens, "research job complete");
        JobResult::Success(serde_json::json!({
            "report_id": report_id,
            "content": content,
            "usage": total_usage,
            "sub_agents": sub_results.len(),
            "sub_agents_succeeded": succeeded,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct ScriptedChat {
        plan_response: String,
        calls: std::sync::atomic::AtomicUsize,
    }

    #[async_trait::async_trait]
    impl ChatCompletionProvider for ScriptedChat {
        async fn complete(&self, _model: &str, _messages: &[ChatMessage]) -> Result<(String, Usage)> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok((self.plan_response.clone(), Usage::default()))
        }

        async fn complete_stream(&self, _model: &str, _messages: &[ChatMessage]) -> Result<waypoint_core::TokenStream> {
            let words = vec![Ok("hello ".to_string()), Ok("world".to_string())];
            Ok(Box::pin(futures::stream::iter(words)))
        }
    }

    #[tokio::test]
    async fn plan_parses_well_formed_json() {
        let chat = ScriptedChat {
            plan_response: r#"{"sub_queries":[{"tag":"a","query":"q1"},{"tag":"b","query":"q2"}]}"#.to_string(),
            calls: AtomicUsize::new(0),
        };
        let (sub_queries, _usage) = plan(&chat, "gpt-4o-mini", "original").await;
        assert_eq!(sub_queries.len(), 2);
        assert_eq!(sub_queries[0].tag, "a");
    }

    #[tokio::test]
    async fn plan_falls_back_on_unparsable_response() {
        let chat = ScriptedChat {
            plan_response: "not json at all".to_string(),
            calls: AtomicUsize::new(0),
        };
        let (sub_queries, _usage) = plan(&chat, "gpt-4o-mini", "original query").await;
        assert_eq!(sub_queries.len(), 1);
        assert_eq!(sub_queries[0].query, "original query");
    }

    #[test]
    fn resolve_seed_prefers_explicit_value() {
        let job_id = Uuid::new_v4();
        assert_eq!(resolve_seed(Some(42), job_id), Some(42));
    }

    #[test]
    fn resolve_seed_is_none_without_explicit_or_opt_in() {
        std::env::remove_var("DETERMINISTIC_SEED_FROM_JOB_ID");
        assert_eq!(resolve_seed(None, Uuid::new_v4()), None);
    }

    #[test]
    fn usage_aggregates_across_sub_agents_and_synthesis() {
        let sub_results = vec![
            SubAgentResult {
                tag: "a".into(),
                query: "q".into(),
                ok: true,
                content: Some("x".into()),
                usage: Usage { prompt_tokens: 10, completion_tokens: 5, total_tokens: 15 },
                sources: vec![],
                error: None,
            },
            SubAgentResult {
                tag: "b".into(),
                query: "q".into(),
                ok: true,
                content: Some("y".into()),
                usage: Usage { prompt_tokens: 3, completion_tokens: 2, total_tokens: 5 },
                sources: vec![],
                error: None,
            },
        ];
        let synthesis_usage = Usage { prompt_tokens: 20, completion_tokens: 10, total_tokens: 30 };
        let total: Usage = sub_results.iter().map(|r| r.usage).sum::<Usage>() + synthesis_usage;
        assert_eq!(total.total_tokens, 50);
    }
}
