//! Core traits for waypoint abstractions.
//!
//! These traits define the interfaces concrete implementations satisfy,
//! keeping `waypoint-jobs`, `waypoint-search`, and `waypoint-orchestrator`
//! decoupled from `waypoint-db`/`waypoint-inference` and letting tests
//! substitute mocks at the same seam production code uses.

use async_trait::async_trait;
use futures::stream::BoxStream;
use uuid::Uuid;

use crate::error::Result;
use crate::models::*;

// =============================================================================
// JOB REPOSITORY
// =============================================================================

/// Persistence for the job queue: claim/execute/heartbeat/finish, plus the
/// idempotency lookups the transport layer needs before enqueueing.
#[async_trait]
pub trait JobRepository: Send + Sync {
    /// Insert a new job, or return the id of an existing non-expired job
    /// with the same idempotency key.
    async fn enqueue(
        &self,
        job_type: JobType,
        idempotency_key: Option<&str>,
        params: serde_json::Value,
    ) -> Result<Uuid>;

    /// Atomically claim the oldest queued (or lease-expired) job, if any.
    async fn claim_next(&self) -> Result<Option<Job>>;

    /// Extend a claimed job's lease and idempotency-key expiry.
    async fn heartbeat(&self, job_id: Uuid) -> Result<()>;

    /// Mark a job terminal with its final status and result/error payload.
    async fn finish(
        &self,
        job_id: Uuid,
        status: JobStatus,
        result: Option<serde_json::Value>,
        error: Option<String>,
    ) -> Result<()>;

    /// Requeue every running job whose lease has expired.
    async fn reclaim_abandoned(&self) -> Result<Vec<Job>>;

    /// Cancel a job if it is still queued or running; false if already terminal.
    async fn cancel(&self, job_id: Uuid) -> Result<bool>;

    /// Fetch a job by id.
    async fn get(&self, job_id: Uuid) -> Result<Job>;

    /// Look up a non-expired job by its idempotency key.
    async fn find_by_idempotency_key(&self, key: &str) -> Result<Option<Job>>;

    /// Delete idempotency keys past their expiry, freeing the key for reuse.
    async fn clean_expired_idempotency_keys(&self) -> Result<u64>;

    /// Create a new job linked to a failed/canceled predecessor via the
    /// same idempotency key, per §4.3's retry-window policy. The
    /// predecessor's key is cleared first so the two rows never collide
    /// on the at-most-one-live-key invariant.
    async fn create_retry(
        &self,
        job_type: JobType,
        idempotency_key: &str,
        params: serde_json::Value,
        retry_of: Uuid,
    ) -> Result<Uuid>;

    /// Count jobs by terminal/non-terminal status, feeding the
    /// `QueueStatus` heartbeat and the `/metrics` HTTP surface.
    async fn queue_counts(&self) -> Result<QueueCounts>;
}

/// A coarse snapshot of queue depth by status, independent of any
/// individual job's detail.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueCounts {
    pub queued: i64,
    pub running: i64,
    pub succeeded: i64,
    pub failed: i64,
}

// =============================================================================
// EVENT REPOSITORY
// =============================================================================

/// Append-only journal backing resumable event streams.
#[async_trait]
pub trait EventRepository: Send + Sync {
    /// Append one event, returning its monotonic id.
    async fn append_event(
        &self,
        job_id: Uuid,
        event_type: EventType,
        payload: serde_json::Value,
    ) -> Result<i64>;

    /// Every event for a job with id greater than `since_id`, ascending.
    async fn events_since(&self, job_id: Uuid, since_id: i64) -> Result<Vec<JobEvent>>;

    /// Delete events older than the given retention window.
    async fn delete_events_older_than(&self, older_than: chrono::Duration) -> Result<u64>;
}

// =============================================================================
// REPORT REPOSITORY
// =============================================================================

/// Persistence for synthesized research reports.
#[async_trait]
pub trait ReportRepository: Send + Sync {
    async fn insert(&self, report: &Report) -> Result<i64>;
    async fn get(&self, id: i64) -> Result<Report>;
    async fn update_embedding(&self, id: i64, embedding: Vec<f32>) -> Result<()>;
    async fn rate(&self, id: i64, rating: i16) -> Result<()>;
}

// =============================================================================
// DOCUMENT INDEX REPOSITORY (BM25 backing store)
// =============================================================================

/// Postings and document rows backing the lexical (BM25) retrieval stage.
#[async_trait]
pub trait DocumentIndexRepository: Send + Sync {
    async fn insert_document(&self, entry: &DocumentIndexEntry, terms: &[DocTerm]) -> Result<()>;
    async fn get_document(&self, id: Uuid) -> Result<DocumentIndexEntry>;
    /// Postings for a single term, used to accumulate per-document BM25 scores.
    async fn postings_for_term(&self, term: &str) -> Result<Vec<DocPosting>>;
    /// Corpus-wide statistics (`total_docs`, `avg_doc_length`) BM25 needs.
    async fn corpus_stats(&self) -> Result<(i64, f64)>;

    /// Nearest neighbors by cosine similarity at or above `threshold`,
    /// used by the dense-vector retrieval stage's threshold-relaxation
    /// ladder.
    async fn nearest(
        &self,
        query_embedding: &[f32],
        threshold: f32,
        limit: usize,
    ) -> Result<Vec<(Uuid, f32)>>;
}

// =============================================================================
// GRAPH REPOSITORY
// =============================================================================

/// Storage and traversal of the entity/relationship graph used for
/// stage-3 expansion.
#[async_trait]
pub trait GraphRepository: Send + Sync {
    async fn upsert_node(&self, node: &GraphNode) -> Result<Uuid>;
    async fn upsert_edge(&self, edge: &GraphEdge) -> Result<Uuid>;
    async fn find_node_by_name(&self, name: &str) -> Result<Option<GraphNode>>;
    /// Neighbors reachable within `max_hops`, paired with the edge that
    /// reached them, ranked by `weight * confidence` descending.
    async fn neighbors(
        &self,
        node_id: Uuid,
        max_hops: u32,
    ) -> Result<Vec<(GraphEdge, GraphNode)>>;
}

// =============================================================================
// SESSION REPOSITORY
// =============================================================================

/// Persistence for client sessions, so stateless-HTTP session metadata
/// survives a server restart.
#[async_trait]
pub trait SessionRepository: Send + Sync {
    async fn create(&self, session: &Session) -> Result<()>;
    async fn touch(&self, session_id: &str) -> Result<()>;
    async fn get(&self, session_id: &str) -> Result<Session>;
    async fn delete_expired(&self, ttl: chrono::Duration) -> Result<u64>;
    async fn subscribe_resource(&self, session_id: &str, resource: &str) -> Result<()>;
    async fn unsubscribe_resource(&self, session_id: &str, resource: &str) -> Result<()>;
}

// =============================================================================
// EMBEDDING PROVIDER
// =============================================================================

/// A backend capable of turning text into a fixed-dimension dense vector.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
    /// The fixed dimension every vector this provider returns will have.
    fn dimension(&self) -> usize;
}

// =============================================================================
// CHAT COMPLETION PROVIDER
// =============================================================================

/// A stream of incremental completion tokens, terminated by the underlying
/// SSE `data: [DONE]` sentinel or end of body.
pub type TokenStream = BoxStream<'static, Result<String>>;

/// One message in a chat completion request.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

/// Token accounting for one completion call, field-wise summable so an
/// orchestrator can aggregate sub-agent + synthesis usage by literal
/// addition (spec.md §9's "sum of token counts" resolution).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Usage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

impl std::ops::Add for Usage {
    type Output = Usage;
    fn add(self, rhs: Self) -> Self::Output {
        Usage {
            prompt_tokens: self.prompt_tokens + rhs.prompt_tokens,
            completion_tokens: self.completion_tokens + rhs.completion_tokens,
            total_tokens: self.total_tokens + rhs.total_tokens,
        }
    }
}

impl std::iter::Sum for Usage {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Usage::default(), std::ops::Add::add)
    }
}

/// A backend capable of non-streaming and streaming chat completion calls.
#[async_trait]
pub trait ChatCompletionProvider: Send + Sync {
    async fn complete(&self, model: &str, messages: &[ChatMessage]) -> Result<(String, Usage)>;
    async fn complete_stream(&self, model: &str, messages: &[ChatMessage]) -> Result<TokenStream>;
}

// =============================================================================
// RERANKER (out of scope per spec.md; seam implemented with a no-op default)
// =============================================================================

/// Hook for re-scoring the top-k fused results. Real rerankers are out of
/// scope; [`NoopReranker`] in `waypoint-search` satisfies this trait so the
/// `rerank: true` request flag is accepted without changing ordering.
#[async_trait]
pub trait Reranker: Send + Sync {
    async fn rerank(
        &self,
        query: &str,
        items: Vec<(Uuid, f32)>,
    ) -> Result<Vec<(Uuid, f32)>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_message_serializes() {
        let msg = ChatMessage {
            role: "user".to_string(),
            content: "hello".to_string(),
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"role\":\"user\""));
    }
}
