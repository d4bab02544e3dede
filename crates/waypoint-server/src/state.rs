//! Process-wide application state, constructed once in `main` and cloned
//! cheaply into every axum handler via `State<ServerContext>` (SPEC_FULL.md
//! §9.1 — no process-wide statics).

use std::sync::Arc;

use waypoint_core::{
    ChatCompletionProvider, EmbeddingProvider, EventBus, EventRepository, JobRepository, SessionRepository,
};
use waypoint_db::Database;
use waypoint_jobs::CancellationRegistry;
use waypoint_search::hybrid::HybridSearch;
use waypoint_transport::SessionManager;

use crate::auth::SharedAuthenticator;
use crate::config::ServerConfig;
use crate::middleware::rate_limit::GlobalRateLimiter;
use crate::sse::LegacyConnectionRegistry;

/// Everything an axum handler or the STDIO loop needs to answer an RPC
/// call. `db` exposes every repository directly (`db.reports`,
/// `db.doc_index`, `db.graph`) since each already implements the trait
/// its callers need. `jobs`/`job_events`/`session_repo` are kept as
/// trait objects alongside `db` (rather than only `db.jobs`/`db.sessions`)
/// because `waypoint_jobs::submission::submit`,
/// `waypoint_transport::resume::replay_and_subscribe`, and
/// `waypoint_transport::capabilities::initialize` all take `Arc<dyn _>`
/// directly.
#[derive(Clone)]
pub struct ServerContext {
    pub db: Database,
    pub jobs: Arc<dyn JobRepository>,
    pub job_events: Arc<dyn EventRepository>,
    pub session_repo: Arc<dyn SessionRepository>,
    pub search: Arc<dyn HybridSearch>,
    pub chat: Arc<dyn ChatCompletionProvider>,
    pub embedder: Arc<dyn EmbeddingProvider>,
    pub sessions: Arc<SessionManager>,
    pub events: Arc<EventBus>,
    pub config: Arc<ServerConfig>,
    pub authenticator: SharedAuthenticator,
    /// Lets `cancel_job` reach a job executing in a worker task.
    pub cancellations: CancellationRegistry,
    /// `None` when `RATE_LIMIT_ENABLED=false`.
    pub rate_limiter: Option<Arc<GlobalRateLimiter>>,
    /// Legacy HTTP+SSE connection id -> response channel (spec.md §4.1
    /// "HTTP+SSE (legacy)").
    pub legacy_connections: LegacyConnectionRegistry,
}
