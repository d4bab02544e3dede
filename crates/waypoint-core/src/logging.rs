//! Structured logging schema and field name constants for waypoint.
//!
//! All crates use these constants for consistent structured logging fields,
//! so log aggregation tools can query by standardized field names across
//! every subsystem.
//!
//! ## Log Level Contract
//!
//! | Level | Usage |
//! |-------|-------|
//! | ERROR | Degraded service, requires operator attention |
//! | WARN  | Recoverable issue, automatic fallback applied |
//! | INFO  | Lifecycle events (startup, shutdown), operation completions |
//! | DEBUG | Decision points, intermediate values, config choices |
//! | TRACE | Per-item iteration, high-volume data (search hits, tokens) |

// ─── Identity fields ───────────────────────────────────────────────────────

/// Correlation ID propagated across request → job → sub-calls.
/// Format: UUIDv7 (time-ordered).
pub const REQUEST_ID: &str = "request_id";

/// Subsystem originating the log event.
/// Values: "transport", "search", "db", "inference", "jobs", "orchestrator"
pub const SUBSYSTEM: &str = "subsystem";

/// Component within a subsystem.
/// Examples: "hybrid_search", "fusion", "openai", "pool", "worker"
pub const COMPONENT: &str = "component";

/// Logical operation name.
/// Examples: "search", "embed", "complete_stream", "claim_next"
pub const OPERATION: &str = "op";

// ─── Entity fields ─────────────────────────────────────────────────────────

/// Job UUID being processed.
pub const JOB_ID: &str = "job_id";

/// Job type enum variant.
pub const JOB_TYPE: &str = "job_type";

/// Session identifier (STDIO process id or negotiated Mcp-Session-Id).
pub const SESSION_ID: &str = "session_id";

/// Transport kind: "stdio", "http", "websocket".
pub const TRANSPORT: &str = "transport";

/// Monotonic job-event journal id.
pub const EVENT_ID: &str = "event_id";

/// Search query text.
pub const QUERY: &str = "query";

// ─── Measurement fields ────────────────────────────────────────────────────

/// Wall-clock duration in milliseconds.
pub const DURATION_MS: &str = "duration_ms";

/// Number of results returned by a search or query.
pub const RESULT_COUNT: &str = "result_count";

/// Number of input texts sent to an embedding model.
pub const INPUT_COUNT: &str = "input_count";

/// Byte length of a prompt or response.
pub const PROMPT_LEN: &str = "prompt_len";

/// Byte length of a model response.
pub const RESPONSE_LEN: &str = "response_len";

// ─── Search-specific fields ────────────────────────────────────────────────

/// Number of BM25 candidates before fusion.
pub const BM25_HITS: &str = "bm25_hits";

/// Number of dense-vector candidates before fusion.
pub const DENSE_HITS: &str = "dense_hits";

/// Number of graph-expansion candidates before fusion.
pub const GRAPH_HITS: &str = "graph_hits";

/// BM25 weight used in fusion.
pub const BM25_WEIGHT: &str = "bm25_weight";

/// Dense-vector weight used in fusion.
pub const DENSE_WEIGHT: &str = "dense_weight";

/// Similarity threshold tier actually used by the dense stage.
pub const SIMILARITY_THRESHOLD: &str = "similarity_threshold";

// ─── Database fields ───────────────────────────────────────────────────────

/// Number of active connections in the pool.
pub const POOL_SIZE: &str = "pool_size";

/// Number of idle connections in the pool.
pub const POOL_IDLE: &str = "pool_idle";

/// Database table or entity affected.
pub const DB_TABLE: &str = "db_table";

// ─── Inference fields ──────────────────────────────────────────────────────

/// Model name used for inference.
pub const MODEL: &str = "model";

// ─── Outcome fields ────────────────────────────────────────────────────────

/// Boolean success/failure indicator.
pub const SUCCESS: &str = "success";

/// Error message when an operation fails.
pub const ERROR_MSG: &str = "error";

/// Slow operation threshold exceeded.
pub const SLOW: &str = "slow";
