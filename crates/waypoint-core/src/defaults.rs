//! Centralized default constants for the waypoint system.
//!
//! **This module is the single source of truth** for all shared default
//! values. Every crate reads tunables from here (or from the matching
//! environment variable at boot) instead of defining its own magic numbers.
//!
//! Organized by domain area. When adding new constants, place them in the
//! appropriate section and document the rationale for the chosen value.

// =============================================================================
// JOB ENGINE
// =============================================================================

/// How long a claimed job's lease lasts before it is eligible for reclaim.
pub const LEASE_DURATION_SECS: i64 = 60;

/// How often a running job's heartbeat task re-stamps its lease.
pub const HEARTBEAT_INTERVAL_SECS: u64 = 15;

/// Number of concurrent claim/execute worker loops.
pub const PARALLELISM: usize = 4;

/// Worker poll sleep when the queue is empty. Deliberately 750ms, not the
/// teacher's 500ms default, per this system's lower expected job volume.
pub const POLL_INTERVAL_MS: u64 = 750;

/// How often the lease-reclaim sweeper runs.
pub const CLEANUP_INTERVAL_SECS: u64 = 600;

// =============================================================================
// IDEMPOTENCY
// =============================================================================

/// How long an idempotency key remains valid for deduplication.
pub const IDEMPOTENCY_TTL_SECS: i64 = 3600;

/// Window during which a retried request with the same key rejoins the
/// original job instead of starting a new one.
pub const IDEMPOTENCY_RETRY_WINDOW_SECS: i64 = 600;

/// Maximum retries tolerated under the same idempotency key.
pub const IDEMPOTENCY_MAX_RETRIES: u32 = 3;

// =============================================================================
// SESSIONS
// =============================================================================

/// How long an idle session stays valid before being swept.
pub const SESSION_TTL_SECS: i64 = 3600;

/// How often the session-expiry sweep runs.
pub const SESSION_CLEANUP_INTERVAL_SECS: u64 = 600;

// =============================================================================
// ENSEMBLE ORCHESTRATION
// =============================================================================

/// Default number of sub-agents fanned out per research job.
pub const ENSEMBLE_SIZE: usize = 2;

/// Per-sub-agent timeout.
pub const SUB_AGENT_TIMEOUT_SECS: u64 = 90;

/// Timeout for the synthesis stage once sub-agent results are in.
pub const SYNTHESIS_TIMEOUT_SECS: u64 = 300;

/// Total wall-clock budget for a research job end to end.
pub const JOB_TOTAL_TIMEOUT_SECS: u64 = 600;

/// Emit a `Progress` event roughly every N synthesis tokens.
pub const SYNTHESIS_PROGRESS_EVERY_N_TOKENS: usize = 50;

// =============================================================================
// EMBEDDING
// =============================================================================

/// Default embedding vector dimension when no provider-specific override
/// is configured.
pub const EMBED_DIMENSION_DEFAULT: usize = 384;

// =============================================================================
// HYBRID SEARCH
// =============================================================================

/// BM25 term-frequency saturation parameter.
pub const BM25_K1: f32 = 1.2;

/// BM25 document-length normalization parameter.
pub const BM25_B: f32 = 0.75;

/// HNSW index build parameter: max connections per node.
pub const HNSW_M: usize = 24;

/// HNSW index build parameter: candidate list size during construction.
pub const HNSW_EF_CONSTRUCTION: usize = 100;

/// HNSW query parameter: candidate list size during search.
pub const HNSW_EF_SEARCH: usize = 40;

/// Progressive similarity-threshold relaxation ladder for the dense stage.
pub const SIMILARITY_THRESHOLD_TIERS: [f32; 4] = [0.75, 0.70, 0.65, 0.60];

/// Weight applied to normalized BM25 scores in the fusion stage.
pub const FUSION_BM25_WEIGHT: f32 = 0.7;

/// Weight applied to normalized dense-vector scores in the fusion stage.
pub const FUSION_DENSE_WEIGHT: f32 = 0.3;

/// Maximum hop count for graph expansion.
pub const GRAPH_MAX_HOPS: u32 = 2;

// =============================================================================
// SERVER
// =============================================================================

/// Default HTTP listen port.
pub const SERVER_PORT: u16 = 3000;

/// WebSocket ping interval.
pub const WS_HEARTBEAT_SECS: u64 = 30;

/// Default per-client rate limit (requests per window).
pub const RATE_LIMIT_MAX_REQUESTS: u32 = 100;

/// `Access-Control-Max-Age` for preflight caching.
pub const CORS_MAX_AGE_SECS: u64 = 600;

/// Ring buffer size for the in-process `EventBus` broadcast channel.
/// Lagging subscribers miss events past this depth; the durable journal
/// (`EventRepository`) is the source of truth for replay.
pub const EVENT_BUS_CAPACITY: usize = 1024;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_similarity_tiers_are_descending() {
        let tiers = SIMILARITY_THRESHOLD_TIERS;
        for pair in tiers.windows(2) {
            assert!(pair[0] > pair[1]);
        }
    }

    #[test]
    fn test_fusion_weights_sum_to_one() {
        assert!((FUSION_BM25_WEIGHT + FUSION_DENSE_WEIGHT - 1.0).abs() < f32::EPSILON);
    }
}
