//! Shared data model: the entities every crate in this workspace passes
//! across trait boundaries (`waypoint-db` persists them, `waypoint-jobs`
//! and `waypoint-orchestrator` operate on them, `waypoint-transport`
//! serializes them onto the wire).

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// How a client is connected to this server for the lifetime of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    Stdio,
    Http,
    WebSocket,
}

impl TransportKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportKind::Stdio => "stdio",
            TransportKind::Http => "http",
            TransportKind::WebSocket => "websocket",
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransportKind {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "stdio" => Ok(TransportKind::Stdio),
            "http" => Ok(TransportKind::Http),
            "websocket" => Ok(TransportKind::WebSocket),
            other => Err(crate::error::Error::Validation(format!(
                "unknown transport kind: {other}"
            ))),
        }
    }
}

/// A client session: one per STDIO process, or one per negotiated
/// `Mcp-Session-Id` over HTTP/WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub transport: TransportKind,
    pub protocol_version: String,
    pub client_info: Option<serde_json::Value>,
    pub subscriptions: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
}

/// The single asynchronous job kind this system runs. Kept as an enum
/// (rather than a bare marker type) so that a future job kind — a
/// reindex sweep, say — is a one-line addition, matching the round-trip
/// pattern the store's job repository already expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    Research,
}

impl JobType {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::Research => "research",
        }
    }
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobType {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "research" => Ok(JobType::Research),
            other => Err(crate::error::Error::Validation(format!(
                "unknown job type: {other}"
            ))),
        }
    }
}

/// Lifecycle state of a queued job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running,
    Succeeded,
    Failed,
    Canceled,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Succeeded => "succeeded",
            JobStatus::Failed => "failed",
            JobStatus::Canceled => "canceled",
        }
    }

    /// True once a job cannot transition to any other state.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Succeeded | JobStatus::Failed | JobStatus::Canceled
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(JobStatus::Queued),
            "running" => Ok(JobStatus::Running),
            "succeeded" => Ok(JobStatus::Succeeded),
            "failed" => Ok(JobStatus::Failed),
            "canceled" => Ok(JobStatus::Canceled),
            other => Err(crate::error::Error::Validation(format!(
                "unknown job status: {other}"
            ))),
        }
    }
}

/// A queued unit of asynchronous work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub job_type: JobType,
    pub status: JobStatus,
    pub params: serde_json::Value,
    pub idempotency_key: Option<String>,
    pub idempotency_expires_at: Option<DateTime<Utc>>,
    /// The job this one was retried from, when a failed/canceled job was
    /// resubmitted under the same idempotency key (§4.3 "Idempotency").
    pub retry_of: Option<Uuid>,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
    pub attempt: i32,
    pub lease_expires_at: Option<DateTime<Utc>>,
    pub heartbeat_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Every event-type tag a job's journal can carry, per the fan-out
/// protocol's `event` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Submitted,
    Started,
    Progress,
    AgentStarted,
    AgentCompleted,
    AgentUsage,
    SynthesisToken,
    SynthesisError,
    ReportSaved,
    UiHint,
    Abandoned,
    Error,
    Completed,
    Canceled,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Submitted => "submitted",
            EventType::Started => "started",
            EventType::Progress => "progress",
            EventType::AgentStarted => "agent_started",
            EventType::AgentCompleted => "agent_completed",
            EventType::AgentUsage => "agent_usage",
            EventType::SynthesisToken => "synthesis_token",
            EventType::SynthesisError => "synthesis_error",
            EventType::ReportSaved => "report_saved",
            EventType::UiHint => "ui_hint",
            EventType::Abandoned => "abandoned",
            EventType::Error => "error",
            EventType::Completed => "completed",
            EventType::Canceled => "canceled",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of a job's append-only event journal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobEvent {
    pub id: i64,
    pub job_id: Uuid,
    pub event_type: EventType,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// A synthesized research report produced by the ensemble orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub id: i64,
    pub job_id: Uuid,
    pub query: String,
    pub content: String,
    pub citations: serde_json::Value,
    /// The originating job's request parameters, snapshotted at persist
    /// time (spec.md §3 Report "parameters blob").
    pub parameters: serde_json::Value,
    /// Aggregated token usage across every sub-agent plus synthesis
    /// (spec.md §3 Report "metadata blob (includes usage totals...)").
    pub usage: serde_json::Value,
    pub embedding: Option<Vec<f32>>,
    pub rating: Option<i16>,
    pub created_at: DateTime<Utc>,
}

/// A document admitted to the BM25/dense hybrid index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentIndexEntry {
    pub id: Uuid,
    pub source_id: String,
    pub title: String,
    pub content: String,
    pub token_count: i32,
    pub embedding: Option<Vec<f32>>,
    pub created_at: DateTime<Utc>,
}

/// A single term occurrence within a document, feeding BM25 scoring.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocTerm {
    pub document_id: Uuid,
    pub term: String,
    pub term_frequency: i32,
}

/// Inverted-index posting: which documents contain a term, and how often.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocPosting {
    pub term: String,
    pub document_id: Uuid,
    pub term_frequency: i32,
}

/// An entity node in the knowledge graph used for stage-3 expansion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: Uuid,
    pub node_type: String,
    pub canonical_name: String,
    pub embedding: Option<Vec<f32>>,
    pub created_at: DateTime<Utc>,
}

/// A directed, weighted relationship between two graph nodes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphEdge {
    pub id: Uuid,
    pub source: Uuid,
    pub target: Uuid,
    pub relation: String,
    pub weight: f32,
    pub confidence: f32,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_status_is_terminal() {
        assert!(!JobStatus::Queued.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
        assert!(JobStatus::Succeeded.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(JobStatus::Canceled.is_terminal());
    }

    #[test]
    fn test_job_status_round_trip() {
        for status in [
            JobStatus::Queued,
            JobStatus::Running,
            JobStatus::Succeeded,
            JobStatus::Failed,
            JobStatus::Canceled,
        ] {
            let s = status.as_str();
            let parsed: JobStatus = s.parse().unwrap();
            assert_eq!(parsed, status);
        }
    }

    #[test]
    fn test_job_type_round_trip() {
        let parsed: JobType = "research".parse().unwrap();
        assert_eq!(parsed, JobType::Research);
        assert_eq!(JobType::Research.to_string(), "research");
    }

    #[test]
    fn test_job_type_rejects_unknown() {
        let result: Result<JobType, _> = "reindex".parse();
        assert!(result.is_err());
    }

    #[test]
    fn test_transport_kind_round_trip() {
        for kind in [
            TransportKind::Stdio,
            TransportKind::Http,
            TransportKind::WebSocket,
        ] {
            let s = kind.as_str();
            let parsed: TransportKind = s.parse().unwrap();
            assert_eq!(parsed, kind);
        }
    }

    #[test]
    fn test_event_type_serializes_snake_case() {
        let json = serde_json::to_string(&EventType::AgentCompleted).unwrap();
        assert_eq!(json, "\"agent_completed\"");
    }

    #[test]
    fn test_job_event_json_round_trip() {
        let event = JobEvent {
            id: 1,
            job_id: Uuid::nil(),
            event_type: EventType::Started,
            payload: serde_json::json!({"note": "ok"}),
            created_at: Utc::now(),
        };
        let json = serde_json::to_string(&event).unwrap();
        let parsed: JobEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.event_type, EventType::Started);
    }
}
