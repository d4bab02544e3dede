//! # waypoint-jobs
//!
//! The claim-based async job engine backing research requests.
//!
//! This crate provides:
//! - A `JobHandler` trait boundary concrete job implementations satisfy
//! - A concurrent claim/execute/heartbeat worker pool (`JobWorker`)
//! - A background lease-reclaim sweep for abandoned jobs
//! - Idempotency key derivation and idempotent submission
//!
//! It depends only on `waypoint-core`'s traits, not on any concrete
//! storage or inference backend, so it can be tested with in-memory
//! fakes and wired to Postgres (`waypoint-db`) at the binary crate.
//!
//! ## Example
//!
//! ```ignore
//! use waypoint_jobs::{JobWorker, WorkerConfig, submission::submit};
//! use waypoint_core::JobType;
//!
//! let worker = JobWorker::new(jobs_repo, events_repo, bus, WorkerConfig::from_env());
//! worker.register_handler(my_research_handler).await;
//! let handle = worker.start();
//! ```

pub mod handler;
pub mod idempotency;
pub mod submission;
pub mod sweeper;
pub mod worker;

pub use handler::{JobContext, JobHandler, JobResult};
pub use submission::{submit, SubmissionOutcome};
pub use sweeper::{run_idempotency_sweeper, run_lease_sweeper, spawn_idempotency_sweeper, spawn_lease_sweeper};
pub use worker::{CancellationRegistry, JobWorker, WorkerConfig, WorkerEvent, WorkerHandle};
