//! # waypoint-core
//!
//! Core types, traits, and abstractions shared by every waypoint crate.
//!
//! This crate provides the foundational data structures, error type, event
//! bus, and trait definitions that `waypoint-db`, `waypoint-search`,
//! `waypoint-inference`, `waypoint-jobs`, `waypoint-orchestrator`,
//! `waypoint-transport`, and `waypoint-server` all depend on.

pub mod defaults;
pub mod error;
pub mod events;
pub mod logging;
pub mod models;
pub mod traits;
pub mod uuid_utils;

// Re-export commonly used types at crate root
pub use error::{Error, Result};
pub use events::{EventBus, JobEventMessage, ServerEvent};
pub use models::*;
pub use traits::*;
pub use uuid_utils::{extract_timestamp, is_v7, new_v7, v7_from_timestamp};
