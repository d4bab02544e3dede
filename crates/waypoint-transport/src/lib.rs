//! # waypoint-transport
//!
//! The MCP multiplexer: JSON-RPC wire shapes, capability negotiation,
//! session management, tool-call normalization, the mode-dependent tool
//! catalog, and resumable event-stream replay.
//!
//! Transport-specific framing (STDIO line loop, HTTP streamable POST,
//! WebSocket, legacy SSE) lives in `waypoint-server`; this crate holds
//! the logic every one of those transports shares.

pub mod capabilities;
pub mod catalog;
pub mod dispatch;
pub mod resume;
pub mod rpc;
pub mod session;

pub use capabilities::{initialize, ClientCapabilities, InitializeResult, ServerCapabilities};
pub use catalog::{ServerMode, ToolDescriptor};
pub use dispatch::{normalize, ToolCategory};
pub use resume::replay_and_subscribe;
pub use rpc::{RpcError, RpcNotification, RpcRequest, RpcResponse};
pub use session::{SessionHandle, SessionManager};
