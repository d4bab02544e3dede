//! # waypoint-inference
//!
//! Upstream collaborators the research orchestrator and hybrid search depend
//! on: an OpenAI-compatible chat-completion client and a text-embedding
//! provider. Both are external systems reached over an assumed wire
//! contract; this crate implements the client side of it:
//! `waypoint_core::ChatCompletionProvider` and
//! `waypoint_core::EmbeddingProvider`.

pub mod config;
pub mod mock;
pub mod model_config;
pub mod openai;

pub use config::InferenceConfig;
pub use mock::{MockChatCompletionProvider, MockEmbeddingProvider};
pub use model_config::{CostPreference, ModelAssignment, ModelRef};
pub use openai::backend::OpenAiChatProvider;
pub use openai::embedding::OpenAiEmbeddingProvider;

// Re-export core types commonly needed alongside this crate.
pub use waypoint_core::{ChatCompletionProvider, ChatMessage, EmbeddingProvider};
