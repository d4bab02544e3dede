//! OpenAI-compatible chat-completion and embedding clients.
//!
//! Works against any OpenAI-compatible endpoint (OpenRouter, OpenAI cloud,
//! vLLM, LocalAI, Ollama's OpenAI-compat mode) over the assumed wire
//! contract: `POST {base_url}/chat/completions` / `/embeddings`,
//! `Authorization: Bearer`, SSE streaming with a `data: [DONE]` sentinel.

pub mod backend;
pub mod embedding;
pub mod streaming;
pub mod types;

pub use backend::{OpenAiChatProvider, OpenAiConfig, DEFAULT_BASE_URL, DEFAULT_TIMEOUT_SECS};
pub use embedding::OpenAiEmbeddingProvider;
pub use streaming::parse_sse_stream;
pub use types::*;
