//! Deterministic mock providers for testing orchestrator/search code
//! without a live upstream model.

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use waypoint_core::{ChatCompletionProvider, ChatMessage, EmbeddingProvider, Result, TokenStream, Usage};

/// Deterministic text-embedding stand-in: hashes the input with SHA-256 and
/// expands the digest into a unit-length vector of the configured
/// dimension. The same text always yields the same vector.
pub struct MockEmbeddingProvider {
    dimension: usize,
}

impl MockEmbeddingProvider {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }

    fn hash_to_vector(text: &str, dimension: usize) -> Vec<f32> {
        let mut vec = vec![0.0f32; dimension];
        let mut counter: u32 = 0;
        let mut filled = 0;
        while filled < dimension {
            let mut hasher = Sha256::new();
            hasher.update(text.as_bytes());
            hasher.update(counter.to_le_bytes());
            let digest = hasher.finalize();
            for chunk in digest.chunks(4) {
                if filled >= dimension {
                    break;
                }
                let mut buf = [0u8; 4];
                buf[..chunk.len()].copy_from_slice(chunk);
                let raw = u32::from_le_bytes(buf);
                vec[filled] = (raw as f32 / u32::MAX as f32) - 0.5;
                filled += 1;
            }
            counter += 1;
        }
        let magnitude: f32 = vec.iter().map(|x| x * x).sum::<f32>().sqrt();
        if magnitude > 0.0 {
            vec.iter_mut().for_each(|x| *x /= magnitude);
        }
        vec
    }
}

#[async_trait]
impl EmbeddingProvider for MockEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(Self::hash_to_vector(text, self.dimension))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Deterministic chat completion stand-in. Returns a fixed response, a
/// response mapped from the last user message, or an echo of it, and logs
/// every call so tests can assert on invocation counts.
#[derive(Clone)]
pub struct MockChatCompletionProvider {
    inner: Arc<Mutex<MockState>>,
}

struct MockState {
    default_response: String,
    responses: HashMap<String, String>,
    calls: Vec<String>,
}

impl MockChatCompletionProvider {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(MockState {
                default_response: "mock response".to_string(),
                responses: HashMap::new(),
                calls: Vec::new(),
            })),
        }
    }

    pub fn with_default_response(self, response: impl Into<String>) -> Self {
        self.inner.lock().unwrap().default_response = response.into();
        self
    }

    pub fn with_response(self, prompt: impl Into<String>, response: impl Into<String>) -> Self {
        self.inner
            .lock()
            .unwrap()
            .responses
            .insert(prompt.into(), response.into());
        self
    }

    pub fn call_count(&self) -> usize {
        self.inner.lock().unwrap().calls.len()
    }

    fn respond_to(&self, prompt: &str) -> String {
        let mut state = self.inner.lock().unwrap();
        state.calls.push(prompt.to_string());
        state
            .responses
            .get(prompt)
            .cloned()
            .unwrap_or_else(|| state.default_response.clone())
    }
}

impl Default for MockChatCompletionProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChatCompletionProvider for MockChatCompletionProvider {
    async fn complete(&self, _model: &str, messages: &[ChatMessage]) -> Result<(String, Usage)> {
        let prompt = messages.last().map(|m| m.content.as_str()).unwrap_or("");
        let content = self.respond_to(prompt);
        let word_count = content.split_whitespace().count() as u64;
        let usage = Usage {
            prompt_tokens: prompt.split_whitespace().count() as u64,
            completion_tokens: word_count,
            total_tokens: word_count + prompt.split_whitespace().count() as u64,
        };
        Ok((content, usage))
    }

    async fn complete_stream(&self, model: &str, messages: &[ChatMessage]) -> Result<TokenStream> {
        let (response, _usage) = self.complete(model, messages).await?;
        let words: Vec<Result<String>> = response
            .split_whitespace()
            .map(|w| Ok(format!("{w} ")))
            .collect();
        Ok(Box::pin(futures::stream::iter(words)))
    }
}
