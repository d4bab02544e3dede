//! OpenAI-compatible text-embedding provider.

use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

use waypoint_core::{EmbeddingProvider, Error, Result};

use super::backend::OpenAiConfig;
use super::types::{EmbeddingRequest, EmbeddingResponse, OpenAiErrorResponse};

/// Embedding client against any OpenAI-compatible `/embeddings` endpoint.
pub struct OpenAiEmbeddingProvider {
    client: Client,
    config: OpenAiConfig,
    model: String,
    dimension: usize,
}

impl OpenAiEmbeddingProvider {
    pub fn new(config: OpenAiConfig, model: impl Into<String>, dimension: usize) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| Error::Embedding(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            config,
            model: model.into(),
            dimension,
        })
    }

    fn build_request(&self) -> reqwest::RequestBuilder {
        let url = format!(
            "{}/embeddings",
            self.config.base_url.trim_end_matches('/')
        );
        let mut req = self
            .client
            .post(&url)
            .header("Content-Type", "application/json");
        if let Some(ref api_key) = self.config.api_key {
            req = req.header("Authorization", format!("Bearer {api_key}"));
        }
        req
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        debug!(model = %self.model, chars = text.len(), "embedding text");

        let request = EmbeddingRequest {
            model: self.model.clone(),
            input: vec![text.to_string()],
        };

        let response = self
            .build_request()
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Embedding(format!("request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let message = response
                .json::<OpenAiErrorResponse>()
                .await
                .map(|b| b.error.message)
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(Error::Embedding(format!(
                "upstream returned {status}: {message}"
            )));
        }

        let mut result: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| Error::Embedding(format!("failed to parse response: {e}")))?;

        result.data.sort_by_key(|d| d.index);
        result
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| Error::Embedding("empty embedding response".to_string()))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_reports_configured_dimension() {
        let provider =
            OpenAiEmbeddingProvider::new(OpenAiConfig::default(), "text-embedding-3-small", 1536)
                .unwrap();
        assert_eq!(provider.dimension(), 1536);
    }
}
