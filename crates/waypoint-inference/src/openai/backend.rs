//! OpenAI-compatible chat completion backend.

use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

use waypoint_core::{ChatCompletionProvider, ChatMessage, Error, Result, TokenStream, Usage};

use super::streaming::parse_sse_stream;
use super::types::*;

/// Default OpenAI API endpoint.
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Default request timeout, in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// Configuration for an OpenAI-compatible chat completion endpoint.
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub timeout_seconds: u64,
    /// `HTTP-Referer` header some gateways (OpenRouter) use for app attribution.
    pub http_referer: Option<String>,
    /// `X-Title` header, same gateways.
    pub x_title: Option<String>,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: None,
            timeout_seconds: DEFAULT_TIMEOUT_SECS,
            http_referer: None,
            x_title: None,
        }
    }
}

/// Chat completion client against any OpenAI-compatible endpoint.
pub struct OpenAiChatProvider {
    client: Client,
    config: OpenAiConfig,
}

impl OpenAiChatProvider {
    pub fn new(config: OpenAiConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| Error::Inference(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &OpenAiConfig {
        &self.config
    }

    fn build_request(&self, endpoint: &str) -> reqwest::RequestBuilder {
        let url = format!("{}{}", self.config.base_url.trim_end_matches('/'), endpoint);
        let mut req = self
            .client
            .post(&url)
            .header("Content-Type", "application/json");

        if let Some(ref api_key) = self.config.api_key {
            req = req.header("Authorization", format!("Bearer {api_key}"));
        }
        if let Some(ref referer) = self.config.http_referer {
            req = req.header("HTTP-Referer", referer);
        }
        if let Some(ref title) = self.config.x_title {
            req = req.header("X-Title", title);
        }
        req
    }

    async fn error_from_response(response: reqwest::Response) -> Error {
        let status = response.status();
        let message = response
            .json::<OpenAiErrorResponse>()
            .await
            .map(|b| b.error.message)
            .unwrap_or_else(|_| "unknown error".to_string());
        Error::Inference(format!("upstream returned {status}: {message}"))
    }
}

#[async_trait]
impl ChatCompletionProvider for OpenAiChatProvider {
    async fn complete(&self, model: &str, messages: &[ChatMessage]) -> Result<(String, Usage)> {
        debug!(model, message_count = messages.len(), "chat completion");

        let request = ChatCompletionRequest {
            model: model.to_string(),
            messages: messages.iter().map(WireMessage::from).collect(),
            stream: false,
            temperature: None,
            seed: None,
            response_format: None,
            tools: None,
        };

        let response = self
            .build_request("/chat/completions")
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Inference(format!("request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(Self::error_from_response(response).await);
        }

        let result: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| Error::Inference(format!("failed to parse response: {e}")))?;

        let usage = result.usage.map(Usage::from).unwrap_or_default();
        let content = result
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .unwrap_or_default();
        Ok((content, usage))
    }

    async fn complete_stream(&self, model: &str, messages: &[ChatMessage]) -> Result<TokenStream> {
        debug!(model, message_count = messages.len(), "streaming chat completion");

        let request = ChatCompletionRequest {
            model: model.to_string(),
            messages: messages.iter().map(WireMessage::from).collect(),
            stream: true,
            temperature: None,
            seed: None,
            response_format: None,
            tools: None,
        };

        let response = self
            .build_request("/chat/completions")
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Inference(format!("request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(Self::error_from_response(response).await);
        }

        Ok(parse_sse_stream(response.bytes_stream()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_points_at_openai() {
        let config = OpenAiConfig::default();
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert!(config.api_key.is_none());
    }

    #[test]
    fn provider_construction_succeeds() {
        let provider = OpenAiChatProvider::new(OpenAiConfig::default());
        assert!(provider.is_ok());
    }
}
