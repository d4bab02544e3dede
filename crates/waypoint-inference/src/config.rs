//! Inference configuration, loaded from recognized environment
//! variables.

use waypoint_core::{Error, Result};

use crate::model_config::ModelTierTable;
use crate::openai::backend::{OpenAiConfig, DEFAULT_BASE_URL, DEFAULT_TIMEOUT_SECS};

/// Which embedding provider to construct: a live OpenAI-compatible
/// endpoint, or the deterministic mock (used in tests and local dev
/// without upstream credentials).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EmbeddingsProvider {
    OpenAi,
    Mock,
}

impl std::str::FromStr for EmbeddingsProvider {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "openai" | "openrouter" => Ok(EmbeddingsProvider::OpenAi),
            "mock" => Ok(EmbeddingsProvider::Mock),
            other => Err(Error::Config(format!(
                "unknown EMBEDDINGS_PROVIDER: {other}"
            ))),
        }
    }
}

/// Resolved inference configuration for this process.
#[derive(Debug, Clone)]
pub struct InferenceConfig {
    pub chat: OpenAiConfig,
    pub embeddings_provider: EmbeddingsProvider,
    pub embeddings_model: String,
    pub embeddings_dimension: usize,
    pub model_tiers: ModelTierTable,
}

impl InferenceConfig {
    /// Load configuration from the environment, falling back to sensible
    /// defaults for every unset variable.
    pub fn from_env() -> Result<Self> {
        let base_url = std::env::var("OPENROUTER_BASE_URL")
            .unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        let api_key = std::env::var("OPENROUTER_API_KEY").ok();

        let embeddings_provider = std::env::var("EMBEDDINGS_PROVIDER")
            .ok()
            .map(|s| s.parse())
            .transpose()?
            .unwrap_or(EmbeddingsProvider::OpenAi);

        let embeddings_model = std::env::var("EMBEDDINGS_MODEL")
            .unwrap_or_else(|_| "text-embedding-3-small".to_string());

        let embeddings_dimension = std::env::var("EMBEDDINGS_DIMENSION")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(1536);

        Ok(Self {
            chat: OpenAiConfig {
                base_url,
                api_key,
                timeout_seconds: DEFAULT_TIMEOUT_SECS,
                http_referer: std::env::var("OPENROUTER_HTTP_REFERER").ok(),
                x_title: std::env::var("OPENROUTER_X_TITLE").ok(),
            },
            embeddings_provider,
            embeddings_model,
            embeddings_dimension,
            model_tiers: ModelTierTable::default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embeddings_provider_parses_openrouter_alias() {
        assert_eq!(
            "openrouter".parse::<EmbeddingsProvider>().unwrap(),
            EmbeddingsProvider::OpenAi
        );
    }

    #[test]
    fn embeddings_provider_rejects_unknown() {
        assert!("carrier-pigeon".parse::<EmbeddingsProvider>().is_err());
    }
}
