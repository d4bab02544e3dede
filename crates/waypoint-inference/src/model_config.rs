//! Cost-tier model selection for ensemble sub-agents.
//!
//! A sub-agent's `costPreference` ("low" | "medium" | "high") is resolved to
//! a primary/fallback model pair up front. If the primary model's call
//! fails or times out, the orchestrator retries once against the fallback
//! before treating the sub-agent as failed, mirroring the teacher's
//! profile-based model-selection pattern but with a simpler three-tier table
//! since Waypoint doesn't maintain per-model empirical performance data.

use serde::{Deserialize, Serialize};

/// A model identifier as understood by the upstream chat completion
/// provider (e.g. an OpenRouter or OpenAI model slug).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelRef(pub String);

impl ModelRef {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ModelRef {
    fn from(s: &str) -> Self {
        ModelRef(s.to_string())
    }
}

impl std::fmt::Display for ModelRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Requested cost/quality tier for a sub-agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CostPreference {
    Low,
    Medium,
    High,
}

impl Default for CostPreference {
    fn default() -> Self {
        CostPreference::Medium
    }
}

/// Primary/fallback model pair assigned to a sub-agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelAssignment {
    pub primary: ModelRef,
    pub fallback: ModelRef,
}

/// Configurable mapping from cost tier to model pair, populated from
/// environment/config at startup so deployments can swap in whatever
/// models their upstream provider exposes without a code change.
#[derive(Debug, Clone)]
pub struct ModelTierTable {
    low: ModelAssignment,
    medium: ModelAssignment,
    high: ModelAssignment,
}

impl ModelTierTable {
    pub fn new(low: ModelAssignment, medium: ModelAssignment, high: ModelAssignment) -> Self {
        Self { low, medium, high }
    }

    pub fn assignment_for(&self, preference: CostPreference) -> ModelAssignment {
        match preference {
            CostPreference::Low => self.low.clone(),
            CostPreference::Medium => self.medium.clone(),
            CostPreference::High => self.high.clone(),
        }
    }
}

impl Default for ModelTierTable {
    fn default() -> Self {
        Self {
            low: ModelAssignment {
                primary: "gpt-4o-mini".into(),
                fallback: "gpt-4o-mini".into(),
            },
            medium: ModelAssignment {
                primary: "gpt-4o".into(),
                fallback: "gpt-4o-mini".into(),
            },
            high: ModelAssignment {
                primary: "o1".into(),
                fallback: "gpt-4o".into(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_table_resolves_every_tier() {
        let table = ModelTierTable::default();
        assert_eq!(
            table.assignment_for(CostPreference::Low).primary.as_str(),
            "gpt-4o-mini"
        );
        assert_eq!(
            table
                .assignment_for(CostPreference::High)
                .fallback
                .as_str(),
            "gpt-4o"
        );
    }

    #[test]
    fn cost_preference_defaults_to_medium() {
        assert_eq!(CostPreference::default(), CostPreference::Medium);
    }

    #[test]
    fn cost_preference_deserializes_lowercase() {
        let pref: CostPreference = serde_json::from_str("\"high\"").unwrap();
        assert_eq!(pref, CostPreference::High);
    }
}
