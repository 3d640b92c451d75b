//! # Research Configuration
//!
//! Which models the stage agents use and where searches go. Model
//! resolution per stage: stage override → global → provider default.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::models::{LlmProvider, ModelConfig};
use crate::pipeline::Stage;

/// Default number of hits kept per search call
pub const DEFAULT_MAX_RESULTS: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResearchConfig {
    /// Global LLM provider (default: Anthropic)
    pub global_provider: LlmProvider,
    /// Global model to use for all stages
    pub global_model: Option<String>,
    /// Base URL override for LLM API (for OpenAI-compatible endpoints)
    pub base_url: Option<String>,
    /// Per-stage model overrides
    pub per_stage_models: HashMap<Stage, String>,
    /// Per-stage provider overrides
    pub per_stage_providers: HashMap<Stage, LlmProvider>,
    /// SearXNG instance used by the research stage
    pub searxng_url: Option<String>,
    /// Hits kept per search call
    pub max_results: usize,
}

impl Default for ResearchConfig {
    fn default() -> Self {
        Self {
            global_provider: LlmProvider::Anthropic,
            global_model: None,
            base_url: None,
            per_stage_models: HashMap::new(),
            per_stage_providers: HashMap::new(),
            searxng_url: None,
            max_results: DEFAULT_MAX_RESULTS,
        }
    }
}

impl ResearchConfig {
    /// Read `LLM_PROVIDER`, `LLM_MODEL`, `LLM_BASE_URL`, `SEARXNG_URL` and
    /// `SEARCH_MAX_RESULTS`; unset or unparsable values keep their defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let mut config = Self::default();

        if let Some(raw) = get("LLM_PROVIDER") {
            match raw.parse() {
                Ok(provider) => config.global_provider = provider,
                Err(e) => tracing::warn!("Ignoring LLM_PROVIDER: {}", e),
            }
        }
        config.global_model = get("LLM_MODEL");
        config.base_url = get("LLM_BASE_URL");
        config.searxng_url = get("SEARXNG_URL");
        if let Some(raw) = get("SEARCH_MAX_RESULTS") {
            match raw.parse::<usize>() {
                Ok(n) if n > 0 => config.max_results = n,
                _ => tracing::warn!("Ignoring SEARCH_MAX_RESULTS={:?}", raw),
            }
        }
        config
    }

    /// Model config for a specific stage
    pub fn model_for(&self, stage: Stage) -> ModelConfig {
        let provider = self
            .per_stage_providers
            .get(&stage)
            .copied()
            .unwrap_or(self.global_provider);

        // A global model only applies to the global provider
        let model = self
            .per_stage_models
            .get(&stage)
            .cloned()
            .or_else(|| {
                (provider == self.global_provider)
                    .then(|| self.global_model.clone())
                    .flatten()
            })
            .unwrap_or_else(|| provider.default_model().to_string());

        let mut config = ModelConfig::with_provider(provider, model);
        if provider.supports_base_url() {
            config.base_url = self.base_url.clone();
        }
        config
    }

    /// Providers used by any stage
    pub fn providers_in_use(&self) -> Vec<LlmProvider> {
        let mut providers = vec![self.global_provider];
        for stage in Stage::ALL {
            let p = self.model_for(stage).provider;
            if !providers.contains(&p) {
                providers.push(p);
            }
        }
        providers
    }

    /// Whether every provider in use has an API key
    pub fn llm_available(&self) -> bool {
        self.providers_in_use().iter().all(LlmProvider::is_configured)
    }

    /// Providers in use that lack an API key
    pub fn missing_keys(&self) -> Vec<&'static str> {
        self.providers_in_use()
            .iter()
            .filter(|p| !p.is_configured())
            .map(LlmProvider::env_var)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &'static [(&'static str, &'static str)]) -> impl Fn(&str) -> Option<String> {
        move |key| {
            pairs
                .iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| v.to_string())
        }
    }

    #[test]
    fn test_from_env_values() {
        let config = ResearchConfig::from_lookup(env(&[
            ("LLM_PROVIDER", "openai"),
            ("LLM_MODEL", "gpt-4o-mini"),
            ("LLM_BASE_URL", "http://localhost:11434/v1"),
            ("SEARCH_MAX_RESULTS", "8"),
        ]));
        assert_eq!(config.global_provider, LlmProvider::OpenAI);
        assert_eq!(config.max_results, 8);

        let model = config.model_for(Stage::Analyze);
        assert_eq!(model.model, "gpt-4o-mini");
        assert_eq!(model.base_url.as_deref(), Some("http://localhost:11434/v1"));
    }

    #[test]
    fn test_bad_values_keep_defaults() {
        let config = ResearchConfig::from_lookup(env(&[
            ("LLM_PROVIDER", "mistral"),
            ("SEARCH_MAX_RESULTS", "0"),
        ]));
        assert_eq!(config, ResearchConfig::default());
    }

    #[test]
    fn test_stage_overrides() {
        let mut config = ResearchConfig {
            global_model: Some("claude-3-5-haiku-latest".into()),
            ..Default::default()
        };
        config.per_stage_providers.insert(Stage::Strategize, LlmProvider::DeepSeek);
        config.per_stage_models.insert(Stage::Analyze, "claude-opus-4".into());

        assert_eq!(config.model_for(Stage::Research).model, "claude-3-5-haiku-latest");
        assert_eq!(config.model_for(Stage::Analyze).model, "claude-opus-4");

        let strategize = config.model_for(Stage::Strategize);
        assert_eq!(strategize.provider, LlmProvider::DeepSeek);
        assert_eq!(strategize.model, "deepseek-chat");
        assert!(strategize.base_url.is_none());

        assert_eq!(
            config.providers_in_use(),
            vec![LlmProvider::Anthropic, LlmProvider::DeepSeek]
        );
    }
}
