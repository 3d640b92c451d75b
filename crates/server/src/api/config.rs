//! # Config API
//!
//! Overrides persisted in `.marketlens/config.json`, layered over the
//! environment. A PATCH rebuilds the stage agents with the new settings.

use anyhow::Context;
use axum::{
    extract::{rejection::JsonRejection, State},
    response::Json,
    routing::get,
    Router,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::{info, warn};
use utoipa::ToSchema;

use marketlens_core::config::{ResearchConfig, DEFAULT_MAX_RESULTS};
use marketlens_core::models::LlmProvider;
use marketlens_core::pipeline::Stage;

use crate::error::{ApiError, ErrorBody};
use crate::SharedState;

pub const CONFIG_PATH: &str = ".marketlens/config.json";
pub const DEFAULT_HEARTBEAT_SECS: u64 = 15;

/// Persisted overrides; absent fields fall back to the environment
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, ToSchema)]
pub struct PersistedConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub global_provider: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub global_model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub searxng_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_results: Option<usize>,
    /// Stage id → provider id
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub per_stage_providers: HashMap<String, String>,
    /// Stage id → model name
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub per_stage_models: HashMap<String, String>,
}

impl PersistedConfig {
    /// Read the file; a missing or unreadable file yields no overrides
    pub async fn load(path: &Path) -> Self {
        match tokio::fs::read_to_string(path).await {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                warn!("Ignoring malformed {}: {}", path.display(), e);
                Self::default()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Self::default(),
            Err(e) => {
                warn!("Failed to read {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    pub async fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let content = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path, content)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))
    }

    pub fn merge(&mut self, other: PersistedConfig) {
        if other.global_provider.is_some() {
            self.global_provider = other.global_provider;
        }
        if other.global_model.is_some() {
            self.global_model = other.global_model;
        }
        if other.base_url.is_some() {
            self.base_url = other.base_url;
        }
        if other.searxng_url.is_some() {
            self.searxng_url = other.searxng_url;
        }
        if other.max_results.is_some() {
            self.max_results = other.max_results;
        }
        self.per_stage_providers.extend(other.per_stage_providers);
        self.per_stage_models.extend(other.per_stage_models);
    }

    /// Layer these overrides over `base`
    pub fn apply(&self, base: &ResearchConfig) -> anyhow::Result<ResearchConfig> {
        let mut config = base.clone();
        if let Some(provider) = &self.global_provider {
            config.global_provider = provider.parse()?;
        }
        if self.global_model.is_some() {
            config.global_model = self.global_model.clone();
        }
        if self.base_url.is_some() {
            config.base_url = self.base_url.clone();
        }
        if self.searxng_url.is_some() {
            config.searxng_url = self.searxng_url.clone();
        }
        if let Some(max) = self.max_results {
            anyhow::ensure!(max > 0, "max_results must be at least 1");
            config.max_results = max;
        }
        for (stage, provider) in &self.per_stage_providers {
            config
                .per_stage_providers
                .insert(parse_stage(stage)?, provider.parse::<LlmProvider>()?);
        }
        for (stage, model) in &self.per_stage_models {
            config.per_stage_models.insert(parse_stage(stage)?, model.clone());
        }
        Ok(config)
    }
}

fn parse_stage(id: &str) -> anyhow::Result<Stage> {
    Stage::ALL
        .into_iter()
        .find(|s| s.as_str() == id.trim())
        .ok_or_else(|| anyhow::anyhow!("unknown stage '{}'", id))
}

#[derive(Debug, Serialize, ToSchema)]
pub struct StageModel {
    pub stage: &'static str,
    pub provider: String,
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

/// What the stage agents actually run with
#[derive(Debug, Serialize, ToSchema)]
pub struct EffectiveConfig {
    pub global_provider: String,
    pub stages: Vec<StageModel>,
    pub searxng_url: Option<String>,
    pub max_results: usize,
    pub llm_available: bool,
    pub missing_keys: Vec<&'static str>,
}

impl From<&ResearchConfig> for EffectiveConfig {
    fn from(config: &ResearchConfig) -> Self {
        let stages = Stage::ALL
            .iter()
            .map(|stage| {
                let model = config.model_for(*stage);
                StageModel {
                    stage: stage.as_str(),
                    provider: model.provider.to_string(),
                    model: model.model,
                    base_url: model.base_url,
                }
            })
            .collect();
        Self {
            global_provider: config.global_provider.to_string(),
            stages,
            searxng_url: config.searxng_url.clone(),
            max_results: config.max_results,
            llm_available: config.llm_available(),
            missing_keys: config.missing_keys(),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ConfigDefaults {
    pub global_provider: &'static str,
    pub max_results: usize,
    pub heartbeat_secs: u64,
}

impl Default for ConfigDefaults {
    fn default() -> Self {
        Self {
            global_provider: LlmProvider::default().id(),
            max_results: DEFAULT_MAX_RESULTS,
            heartbeat_secs: DEFAULT_HEARTBEAT_SECS,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ConfigResponse {
    pub config: PersistedConfig,
    pub effective: EffectiveConfig,
    pub defaults: ConfigDefaults,
}

impl ConfigResponse {
    fn new(config: PersistedConfig, effective: &ResearchConfig) -> Self {
        Self {
            config,
            effective: effective.into(),
            defaults: ConfigDefaults::default(),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ProviderInfo {
    pub id: &'static str,
    pub name: &'static str,
    pub default_model: &'static str,
    pub supports_base_url: bool,
    pub env_var: &'static str,
    /// Whether the API key is set
    pub configured: bool,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ProvidersResponse {
    pub providers: Vec<ProviderInfo>,
}

pub fn config_routes() -> Router<SharedState> {
    Router::new()
        .route("/api/v1/config", get(get_config).patch(update_config))
        .route("/api/v1/providers", get(get_providers))
}

/// Get persisted and effective configuration
#[utoipa::path(
    get,
    path = "/api/v1/config",
    tag = "config",
    responses(
        (status = 200, description = "Current configuration", body = ConfigResponse)
    )
)]
pub async fn get_config(State(state): State<SharedState>) -> Json<ConfigResponse> {
    let config = PersistedConfig::load(&state.config_path).await;
    let runtime = state.runtime().await;
    Json(ConfigResponse::new(config, &runtime.config))
}

/// Merge overrides into the persisted configuration
#[utoipa::path(
    patch,
    path = "/api/v1/config",
    tag = "config",
    request_body = PersistedConfig,
    responses(
        (status = 200, description = "Updated configuration", body = ConfigResponse),
        (status = 400, description = "Unknown provider or stage", body = ErrorBody)
    )
)]
pub async fn update_config(
    State(state): State<SharedState>,
    body: Result<Json<PersistedConfig>, JsonRejection>,
) -> Result<Json<ConfigResponse>, ApiError> {
    let Json(updates) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;

    let mut config = PersistedConfig::load(&state.config_path).await;
    config.merge(updates);
    let effective = config
        .apply(&state.env_config)
        .map_err(|e| ApiError::BadRequest(format!("{:#}", e)))?;

    config.save(&state.config_path).await?;
    state.reload(effective).await?;
    info!("Configuration updated");

    let runtime = state.runtime().await;
    Ok(Json(ConfigResponse::new(config, &runtime.config)))
}

/// List supported LLM providers
#[utoipa::path(
    get,
    path = "/api/v1/providers",
    tag = "providers",
    responses(
        (status = 200, description = "Supported providers", body = ProvidersResponse)
    )
)]
pub async fn get_providers() -> Json<ProvidersResponse> {
    let providers = LlmProvider::all()
        .into_iter()
        .map(|p| ProviderInfo {
            id: p.id(),
            name: p.display_name(),
            default_model: p.default_model(),
            supports_base_url: p.supports_base_url(),
            env_var: p.env_var(),
            configured: p.is_configured(),
        })
        .collect();
    Json(ProvidersResponse { providers })
}
