//! # Research API
//!
//! Streaming and synchronous research runs, plus the discovery endpoints
//! clients use to build a request.

use axum::{
    body::Body,
    extract::{rejection::JsonRejection, State},
    http::{header, HeaderName},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use tracing::info;
use utoipa::ToSchema;

use marketlens_core::pipeline::{
    PipelineDriver, ResearchPayload, ResearchRequest, ResearchType, Stage, StageEmitter,
};
use marketlens_core::stream::EVENT_STREAM_CONTENT_TYPE;

use crate::error::{ApiError, ErrorBody};
use crate::{Runtime, SharedState};

/// Research request body
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResearchBody {
    /// What to research; must not be blank
    #[serde(default)]
    pub query: String,
    /// One of the ids from `/api/v1/research/types`
    #[serde(default, alias = "research_type")]
    #[schema(example = "market_overview")]
    pub research_type: String,
    #[serde(default, alias = "company_name")]
    pub company_name: Option<String>,
    #[serde(default)]
    pub industry: Option<String>,
    /// Known competitors; `null` and absent both mean none
    #[serde(default)]
    pub competitors: Option<Vec<String>>,
}

impl From<ResearchBody> for ResearchRequest {
    fn from(body: ResearchBody) -> Self {
        ResearchRequest {
            query: body.query,
            research_type: body.research_type,
            company_name: body.company_name,
            industry: body.industry,
            competitors: body.competitors.unwrap_or_default(),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ResearchTypeInfo {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ResearchTypesResponse {
    pub types: Vec<ResearchTypeInfo>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AgentStatus {
    pub id: &'static str,
    pub name: &'static str,
    pub stage: &'static str,
    pub description: &'static str,
    pub capabilities: Vec<&'static str>,
    pub model: Option<String>,
    pub available: bool,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AgentsResponse {
    pub agents: Vec<AgentStatus>,
    pub llm_available: bool,
    /// Environment variables that still need an API key
    pub missing_keys: Vec<&'static str>,
}

/// A capability of one stage agent
#[derive(Debug, Serialize, ToSchema)]
pub struct ToolInfo {
    pub name: &'static str,
    /// Display name of the agent that uses it
    pub agent: &'static str,
    pub stage: &'static str,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ToolsResponse {
    pub tools: Vec<ToolInfo>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub llm_available: bool,
    pub provider: String,
}

pub fn research_routes() -> Router<SharedState> {
    Router::new()
        .route("/stream", post(stream_research))
        .route("/execute", post(execute_research))
        .route("/types", get(research_types))
}

fn parse_body(
    body: Result<Json<ResearchBody>, JsonRejection>,
) -> Result<ResearchRequest, ApiError> {
    let Json(body) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    Ok(body.into())
}

fn ensure_available(runtime: &Runtime) -> Result<(), ApiError> {
    if runtime.agent.is_available() {
        return Ok(());
    }
    let missing = runtime.config.missing_keys();
    let detail = if missing.is_empty() {
        "no LLM provider is configured".to_string()
    } else {
        format!("set {}", missing.join(", "))
    };
    Err(ApiError::LlmUnavailable(detail))
}

/// Run research and stream progress as server-sent events
#[utoipa::path(
    post,
    path = "/api/v1/research/stream",
    tag = "research",
    request_body = ResearchBody,
    responses(
        (
            status = 200,
            description = "Progress frames, then one frame with status \"done\" and the result",
            body = String,
            content_type = "text/event-stream"
        ),
        (status = 400, description = "Invalid request", body = ErrorBody),
        (status = 503, description = "No LLM provider configured", body = ErrorBody)
    )
)]
pub async fn stream_research(
    State(state): State<SharedState>,
    body: Result<Json<ResearchBody>, JsonRejection>,
) -> Result<Response, ApiError> {
    let query = parse_body(body)?.validate()?;
    let runtime = state.runtime().await;
    ensure_available(&runtime)?;

    let progress = state.encoder.spawn(runtime.agent.clone(), query);
    info!(research_id = %progress.research_id(), "Streaming research");

    let body = Body::from_stream(progress.into_bytes().map(Ok::<_, Infallible>));
    Ok((
        [
            (header::CONTENT_TYPE, EVENT_STREAM_CONTENT_TYPE),
            (header::CACHE_CONTROL, "no-cache"),
            (HeaderName::from_static("x-accel-buffering"), "no"),
        ],
        body,
    )
        .into_response())
}

/// Run research and wait for the payload
#[utoipa::path(
    post,
    path = "/api/v1/research/execute",
    tag = "research",
    request_body = ResearchBody,
    responses(
        (status = 200, description = "Completed research payload"),
        (status = 400, description = "Invalid request", body = ErrorBody),
        (status = 500, description = "A stage failed", body = ErrorBody),
        (status = 503, description = "No LLM provider configured", body = ErrorBody)
    )
)]
pub async fn execute_research(
    State(state): State<SharedState>,
    body: Result<Json<ResearchBody>, JsonRejection>,
) -> Result<Json<ResearchPayload>, ApiError> {
    let query = parse_body(body)?.validate()?;
    let runtime = state.runtime().await;
    ensure_available(&runtime)?;

    let driver = PipelineDriver::new(runtime.agent.clone(), StageEmitter::detached());
    info!(research_id = %driver.research_id(), "Executing research");
    let payload = driver.run(&query).await?;
    Ok(Json(payload))
}

/// List supported research types
#[utoipa::path(
    get,
    path = "/api/v1/research/types",
    tag = "research",
    responses(
        (status = 200, description = "Supported research types", body = ResearchTypesResponse)
    )
)]
pub async fn research_types() -> Json<ResearchTypesResponse> {
    let types = ResearchType::all()
        .into_iter()
        .map(|t| ResearchTypeInfo {
            id: t.as_str(),
            name: t.display_name(),
            description: t.description(),
        })
        .collect();
    Json(ResearchTypesResponse { types })
}

/// Stage agents and whether they can run
#[utoipa::path(
    get,
    path = "/api/v1/agents/status",
    tag = "research",
    responses(
        (status = 200, description = "Stage agents", body = AgentsResponse)
    )
)]
pub async fn agents_status(State(state): State<SharedState>) -> Json<AgentsResponse> {
    let runtime = state.runtime().await;
    let llm_available = runtime.agent.is_available();
    let agents = runtime
        .agents
        .iter()
        .map(|info| AgentStatus {
            id: info.id,
            name: info.name,
            stage: info.stage.as_str(),
            description: info.description,
            capabilities: info.capabilities.clone(),
            model: info.model.clone(),
            // Compile is local
            available: llm_available || info.stage == Stage::Compile,
        })
        .collect();

    Json(AgentsResponse {
        agents,
        llm_available,
        missing_keys: runtime.config.missing_keys(),
    })
}

/// Tools the stage agents can use, in pipeline order
#[utoipa::path(
    get,
    path = "/api/v1/tools/list",
    tag = "research",
    responses(
        (status = 200, description = "Agent tools", body = ToolsResponse)
    )
)]
pub async fn list_tools(State(state): State<SharedState>) -> Json<ToolsResponse> {
    let runtime = state.runtime().await;
    let tools = runtime
        .agents
        .iter()
        .flat_map(|info| {
            info.capabilities.iter().map(move |name| ToolInfo {
                name: *name,
                agent: info.name,
                stage: info.stage.as_str(),
            })
        })
        .collect();
    Json(ToolsResponse { tools })
}

/// Health check
#[utoipa::path(
    get,
    path = "/health",
    tag = "health",
    responses(
        (status = 200, description = "Server is up", body = HealthResponse)
    )
)]
pub async fn health(State(state): State<SharedState>) -> Json<HealthResponse> {
    let runtime = state.runtime().await;
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        llm_available: runtime.agent.is_available(),
        provider: runtime.config.global_provider.to_string(),
    })
}
