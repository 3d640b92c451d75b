//! MarketLens Server
//!
//! Axum server that runs market research and streams stage progress to
//! clients, plus a CLI to run or watch research from a terminal.

mod api;
mod error;

use axum::{
    http::{header, Method},
    response::Json,
    routing::get,
    Router,
};
use clap::{Parser, Subcommand};
use futures::StreamExt;
use std::{convert::Infallible, path::PathBuf, sync::Arc, time::Duration};
use tokio::{net::TcpListener, sync::RwLock};
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};
use utoipa::OpenApi;

use marketlens_core::config::ResearchConfig;
use marketlens_core::pipeline::market_agent::AgentInfo;
use marketlens_core::pipeline::{
    MarketResearchAgent, ProgressEvent, ResearchPayload, ResearchRequest, StageAgent,
};
use marketlens_core::stream::{
    consume_stream, ProgressBoard, ProgressStreamEncoder, ResearchClient, StreamError,
};

use crate::api::config::{PersistedConfig, CONFIG_PATH, DEFAULT_HEARTBEAT_SECS};

/// Stage agents built from one configuration
#[derive(Clone)]
pub(crate) struct Runtime {
    pub agent: Arc<dyn StageAgent>,
    pub agents: Vec<AgentInfo>,
    pub config: ResearchConfig,
}

pub(crate) type RuntimeFactory =
    Arc<dyn Fn(ResearchConfig) -> anyhow::Result<Runtime> + Send + Sync>;

pub(crate) fn market_runtime(config: ResearchConfig) -> anyhow::Result<Runtime> {
    let agent = MarketResearchAgent::new(config.clone())?;
    let agents = agent.describe();
    Ok(Runtime {
        agent: Arc::new(agent),
        agents,
        config,
    })
}

/// Application state
pub(crate) struct AppState {
    runtime: RwLock<Runtime>,
    factory: RuntimeFactory,
    /// Configuration from the environment, before persisted overrides
    pub env_config: ResearchConfig,
    pub config_path: PathBuf,
    pub encoder: ProgressStreamEncoder,
}

pub(crate) type SharedState = Arc<AppState>;

impl AppState {
    pub async fn build(
        env_config: ResearchConfig,
        config_path: PathBuf,
        encoder: ProgressStreamEncoder,
        factory: RuntimeFactory,
    ) -> anyhow::Result<Self> {
        let persisted = PersistedConfig::load(&config_path).await;
        let config = persisted.apply(&env_config).unwrap_or_else(|e| {
            warn!("Ignoring persisted config: {:#}", e);
            env_config.clone()
        });
        let runtime = factory(config)?;

        Ok(Self {
            runtime: RwLock::new(runtime),
            factory,
            env_config,
            config_path,
            encoder,
        })
    }

    /// Snapshot of the current agents; requests keep it for their whole run
    pub async fn runtime(&self) -> Runtime {
        self.runtime.read().await.clone()
    }

    pub async fn reload(&self, config: ResearchConfig) -> anyhow::Result<()> {
        let runtime = (self.factory)(config)?;
        *self.runtime.write().await = runtime;
        Ok(())
    }
}

#[derive(Parser, Clone)]
#[command(author, version, about = "MarketLens - Market research with live progress")]
struct Args {
    #[command(subcommand)]
    command: Option<CliCommand>,
}

#[derive(Subcommand, Clone)]
enum CliCommand {
    /// Start the MarketLens server (default)
    Serve {
        /// Address to bind
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
        /// Port to listen on (falls back to $PORT, then 8080)
        #[arg(short, long)]
        port: Option<u16>,
        /// Seconds between keep-alive comments on idle streams, 0 to disable
        #[arg(long, default_value_t = DEFAULT_HEARTBEAT_SECS)]
        heartbeat_secs: u64,
    },
    /// Run research in-process and print progress (no server)
    Run {
        #[command(flatten)]
        request: QueryArgs,
        /// Write the payload JSON here instead of stdout
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// Stream research from a running server
    Watch {
        #[command(flatten)]
        request: QueryArgs,
        /// Server base URL
        #[arg(long, default_value = "http://127.0.0.1:8080")]
        url: String,
        /// Wait for the payload on the blocking endpoint instead of streaming
        #[arg(long)]
        no_stream: bool,
    },
}

#[derive(clap::Args, Clone, Debug)]
struct QueryArgs {
    /// What to research
    query: String,
    /// Research type id
    #[arg(short = 't', long = "type", default_value = "market_overview")]
    research_type: String,
    #[arg(long)]
    company: Option<String>,
    #[arg(long)]
    industry: Option<String>,
    /// Known competitor (repeatable)
    #[arg(long = "competitor")]
    competitors: Vec<String>,
}

impl From<QueryArgs> for ResearchRequest {
    fn from(args: QueryArgs) -> Self {
        ResearchRequest {
            query: args.query,
            research_type: args.research_type,
            company_name: args.company,
            industry: args.industry,
            competitors: args.competitors,
        }
    }
}

// === OpenAPI Definition ===

#[derive(OpenApi)]
#[openapi(
    info(
        title = "MarketLens API",
        version = "1.0.0",
        description = "Market research pipeline with streamed stage progress"
    ),
    paths(
        api::research::stream_research,
        api::research::execute_research,
        api::research::research_types,
        api::research::agents_status,
        api::research::list_tools,
        api::research::health,
        api::config::get_config,
        api::config::update_config,
        api::config::get_providers
    ),
    components(
        schemas(
            api::research::ResearchBody,
            api::research::ResearchTypeInfo,
            api::research::ResearchTypesResponse,
            api::research::AgentStatus,
            api::research::AgentsResponse,
            api::research::ToolInfo,
            api::research::ToolsResponse,
            api::research::HealthResponse,
            api::config::PersistedConfig,
            api::config::ConfigResponse,
            api::config::ConfigDefaults,
            api::config::EffectiveConfig,
            api::config::StageModel,
            api::config::ProviderInfo,
            api::config::ProvidersResponse,
            error::ErrorBody
        )
    ),
    tags(
        (name = "research", description = "Research runs and stage agents"),
        (name = "config", description = "Configuration management"),
        (name = "providers", description = "LLM provider discovery"),
        (name = "health", description = "Liveness")
    )
)]
struct ApiDoc;

async fn serve_openapi() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

pub(crate) fn app(state: SharedState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PATCH])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT]);

    Router::new()
        .nest("/api/v1/research", api::research::research_routes())
        .merge(api::config::config_routes())
        .route("/api/v1/agents/status", get(api::research::agents_status))
        .route("/api/v1/tools/list", get(api::research::list_tools))
        .route("/api/v1/openapi.json", get(serve_openapi))
        .route("/health", get(api::research::health))
        .layer(cors)
        .with_state(state)
}

async fn run_server(host: String, port: Option<u16>, heartbeat_secs: u64) -> anyhow::Result<()> {
    let port = port
        .or_else(|| std::env::var("PORT").ok().and_then(|p| p.parse().ok()))
        .unwrap_or(8080);

    let mut encoder = ProgressStreamEncoder::new();
    if heartbeat_secs > 0 {
        encoder = encoder.with_heartbeat(Duration::from_secs(heartbeat_secs));
    }

    let state = AppState::build(
        ResearchConfig::from_env(),
        PathBuf::from(CONFIG_PATH),
        encoder,
        Arc::new(market_runtime),
    )
    .await?;
    let runtime = state.runtime().await;
    if !runtime.agent.is_available() {
        warn!(
            "LLM unavailable, research requests will be refused until {} is set",
            runtime.config.missing_keys().join(", ")
        );
    }

    let app = app(Arc::new(state));

    let listener = TcpListener::bind((host.as_str(), port)).await?;
    let addr = listener.local_addr()?;
    println!("MarketLens Server running at http://{}", addr);
    println!("   API v1 Routes:");
    println!("   Research:  /api/v1/research/stream, /execute, /types");
    println!("   Agents:    /api/v1/agents/status, /api/v1/tools/list");
    println!("   Config:    /api/v1/config (GET, PATCH)");
    println!("   Providers: /api/v1/providers (GET)");
    println!("   OpenAPI:   /api/v1/openapi.json");
    println!("   Health:    /health");
    info!(%addr, provider = %runtime.config.global_provider, "Server started");

    axum::serve(listener, app).await?;
    Ok(())
}

/// Print each event that changes the board
fn print_progress(board: &mut ProgressBoard, event: &ProgressEvent) {
    if board.apply(event) {
        println!("   {}", board.render_line(event.stage));
    }
}

/// A stream that closed without a result failed at the stage the board
/// last saw report an error
fn stream_failure(board: &ProgressBoard, err: StreamError) -> anyhow::Error {
    match (err, board.failure()) {
        (StreamError::NoResult, Some(event)) => anyhow::anyhow!(
            "{} stage failed: {}",
            event.stage,
            event.message.as_deref().unwrap_or("no detail")
        ),
        (err, _) => err.into(),
    }
}

fn print_completion(payload: &ResearchPayload) {
    println!("Research complete: {}", payload.research_id);
    println!("\n{}\n", payload.summary);
}

async fn run_local(request: ResearchRequest, out: Option<PathBuf>) -> anyhow::Result<()> {
    let query = request.validate()?;
    let runtime = market_runtime(ResearchConfig::from_env())?;
    anyhow::ensure!(
        runtime.agent.is_available(),
        "LLM unavailable: set {}",
        runtime.config.missing_keys().join(", ")
    );

    println!("Researching: {} ({})", query.query, query.research_type);
    let progress = ProgressStreamEncoder::new().spawn(runtime.agent, query);
    let mut board = ProgressBoard::new();
    let result = consume_stream(progress.into_bytes().map(Ok::<_, Infallible>), |event| {
        print_progress(&mut board, event)
    })
    .await;

    let payload = result.map_err(|e| stream_failure(&board, e))?;
    board.mark_succeeded();
    println!("{}", board.render());
    print_completion(&payload);

    let json = serde_json::to_string_pretty(&payload)?;
    match out {
        Some(path) => {
            tokio::fs::write(&path, json).await?;
            println!("Payload written to {}", path.display());
        }
        None => println!("{}", json),
    }
    Ok(())
}

async fn watch_remote(
    request: ResearchRequest,
    url: String,
    stream: bool,
) -> anyhow::Result<ResearchPayload> {
    let client = ResearchClient::new(url)?;
    if !stream {
        println!("Waiting on {}", client.base_url());
        let payload = client.execute(&request).await?;
        print_completion(&payload);
        return Ok(payload);
    }

    println!("Streaming from {}", client.base_url());
    let mut board = ProgressBoard::new();
    let result = client
        .stream_research(&request, |event| print_progress(&mut board, event))
        .await;
    let payload = result.map_err(|e| stream_failure(&board, e))?;
    board.mark_succeeded();

    println!("{}", board.render());
    print_completion(&payload);
    Ok(payload)
}

fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,marketlens_core=debug".into()),
        )
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::from_filename(".marketlens/.env");
    let _ = dotenvy::dotenv();
    init_logging();

    let args = Args::parse();
    match args.command {
        Some(CliCommand::Run { request, out }) => run_local(request.into(), out).await,
        Some(CliCommand::Watch {
            request,
            url,
            no_stream,
        }) => watch_remote(request.into(), url, !no_stream).await.map(|_| ()),
        Some(CliCommand::Serve {
            host,
            port,
            heartbeat_secs,
        }) => {
            print_banner();
            run_server(host, port, heartbeat_secs).await
        }
        None => {
            print_banner();
            run_server("127.0.0.1".to_string(), None, DEFAULT_HEARTBEAT_SECS).await
        }
    }
}

fn print_banner() {
    println!("╔══════════════════════════════════════╗");
    println!("║         MARKETLENS SERVER            ║");
    println!("╚══════════════════════════════════════╝");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::tests::{get, send_json, serve_local, test_app, ScriptedAgent};
    use axum::http::StatusCode;
    use marketlens_core::pipeline::{ResearchType, Stage, StageStatus};

    fn market_overview() -> ResearchRequest {
        ResearchRequest::new("AI market trends", ResearchType::MarketOverview)
    }

    #[tokio::test]
    async fn test_openapi_lists_research_routes() {
        let app = test_app(ScriptedAgent::default()).await;
        let (status, body) = send_json(app, get("/api/v1/openapi.json")).await;
        assert_eq!(status, StatusCode::OK);

        let paths = body["paths"].as_object().unwrap();
        assert!(paths.contains_key("/api/v1/research/stream"));
        assert!(paths.contains_key("/api/v1/config"));
        assert!(paths.contains_key("/api/v1/tools/list"));
        assert_eq!(body["info"]["title"], "MarketLens API");
    }

    #[test]
    fn test_cli_parses_run() {
        let args = Args::parse_from([
            "marketlens",
            "run",
            "EV chargers",
            "--type",
            "competitor_analysis",
            "--competitor",
            "ChargePoint",
            "--competitor",
            "Blink",
        ]);
        let Some(CliCommand::Run { request, out }) = args.command else {
            panic!("expected run");
        };
        assert!(out.is_none());

        let request = ResearchRequest::from(request);
        assert_eq!(request.research_type, "competitor_analysis");
        assert_eq!(request.competitors, ["ChargePoint", "Blink"]);
        assert!(request.validate().is_ok());
    }

    #[test]
    fn test_cli_parses_watch_without_stream() {
        let args = Args::parse_from(["marketlens", "watch", "drones", "--no-stream"]);
        let Some(CliCommand::Watch { url, no_stream, .. }) = args.command else {
            panic!("expected watch");
        };
        assert!(no_stream);
        assert_eq!(url, "http://127.0.0.1:8080");
    }

    #[tokio::test]
    async fn test_watch_streams_and_executes_against_server() {
        let url = serve_local(ScriptedAgent::default()).await;

        let streamed = watch_remote(market_overview(), url.clone(), true).await.unwrap();
        let executed = watch_remote(market_overview(), url, false).await.unwrap();

        assert_eq!(streamed.summary, "Scripted summary");
        assert_eq!(executed.summary, "Scripted summary");
        assert_ne!(streamed.research_id, executed.research_id);
    }

    #[tokio::test]
    async fn test_execute_failure_is_rejected_with_status() {
        let url = serve_local(ScriptedAgent {
            fail_at: Some(Stage::Strategize),
            ..ScriptedAgent::default()
        })
        .await;

        let err = ResearchClient::new(url)
            .unwrap()
            .execute(&market_overview())
            .await
            .unwrap_err();
        match err {
            StreamError::Rejected { status, message } => {
                assert_eq!(status, 500);
                assert!(message.contains("strategize"), "{}", message);
            }
            other => panic!("expected rejection, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_watch_reports_failed_stage_message() {
        let url = serve_local(ScriptedAgent {
            fail_at: Some(Stage::Analyze),
            ..ScriptedAgent::default()
        })
        .await;

        let err = watch_remote(market_overview(), url, true).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "analyze stage failed: analyze model returned garbage"
        );
    }

    #[test]
    fn test_stream_failure_without_error_event_keeps_cause() {
        let mut board = ProgressBoard::new();
        board.apply(&ProgressEvent::new(Stage::Research, StageStatus::Running));

        let err = stream_failure(&board, StreamError::NoResult);
        assert_eq!(err.to_string(), StreamError::NoResult.to_string());

        let err = stream_failure(&board, StreamError::Transport("reset".into()));
        assert!(err.to_string().contains("reset"));
    }

    #[test]
    fn test_cli_defaults_to_serve() {
        let args = Args::parse_from(["marketlens"]);
        assert!(args.command.is_none());
    }
}
