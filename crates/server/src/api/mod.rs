//! # HTTP API
//!
//! - `research` - Streaming and synchronous research, research types, agents, health
//! - `config` - Persisted configuration and provider discovery

pub mod config;
pub mod research;

#[cfg(test)]
pub(crate) mod tests {
    //! Shared fixtures for handler tests.

    use async_trait::async_trait;
    use axum::{
        body::{to_bytes, Body, Bytes},
        http::{header, HeaderMap, Request, StatusCode},
        Router,
    };
    use marketlens_core::config::ResearchConfig;
    use marketlens_core::pipeline::{
        MarketResearchAgent, Stage, StageAgent, StageInput, StageTicker,
    };
    use marketlens_core::stream::ProgressStreamEncoder;
    use serde_json::{json, Value};
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::net::TcpListener;
    use tower::ServiceExt;

    use crate::{app, AppState, Runtime, SharedState};

    /// Stage agent that answers instantly, optionally failing one stage
    #[derive(Clone, Copy)]
    pub(crate) struct ScriptedAgent {
        pub fail_at: Option<Stage>,
        pub available: bool,
    }

    impl Default for ScriptedAgent {
        fn default() -> Self {
            Self {
                fail_at: None,
                available: true,
            }
        }
    }

    #[async_trait]
    impl StageAgent for ScriptedAgent {
        async fn run(
            &self,
            stage: Stage,
            _input: StageInput<'_>,
            ticker: &StageTicker,
        ) -> anyhow::Result<Value> {
            if self.fail_at == Some(stage) {
                anyhow::bail!("{} model returned garbage", stage);
            }
            ticker.tick(1, 2).await?;
            ticker.tick(2, 2).await?;
            Ok(match stage {
                Stage::Compile => json!({"executiveSummary": "Scripted summary"}),
                other => json!({"stage": other.as_str()}),
            })
        }

        fn is_available(&self) -> bool {
            self.available
        }
    }

    pub(crate) fn temp_config_path() -> PathBuf {
        static NEXT: AtomicUsize = AtomicUsize::new(0);
        std::env::temp_dir()
            .join(format!("marketlens-test-{}", std::process::id()))
            .join(format!("config-{}.json", NEXT.fetch_add(1, Ordering::SeqCst)))
    }

    pub(crate) async fn test_state(agent: ScriptedAgent) -> SharedState {
        let factory = Arc::new(move |config: ResearchConfig| -> anyhow::Result<Runtime> {
            let agents = MarketResearchAgent::new(config.clone())?.describe();
            Ok(Runtime {
                agent: Arc::new(agent) as Arc<dyn StageAgent>,
                agents,
                config,
            })
        });
        let state = AppState::build(
            ResearchConfig::default(),
            temp_config_path(),
            ProgressStreamEncoder::new(),
            factory,
        )
        .await
        .unwrap();
        Arc::new(state)
    }

    pub(crate) async fn test_app(agent: ScriptedAgent) -> Router {
        app(test_state(agent).await)
    }

    pub(crate) fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    pub(crate) fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    /// Serve the app on an ephemeral loopback port; returns its base URL
    pub(crate) async fn serve_local(agent: ScriptedAgent) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = test_app(agent).await;
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    /// Send one request and collect the whole body
    pub(crate) async fn send(
        app: Router,
        request: Request<Body>,
    ) -> (StatusCode, HeaderMap, Bytes) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, headers, body)
    }

    pub(crate) async fn send_json(app: Router, request: Request<Body>) -> (StatusCode, Value) {
        let (status, _, body) = send(app, request).await;
        (status, serde_json::from_slice(&body).unwrap())
    }
}
