//! # Pipeline Driver
//!
//! Runs research → analyze → strategize → compile strictly in sequence and
//! assembles the [`ResearchPayload`]. All-or-nothing: a failed stage stops
//! the run and no payload is produced.

use std::sync::Arc;
use thiserror::Error;

use super::agent::{StageAgent, StageInput, StageOutputs};
use super::emitter::{EmitError, StageEmitter};
use super::events::Stage;
use super::payload::{PayloadStatus, ResearchPayload, ResearchQuery};
use super::state::Pipeline;

/// Summary used when the compiled report carries none
pub const DEFAULT_SUMMARY: &str = "Research complete.";

/// Why a run produced no payload
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("{stage} stage failed: {message}")]
    StageFailed { stage: Stage, message: String },
    #[error("client disconnected before the {stage} stage")]
    Cancelled { stage: Stage },
    #[error(transparent)]
    Emit(#[from] EmitError),
}

impl PipelineError {
    /// Stage the failure is attributed to, if any
    pub fn stage(&self) -> Option<Stage> {
        match self {
            PipelineError::StageFailed { stage, .. } | PipelineError::Cancelled { stage } => {
                Some(*stage)
            }
            PipelineError::Emit(EmitError::IllegalTransition { stage, .. }) => Some(*stage),
            PipelineError::Emit(EmitError::AlreadyFinished) => None,
        }
    }
}

/// Drives one research request through the four stages
pub struct PipelineDriver {
    agent: Arc<dyn StageAgent>,
    emitter: StageEmitter,
    pipeline: Pipeline,
    research_id: String,
}

impl PipelineDriver {
    /// Create a driver; the research id is fixed here, at request start
    pub fn new(agent: Arc<dyn StageAgent>, emitter: StageEmitter) -> Self {
        Self {
            agent,
            emitter,
            pipeline: Pipeline::new(),
            research_id: ResearchPayload::generate_id(),
        }
    }

    pub fn research_id(&self) -> &str {
        &self.research_id
    }

    pub fn emitter(&self) -> &StageEmitter {
        &self.emitter
    }

    /// Run every stage and emit the terminal event on success
    #[tracing::instrument(
        skip(self, query),
        fields(
            research_id = %self.research_id,
            research_type = %query.research_type,
            query_preview = %query.query.chars().take(50).collect::<String>()
        )
    )]
    pub async fn run(mut self, query: &ResearchQuery) -> Result<ResearchPayload, PipelineError> {
        let mut payload = ResearchPayload::new(self.research_id.clone(), query.research_type);
        let mut outputs = StageOutputs::default();

        self.pipeline.advance();
        while let Some(stage) = self.pipeline.active_stage() {
            if self.emitter.is_disconnected() {
                tracing::info!(%stage, "Client disconnected, stopping pipeline");
                self.pipeline.fail();
                return Err(PipelineError::Cancelled { stage });
            }

            self.emitter.begin(stage).await?;
            tracing::info!(%stage, "Stage started");

            let input = StageInput {
                research_id: &self.research_id,
                query,
                prior: &outputs,
            };
            let ticker = self.emitter.ticker(stage);

            match self.agent.run(stage, input, &ticker).await {
                Ok(output) => {
                    outputs.set(stage, output);
                    self.emitter.complete(stage).await?;
                    tracing::info!(%stage, "Stage completed");
                    self.pipeline.advance();
                }
                Err(e) => {
                    let message = format!("{:#}", e);
                    tracing::warn!(%stage, error = %message, "Stage failed");
                    self.pipeline.fail();
                    self.emitter.fail(stage, message.clone()).await?;
                    return Err(PipelineError::StageFailed { stage, message });
                }
            }
        }

        let report = outputs.compile.take().unwrap_or(serde_json::Value::Null);
        payload.summary = summary_of(&report);
        payload.results = report;
        payload.status = PayloadStatus::Completed;

        self.emitter.finish(payload.clone()).await?;
        tracing::info!("Pipeline completed");
        Ok(payload)
    }
}

/// Executive summary of a compiled report, never empty
fn summary_of(report: &serde_json::Value) -> String {
    ["executiveSummary", "summary"]
        .iter()
        .filter_map(|key| report.get(*key).and_then(|v| v.as_str()))
        .map(str::trim)
        .find(|s| !s.is_empty())
        .unwrap_or(DEFAULT_SUMMARY)
        .to_string()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::pipeline::emitter::StageTicker;
    use crate::pipeline::events::{StageStatus, StreamFrame};
    use crate::pipeline::payload::{ResearchRequest, ResearchType};
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::Mutex;

    /// Agent double: ticks `units` times per stage, optionally failing one stage
    pub(crate) struct ScriptedAgent {
        pub units: u32,
        pub fail_at: Option<Stage>,
        pub calls: Mutex<Vec<Stage>>,
    }

    impl ScriptedAgent {
        pub(crate) fn new(units: u32) -> Self {
            Self {
                units,
                fail_at: None,
                calls: Mutex::new(Vec::new()),
            }
        }

        pub(crate) fn failing_at(stage: Stage) -> Self {
            Self {
                fail_at: Some(stage),
                ..Self::new(1)
            }
        }
    }

    #[async_trait]
    impl StageAgent for ScriptedAgent {
        async fn run(
            &self,
            stage: Stage,
            input: StageInput<'_>,
            ticker: &StageTicker,
        ) -> anyhow::Result<Value> {
            self.calls.lock().unwrap().push(stage);
            if let Some(prev) = Stage::ALL.get(stage.index().wrapping_sub(1)) {
                anyhow::ensure!(input.prior.get(*prev).is_some(), "missing {} output", prev);
            }
            for i in 1..=self.units {
                ticker.tick(i, self.units).await?;
            }
            if self.fail_at == Some(stage) {
                anyhow::bail!("{} agent call raised", stage);
            }
            Ok(match stage {
                Stage::Compile => json!({
                    "executiveSummary": format!("Outlook for {}", input.query.query),
                    "researchType": input.query.research_type,
                }),
                other => json!({ "stage": other }),
            })
        }
    }

    pub(crate) fn market_query() -> ResearchQuery {
        ResearchRequest::new("AI market trends", ResearchType::MarketOverview)
            .validate()
            .unwrap()
    }

    #[tokio::test]
    async fn test_stages_run_in_order_and_payload_assembled() {
        let agent = Arc::new(ScriptedAgent::new(2));
        let emitter = StageEmitter::recording();
        let driver = PipelineDriver::new(agent.clone(), emitter.clone());
        let research_id = driver.research_id().to_string();

        let payload = driver.run(&market_query()).await.unwrap();

        assert_eq!(*agent.calls.lock().unwrap(), Stage::ALL.to_vec());
        assert_eq!(payload.research_id, research_id);
        assert_eq!(payload.research_type, ResearchType::MarketOverview);
        assert_eq!(payload.status, PayloadStatus::Completed);
        assert_eq!(payload.summary, "Outlook for AI market trends");

        let history = emitter.history().await;
        // begin + 2 ticks + complete per stage, then the terminal frame
        assert_eq!(history.len(), 4 * 4 + 1);
        assert!(history.last().unwrap().is_terminal());
        assert_eq!(history.iter().filter(|f| f.is_terminal()).count(), 1);
    }

    #[tokio::test]
    async fn test_failure_stops_pipeline_without_payload() {
        let agent = Arc::new(ScriptedAgent::failing_at(Stage::Analyze));
        let emitter = StageEmitter::recording();
        let driver = PipelineDriver::new(agent.clone(), emitter.clone());

        let err = driver.run(&market_query()).await.unwrap_err();
        assert!(matches!(
            err,
            PipelineError::StageFailed { stage: Stage::Analyze, .. }
        ));
        assert_eq!(err.stage(), Some(Stage::Analyze));
        assert_eq!(
            *agent.calls.lock().unwrap(),
            vec![Stage::Research, Stage::Analyze]
        );

        let history = emitter.history().await;
        assert!(history.iter().all(|f| !f.is_terminal()));
        let last = history.last().and_then(StreamFrame::as_progress).unwrap();
        assert_eq!((last.stage, last.status), (Stage::Analyze, StageStatus::Error));
        assert!(last.message.as_deref().unwrap().contains("agent call raised"));
    }

    #[tokio::test]
    async fn test_disconnect_cancels_before_next_stage() {
        let (tx, rx) = tokio::sync::mpsc::channel(64);
        drop(rx);
        let agent = Arc::new(ScriptedAgent::new(1));
        let driver = PipelineDriver::new(agent.clone(), StageEmitter::new(tx));

        let err = driver.run(&market_query()).await.unwrap_err();
        assert!(matches!(err, PipelineError::Cancelled { stage: Stage::Research }));
        assert!(agent.calls.lock().unwrap().is_empty());
    }

    #[test]
    fn test_summary_fallbacks() {
        assert_eq!(summary_of(&json!({"executiveSummary": "  "})), DEFAULT_SUMMARY);
        assert_eq!(summary_of(&json!({"summary": "Short take"})), "Short take");
        assert_eq!(summary_of(&Value::Null), DEFAULT_SUMMARY);
    }
}
