//! # Progress Stream Encoder
//!
//! Runs a pipeline on its own task and turns the emitted frames into an
//! event-stream body: `data: <compact json>\n\n` per frame, one chunk per
//! frame. The stream ends once the terminal frame has been yielded, or,
//! on failure, after a final `error` frame for the active stage.

use bytes::Bytes;
use futures::stream::{self, Stream};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::pipeline::{PipelineDriver, ResearchQuery, StageAgent, StageEmitter, StreamFrame};

/// Marker that opens every data line
pub const FRAME_PREFIX: &str = "data: ";
/// Blank line closing every frame
pub const FRAME_TERMINATOR: &str = "\n\n";
/// Comment frame sent while a stage is quiet
pub const HEARTBEAT_FRAME: &[u8] = b": heartbeat\n\n";
/// Content type of the streaming response
pub const EVENT_STREAM_CONTENT_TYPE: &str = "text/event-stream";
/// Frames buffered between the pipeline task and the body
const FRAME_QUEUE_CAPACITY: usize = 100;

/// Serialize one frame onto the wire format
pub fn encode_frame(frame: &StreamFrame) -> Result<Bytes, serde_json::Error> {
    let json = serde_json::to_string(frame)?;
    let mut out = String::with_capacity(FRAME_PREFIX.len() + json.len() + FRAME_TERMINATOR.len());
    out.push_str(FRAME_PREFIX);
    out.push_str(&json);
    out.push_str(FRAME_TERMINATOR);
    Ok(Bytes::from(out))
}

/// Spawns pipeline runs whose progress is exposed as a stream
#[derive(Debug, Clone, Default)]
pub struct ProgressStreamEncoder {
    heartbeat: Option<Duration>,
}

impl ProgressStreamEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Emit a heartbeat comment whenever no frame was produced for `period`
    pub fn with_heartbeat(mut self, period: Duration) -> Self {
        self.heartbeat = Some(period);
        self
    }

    /// Start a pipeline run for `query` on a background task
    pub fn spawn(&self, agent: Arc<dyn StageAgent>, query: ResearchQuery) -> ProgressStream {
        let (tx, rx) = mpsc::channel(FRAME_QUEUE_CAPACITY);
        let emitter = StageEmitter::new(tx);
        let driver = PipelineDriver::new(agent, emitter.clone());
        let research_id = driver.research_id().to_string();

        tokio::spawn(async move {
            // Inner task so a panicking agent surfaces as a JoinError here
            let run = tokio::spawn(async move { driver.run(&query).await.map(|_| ()) });
            let failure = match run.await {
                Ok(Ok(())) => return,
                Ok(Err(e)) => e.to_string(),
                Err(e) => format!("pipeline task aborted: {}", e),
            };
            if emitter.abort_active(failure.clone()).await {
                tracing::warn!(error = %failure, "Pipeline aborted, closing stream without result");
            }
            // Dropping the last sender closes the stream
        });

        ProgressStream {
            research_id,
            rx,
            heartbeat: self.heartbeat,
        }
    }
}

/// Receiving side of one pipeline run
pub struct ProgressStream {
    research_id: String,
    rx: mpsc::Receiver<StreamFrame>,
    heartbeat: Option<Duration>,
}

impl ProgressStream {
    pub fn research_id(&self) -> &str {
        &self.research_id
    }

    /// Decoded frames, in emission order, without heartbeats
    pub fn frames(self) -> impl Stream<Item = StreamFrame> + Send + 'static {
        stream::unfold(self.rx, |mut rx| async move {
            rx.recv().await.map(|frame| (frame, rx))
        })
    }

    /// Encoded body chunks, one per frame, with heartbeats when configured
    pub fn into_bytes(self) -> impl Stream<Item = Bytes> + Send + 'static {
        let heartbeat = self.heartbeat;
        stream::unfold(self.rx, move |mut rx| async move {
            loop {
                let next = match heartbeat {
                    Some(period) => match tokio::time::timeout(period, rx.recv()).await {
                        Ok(next) => next,
                        Err(_) => return Some((Bytes::from_static(HEARTBEAT_FRAME), rx)),
                    },
                    None => rx.recv().await,
                };
                let frame = next?;
                match encode_frame(&frame) {
                    Ok(bytes) => return Some((bytes, rx)),
                    Err(e) => tracing::error!("Failed to encode frame: {}", e),
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::driver::tests::{market_query, ScriptedAgent};
    use crate::pipeline::{Stage, StageInput, StageStatus, StageTicker};
    use async_trait::async_trait;
    use futures::StreamExt;

    fn decode_all(chunks: &[Bytes]) -> Vec<StreamFrame> {
        chunks
            .iter()
            .map(|chunk| {
                let text = std::str::from_utf8(chunk).unwrap();
                let json = text
                    .strip_prefix(FRAME_PREFIX)
                    .and_then(|t| t.strip_suffix(FRAME_TERMINATOR))
                    .unwrap();
                assert!(!json.contains('\n'), "frame must be compact");
                serde_json::from_str(json).unwrap()
            })
            .collect()
    }

    #[test]
    fn test_encode_frame_format() {
        let frame = StreamFrame::from(
            crate::pipeline::ProgressEvent::new(Stage::Research, StageStatus::Running),
        );
        let bytes = encode_frame(&frame).unwrap();
        assert_eq!(
            &bytes[..],
            br#"data: {"stage":"research","status":"running","iteration":0,"maxIterations":0}

"#
            .as_slice()
        );
    }

    #[tokio::test]
    async fn test_successful_run_ends_with_single_terminal() {
        let agent = Arc::new(ScriptedAgent::new(1));
        let stream = ProgressStreamEncoder::new().spawn(agent, market_query());
        let research_id = stream.research_id().to_string();

        let chunks: Vec<Bytes> = stream.into_bytes().collect().await;
        let frames = decode_all(&chunks);

        assert_eq!(frames.iter().filter(|f| f.is_terminal()).count(), 1);
        match frames.last().unwrap() {
            StreamFrame::Terminal(terminal) => {
                assert_eq!(terminal.result.research_id, research_id)
            }
            other => panic!("expected terminal frame, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_stage_failure_closes_without_terminal() {
        let agent = Arc::new(ScriptedAgent::failing_at(Stage::Strategize));
        let frames: Vec<StreamFrame> = ProgressStreamEncoder::new()
            .spawn(agent, market_query())
            .frames()
            .collect()
            .await;

        assert!(frames.iter().all(|f| !f.is_terminal()));
        let errors: Vec<_> = frames
            .iter()
            .filter_map(StreamFrame::as_progress)
            .filter(|e| e.status == StageStatus::Error)
            .collect();
        // The driver already reported the failure; no duplicate
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].stage, Stage::Strategize);
    }

    struct PanickingAgent;

    #[async_trait]
    impl StageAgent for PanickingAgent {
        async fn run(
            &self,
            stage: Stage,
            _input: StageInput<'_>,
            ticker: &StageTicker,
        ) -> anyhow::Result<serde_json::Value> {
            if stage == Stage::Analyze {
                ticker.tick(1, 4).await?;
                panic!("analysis worker crashed");
            }
            Ok(serde_json::json!({}))
        }
    }

    #[tokio::test]
    async fn test_panic_yields_error_for_active_stage() {
        let frames: Vec<StreamFrame> = ProgressStreamEncoder::new()
            .spawn(Arc::new(PanickingAgent), market_query())
            .frames()
            .collect()
            .await;

        assert!(frames.iter().all(|f| !f.is_terminal()));
        let last = frames.last().and_then(StreamFrame::as_progress).unwrap();
        assert_eq!((last.stage, last.status), (Stage::Analyze, StageStatus::Error));
        assert!(last.message.as_deref().unwrap().contains("aborted"));
    }

    struct SlowAgent;

    #[async_trait]
    impl StageAgent for SlowAgent {
        async fn run(
            &self,
            stage: Stage,
            _input: StageInput<'_>,
            _ticker: &StageTicker,
        ) -> anyhow::Result<serde_json::Value> {
            if stage == Stage::Research {
                tokio::time::sleep(Duration::from_millis(120)).await;
            }
            Ok(serde_json::json!({}))
        }
    }

    #[tokio::test]
    async fn test_heartbeat_while_stage_is_quiet() {
        let chunks: Vec<Bytes> = ProgressStreamEncoder::new()
            .with_heartbeat(Duration::from_millis(20))
            .spawn(Arc::new(SlowAgent), market_query())
            .into_bytes()
            .collect()
            .await;

        assert!(chunks.iter().any(|c| &c[..] == HEARTBEAT_FRAME));
        let last = chunks.last().unwrap();
        assert!(std::str::from_utf8(last).unwrap().contains("\"status\":\"done\""));
    }
}
