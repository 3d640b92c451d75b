//! # Stage Emitter
//!
//! Attaches progress semantics to pipeline stages. Every accepted call
//! produces exactly one frame on the outbound queue; illegal transitions
//! are rejected and emit nothing.
//!
//! ```text
//! Driver / Agent ── begin/tick/complete/fail ──▶ StageEmitter ── mpsc ──▶ Encoder
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};

use super::events::{ProgressEvent, Stage, StageStatus, StreamFrame, TerminalEvent};
use super::payload::ResearchPayload;

/// A call the emitter refused
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EmitError {
    #[error("stage '{stage}' cannot move from {from:?} to {to:?}")]
    IllegalTransition {
        stage: Stage,
        from: StageStatus,
        to: StageStatus,
    },
    #[error("stream already carries a terminal event")]
    AlreadyFinished,
}

#[derive(Debug, Default)]
struct EmitterState {
    statuses: HashMap<Stage, StageStatus>,
    history: Option<Vec<StreamFrame>>,
    finished: bool,
}

impl EmitterState {
    fn status(&self, stage: Stage) -> StageStatus {
        self.statuses
            .get(&stage)
            .copied()
            .unwrap_or(StageStatus::Pending)
    }
}

/// Emits progress for the stages of one pipeline run.
///
/// Cloning yields a handle onto the same run. The state lock is held
/// across the channel send, so frames leave in call order even when
/// several handles emit concurrently.
#[derive(Clone)]
pub struct StageEmitter {
    state: Arc<Mutex<EmitterState>>,
    tx: Option<mpsc::Sender<StreamFrame>>,
}

impl StageEmitter {
    /// Emitter that streams frames onto `tx`
    pub fn new(tx: mpsc::Sender<StreamFrame>) -> Self {
        Self {
            state: Arc::new(Mutex::new(EmitterState::default())),
            tx: Some(tx),
        }
    }

    /// Emitter with no outbound queue; frames are dropped
    pub fn detached() -> Self {
        Self {
            state: Arc::new(Mutex::new(EmitterState::default())),
            tx: None,
        }
    }

    /// Detached emitter that keeps every frame for [`history`](Self::history)
    #[cfg(test)]
    pub(crate) fn recording() -> Self {
        let state = EmitterState {
            history: Some(Vec::new()),
            ..EmitterState::default()
        };
        Self {
            state: Arc::new(Mutex::new(state)),
            tx: None,
        }
    }

    /// Transition `stage` to running with `iteration = 0`
    pub async fn begin(&self, stage: Stage) -> Result<(), EmitError> {
        self.transition(
            ProgressEvent::new(stage, StageStatus::Running)
                .with_message(format!("{} started", stage)),
        )
        .await
    }

    /// Update the counters of a running stage. Only [`begin`](Self::begin)
    /// starts a stage.
    pub async fn tick(
        &self,
        stage: Stage,
        iteration: u32,
        max_iterations: u32,
    ) -> Result<(), EmitError> {
        self.update_running(
            ProgressEvent::new(stage, StageStatus::Running)
                .with_iterations(iteration, max_iterations),
        )
        .await
    }

    /// Like [`tick`](Self::tick) with a description of the unit of work
    pub async fn tick_with_message(
        &self,
        stage: Stage,
        iteration: u32,
        max_iterations: u32,
        message: impl Into<String>,
    ) -> Result<(), EmitError> {
        self.update_running(
            ProgressEvent::new(stage, StageStatus::Running)
                .with_iterations(iteration, max_iterations)
                .with_message(message),
        )
        .await
    }

    pub async fn complete(&self, stage: Stage) -> Result<(), EmitError> {
        self.transition(
            ProgressEvent::new(stage, StageStatus::Completed)
                .with_message(format!("{} completed", stage)),
        )
        .await
    }

    pub async fn fail(&self, stage: Stage, message: impl Into<String>) -> Result<(), EmitError> {
        self.transition(ProgressEvent::new(stage, StageStatus::Error).with_message(message))
            .await
    }

    /// Push the terminal event. Nothing may follow it.
    pub async fn finish(&self, payload: ResearchPayload) -> Result<(), EmitError> {
        let mut state = self.state.lock().await;
        if state.finished {
            return Err(EmitError::AlreadyFinished);
        }
        state.finished = true;
        self.push(&mut state, TerminalEvent::new(payload).into()).await;
        Ok(())
    }

    /// Emit `error` for the active stage unless the run already failed or
    /// finished. The active stage is the running one, or the first stage
    /// that never started. Returns whether a frame was emitted.
    pub async fn abort_active(&self, message: impl Into<String>) -> bool {
        let mut state = self.state.lock().await;
        if state.finished {
            return false;
        }
        if Stage::ALL
            .iter()
            .any(|s| state.status(*s) == StageStatus::Error)
        {
            return false;
        }
        let active = Stage::ALL
            .iter()
            .copied()
            .find(|s| state.status(*s) == StageStatus::Running)
            .or_else(|| {
                Stage::ALL
                    .iter()
                    .copied()
                    .find(|s| state.status(*s) == StageStatus::Pending)
            });

        match active {
            Some(stage) => {
                state.statuses.insert(stage, StageStatus::Error);
                let event = ProgressEvent::new(stage, StageStatus::Error).with_message(message);
                self.push(&mut state, event.into()).await;
                true
            }
            None => false,
        }
    }

    /// Current status of a stage
    pub async fn status(&self, stage: Stage) -> StageStatus {
        self.state.lock().await.status(stage)
    }

    /// Every frame emitted so far, in order
    #[cfg(test)]
    pub(crate) async fn history(&self) -> Vec<StreamFrame> {
        self.state.lock().await.history.clone().unwrap_or_default()
    }

    /// Whether the stream's receiving side has gone away
    pub fn is_disconnected(&self) -> bool {
        self.tx.as_ref().is_some_and(|tx| tx.is_closed())
    }

    /// Handle that ticks a single stage
    pub fn ticker(&self, stage: Stage) -> StageTicker {
        StageTicker {
            emitter: self.clone(),
            stage,
        }
    }

    async fn transition(&self, event: ProgressEvent) -> Result<(), EmitError> {
        let mut state = self.state.lock().await;
        if state.finished {
            return Err(EmitError::AlreadyFinished);
        }
        let from = state.status(event.stage);
        if !from.can_transition_to(event.status) {
            return Err(EmitError::IllegalTransition {
                stage: event.stage,
                from,
                to: event.status,
            });
        }
        state.statuses.insert(event.stage, event.status);
        self.push(&mut state, event.into()).await;
        Ok(())
    }

    async fn update_running(&self, event: ProgressEvent) -> Result<(), EmitError> {
        let mut state = self.state.lock().await;
        if state.finished {
            return Err(EmitError::AlreadyFinished);
        }
        let from = state.status(event.stage);
        if from != StageStatus::Running {
            return Err(EmitError::IllegalTransition {
                stage: event.stage,
                from,
                to: StageStatus::Running,
            });
        }
        self.push(&mut state, event.into()).await;
        Ok(())
    }

    async fn push(&self, state: &mut EmitterState, frame: StreamFrame) {
        match (&self.tx, &mut state.history) {
            (Some(tx), _) => {
                if tx.send(frame).await.is_err() {
                    tracing::debug!("Stream receiver gone, dropping frame");
                }
            }
            (None, Some(history)) => history.push(frame),
            (None, None) => {}
        }
    }
}

/// Progress handle for one running stage, passed to stage agents
#[derive(Clone)]
pub struct StageTicker {
    emitter: StageEmitter,
    stage: Stage,
}

impl StageTicker {
    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub async fn tick(&self, iteration: u32, max_iterations: u32) -> Result<(), EmitError> {
        self.emitter.tick(self.stage, iteration, max_iterations).await
    }

    pub async fn report(
        &self,
        iteration: u32,
        max_iterations: u32,
        message: impl Into<String>,
    ) -> Result<(), EmitError> {
        self.emitter
            .tick_with_message(self.stage, iteration, max_iterations, message)
            .await
    }
}
