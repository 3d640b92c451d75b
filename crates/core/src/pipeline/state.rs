//! # Pipeline State
//!
//! The driver's state machine:
//! `pending → research → analyze → strategize → compile → done`,
//! with `error` reachable from any running stage.

use serde::{Deserialize, Serialize};

use super::events::Stage;

/// Where the pipeline is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state", content = "stage")]
pub enum PipelineState {
    /// Not started
    Pending,
    /// A stage is executing
    Running(Stage),
    /// All stages completed
    Done,
    /// A stage failed; absorbing
    Failed(Stage),
}

/// The pipeline state machine
#[derive(Debug, Clone)]
pub struct Pipeline {
    /// Current state
    pub state: PipelineState,
}

impl Default for Pipeline {
    fn default() -> Self {
        Self {
            state: PipelineState::Pending,
        }
    }
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance to the next stage, or to `Done` after compile
    pub fn advance(&mut self) {
        self.state = match self.state {
            PipelineState::Pending => PipelineState::Running(Stage::Research),
            PipelineState::Running(stage) => match stage.next() {
                Some(next) => PipelineState::Running(next),
                None => PipelineState::Done,
            },
            PipelineState::Done => PipelineState::Done,
            PipelineState::Failed(stage) => PipelineState::Failed(stage),
        };
    }

    /// Fail the running stage
    pub fn fail(&mut self) {
        self.state = match self.state {
            PipelineState::Running(stage) => PipelineState::Failed(stage),
            PipelineState::Pending => PipelineState::Failed(Stage::Research),
            other => other,
        };
    }

    /// The stage currently executing
    pub fn active_stage(&self) -> Option<Stage> {
        match self.state {
            PipelineState::Running(stage) => Some(stage),
            _ => None,
        }
    }
}
