//! # Pipeline Events
//!
//! Wire types for the progress stream: one [`ProgressEvent`] per stage
//! transition or tick, and a single [`TerminalEvent`] carrying the result.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::payload::ResearchPayload;

/// A named phase of the research pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Gathering data via search
    Research,
    /// Extracting insights from the gathered data
    Analyze,
    /// Producing recommendations
    Strategize,
    /// Assembling the final report
    Compile,
}

impl Stage {
    /// All stages in execution order
    pub const ALL: [Stage; 4] = [
        Stage::Research,
        Stage::Analyze,
        Stage::Strategize,
        Stage::Compile,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Research => "research",
            Stage::Analyze => "analyze",
            Stage::Strategize => "strategize",
            Stage::Compile => "compile",
        }
    }

    /// Position in the pipeline (0-based)
    pub fn index(&self) -> usize {
        match self {
            Stage::Research => 0,
            Stage::Analyze => 1,
            Stage::Strategize => 2,
            Stage::Compile => 3,
        }
    }

    /// The stage that runs after this one, if any
    pub fn next(&self) -> Option<Stage> {
        Stage::ALL.get(self.index() + 1).copied()
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of a single stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Pending,
    Running,
    Completed,
    Error,
}

impl StageStatus {
    /// Whether the stage has reached `completed` or `error`
    pub fn is_terminal(&self) -> bool {
        matches!(self, StageStatus::Completed | StageStatus::Error)
    }

    /// Whether moving from `self` to `next` respects
    /// pending → running → completed|error.
    pub fn can_transition_to(&self, next: StageStatus) -> bool {
        use StageStatus::*;
        matches!(
            (self, next),
            (Pending, Running)
                | (Running, Running)
                | (Running, Completed)
                | (Running, Error)
                | (Pending, Error)
        )
    }
}

/// One update about pipeline execution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEvent {
    pub stage: Stage,
    pub status: StageStatus,
    #[serde(default)]
    pub iteration: u32,
    #[serde(default)]
    pub max_iterations: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ProgressEvent {
    pub fn new(stage: Stage, status: StageStatus) -> Self {
        Self {
            stage,
            status,
            iteration: 0,
            max_iterations: 0,
            message: None,
        }
    }

    pub fn with_iterations(mut self, iteration: u32, max_iterations: u32) -> Self {
        self.iteration = iteration;
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// Marker for the terminal frame's `status` field; only `"done"` parses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminalStatus {
    #[default]
    Done,
}

/// The final frame of a successful stream
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TerminalEvent {
    pub status: TerminalStatus,
    pub result: ResearchPayload,
}

impl TerminalEvent {
    pub fn new(result: ResearchPayload) -> Self {
        Self {
            status: TerminalStatus::Done,
            result,
        }
    }
}

/// Anything that travels as one frame on the wire
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StreamFrame {
    // Terminal first: a progress event never carries `result`, and its
    // status can never be "done".
    Terminal(TerminalEvent),
    Progress(ProgressEvent),
}

impl StreamFrame {
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamFrame::Terminal(_))
    }

    pub fn as_progress(&self) -> Option<&ProgressEvent> {
        match self {
            StreamFrame::Progress(event) => Some(event),
            StreamFrame::Terminal(_) => None,
        }
    }
}

impl From<ProgressEvent> for StreamFrame {
    fn from(event: ProgressEvent) -> Self {
        StreamFrame::Progress(event)
    }
}

impl From<TerminalEvent> for StreamFrame {
    fn from(event: TerminalEvent) -> Self {
        StreamFrame::Terminal(event)
    }
}
