//! Per-stage progress view built from received events.

use std::collections::BTreeMap;

use crate::pipeline::{ProgressEvent, Stage, StageStatus};

/// Overall state of a watched run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Running,
    Failed,
    Succeeded,
}

/// Latest event per stage; every stage starts out pending
#[derive(Debug, Clone)]
pub struct ProgressBoard {
    stages: BTreeMap<Stage, ProgressEvent>,
    succeeded: bool,
}

impl Default for ProgressBoard {
    fn default() -> Self {
        Self {
            stages: Stage::ALL
                .iter()
                .map(|s| (*s, ProgressEvent::new(*s, StageStatus::Pending)))
                .collect(),
            succeeded: false,
        }
    }
}

fn rank(status: StageStatus) -> u8 {
    match status {
        StageStatus::Pending => 0,
        StageStatus::Running => 1,
        StageStatus::Completed | StageStatus::Error => 2,
    }
}

impl ProgressBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an event. Events that would move a stage backwards, or out of
    /// a final status, are ignored. Returns whether the board changed.
    pub fn apply(&mut self, event: &ProgressEvent) -> bool {
        let Some(current) = self.stages.get_mut(&event.stage) else {
            return false;
        };
        if current.status.is_terminal() || rank(event.status) < rank(current.status) {
            tracing::debug!(
                stage = %event.stage,
                from = ?current.status,
                to = ?event.status,
                "Ignoring out-of-order progress event"
            );
            return false;
        }
        *current = event.clone();
        true
    }

    /// The event that failed the run, if any stage reported an error
    pub fn failure(&self) -> Option<&ProgressEvent> {
        self.stages
            .values()
            .find(|e| e.status == StageStatus::Error)
    }

    pub fn mark_succeeded(&mut self) {
        self.succeeded = true;
    }

    pub fn get(&self, stage: Stage) -> &ProgressEvent {
        // Every stage is seeded in `default`
        &self.stages[&stage]
    }

    /// Completion percentage; `None` when the stage reports no total
    pub fn percent(&self, stage: Stage) -> Option<u8> {
        let event = self.get(stage);
        if event.max_iterations == 0 {
            return None;
        }
        let pct = u64::from(event.iteration) * 100 / u64::from(event.max_iterations);
        Some(pct.min(100) as u8)
    }

    pub fn state(&self) -> RunState {
        let statuses: Vec<StageStatus> = self.stages.values().map(|e| e.status).collect();
        if statuses.contains(&StageStatus::Error) {
            RunState::Failed
        } else if self.succeeded {
            RunState::Succeeded
        } else if statuses.iter().any(|s| *s != StageStatus::Pending) {
            RunState::Running
        } else {
            RunState::Idle
        }
    }

    /// One line per stage, e.g. `analyze     running  2/4 ( 50%) Scoring trends`
    pub fn render_line(&self, stage: Stage) -> String {
        let event = self.get(stage);
        let status = match event.status {
            StageStatus::Pending => "pending",
            StageStatus::Running => "running",
            StageStatus::Completed => "done",
            StageStatus::Error => "error",
        };
        let mut line = format!("{:<11} {:<8}", stage.as_str(), status);
        if let Some(pct) = self.percent(stage) {
            line.push_str(&format!(
                " {}/{} ({:>3}%)",
                event.iteration, event.max_iterations, pct
            ));
        }
        if let Some(message) = &event.message {
            line.push(' ');
            line.push_str(message);
        }
        line
    }

    pub fn render(&self) -> String {
        Stage::ALL
            .iter()
            .map(|s| self.render_line(*s))
            .collect::<Vec<_>>()
            .join("\n")
    }
}
