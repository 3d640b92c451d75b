//! # Stage Agents
//!
//! The collaborator seam of the pipeline. The driver invokes exactly one
//! [`StageAgent::run`] per stage and awaits it before advancing; an `Err`
//! fails the stage.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use super::emitter::StageTicker;
use super::events::Stage;
use super::payload::ResearchQuery;

/// Outputs of the stages that already ran
#[derive(Debug, Clone, Default, Serialize)]
pub struct StageOutputs {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub research: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analyze: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strategize: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compile: Option<Value>,
}

impl StageOutputs {
    pub fn get(&self, stage: Stage) -> Option<&Value> {
        match stage {
            Stage::Research => self.research.as_ref(),
            Stage::Analyze => self.analyze.as_ref(),
            Stage::Strategize => self.strategize.as_ref(),
            Stage::Compile => self.compile.as_ref(),
        }
    }

    pub fn set(&mut self, stage: Stage, output: Value) {
        let slot = match stage {
            Stage::Research => &mut self.research,
            Stage::Analyze => &mut self.analyze,
            Stage::Strategize => &mut self.strategize,
            Stage::Compile => &mut self.compile,
        };
        *slot = Some(output);
    }
}

/// What a stage agent gets to work with
#[derive(Debug, Clone, Copy)]
pub struct StageInput<'a> {
    pub research_id: &'a str,
    pub query: &'a ResearchQuery,
    pub prior: &'a StageOutputs,
}

/// External capability invoked once per stage
#[async_trait]
pub trait StageAgent: Send + Sync {
    /// Run `stage`, reporting units of work through `ticker`
    async fn run(
        &self,
        stage: Stage,
        input: StageInput<'_>,
        ticker: &StageTicker,
    ) -> anyhow::Result<Value>;

    /// Whether the agent can serve requests at all (e.g. credentials present)
    fn is_available(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outputs_slots() {
        let mut outputs = StageOutputs::default();
        assert!(outputs.get(Stage::Analyze).is_none());

        outputs.set(Stage::Analyze, serde_json::json!({"insights": 3}));
        assert_eq!(outputs.get(Stage::Analyze).unwrap()["insights"], 3);
        assert!(outputs.get(Stage::Research).is_none());

        let json = serde_json::to_value(&outputs).unwrap();
        assert!(json.get("research").is_none());
        assert!(json.get("analyze").is_some());
    }
}
