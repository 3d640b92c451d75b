//! # Market Research Agent
//!
//! The production [`StageAgent`]: searches the web, then asks the
//! configured LLMs to analyze the findings and derive strategy.

use anyhow::Context;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use super::agent::{StageAgent, StageInput};
use super::emitter::StageTicker;
use super::events::Stage;
use crate::config::ResearchConfig;
use crate::skills::tools::SearchClient;
use crate::skills::{
    AnalysisKind, AnalysisOutput, AnalysisSkill, CompileSkill, ResearchFindings, ResearchSkill,
    StrategyKind, StrategyOutput, StrategySkill,
};

/// Description of one stage agent, for status listings
#[derive(Debug, Clone, Serialize)]
pub struct AgentInfo {
    pub id: &'static str,
    pub name: &'static str,
    pub stage: Stage,
    pub description: &'static str,
    pub capabilities: Vec<&'static str>,
    /// Model used, or `None` for local stages
    pub model: Option<String>,
}

pub struct MarketResearchAgent {
    config: ResearchConfig,
    search: SearchClient,
}

impl MarketResearchAgent {
    pub fn new(config: ResearchConfig) -> anyhow::Result<Self> {
        let search = SearchClient::new(config.searxng_url.as_deref(), config.max_results)
            .context("Failed to create search client")?;
        Ok(Self { config, search })
    }

    /// The agents behind each stage
    pub fn describe(&self) -> Vec<AgentInfo> {
        let model = |stage: Stage| {
            let m = self.config.model_for(stage);
            Some(format!("{}/{}", m.provider, m.model))
        };
        vec![
            AgentInfo {
                id: "research_agent",
                name: "Research Agent",
                stage: Stage::Research,
                description: "Gathers market data through web, news, company and market searches",
                capabilities: vec!["web_search", "news_search", "company_search", "market_search"],
                model: model(Stage::Research),
            },
            AgentInfo {
                id: "analysis_agent",
                name: "Analysis Agent",
                stage: Stage::Analyze,
                description: "Turns research data into structured market insights",
                capabilities: all_analyses(),
                model: model(Stage::Analyze),
            },
            AgentInfo {
                id: "strategy_agent",
                name: "Strategy Agent",
                stage: Stage::Strategize,
                description: "Derives recommendations, risks and opportunities from the analysis",
                capabilities: all_strategies(),
                model: model(Stage::Strategize),
            },
            AgentInfo {
                id: "report_compiler",
                name: "Report Compiler",
                stage: Stage::Compile,
                description: "Assembles the final report",
                capabilities: vec!["final_report"],
                model: None,
            },
        ]
    }
}

fn all_analyses() -> Vec<&'static str> {
    use AnalysisKind::*;
    [MarketSize, MarketSegments, CompetitiveLandscape, Swot, Trends, KeyStatistics]
        .iter()
        .map(AnalysisKind::as_str)
        .collect()
}

fn all_strategies() -> Vec<&'static str> {
    use StrategyKind::*;
    [Recommendations, Risks, Opportunities, ActionPlan, CompetitiveResponse, ExecutiveSummary]
        .iter()
        .map(StrategyKind::as_str)
        .collect()
}

/// Typed output of an earlier stage
fn prior<T: DeserializeOwned>(input: &StageInput<'_>, stage: Stage) -> anyhow::Result<T> {
    let value = input
        .prior
        .get(stage)
        .with_context(|| format!("{} output missing", stage))?;
    serde_json::from_value(value.clone()).with_context(|| format!("Malformed {} output", stage))
}

#[async_trait]
impl StageAgent for MarketResearchAgent {
    async fn run(
        &self,
        stage: Stage,
        input: StageInput<'_>,
        ticker: &StageTicker,
    ) -> anyhow::Result<Value> {
        let model = self.config.model_for(stage);
        let query = input.query;

        let output = match stage {
            Stage::Research => {
                let findings = ResearchSkill::run(query, &self.search, &model, ticker)
                    .await
                    .context(format!(
                        "Research failed (provider: {}, model: {})",
                        model.provider, model.model
                    ))?;
                serde_json::to_value(findings)?
            }
            Stage::Analyze => {
                let findings: ResearchFindings = prior(&input, Stage::Research)?;
                let analysis = AnalysisSkill::run(query, &findings, &model, ticker).await?;
                serde_json::to_value(analysis)?
            }
            Stage::Strategize => {
                let analysis: AnalysisOutput = prior(&input, Stage::Analyze)?;
                let strategy = StrategySkill::run(query, &analysis, &model, ticker).await?;
                serde_json::to_value(strategy)?
            }
            Stage::Compile => {
                let findings: ResearchFindings = prior(&input, Stage::Research)?;
                let analysis: AnalysisOutput = prior(&input, Stage::Analyze)?;
                let strategy: StrategyOutput = prior(&input, Stage::Strategize)?;
                let report =
                    CompileSkill::run(query, &findings, &analysis, &strategy, ticker).await?;
                serde_json::to_value(report)?
            }
        };
        Ok(output)
    }

    fn is_available(&self) -> bool {
        self.config.llm_available()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{ResearchRequest, ResearchType, StageEmitter, StageOutputs, StageStatus};
    use serde_json::json;

    fn agent() -> MarketResearchAgent {
        MarketResearchAgent::new(ResearchConfig::default()).unwrap()
    }

    #[test]
    fn test_describe_covers_every_stage() {
        let agents = agent().describe();
        let stages: Vec<Stage> = agents.iter().map(|a| a.stage).collect();
        assert_eq!(stages, Stage::ALL.to_vec());
        assert!(agents[1].capabilities.contains(&"swot"));
        assert!(agents[3].model.is_none());
    }

    #[tokio::test]
    async fn test_analyze_without_hits_fails() {
        let query = ResearchRequest::new("quantum sensors", ResearchType::MarketOverview)
            .validate()
            .unwrap();
        let mut prior_outputs = StageOutputs::default();
        prior_outputs.set(
            Stage::Research,
            json!({"searches": [], "hits": [], "digest": {"overview": "", "key_findings": []}}),
        );
        let emitter = StageEmitter::detached();
        emitter.begin(Stage::Analyze).await.unwrap();

        let input = StageInput {
            research_id: "research_test",
            query: &query,
            prior: &prior_outputs,
        };
        let err = agent()
            .run(Stage::Analyze, input, &emitter.ticker(Stage::Analyze))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("no research data to analyze"));
        assert_eq!(emitter.status(Stage::Analyze).await, StageStatus::Running);
    }

    #[tokio::test]
    async fn test_missing_prior_output_is_an_error() {
        let query = ResearchRequest::new("quantum sensors", ResearchType::FullReport)
            .validate()
            .unwrap();
        let outputs = StageOutputs::default();
        let input = StageInput {
            research_id: "research_test",
            query: &query,
            prior: &outputs,
        };
        let emitter = StageEmitter::detached();
        let err = agent()
            .run(Stage::Compile, input, &emitter.ticker(Stage::Compile))
            .await
            .unwrap_err();
        assert!(format!("{:#}", err).contains("research output missing"));
    }
}
