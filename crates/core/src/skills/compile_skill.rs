//! # Compile Skill
//!
//! Assembles the final report from the stage outputs. Local only.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::pipeline::{ResearchQuery, ResearchType, StageTicker};
use crate::skills::analysis_skill::{AnalysisKind, AnalysisOutput, Insight};
use crate::skills::research_skill::{ResearchDigest, ResearchFindings};
use crate::skills::strategy_skill::{StrategyKind, StrategyOutput};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataSources {
    pub searches_performed: usize,
    pub data_points_analyzed: usize,
}

/// What each stage did
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowTrace {
    pub research: Vec<String>,
    pub analyze: Vec<AnalysisKind>,
    pub strategize: Vec<StrategyKind>,
}

/// The report carried in the payload's `results`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalReport {
    pub executive_summary: String,
    pub research_type: ResearchType,
    pub data_sources: DataSources,
    pub research: ResearchDigest,
    pub analysis: BTreeMap<AnalysisKind, Insight>,
    pub strategic_guidance: BTreeMap<StrategyKind, Insight>,
    pub workflow_trace: WorkflowTrace,
}

pub struct CompileSkill;

impl CompileSkill {
    pub async fn run(
        query: &ResearchQuery,
        research: &ResearchFindings,
        analysis: &AnalysisOutput,
        strategy: &StrategyOutput,
        ticker: &StageTicker,
    ) -> anyhow::Result<FinalReport> {
        let report = compile_report(query, research, analysis, strategy);
        ticker.report(1, 1, "Report assembled").await?;
        Ok(report)
    }
}

pub fn compile_report(
    query: &ResearchQuery,
    research: &ResearchFindings,
    analysis: &AnalysisOutput,
    strategy: &StrategyOutput,
) -> FinalReport {
    let executive_summary = [&strategy.executive_summary, &research.digest.overview]
        .into_iter()
        .map(|s| s.trim())
        .find(|s| !s.is_empty())
        .unwrap_or_default()
        .to_string();

    FinalReport {
        executive_summary,
        research_type: query.research_type,
        data_sources: DataSources {
            searches_performed: research.searches_performed(),
            data_points_analyzed: analysis.data_points_analyzed,
        },
        research: research.digest.clone(),
        analysis: analysis.analyses.clone(),
        strategic_guidance: strategy.strategies.clone(),
        workflow_trace: WorkflowTrace {
            research: research.searches.iter().map(|c| c.label()).collect(),
            analyze: analysis.analyses.keys().copied().collect(),
            strategize: strategy.strategies.keys().copied().collect(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::ResearchRequest;
    use crate::skills::tools::{SearchCall, SearchHit};

    fn findings() -> ResearchFindings {
        ResearchFindings {
            searches: vec![SearchCall::market("solar"), SearchCall::Web { query: "solar".into() }],
            hits: vec![SearchHit {
                title: "Solar installs hit record".into(),
                url: "https://example.com/solar".into(),
                snippet: "Installs up 40%".into(),
                category: "market_data".into(),
                published: None,
            }],
            digest: ResearchDigest {
                overview: "Solar keeps growing.".into(),
                key_findings: vec!["Installs up 40%".into()],
                key_players: vec![],
            },
        }
    }

    fn insight(summary: &str) -> Insight {
        Insight {
            summary: summary.into(),
            findings: vec![],
            confidence: "medium".into(),
        }
    }

    #[test]
    fn test_report_shape() {
        let query = ResearchRequest::new("solar", ResearchType::MarketOverview)
            .validate()
            .unwrap();
        let analysis = AnalysisOutput {
            analyses: BTreeMap::from([(AnalysisKind::Trends, insight("Rooftop leads"))]),
            data_points_analyzed: 1,
        };
        let strategy = StrategyOutput {
            strategies: BTreeMap::from([(StrategyKind::ExecutiveSummary, insight("Enter now."))]),
            executive_summary: "Enter now.".into(),
        };

        let report = compile_report(&query, &findings(), &analysis, &strategy);
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["executiveSummary"], "Enter now.");
        assert_eq!(json["researchType"], "market_overview");
        assert_eq!(json["dataSources"]["searchesPerformed"], 2);
        assert_eq!(json["analysis"]["trends"]["summary"], "Rooftop leads");
        assert_eq!(json["strategicGuidance"]["executive_summary"]["summary"], "Enter now.");
        assert_eq!(json["workflowTrace"]["analyze"][0], "trends");
    }

    #[test]
    fn test_summary_falls_back_to_research_overview() {
        let query = ResearchRequest::new("solar", ResearchType::TrendAnalysis)
            .validate()
            .unwrap();
        let analysis = AnalysisOutput {
            analyses: BTreeMap::new(),
            data_points_analyzed: 1,
        };
        let strategy = StrategyOutput {
            strategies: BTreeMap::new(),
            executive_summary: "  ".into(),
        };
        let report = compile_report(&query, &findings(), &analysis, &strategy);
        assert_eq!(report.executive_summary, "Solar keeps growing.");
    }
}
